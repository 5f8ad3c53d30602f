use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::pull::SortKey;
use crate::models::repo::DiscoveredRepo;

/// Where pull runs discover repositories.
#[async_trait]
pub trait RepoSource: Send + Sync {
    async fn search(&self, keyword: &str, sort: SortKey, limit: u32) -> Result<Vec<DiscoveredRepo>>;
    async fn repository(&self, full_name: &str) -> Result<DiscoveredRepo>;
    async fn readme(&self, full_name: &str) -> Result<Option<String>>;
    fn name(&self) -> &str;
}

/// Deterministic offline source used for simulated pull runs.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSource;

impl SimulatedSource {
    fn slug(keyword: &str) -> String {
        let slug: String = keyword
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let slug = slug.trim_matches('-').to_string();
        if slug.is_empty() {
            "repo".to_string()
        } else {
            slug
        }
    }

    fn make(keyword: &str, index: u32) -> DiscoveredRepo {
        let full_name = format!("simulated/{}-{}", Self::slug(keyword), index);
        DiscoveredRepo {
            url: format!("https://github.com/{}", full_name),
            description: Some(format!("Simulated result {} for '{}'", index, keyword.trim())),
            language: Some(["Rust", "Python", "TypeScript"][(index % 3) as usize].to_string()),
            stars: 1000 / index.max(1),
            forks: 100 / index.max(1),
            full_name,
        }
    }
}

#[async_trait]
impl RepoSource for SimulatedSource {
    async fn search(&self, keyword: &str, sort: SortKey, limit: u32) -> Result<Vec<DiscoveredRepo>> {
        let mut repos: Vec<_> = (1..=limit).map(|i| Self::make(keyword, i)).collect();
        if sort == SortKey::Forks {
            repos.sort_by(|a, b| b.forks.cmp(&a.forks));
        }
        Ok(repos)
    }

    async fn repository(&self, full_name: &str) -> Result<DiscoveredRepo> {
        let (keyword, index) = full_name
            .strip_prefix("simulated/")
            .and_then(|rest| rest.rsplit_once('-'))
            .and_then(|(slug, index)| index.parse::<u32>().ok().map(|i| (slug, i)))
            .ok_or_else(|| Error::NotFound(format!("repository {}", full_name)))?;
        Ok(Self::make(keyword, index))
    }

    async fn readme(&self, full_name: &str) -> Result<Option<String>> {
        Ok(Some(format!(
            "# {}\n\nThis repository was produced by a simulated pull run.\n",
            full_name
        )))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_results_are_deterministic() {
        let source = SimulatedSource;
        let first = source.search("Vue 3", SortKey::Stars, 3).await.unwrap();
        let second = source.search("Vue 3", SortKey::Stars, 3).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].full_name, "simulated/vue-3-1");
        assert!(first[0].stars > first[1].stars);
    }

    #[tokio::test]
    async fn test_simulated_repository_lookup() {
        let source = SimulatedSource;
        let repo = source.repository("simulated/gpt-2").await.unwrap();
        assert_eq!(repo.full_name, "simulated/gpt-2");
        assert!(source.repository("octocat/hello").await.is_err());
    }
}
