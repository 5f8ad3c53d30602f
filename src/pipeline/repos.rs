use std::path::{Component, Path};

use crate::error::{Error, Result};
use crate::models::repo::{RepoRecord, RepoStats, ReposQuery};
use crate::pipeline::Pipeline;

const DEFAULT_REPOS_LIMIT: u32 = 20;
const MAX_REPOS_LIMIT: u32 = 200;

impl Pipeline {
    /// Stored repositories with the most stars.
    pub fn repos(&self, query: &ReposQuery) -> Result<Vec<RepoRecord>> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_REPOS_LIMIT)
            .clamp(1, MAX_REPOS_LIMIT);
        self.storage.top_records(limit)
    }

    pub fn stats(&self) -> Result<RepoStats> {
        self.storage.repo_stats()
    }

    /// Reads a cached README. Only files inside the data directory are served.
    pub async fn readme(&self, path: &str) -> Result<String> {
        let requested = Path::new(path.trim());
        if path.trim().is_empty() {
            return Err(Error::Validation("path is required".to_string()));
        }
        if requested
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(Error::Validation("path must not leave the data directory".to_string()));
        }

        let root = tokio::fs::canonicalize(&self.config.data_dir)
            .await
            .map_err(|_| Error::NotFound(format!("file {}", path)))?;
        let resolved = tokio::fs::canonicalize(requested)
            .await
            .map_err(|_| Error::NotFound(format!("file {}", path)))?;
        if !resolved.starts_with(&root) {
            return Err(Error::Validation("path must not leave the data directory".to_string()));
        }

        Ok(tokio::fs::read_to_string(&resolved).await?)
    }

    /// A file written by the local publish target.
    pub async fn published_file(&self, name: &str) -> Result<String> {
        let valid = !name.is_empty()
            && name.ends_with(".md")
            && !name.starts_with('.')
            && !name.contains(['/', '\\']);
        if !valid {
            return Err(Error::Validation(format!("invalid file name '{}'", name)));
        }
        match tokio::fs::read_to_string(self.config.published_dir().join(name)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("file {}", name)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::repo::RecordStatus;
    use crate::test_support::{pipeline_with, CountingSource, FakeProviderFactory};

    #[tokio::test]
    async fn test_readme_is_sandboxed_to_data_dir() {
        let (pipeline, _github, dir) = pipeline_with(FakeProviderFactory::replying("ok"));
        let record = pipeline
            .storage()
            .upsert_record(&CountingSource::repo("ai", 1), None, None, RecordStatus::Pending)
            .unwrap();
        pipeline.ingest_records(vec![record.clone()], 1, 0).await;
        let path = pipeline
            .storage()
            .get_record(record.id)
            .unwrap()
            .unwrap()
            .readme_path
            .unwrap();

        let readme = pipeline.readme(&path).await.unwrap();
        assert!(readme.contains("is a small tool"));

        let outside = dir.path().join("secret.txt");
        std::fs::write(&outside, "secret").unwrap();
        let err = pipeline.readme(outside.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = pipeline.readme("data/../secret.txt").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_repos_and_stats() {
        let (pipeline, _github, _dir) = pipeline_with(FakeProviderFactory::replying("ok"));
        for i in 1..=3 {
            pipeline
                .storage()
                .upsert_record(&CountingSource::repo("ai", i), None, None, RecordStatus::Fetched)
                .unwrap();
        }
        let top = pipeline.repos(&ReposQuery { limit: Some(2) }).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].full_name, "octo/ai-1");

        let stats = pipeline.stats().unwrap();
        assert_eq!(stats.total_repos, 3);
        assert_eq!(stats.total_stars, 499 + 498 + 497);
        assert_eq!(stats.language_distribution.get("Rust"), Some(&3));
    }

    #[tokio::test]
    async fn test_published_file_names() {
        let (pipeline, _github, _dir) = pipeline_with(FakeProviderFactory::replying("ok"));
        assert!(matches!(
            pipeline.published_file("../x.md").await.unwrap_err(),
            Error::Validation(_)
        ));
        assert!(matches!(
            pipeline.published_file("missing.md").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
