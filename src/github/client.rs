use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::github::rate_limiter::{seconds_until, RateLimiter};
use crate::github::source::RepoSource;
use crate::models::pull::SortKey;
use crate::models::repo::{DiscoveredRepo, Repository, SearchResponse};

pub struct GitHubClient {
    client: Client,
    rate_limiter: RateLimiter,
    base_url: String,
}

impl GitHubClient {
    /// Builds a client. Without a token requests are anonymous and get the
    /// lower unauthenticated quota.
    pub fn new(token: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            header::HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static("repopress/0.1"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            rate_limiter: RateLimiter::default(),
            base_url: "https://api.github.com".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        self.rate_limiter.wait().await;
        let response = request.send().await?;
        self.rate_limiter.update_from_response(&response).await;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(response);
        }

        let exhausted = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0");
        if status == StatusCode::TOO_MANY_REQUESTS || (status == StatusCode::FORBIDDEN && exhausted) {
            let retry_after = response
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(seconds_until)
                .unwrap_or(60);
            return Err(Error::RateLimited(retry_after));
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::GitHubApi(format!(
            "Failed to fetch {}: {} - {}",
            what, status, body
        )))
    }

    pub async fn search_repositories(
        &self,
        keyword: &str,
        sort: SortKey,
        per_page: u32,
    ) -> Result<Vec<Repository>> {
        let url = format!("{}/search/repositories", self.base_url);
        let per_page = per_page.clamp(1, 100).to_string();
        let mut query = vec![("q", keyword), ("per_page", per_page.as_str())];
        if let Some(sort) = sort.as_query() {
            query.push(("sort", sort));
            query.push(("order", "desc"));
        }
        tracing::debug!("Searching repositories: {} (sort {})", keyword, sort.as_str());

        let response = self
            .send(self.client.get(&url).query(&query), "repository search")
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let result: SearchResponse = response.json().await?;
        tracing::info!(
            "Search '{}' matched {} repositories, returning {}",
            keyword,
            result.total_count,
            result.items.len()
        );
        Ok(result.items)
    }

    pub async fn get_repository(&self, full_name: &str) -> Result<Repository> {
        let url = format!("{}/repos/{}", self.base_url, full_name);
        tracing::debug!("Fetching repository: {}", full_name);

        let response = self.send(self.client.get(&url), full_name).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("repository {}", full_name)));
        }
        Ok(response.json().await?)
    }

    /// Raw README text, or `None` when the repository has no README.
    pub async fn get_readme(&self, full_name: &str) -> Result<Option<String>> {
        let url = format!("{}/repos/{}/readme", self.base_url, full_name);
        tracing::debug!("Fetching README: {}", full_name);

        let request = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/vnd.github.raw+json");
        let response = self.send(request, full_name).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }
}

#[async_trait]
impl RepoSource for GitHubClient {
    async fn search(&self, keyword: &str, sort: SortKey, limit: u32) -> Result<Vec<DiscoveredRepo>> {
        let repos = self.search_repositories(keyword, sort, limit).await?;
        Ok(repos.into_iter().map(DiscoveredRepo::from).collect())
    }

    async fn repository(&self, full_name: &str) -> Result<DiscoveredRepo> {
        Ok(self.get_repository(full_name).await?.into())
    }

    async fn readme(&self, full_name: &str) -> Result<Option<String>> {
        self.get_readme(full_name).await
    }

    fn name(&self) -> &str {
        "github"
    }
}
