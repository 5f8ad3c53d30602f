use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::llm::prompts::plain_summary;
use crate::models::publish::Article;
use crate::models::settings::{PublishTargetConfig, PublishTargetKind};

/// One place an approved article can be published to.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes the article and returns its public link.
    async fn publish(&self, article: &Article) -> Result<String>;
    /// Checks that the target is usable without publishing anything.
    async fn check(&self) -> Result<String>;
    fn name(&self) -> &str;
}

pub trait PublisherFactory: Send + Sync {
    fn build(&self, target: &PublishTargetConfig) -> Result<Arc<dyn Publisher>>;
}

/// Writes Markdown files under the data directory.
pub struct LocalPublisher {
    name: String,
    dir: PathBuf,
    link_prefix: String,
}

impl LocalPublisher {
    pub fn new(name: impl Into<String>, dir: PathBuf, link_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir,
            link_prefix: link_prefix.into(),
        }
    }

    pub fn file_name(article: &Article) -> String {
        format!("{}_{}.md", article.id, safe_title(&article.title))
    }
}

/// File-name-safe form of a title, at most 50 characters.
pub fn safe_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .take(50)
        .collect();
    let cleaned = cleaned.trim_matches('_').to_string();
    if cleaned.is_empty() {
        "article".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl Publisher for LocalPublisher {
    async fn publish(&self, article: &Article) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let file_name = Self::file_name(article);
        let path = self.dir.join(&file_name);
        tokio::fs::write(&path, article.content.as_bytes()).await?;
        tracing::info!("Published {} to {}", article.id, path.display());
        Ok(format!("{}/{}", self.link_prefix, file_name))
    }

    async fn check(&self) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(format!("writing to {}", self.dir.display()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Posts the article as JSON to an HTTP endpoint.
pub struct WebhookPublisher {
    name: String,
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    article_id: &'a str,
    title: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    repo_name: Option<&'a str>,
    test: bool,
}

#[derive(Deserialize, Default)]
struct WebhookReply {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

impl WebhookPublisher {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            client: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> Result<reqwest::Response> {
        let mut request = self.client.post(&self.endpoint).json(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::PublishTarget(format!("{}: {}", self.name, e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::PublishTarget(format!(
                "{} returned {}: {}",
                self.name, status, body
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    async fn publish(&self, article: &Article) -> Result<String> {
        let payload = WebhookPayload {
            article_id: &article.id,
            title: &article.title,
            content: &article.content,
            repo_name: article.repo_name.as_deref(),
            test: false,
        };
        let response = self.post(&payload).await?;
        let reply: WebhookReply = response.json().await.unwrap_or_default();
        Ok(reply
            .url
            .or(reply.link)
            .unwrap_or_else(|| self.endpoint.clone()))
    }

    async fn check(&self) -> Result<String> {
        let payload = WebhookPayload {
            article_id: "",
            title: "connection test",
            content: "",
            repo_name: None,
            test: true,
        };
        let response = self.post(&payload).await?;
        Ok(format!("{} answered {}", self.endpoint, response.status()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub const WECHAT_API_BASE: &str = "https://api.weixin.qq.com";

/// Creates drafts in a WeChat official account. Publishing the draft is left
/// to the account owner.
pub struct WechatPublisher {
    name: String,
    client: Client,
    base_url: String,
    app_id: String,
    app_secret: String,
}

#[derive(Deserialize)]
struct WechatReply {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    media_id: Option<String>,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: Option<String>,
}

#[derive(Serialize)]
struct WechatDraft<'a> {
    articles: [WechatArticle<'a>; 1],
}

#[derive(Serialize)]
struct WechatArticle<'a> {
    title: &'a str,
    content: String,
    digest: String,
}

impl WechatPublisher {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        })
    }

    async fn call(&self, request: reqwest::RequestBuilder, what: &str) -> Result<WechatReply> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::PublishTarget(format!("{}: {}", self.name, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::PublishTarget(format!(
                "{} {} returned {}",
                self.name, what, status
            )));
        }
        let reply: WechatReply = response
            .json()
            .await
            .map_err(|e| Error::PublishTarget(format!("{} {}: {}", self.name, what, e)))?;
        if reply.errcode != 0 {
            return Err(Error::PublishTarget(format!(
                "{} {} failed ({}): {}",
                self.name,
                what,
                reply.errcode,
                reply.errmsg.as_deref().unwrap_or("no message")
            )));
        }
        Ok(reply)
    }

    async fn access_token(&self) -> Result<String> {
        let request = self
            .client
            .get(format!("{}/cgi-bin/token", self.base_url))
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", self.app_id.as_str()),
                ("secret", self.app_secret.as_str()),
            ]);
        self.call(request, "token").await?.access_token.ok_or_else(|| {
            Error::PublishTarget(format!("{} token reply had no access_token", self.name))
        })
    }
}

#[async_trait]
impl Publisher for WechatPublisher {
    async fn publish(&self, article: &Article) -> Result<String> {
        let token = self.access_token().await?;
        let draft = WechatDraft {
            articles: [WechatArticle {
                title: &article.title,
                content: wechat_html(&article.content),
                digest: plain_summary(&article.content),
            }],
        };
        let request = self
            .client
            .post(format!("{}/cgi-bin/draft/add", self.base_url))
            .query(&[("access_token", token.as_str())])
            .json(&draft);
        let media_id = self.call(request, "draft").await?.media_id.ok_or_else(|| {
            Error::PublishTarget(format!("{} draft reply had no media_id", self.name))
        })?;
        tracing::info!("Created WeChat draft {} for {}", media_id, article.id);
        Ok(format!("wechat://draft/{}", media_id))
    }

    async fn check(&self) -> Result<String> {
        self.access_token().await?;
        Ok(format!("access token granted for {}", self.app_id))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Line-based Markdown to the HTML subset the WeChat editor accepts. The
/// first `# ` heading is the draft title and is left out of the body.
pub fn wechat_html(markdown: &str) -> String {
    let mut html = String::new();
    let mut title_skipped = false;
    for line in markdown.lines() {
        let trimmed = line.trim();
        if let Some(title) = trimmed.strip_prefix("# ") {
            if !title_skipped {
                title_skipped = true;
                continue;
            }
            html.push_str(&format!("<h1>{}</h1>\n", escape_html(title.trim())));
        } else if let Some(heading) = trimmed.strip_prefix("### ") {
            html.push_str(&format!("<h3>{}</h3>\n", escape_html(heading.trim())));
        } else if let Some(heading) = trimmed.strip_prefix("## ") {
            html.push_str(&format!("<h2>{}</h2>\n", escape_html(heading.trim())));
        } else if let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
            html.push_str(&format!("<li>{}</li>\n", escape_html(item.trim())));
        } else if trimmed.len() > 4 && trimmed.starts_with("**") && trimmed.ends_with("**") {
            html.push_str(&format!(
                "<strong>{}</strong><br/>\n",
                escape_html(trimmed.trim_matches('*'))
            ));
        } else if let Some((text, url)) = markdown_link(trimmed) {
            html.push_str(&format!(
                "<a href=\"{}\">{}</a><br/>\n",
                escape_html(url),
                escape_html(text)
            ));
        } else if trimmed.is_empty() {
            html.push_str("<br/>\n");
        } else {
            html.push_str(&format!("{}<br/>\n", escape_html(trimmed)));
        }
    }
    html
}

/// `[text](url)` when the whole line is one link.
fn markdown_link(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix('[')?;
    let (text, rest) = rest.split_once("](")?;
    let url = rest.strip_suffix(')')?;
    (!text.is_empty() && !url.is_empty()).then_some((text, url))
}

pub struct DefaultPublisherFactory {
    published_dir: PathBuf,
    link_prefix: String,
    timeout: Duration,
}

impl DefaultPublisherFactory {
    pub fn new(published_dir: PathBuf, link_prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            published_dir,
            link_prefix: link_prefix.into(),
            timeout,
        }
    }
}

impl PublisherFactory for DefaultPublisherFactory {
    fn build(&self, target: &PublishTargetConfig) -> Result<Arc<dyn Publisher>> {
        Ok(match target.kind {
            PublishTargetKind::Local => Arc::new(LocalPublisher::new(
                target.name.clone(),
                self.published_dir.clone(),
                self.link_prefix.clone(),
            )),
            PublishTargetKind::Webhook => {
                let endpoint = target.endpoint.clone().ok_or_else(|| {
                    Error::Validation(format!("webhook target '{}' needs an endpoint", target.name))
                })?;
                Arc::new(WebhookPublisher::new(
                    target.name.clone(),
                    endpoint,
                    target.api_key.clone(),
                    self.timeout,
                )?)
            }
            PublishTargetKind::Wechat => {
                let (Some(app_id), Some(secret)) = (&target.app_id, &target.api_key) else {
                    return Err(Error::Validation(format!(
                        "wechat target '{}' needs app_id and api_key (app secret)",
                        target.name
                    )));
                };
                Arc::new(WechatPublisher::new(
                    target.name.clone(),
                    target.endpoint.as_deref().unwrap_or(WECHAT_API_BASE),
                    app_id.clone(),
                    secret.clone(),
                    self.timeout,
                )?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_title() {
        assert_eq!(safe_title("Hello, World: A Tour!"), "Hello__World__A_Tour");
        assert_eq!(safe_title("???"), "article");
        assert_eq!(safe_title(&"x".repeat(80)).len(), 50);
    }

    #[tokio::test]
    async fn test_local_publisher_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = LocalPublisher::new("local", dir.path().join("published"), "/api/files");
        let article = Article {
            id: "task_1".to_string(),
            title: "My Post".to_string(),
            content: "# My Post\n\nbody".to_string(),
            repo_name: None,
        };

        let link = publisher.publish(&article).await.unwrap();
        assert_eq!(link, "/api/files/task_1_My_Post.md");
        let written = std::fs::read_to_string(dir.path().join("published/task_1_My_Post.md")).unwrap();
        assert_eq!(written, article.content);
    }

    #[test]
    fn test_wechat_html() {
        let html = wechat_html(
            "# Title\n\n## Why\n**Fast** <b>\n- one & two\n[Repo](https://github.com/a/b)\nplain",
        );
        assert_eq!(
            html,
            "<br/>\n<h2>Why</h2>\n**Fast** &lt;b&gt;<br/>\n<li>one &amp; two</li>\n\
             <a href=\"https://github.com/a/b\">Repo</a><br/>\nplain<br/>\n"
        );
        assert_eq!(wechat_html("**Bold**"), "<strong>Bold</strong><br/>\n");
    }

    async fn serve_wechat(errcode: i64) -> String {
        use axum::extract::Query;
        use axum::routing::{get, post};
        use axum::{Json, Router};
        use serde_json::{json, Value};
        use std::collections::HashMap;

        let app = Router::new()
            .route(
                "/cgi-bin/token",
                get(|Query(query): Query<HashMap<String, String>>| async move {
                    if query.get("appid").map(String::as_str) == Some("wx1")
                        && query.get("secret").map(String::as_str) == Some("s3cret")
                    {
                        Json(json!({ "access_token": "tok", "expires_in": 7200 }))
                    } else {
                        Json(json!({ "errcode": 40013, "errmsg": "invalid appid" }))
                    }
                }),
            )
            .route(
                "/cgi-bin/draft/add",
                post(
                    move |Query(query): Query<HashMap<String, String>>, Json(body): Json<Value>| async move {
                        if errcode != 0 {
                            return Json(json!({ "errcode": errcode, "errmsg": "draft rejected" }));
                        }
                        assert_eq!(query.get("access_token").map(String::as_str), Some("tok"));
                        assert_eq!(body["articles"][0]["title"], "My Post");
                        Json(json!({ "media_id": "m-42" }))
                    },
                ),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn article() -> Article {
        Article {
            id: "task_1".to_string(),
            title: "My Post".to_string(),
            content: "# My Post\n\nA small tool.".to_string(),
            repo_name: Some("a/b".to_string()),
        }
    }

    #[tokio::test]
    async fn test_wechat_publisher_creates_draft() {
        let base = serve_wechat(0).await;
        let publisher =
            WechatPublisher::new("wechat", &base, "wx1", "s3cret", Duration::from_secs(5)).unwrap();
        assert!(publisher.check().await.unwrap().contains("wx1"));
        let link = publisher.publish(&article()).await.unwrap();
        assert_eq!(link, "wechat://draft/m-42");
    }

    #[tokio::test]
    async fn test_wechat_errors_are_target_failures() {
        let base = serve_wechat(45009).await;
        let publisher =
            WechatPublisher::new("wechat", &base, "wx1", "s3cret", Duration::from_secs(5)).unwrap();
        let err = publisher.publish(&article()).await.unwrap_err();
        assert!(matches!(&err, Error::PublishTarget(msg) if msg.contains("45009")));

        let wrong =
            WechatPublisher::new("wechat", &base, "wx1", "nope", Duration::from_secs(5)).unwrap();
        assert!(matches!(wrong.check().await, Err(Error::PublishTarget(_))));
    }

    #[test]
    fn test_factory_rejects_wechat_without_secret() {
        let factory = DefaultPublisherFactory::new(PathBuf::from("/tmp/unused"), "/api/files", Duration::from_secs(1));
        let target = PublishTargetConfig {
            name: "wechat".to_string(),
            kind: PublishTargetKind::Wechat,
            endpoint: None,
            api_key: None,
            app_id: Some("wx1".to_string()),
        };
        assert!(matches!(factory.build(&target), Err(Error::Validation(_))));
    }
}
