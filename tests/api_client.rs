mod common;

use std::time::Duration;

use repopress::client::ClientError;
use repopress::models::analysis::{AnalyzeRequest, ModelOverride};
use repopress::models::publish::{PublishRequest, PublishStatus};
use repopress::models::pull::{PullRunRequest, SortKey};
use repopress::models::repo::RecordQuery;
use repopress::models::review::{AuditRequest, Verdict};
use repopress::models::settings::ModelConfig;
use repopress::models::task::{CreateTaskRequest, TaskStatus};
use repopress::{ApiClient, ClientConfig, ErrorKind};
use tokio::net::TcpListener;

use common::{spawn_app, ARTICLE};

async fn configure_model(client: &ApiClient) {
    client
        .save_model_config(&ModelConfig {
            api_key: Some("sk-test".to_string()),
            ..ModelConfig::default()
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_health() {
    let app = spawn_app().await;
    let health = app.client.health().await.unwrap();
    assert_eq!(health.status, "ok");
}

#[tokio::test]
async fn test_pull_run_persists_records() {
    let app = spawn_app().await;

    let result = app
        .client
        .pull_run(&PullRunRequest {
            keyword: "cli".to_string(),
            limit: 3,
            sort: SortKey::Stars,
            simulate: false,
            task_id: None,
        })
        .await
        .unwrap();
    assert_eq!(result.count, 3);
    assert!(result.persisted);

    let page = app.client.pull_records(&RecordQuery::default()).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 3);
}

#[tokio::test]
async fn test_reanalyze_all_needs_a_model() {
    let app = spawn_app().await;
    let err = app.client.reanalyze_all().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    configure_model(&app.client).await;
    let result = app.client.reanalyze_all().await.unwrap();
    assert_eq!(result.count, result.repos.len());
}

#[tokio::test]
async fn test_errors_carry_their_kind() {
    let app = spawn_app().await;

    let err = app.client.task_logs("task_missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(matches!(err, ClientError::Remote { status: 404, .. }));

    let err = app
        .client
        .pull_run(&PullRunRequest {
            limit: 0,
            ..PullRunRequest::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = app
        .client
        .analyze(&AnalyzeRequest {
            repo_full_name: "simulated/cli-1".to_string(),
            overrides: ModelOverride::default(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("No API key configured"));
}

#[tokio::test]
async fn test_unresponsive_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = ApiClient::new(&ClientConfig {
        base_url: format!("http://{}/api", addr),
        timeout: Duration::from_millis(200),
    })
    .unwrap();

    let err = client.health().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.kind(), ErrorKind::Transport);
    drop(listener);
}

#[tokio::test]
async fn test_article_flow_from_analysis_to_publication() {
    let app = spawn_app().await;
    configure_model(&app.client).await;

    let analysis = app
        .client
        .analyze(&AnalyzeRequest {
            repo_full_name: "simulated/cli-1".to_string(),
            overrides: ModelOverride::default(),
        })
        .await
        .unwrap();

    let request = CreateTaskRequest {
        analysis_id: Some(analysis.id),
        ..CreateTaskRequest::default()
    };
    let first = app.client.create_task(&request, Some("flow-1")).await.unwrap();
    let second = app.client.create_task(&request, Some("flow-1")).await.unwrap();
    assert_eq!(first.task_id, second.task_id);
    assert_eq!(first.repo_name.as_deref(), Some("simulated/cli-1"));

    let log = app
        .client
        .poll_task(&first.task_id, Duration::from_millis(20), 250)
        .await
        .unwrap();
    assert_eq!(log.status, TaskStatus::Succeeded);
    assert!(log.log.contains("draft stored"));

    let latest = app.client.latest_article().await.unwrap();
    assert_eq!(latest.task_id, first.task_id);
    assert_eq!(latest.content, ARTICLE);

    let pending = app.client.pending_review().await.unwrap();
    assert_eq!(pending.len(), 1);

    let decision = app
        .client
        .audit(&AuditRequest {
            task_id: first.task_id.clone(),
            verdict: Verdict::Approved,
            notes: None,
            content: None,
        })
        .await
        .unwrap();
    assert_eq!(decision.verdict, Verdict::Approved);

    let waiting = app.client.publish_pending().await.unwrap();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].article_id, first.task_id);

    let report = app
        .client
        .publish(&PublishRequest {
            article_id: first.task_id.clone(),
            targets: Vec::new(),
        })
        .await
        .unwrap();
    assert!(report.all_published());
    assert_eq!(report.outcomes[0].status, PublishStatus::Published);

    assert!(app.client.publish_pending().await.unwrap().is_empty());
    let links = app.client.publish_links().await.unwrap();
    assert_eq!(links.len(), 1);
    assert!(links[0].link.starts_with("/api/files/"));

    let err = app
        .client
        .audit(&AuditRequest {
            task_id: first.task_id.clone(),
            verdict: Verdict::Rejected,
            notes: None,
            content: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_poll_task_reports_failure() {
    let app = spawn_app().await;

    let task = app
        .client
        .create_task(
            &CreateTaskRequest {
                repo_name: Some("simulated/cli-2".to_string()),
                ..CreateTaskRequest::default()
            },
            None,
        )
        .await
        .unwrap();

    let log = app
        .client
        .poll_task(&task.task_id, Duration::from_millis(20), 250)
        .await
        .unwrap();
    assert_eq!(log.status, TaskStatus::Failed);
    assert_eq!(app.providers.calls(), 0);
}
