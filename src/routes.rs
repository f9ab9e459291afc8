use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::github::GitHubApi;
use crate::models::DateRange;
use crate::orchestrator::{RunState, StatsOrchestrator, StatsSnapshot};

pub struct AppState<A> {
    pub stats: Arc<StatsOrchestrator<A>>,
}

impl<A> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            stats: Arc::clone(&self.stats),
        }
    }
}

pub fn router<A: GitHubApi>(state: AppState<A>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(get_stats::<A>))
        .route("/date-range", put(set_date_range::<A>))
        .route("/run", post(trigger_run::<A>))
        .route("/repositories/refresh", post(refresh_repositories::<A>))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_stats<A: GitHubApi>(State(state): State<AppState<A>>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot().await)
}

#[derive(Debug, Deserialize)]
pub struct DateRangeRequest {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

async fn set_date_range<A: GitHubApi>(
    State(state): State<AppState<A>>,
    Json(request): Json<DateRangeRequest>,
) -> Json<StatsSnapshot> {
    state
        .stats
        .set_date_range(DateRange::new(request.start, request.end))
        .await;
    Json(state.stats.snapshot().await)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub run_id: u64,
    pub state: RunState,
}

async fn trigger_run<A: GitHubApi>(
    State(state): State<AppState<A>>,
) -> Result<(StatusCode, Json<RunResponse>), (StatusCode, String)> {
    let ticket = state
        .stats
        .trigger_run()
        .await
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RunResponse {
            run_id: ticket.run_id,
            state: RunState::Running,
        }),
    ))
}

async fn refresh_repositories<A: GitHubApi>(
    State(state): State<AppState<A>>,
) -> Result<Json<StatsSnapshot>, (StatusCode, String)> {
    state
        .stats
        .load_repositories()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;
    Ok(Json(state.stats.snapshot().await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RepositoryRef;
    use crate::test_support::{at, commit, FakeGitHub};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with(api: FakeGitHub) -> (Router, AppState<FakeGitHub>) {
        let stats = StatsOrchestrator::new(Arc::new(api), "alice", vec!["secret1".into()]);
        let state = AppState {
            stats: Arc::new(stats),
        };
        (router(state.clone()), state)
    }

    fn alice_github() -> FakeGitHub {
        FakeGitHub::new()
            .with_page(vec![RepositoryRef::public("pub1", 10)])
            .with_commits("pub1", vec![commit("c1", at(2024, 3, 1))])
            .with_stats("c1", 5, 1)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    fn json(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app_with(FakeGitHub::new());
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "ok");
    }

    #[tokio::test]
    async fn test_run_rejected_until_repositories_load() {
        let (app, _) = app_with(alice_github());
        let (status, body) = send(&app, "POST", "/run", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(String::from_utf8(body).unwrap(), "repository list is not loaded");
    }

    #[tokio::test]
    async fn test_refresh_then_run() {
        let (app, _) = app_with(alice_github());

        let (status, body) = send(&app, "POST", "/repositories/refresh", None).await;
        assert_eq!(status, StatusCode::OK);
        let snapshot = json(&body);
        assert_eq!(snapshot["state"], "ready");
        assert_eq!(snapshot["repositories"]["count"], 2);
        assert_eq!(snapshot["profileUrl"], "https://github.com/alice");

        let range = serde_json::json!({ "start": "2024-01-01", "end": "2024-12-31" });
        send(&app, "PUT", "/date-range", Some(range)).await;

        let (status, body) = send(&app, "POST", "/run", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let accepted = json(&body);
        assert_eq!(accepted["state"], "running");
        assert_eq!(
            accepted.as_object().unwrap().keys().collect::<Vec<_>>(),
            vec!["runId", "state"]
        );

        let mut snapshot = Value::Null;
        for _ in 0..200 {
            let (_, body) = send(&app, "GET", "/stats", None).await;
            snapshot = json(&body);
            if snapshot["state"] == "settled" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(snapshot["state"], "settled");
        assert_eq!(snapshot["totals"]["totalAdditions"], 5);
        assert_eq!(snapshot["totals"]["totalDeletions"], 1);
        assert_eq!(snapshot["totals"]["totalCommits"], 1);
        assert_eq!(snapshot["totals"]["totalRepos"], 1);
        assert_eq!(snapshot["totals"]["totalModifications"], 6);
        assert_eq!(snapshot["repoStats"][0]["repoName"], "pub1");
        assert_eq!(snapshot["repoStats"][0]["commits"], 1);
    }

    #[tokio::test]
    async fn test_date_range_update() {
        let (app, state) = app_with(alice_github());
        state.stats.load_repositories().await.unwrap();

        let range = serde_json::json!({ "start": "2023-02-01", "end": null });
        let (status, body) = send(&app, "PUT", "/date-range", Some(range)).await;

        assert_eq!(status, StatusCode::OK);
        let snapshot = json(&body);
        assert_eq!(snapshot["state"], "idle");
        assert_eq!(snapshot["runEnabled"], false);
        assert_eq!(snapshot["dateRange"]["start"], "2023-02-01");
        assert_eq!(snapshot["dateRange"]["end"], Value::Null);

        let (status, _) = send(&app, "POST", "/run", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_invalid_date_is_rejected() {
        let (app, _) = app_with(alice_github());
        let range = serde_json::json!({ "start": "not-a-date", "end": "2024-01-01" });
        let (status, _) = send(&app, "PUT", "/date-range", Some(range)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_refresh_failure_is_bad_gateway() {
        let (app, _) = app_with(FakeGitHub::new().with_listing_failure(1, 500));

        let (status, _) = send(&app, "POST", "/repositories/refresh", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (_, body) = send(&app, "GET", "/stats", None).await;
        let snapshot = json(&body);
        assert_eq!(snapshot["state"], "failed");
        assert_eq!(snapshot["repositories"]["status"], "failed");
    }
}
