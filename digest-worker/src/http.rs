//! HTTP surface: trigger endpoints, task-status lookup, and the ambient
//! health/metrics/liveness/readiness routes.
//!
//! Grounded on `hook-worker/src/main.rs`'s `Router::new().route("/", ...)
//! .route("/_readiness", ...).route("/_liveness", ...)` composition with
//! `hook_common::metrics::setup_metrics_router()` layered on top; the
//! trigger/task-status routes are this service's own addition.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use digest_common::health::HealthRegistry;
use digest_common::models::TaskSnapshot;

use crate::config::Config;
use crate::taskstore::TaskStore;

/// Shared state reachable from every route. `trigger` builds a fresh
/// [`crate::state_machine::StateMachine`] per invocation since its
/// publisher set borrows a short-lived `reqwest::Client`/`Octocrab`.
pub struct AppState {
    pub store: TaskStore,
    pub config: Config,
    pub http_client: reqwest::Client,
    pub llm: digest_common::llm::LlmClient,
    pub fetcher: digest_common::fetch::BudgetedFetcher,
    pub liveness: HealthRegistry,
}

pub fn router(state: Arc<AppState>) -> Router {
    let liveness = state.liveness.clone();
    let router = Router::new()
        .route("/", get(index))
        .route("/trigger-export", post(trigger_export))
        .route("/trigger-export-sync", post(trigger_export_sync))
        .route("/task-status", get(task_status))
        .route("/retry-failed-tasks", post(retry_failed_tasks))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || std::future::ready(liveness.get_status())))
        .with_state(state);

    digest_common::metrics::setup_metrics_router().merge(router)
}

async fn index() -> &'static str {
    "hn-daily-digest worker"
}

#[derive(Deserialize)]
struct DateQuery {
    date: Option<String>,
}

/// Resolves the target date for a trigger: explicit overrides win, otherwise
/// the UTC calendar date of "yesterday" (a daily digest covers the prior
/// day's complete set of stories, whether the trigger is the periodic cron
/// tick or a manual HTTP call).
fn resolve_date(date: Option<String>) -> String {
    date.unwrap_or_else(|| (chrono::Utc::now().date_naive() - chrono::Duration::days(1)).format("%Y-%m-%d").to_string())
}

#[derive(Serialize)]
struct TriggerResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// `POST /trigger-export`: accepts the request and runs the pipeline in
/// the background, returning `202 Accepted` immediately.
async fn trigger_export(State(state): State<Arc<AppState>>, Query(query): Query<DateQuery>) -> impl IntoResponse {
    let date = resolve_date(query.date);
    tokio::spawn(async move {
        if let Err(err) = advance_for_date(&state, &date).await {
            error!(date, error = %err, "background trigger-export failed");
        }
    });
    (axum::http::StatusCode::ACCEPTED, Json(TriggerResponse { success: true, message: Some("accepted".to_string()), error: None }))
}

/// `POST /trigger-export-sync`: runs the pipeline inline and reports the
/// outcome.
async fn trigger_export_sync(State(state): State<Arc<AppState>>, Query(query): Query<DateQuery>) -> impl IntoResponse {
    let date = resolve_date(query.date);
    match advance_for_date(&state, &date).await {
        Ok(snapshot) => (
            axum::http::StatusCode::OK,
            Json(TriggerResponse {
                success: true,
                message: Some(format!("task for {date} reached status {}", snapshot.task.status)),
                error: None,
            }),
        ),
        Err(err) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(TriggerResponse { success: false, message: None, error: Some(err.to_string()) }),
        ),
    }
}

async fn task_status(State(state): State<Arc<AppState>>, Query(query): Query<DateQuery>) -> impl IntoResponse {
    let date = resolve_date(query.date);
    match state.store.snapshot(&date).await {
        Ok(snapshot) => (axum::http::StatusCode::OK, Json(Some(snapshot))).into_response(),
        Err(_) => (axum::http::StatusCode::NOT_FOUND, Json(None::<TaskSnapshot>)).into_response(),
    }
}

async fn retry_failed_tasks(State(state): State<Arc<AppState>>, Query(query): Query<DateQuery>) -> impl IntoResponse {
    let date = resolve_date(query.date);
    match state.store.retry_failed(&date).await {
        Ok(count) => (
            axum::http::StatusCode::OK,
            Json(TriggerResponse { success: true, message: Some(format!("reset {count} articles to pending")), error: None }),
        ),
        Err(err) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(TriggerResponse { success: false, message: None, error: Some(err.to_string()) }),
        ),
    }
}

/// Builds the per-invocation pipeline components and drives the state
/// machine for `date` to completion. Exposed for the periodic trigger loop
/// in `main.rs` as well as the trigger-export routes below.
pub async fn advance_for_date(state: &AppState, date: &str) -> Result<TaskSnapshot, crate::error::EngineError> {
    let (provider, model) = state
        .config
        .llm
        .selected()
        .map(|(name, _key, model)| (provider_from_name(name), model.to_string()))
        .ok_or(crate::error::EngineError::NoLlmProviderConfigured)?;

    let source = crate::source_adapter::SourceAdapter::new(&state.fetcher, state.config.story_limit(), state.config.time_window_hours());
    let extractor = crate::content_extractor::ContentExtractor::new(
        &state.fetcher,
        &state.http_client,
        state.config.crawler_api_url.clone(),
        state.config.crawler_api_token.clone(),
    );
    let translator = crate::translator::Translator::new(&state.llm, provider, model.clone());
    let classifier = crate::classifier::Classifier::new(
        &state.llm,
        provider,
        model,
        state.config.enable_content_filter,
        state.config.content_filter_sensitivity,
    );
    let batch_executor = crate::batch_executor::BatchExecutor::new(
        &state.store,
        &source,
        &extractor,
        &translator,
        state.config.summary_max_length(),
    );

    let publishers = crate::state_machine::enabled_publishers(&state.config, state.http_client.clone())?;
    let state_machine = crate::state_machine::StateMachine::new(
        &state.store,
        &source,
        &classifier,
        &batch_executor,
        &publishers,
        state.config.task_batch_size(),
    );

    Ok(state_machine.advance(date).await?)
}

fn provider_from_name(name: &str) -> digest_common::llm::Provider {
    match name {
        "deepseek" => digest_common::llm::Provider::Deepseek,
        "openrouter" => digest_common::llm::Provider::Openrouter,
        "zhipu" => digest_common::llm::Provider::Zhipu,
        _ => digest_common::llm::Provider::Deepseek,
    }
}

#[cfg(test)]
mod tests {
    use super::resolve_date;

    #[test]
    fn resolve_date_falls_back_to_yesterday() {
        let yesterday = (chrono::Utc::now().date_naive() - chrono::Duration::days(1)).format("%Y-%m-%d").to_string();
        assert_eq!(resolve_date(None), yesterday);
    }

    #[test]
    fn resolve_date_passes_through_explicit_date() {
        assert_eq!(resolve_date(Some("2026-07-01".to_string())), "2026-07-01");
    }
}
