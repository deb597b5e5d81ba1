//! Process entrypoint: wires configuration, the shared HTTP client/LLM
//! client/Task Store, a periodic trigger loop for "today", and the axum
//! HTTP surface, running both concurrently via `select!`.
//!
//! Grounded on `hook-worker/src/main.rs`'s shape: build config, build a
//! `HealthRegistry`, spawn the metrics/health router on its own task, run
//! the long-lived worker loop on the main task.

use std::sync::Arc;
use std::time::Duration;

use envconfig::Envconfig;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{error, info};

use digest_common::concurrency::ConcurrencyGate;
use digest_common::fetch::{BudgetedFetcher, FetchBudget};
use digest_common::health::HealthRegistry;
use digest_common::llm::{LlmClient, LlmClientConfig};
use digest_worker::config::Config;
use digest_worker::error::EngineError;
use digest_worker::http::{self, AppState};
use digest_worker::taskstore::TaskStore;

const LIVENESS_DEADLINE: time::Duration = time::Duration::seconds(120);

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("invalid configuration");

    if !config.any_publisher_enabled() {
        panic!("no publisher is configured: set LOCAL_TEST_MODE=true or enable GITHUB_ENABLED/TELEGRAM_ENABLED");
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite://{}?mode=rwc", config.database_url))
        .await
        .expect("failed to open task store database");
    let store = TaskStore::new(pool);
    store.migrate().await.expect("failed to run task store migrations");

    let http_client = reqwest::Client::builder()
        .timeout(config.request_timeout.0)
        .build()
        .expect("failed to build http client");

    let mut api_keys = std::collections::HashMap::new();
    if let Some(key) = &config.llm.llm_deepseek_api_key {
        api_keys.insert("deepseek".to_string(), key.clone());
    }
    if let Some(key) = &config.llm.llm_openrouter_api_key {
        api_keys.insert("openrouter".to_string(), key.clone());
    }
    if let Some(key) = &config.llm.llm_zhipu_api_key {
        api_keys.insert("zhipu".to_string(), key.clone());
    }

    let gate = ConcurrencyGate::new([
        ("deepseek".to_string(), 5),
        ("openrouter".to_string(), 5),
        ("zhipu".to_string(), 5),
    ]);
    let llm = LlmClient::new(
        http_client.clone(),
        gate,
        LlmClientConfig {
            api_keys,
            max_retries: config.max_retry_count().max(1),
            provider_min_delay: std::collections::HashMap::new(),
            gate_acquire_timeout: config.request_timeout.0,
            openrouter_site_url: config.llm.llm_openrouter_site_url.clone(),
            openrouter_site_name: config.llm.llm_openrouter_site_name.clone(),
        },
    );

    let fetcher = BudgetedFetcher::new(
        http_client.clone(),
        FetchBudget { max_attempts: 3, timeout: config.request_timeout.0, retry_policy: Default::default() },
    );

    let liveness = HealthRegistry::new("liveness");
    let worker_liveness = liveness.register("trigger-loop".to_string(), LIVENESS_DEADLINE).await;

    let state = Arc::new(AppState { store, config: config.clone(), http_client, llm, fetcher, liveness });

    let bind = config.bind();
    let router = http::router(state.clone());
    let server = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&bind).await.expect("failed to bind http listener");
        info!(bind, "serving http");
        axum::serve(listener, router).await.expect("http server exited");
    });

    let poll_interval = config.trigger_poll_interval.0;
    let trigger_loop = tokio::spawn(async move {
        loop {
            worker_liveness.report_healthy().await;
            // A cron trigger targets the UTC calendar date of "yesterday":
            // by the time the trigger fires, that day's story set is final.
            let date = (chrono::Utc::now().date_naive() - chrono::Duration::days(1)).format("%Y-%m-%d").to_string();
            if let Err(err) = run_trigger_tick(&state, &date).await {
                error!(date, error = %err, "periodic trigger tick failed");
            }
            tokio::time::sleep(poll_interval).await;
        }
    });

    tokio::select! {
        result = server => { result.expect("http server task panicked"); }
        result = trigger_loop => { result.expect("trigger loop task panicked"); }
    }

    Ok(())
}

/// One periodic attempt to advance today's task. Errors are logged and
/// swallowed by the caller loop; the next tick (`TRIGGER_POLL_INTERVAL`
/// later) tries again.
async fn run_trigger_tick(state: &Arc<AppState>, date: &str) -> Result<(), EngineError> {
    match tokio::time::timeout(Duration::from_secs(280), http::advance_for_date(state, date)).await {
        Ok(result) => result.map(|_| ()),
        Err(_elapsed) => {
            tracing::warn!(date, "trigger tick exceeded its wall-clock budget; will resume next poll");
            Ok(())
        }
    }
}
