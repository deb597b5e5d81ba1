use digest_common::error::{FetchError, LlmError};
use thiserror::Error;

/// Errors from the Content Extractor (C5). Never surfaces to callers:
/// `extract` always returns `{None, None}` on total failure, but this type
/// is retained for logging and metrics labeling.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("fetching article html failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("crawler fallback returned a non-2xx response or success=false: {0}")]
    CrawlerSoftFailure(String),
}

/// Errors from the Task Store (C8).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("a database error occurred: {0}")]
    Database(#[from] sqlx::Error),
    #[error("no task exists for date {0}")]
    TaskNotFound(String),
    #[error("article {story_id} not found for task {task_date}")]
    ArticleNotFound { task_date: String, story_id: i64 },
}

/// Errors from a publisher sink (C12). Whether a given failure aborts the
/// fan-out is decided by the sink's own [`crate::publishers::Publisher::is_hard`],
/// not by which variant this is.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("git sink: {0}")]
    Git(String),
    #[error("chat sink: {0}")]
    Chat(String),
}

/// Top-level error for a single per-story pipeline run inside the Batch
/// Executor (C10). Always attributable to one of C3/C5/C6/C7.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("llm call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),
    #[error("source fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("a publish sink failed: {0}")]
    Publish(#[from] PublishError),
    #[error("{0} is not a valid date (expected YYYY-MM-DD)")]
    InvalidDate(String),
}

/// Errors surfaced by the HTTP surface's trigger endpoints.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("no publisher is configured (set LOCAL_TEST_MODE, GITHUB_ENABLED, or TELEGRAM_ENABLED)")]
    NoPublisherConfigured,
    #[error("no api key configured for selected LLM_PROVIDER")]
    NoLlmProviderConfigured,
}
