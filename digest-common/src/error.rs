use thiserror::Error;

/// Category a failed HTTP call is classified into. Mirrors the retry policy
/// of [`crate::fetch::BudgetedFetcher`]: only `Network`, `Http5xx` and
/// `RateLimit` are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Timeout,
    Network,
    Http4xx,
    Http5xx,
    RateLimit,
    Parse,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureCategory::Timeout => "timeout",
            FailureCategory::Network => "network",
            FailureCategory::Http4xx => "http4xx",
            FailureCategory::Http5xx => "http5xx",
            FailureCategory::RateLimit => "rate-limit",
            FailureCategory::Parse => "parse",
        };
        write!(f, "{s}")
    }
}

/// Error produced by [`crate::fetch::BudgetedFetcher`].
#[derive(Error, Debug)]
#[error("fetch failed with category {category}: {message}")]
pub struct FetchError {
    pub category: FailureCategory,
    pub message: String,
    pub status: Option<u16>,
}

impl FetchError {
    pub fn new(category: FailureCategory, message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            category,
            message: message.into(),
            status,
        }
    }
}

/// Error produced by [`crate::llm::LlmClient`].
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("rate limit exhausted after retries for provider {provider}")]
    RateLimitExhausted { provider: String },
    #[error("transport error calling {provider}: {0}")]
    Transport(String, #[source] Option<Box<FetchError>>),
    #[error("could not parse model output as the expected shape: {reason}; raw content retained")]
    Parse { reason: String, raw_content: String },
    #[error("acquiring a concurrency permit was cancelled")]
    Cancelled,
}

impl LlmError {
    pub fn provider(&self) -> &str {
        match self {
            LlmError::RateLimitExhausted { provider } => provider,
            LlmError::Transport(provider, _) => provider,
            _ => "unknown",
        }
    }
}
