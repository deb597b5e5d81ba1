//! C1 Budgeted Fetcher: a single HTTP GET path shared by the Source Adapter,
//! Content Extractor, and crawler-fallback client, with a fixed retry
//! budget and typed failure categorization.
//!
//! Grounded on `hook-common/src/webhook.rs`'s `From<&reqwest::Error> for
//! WebhookJobError` categorization (`is_timeout`/`is_status`/connection
//! catch-all), generalized from a one-shot webhook delivery into a
//! reusable retrying fetcher.

use std::time::Duration;

use tracing::warn;

use crate::error::{FailureCategory, FetchError};
use crate::retry::RetryPolicy;

/// Configuration for a [`BudgetedFetcher`].
#[derive(Debug, Clone)]
pub struct FetchBudget {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for FetchBudget {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Thin wrapper around a `reqwest::Client` that retries the categories of
/// failure known to be transient (`Network`, `Http5xx`, `RateLimit`) and
/// fails fast on everything else, including `Timeout`: a deadline that was
/// already hit once is unlikely to be met by retrying the same budget.
pub struct BudgetedFetcher {
    client: reqwest::Client,
    budget: FetchBudget,
}

impl BudgetedFetcher {
    pub fn new(client: reqwest::Client, budget: FetchBudget) -> Self {
        Self { client, budget }
    }

    /// GET `url`, returning the raw body. If `expect_json` is set, a
    /// non-JSON `Content-Type` response is classified as [`FailureCategory::Parse`]
    /// and not retried.
    pub async fn get(&self, url: &str, expect_json: bool) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            match self.try_once(url, expect_json).await {
                Ok(body) => return Ok(body),
                Err(err) if attempt + 1 >= self.budget.max_attempts || !is_retryable(err.category) => {
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.budget.retry_policy.delay_for_attempt(attempt, None);
                    warn!(url, attempt, category = %err.category, delay_ms = delay.as_millis() as u64, "retrying fetch");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_once(&self, url: &str, expect_json: bool) -> Result<String, FetchError> {
        let response = tokio::time::timeout(self.budget.timeout, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::new(FailureCategory::Timeout, format!("timed out after {:?}", self.budget.timeout), None))?
            .map_err(categorize_transport_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FetchError::new(
                FailureCategory::RateLimit,
                format!("rate limited ({status})"),
                Some(status.as_u16()),
            ));
        }
        if status.is_server_error() {
            return Err(FetchError::new(
                FailureCategory::Http5xx,
                format!("server error ({status})"),
                Some(status.as_u16()),
            ));
        }
        if !status.is_success() {
            return Err(FetchError::new(
                FailureCategory::Http4xx,
                format!("unexpected status ({status})"),
                Some(status.as_u16()),
            ));
        }

        if expect_json {
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_owned();
            if !content_type.contains("json") {
                return Err(FetchError::new(
                    FailureCategory::Parse,
                    format!("expected JSON content-type, got {content_type:?}"),
                    Some(status.as_u16()),
                ));
            }
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::new(FailureCategory::Parse, e.to_string(), None))
    }
}

fn categorize_transport_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::new(FailureCategory::Timeout, error.to_string(), None)
    } else if error.is_status() {
        let status = error.status().map(|s| s.as_u16());
        FetchError::new(FailureCategory::Http4xx, error.to_string(), status)
    } else {
        FetchError::new(FailureCategory::Network, error.to_string(), None)
    }
}

fn is_retryable(category: FailureCategory) -> bool {
    matches!(
        category,
        FailureCategory::Network | FailureCategory::Http5xx | FailureCategory::RateLimit
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_categories() {
        assert!(is_retryable(FailureCategory::Network));
        assert!(is_retryable(FailureCategory::Http5xx));
        assert!(is_retryable(FailureCategory::RateLimit));
        assert!(!is_retryable(FailureCategory::Timeout));
        assert!(!is_retryable(FailureCategory::Http4xx));
        assert!(!is_retryable(FailureCategory::Parse));
    }
}
