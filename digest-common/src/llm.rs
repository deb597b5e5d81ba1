//! C3 LLM Client: a uniform chat-completion call dispatched to one of three
//! providers (deepseek, openrouter, zhipu), gated by the C2 concurrency
//! gate and retried with provider-aware backoff.
//!
//! Grounded on `hook-worker/src/worker.rs`'s retryable/non-retryable HTTP
//! status split combined with the OpenAI-style `messages` request body
//! idiom seen across `other_examples/` LLM clients.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::concurrency::ConcurrencyGate;
use crate::error::{FailureCategory, LlmError};
use crate::retry::RetryPolicy;

/// Which backend a given request should be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Deepseek,
    Openrouter,
    Zhipu,
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Deepseek => "deepseek",
            Provider::Openrouter => "openrouter",
            Provider::Zhipu => "zhipu",
        }
    }

    fn base_url(&self) -> &'static str {
        match self {
            Provider::Deepseek => "https://api.deepseek.com/chat/completions",
            Provider::Openrouter => "https://openrouter.ai/api/v1/chat/completions",
            Provider::Zhipu => "https://open.bigmodel.cn/api/paas/v4/chat/completions",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

/// A single `chatCompletion` request, addressed at one provider.
pub struct ChatCompletionRequest {
    pub provider: Provider,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// When set, the response content is expected to parse as a JSON array
    /// of this length after stripping any fenced-code wrapper.
    pub expect_json_array_len: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ChatCompletionResponse {
    pub content: String,
    pub parsed_array: Option<Vec<Value>>,
    pub usage_total_tokens: Option<u64>,
}

#[derive(Serialize)]
struct ApiRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ApiResponseBody {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Deserialize)]
struct ApiChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ApiUsage {
    total_tokens: u64,
}

pub struct LlmClientConfig {
    pub api_keys: std::collections::HashMap<String, String>,
    pub max_retries: u32,
    /// Minimum delay enforced on rate-limit/5xx retries, per provider.
    pub provider_min_delay: std::collections::HashMap<String, Duration>,
    /// Wall-clock budget for waiting on the C2 concurrency gate before a
    /// call is cancelled rather than dispatched.
    pub gate_acquire_timeout: Duration,
    /// Sent as `HTTP-Referer` on Openrouter calls, per its attribution
    /// requirements. Falls back to a generic identifier when unset.
    pub openrouter_site_url: Option<String>,
    /// Sent as `X-Title` on Openrouter calls.
    pub openrouter_site_name: Option<String>,
}

pub struct LlmClient {
    client: reqwest::Client,
    gate: ConcurrencyGate,
    retry_policy: RetryPolicy,
    config: LlmClientConfig,
}

impl LlmClient {
    pub fn new(client: reqwest::Client, gate: ConcurrencyGate, config: LlmClientConfig) -> Self {
        Self { client, gate, retry_policy: RetryPolicy::default(), config }
    }

    pub async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let provider_name = request.provider.name().to_string();
        let _permit = self
            .gate
            .acquire(&provider_name, self.config.gate_acquire_timeout)
            .await?;

        let min_delay = self
            .config
            .provider_min_delay
            .get(&provider_name)
            .copied();

        let mut attempt = 0;
        loop {
            metrics::counter!("hn_digest_llm_requests_total", "provider" => provider_name.clone())
                .increment(1);
            let started = tokio::time::Instant::now();
            let outcome = self.try_once(&request).await;
            metrics::histogram!("hn_digest_llm_request_duration_seconds", "provider" => provider_name.clone())
                .record(started.elapsed().as_secs_f64());

            match outcome {
                Ok(response) => return Ok(response),
                Err(err @ LlmError::Parse { .. }) => return Err(err),
                Err(err) if attempt + 1 >= self.config.max_retries => {
                    return match err {
                        LlmError::Transport(_, boxed)
                            if boxed.as_ref().is_some_and(|e| e.category == FailureCategory::RateLimit) =>
                        {
                            Err(LlmError::RateLimitExhausted { provider: provider_name })
                        }
                        other => Err(other),
                    };
                }
                Err(_) => {
                    metrics::counter!("hn_digest_llm_retries_total", "provider" => provider_name.clone())
                        .increment(1);
                    let delay = self.retry_policy.delay_for_attempt(attempt, min_delay);
                    warn!(provider = %provider_name, attempt, delay_ms = delay.as_millis() as u64, "retrying chat completion");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_once(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let provider_name = request.provider.name();
        let api_key = self
            .config
            .api_keys
            .get(provider_name)
            .ok_or_else(|| LlmError::Transport(provider_name.to_string(), None))?;

        let body = ApiRequestBody {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        let mut builder = self
            .client
            .post(request.provider.base_url())
            .bearer_auth(api_key)
            .json(&body);

        if request.provider == Provider::Openrouter {
            let site_url = self
                .config
                .openrouter_site_url
                .as_deref()
                .unwrap_or("https://github.com");
            let site_name = self
                .config
                .openrouter_site_name
                .as_deref()
                .unwrap_or("hn-daily-digest");
            builder = builder
                .header("HTTP-Referer", site_url)
                .header("X-Title", site_name);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(provider_name, categorize_reqwest_error(&e)))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(transport_error(
                provider_name,
                FetchErrorShim::new(FailureCategory::RateLimit, status.as_u16()),
            ));
        }
        if status.is_server_error() {
            return Err(transport_error(
                provider_name,
                FetchErrorShim::new(FailureCategory::Http5xx, status.as_u16()),
            ));
        }
        if !status.is_success() {
            return Err(transport_error(
                provider_name,
                FetchErrorShim::new(FailureCategory::Http4xx, status.as_u16()),
            ));
        }

        let parsed: ApiResponseBody = response
            .json()
            .await
            .map_err(|e| transport_error(provider_name, categorize_reqwest_error(&e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        let parsed_array = match request.expect_json_array_len {
            Some(expected_len) => Some(parse_json_array(&content, expected_len)?),
            None => None,
        };

        Ok(ChatCompletionResponse {
            content,
            parsed_array,
            usage_total_tokens: parsed.usage.map(|u| u.total_tokens),
        })
    }
}

/// Strip a fenced-code wrapper (```json ... ``` or ``` ... ```) if present,
/// then parse as a JSON array and check its length.
fn parse_json_array(content: &str, expected_len: usize) -> Result<Vec<Value>, LlmError> {
    let stripped = strip_fenced_code(content);
    let value: Value = serde_json::from_str(stripped).map_err(|e| LlmError::Parse {
        reason: format!("invalid JSON: {e}"),
        raw_content: content.to_string(),
    })?;
    let Value::Array(items) = value else {
        return Err(LlmError::Parse {
            reason: "expected a JSON array".to_string(),
            raw_content: content.to_string(),
        });
    };
    if items.len() != expected_len {
        return Err(LlmError::Parse {
            reason: format!("expected {expected_len} items, got {}", items.len()),
            raw_content: content.to_string(),
        });
    }
    Ok(items)
}

fn strip_fenced_code(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map(str::trim).unwrap_or(rest)
}

struct FetchErrorShim {
    category: FailureCategory,
    status: u16,
}

impl FetchErrorShim {
    fn new(category: FailureCategory, status: u16) -> Self {
        Self { category, status }
    }
}

fn transport_error(provider: &str, shim: FetchErrorShim) -> LlmError {
    LlmError::Transport(
        provider.to_string(),
        Some(Box::new(crate::error::FetchError::new(
            shim.category,
            format!("http status {}", shim.status),
            Some(shim.status),
        ))),
    )
}

fn categorize_reqwest_error(error: &reqwest::Error) -> FetchErrorShim {
    if error.is_timeout() {
        FetchErrorShim::new(FailureCategory::Timeout, 0)
    } else if error.is_decode() {
        FetchErrorShim::new(FailureCategory::Parse, 0)
    } else {
        FetchErrorShim::new(FailureCategory::Network, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_code_with_language_tag() {
        let input = "```json\n[1, 2, 3]\n```";
        assert_eq!(strip_fenced_code(input), "[1, 2, 3]");
    }

    #[test]
    fn strips_fenced_code_without_language_tag() {
        let input = "```\n[\"a\"]\n```";
        assert_eq!(strip_fenced_code(input), "[\"a\"]");
    }

    #[test]
    fn passes_through_unfenced_content() {
        assert_eq!(strip_fenced_code("[1]"), "[1]");
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = parse_json_array("[1, 2]", 3).unwrap_err();
        assert!(matches!(err, LlmError::Parse { .. }));
    }

    #[test]
    fn rejects_non_array() {
        let err = parse_json_array("{\"a\": 1}", 1).unwrap_err();
        assert!(matches!(err, LlmError::Parse { .. }));
    }

    #[test]
    fn accepts_matching_array() {
        let items = parse_json_array("```json\n[1, 2]\n```", 2).unwrap();
        assert_eq!(items.len(), 2);
    }
}
