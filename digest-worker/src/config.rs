use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3301")]
    pub port: u16,

    #[envconfig(default = "digest.sqlite3")]
    pub database_url: String,

    #[envconfig(default = "5000")]
    pub trigger_poll_interval: EnvMsDuration,

    #[envconfig(default = "10000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(default = "30")]
    pub hn_story_limit: u32,

    #[envconfig(default = "24")]
    pub hn_time_window_hours: u32,

    #[envconfig(default = "300")]
    pub summary_max_length: u32,

    #[envconfig(default = "6")]
    pub task_batch_size: u32,

    #[envconfig(default = "3")]
    pub max_retry_count: u32,

    #[envconfig(default = "false")]
    pub enable_content_filter: bool,

    #[envconfig(default = "medium")]
    pub content_filter_sensitivity: ContentFilterSensitivity,

    #[envconfig(default = "false")]
    pub local_test_mode: bool,

    pub crawler_api_url: Option<String>,
    pub crawler_api_token: Option<String>,

    #[envconfig(nested = true)]
    pub llm: LlmConfig,

    #[envconfig(nested = true)]
    pub github: GithubConfig,

    #[envconfig(nested = true)]
    pub telegram: TelegramConfig,

    #[envconfig(nested = true)]
    pub retry_policy: RetryPolicyConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `HN_STORY_LIMIT` clamped to the spec's documented 1-100 range.
    pub fn story_limit(&self) -> u32 {
        self.hn_story_limit.clamp(1, 100)
    }

    /// `HN_TIME_WINDOW_HOURS` clamped to the spec's documented 1-168 range.
    pub fn time_window_hours(&self) -> u32 {
        self.hn_time_window_hours.clamp(1, 168)
    }

    /// `TASK_BATCH_SIZE` clamped to the spec's documented 1-10 range.
    pub fn task_batch_size(&self) -> u32 {
        self.task_batch_size.clamp(1, 10)
    }

    /// `MAX_RETRY_COUNT` clamped to the spec's documented 0-10 range.
    pub fn max_retry_count(&self) -> u32 {
        self.max_retry_count.clamp(0, 10)
    }

    /// `SUMMARY_MAX_LENGTH` clamped to the spec's documented 50-1000 range.
    pub fn summary_max_length(&self) -> u32 {
        self.summary_max_length.clamp(50, 1000)
    }

    /// Terminal sink is forced on under `LOCAL_TEST_MODE`, satisfying the
    /// "at least one publisher configured" precondition.
    pub fn any_publisher_enabled(&self) -> bool {
        self.local_test_mode || self.github.enabled || self.telegram.enabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFilterSensitivity {
    Low,
    Medium,
    High,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseSensitivityError;

impl FromStr for ContentFilterSensitivity {
    type Err = ParseSensitivityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ParseSensitivityError),
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct LlmConfig {
    pub llm_provider: NonEmptyString,

    pub llm_deepseek_api_key: Option<String>,
    #[envconfig(default = "deepseek-chat")]
    pub llm_deepseek_model: String,

    pub llm_openrouter_api_key: Option<String>,
    #[envconfig(default = "openai/gpt-4o-mini")]
    pub llm_openrouter_model: String,
    pub llm_openrouter_site_url: Option<String>,
    pub llm_openrouter_site_name: Option<String>,

    pub llm_zhipu_api_key: Option<String>,
    #[envconfig(default = "glm-4-flash")]
    pub llm_zhipu_model: String,
}

impl LlmConfig {
    /// The API key and model for whichever provider `LLM_PROVIDER` names.
    /// Returns `None` if the selected provider has no key configured.
    pub fn selected(&self) -> Option<(&str, &str, &str)> {
        match self.llm_provider.as_str() {
            "deepseek" => Some(("deepseek", self.llm_deepseek_api_key.as_deref()?, &self.llm_deepseek_model)),
            "openrouter" => Some(("openrouter", self.llm_openrouter_api_key.as_deref()?, &self.llm_openrouter_model)),
            "zhipu" => Some(("zhipu", self.llm_zhipu_api_key.as_deref()?, &self.llm_zhipu_model)),
            _ => None,
        }
    }
}

#[derive(Envconfig, Clone, Default)]
pub struct GithubConfig {
    #[envconfig(from = "GITHUB_ENABLED", default = "false")]
    pub enabled: bool,
    #[envconfig(from = "GITHUB_TOKEN")]
    pub token: Option<String>,
    #[envconfig(from = "TARGET_REPO")]
    pub target_repo: Option<String>,
    #[envconfig(from = "TARGET_BRANCH", default = "main")]
    pub target_branch: String,
}

#[derive(Envconfig, Clone, Default)]
pub struct TelegramConfig {
    #[envconfig(from = "TELEGRAM_ENABLED", default = "false")]
    pub enabled: bool,
    #[envconfig(from = "TELEGRAM_BOT_TOKEN")]
    pub bot_token: Option<String>,
    #[envconfig(from = "TELEGRAM_CHANNEL_ID")]
    pub channel_id: Option<String>,
    #[envconfig(from = "TELEGRAM_BATCH_SIZE", default = "2")]
    pub batch_size: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Envconfig, Clone)]
pub struct RetryPolicyConfig {
    #[envconfig(default = "2")]
    pub backoff_coefficient: u32,

    #[envconfig(default = "1000")]
    pub initial_interval: EnvMsDuration,

    #[envconfig(default = "30000")]
    pub maximum_interval: EnvMsDuration,
}

#[derive(Debug, Clone)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_story_limit_to_documented_range() {
        let mut config = test_config();
        config.hn_story_limit = 500;
        assert_eq!(config.story_limit(), 100);
        config.hn_story_limit = 0;
        assert_eq!(config.story_limit(), 1);
    }

    fn test_config() -> Config {
        Config {
            host: "0.0.0.0".into(),
            port: 3301,
            database_url: ":memory:".into(),
            trigger_poll_interval: EnvMsDuration(time::Duration::from_millis(5000)),
            request_timeout: EnvMsDuration(time::Duration::from_millis(10000)),
            hn_story_limit: 30,
            hn_time_window_hours: 24,
            summary_max_length: 300,
            task_batch_size: 6,
            max_retry_count: 3,
            enable_content_filter: false,
            content_filter_sensitivity: ContentFilterSensitivity::Medium,
            local_test_mode: true,
            crawler_api_url: None,
            crawler_api_token: None,
            llm: LlmConfig {
                llm_provider: NonEmptyString("deepseek".into()),
                llm_deepseek_api_key: Some("test".into()),
                llm_deepseek_model: "deepseek-chat".into(),
                llm_openrouter_api_key: None,
                llm_openrouter_model: "openai/gpt-4o-mini".into(),
                llm_openrouter_site_url: None,
                llm_openrouter_site_name: None,
                llm_zhipu_api_key: None,
                llm_zhipu_model: "glm-4-flash".into(),
            },
            github: GithubConfig::default(),
            telegram: TelegramConfig::default(),
            retry_policy: RetryPolicyConfig {
                backoff_coefficient: 2,
                initial_interval: EnvMsDuration(time::Duration::from_millis(1000)),
                maximum_interval: EnvMsDuration(time::Duration::from_millis(30000)),
            },
        }
    }
}
