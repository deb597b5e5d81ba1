//! The canonical data model shared by every component of the digest engine.
//!
//! `TaskStatus`/`ArticleStatus` follow the same `sqlx::Type` + `FromStr` +
//! lowercase-rename shape as `hook-common`'s `JobStatus`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A HackerNews story as resolved by the Source Adapter (C4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub author: String,
}

impl Story {
    /// The canonical URL for this story: its own `url` if non-empty, else
    /// the synthetic `hn-item://{id}` scheme.
    pub fn canonical_url(&self) -> String {
        if self.url.is_empty() {
            format!("hn-item://{}", self.id)
        } else {
            self.url.clone()
        }
    }
}

/// A transient top-level comment on a story. Never persisted across
/// triggers; re-fetched inside the batch that processes its story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub story_id: i64,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Status of a per-day Task row. Transitions monotonically except
/// `processing -> processing` (idempotent re-entry) and any non-terminal
/// status moving to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "lowercase")]
pub enum TaskStatus {
    Init,
    #[sqlx(rename = "list_fetched")]
    ListFetched,
    Processing,
    Aggregating,
    Published,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Init => "init",
            TaskStatus::ListFetched => "list_fetched",
            TaskStatus::Processing => "processing",
            TaskStatus::Aggregating => "aggregating",
            TaskStatus::Published => "published",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0} is not a valid TaskStatus")]
pub struct ParseTaskStatusError(pub String);

impl FromStr for TaskStatus {
    type Err = ParseTaskStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(TaskStatus::Init),
            "list_fetched" => Ok(TaskStatus::ListFetched),
            "processing" => Ok(TaskStatus::Processing),
            "aggregating" => Ok(TaskStatus::Aggregating),
            "published" => Ok(TaskStatus::Published),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(ParseTaskStatusError(other.to_owned())),
        }
    }
}

/// Status of a per-story Article row within a Task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "lowercase")]
pub enum ArticleStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArticleStatus::Pending => "pending",
            ArticleStatus::Processing => "processing",
            ArticleStatus::Completed => "completed",
            ArticleStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0} is not a valid ArticleStatus")]
pub struct ParseArticleStatusError(pub String);

impl FromStr for ArticleStatus {
    type Err = ParseArticleStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ArticleStatus::Pending),
            "processing" => Ok(ArticleStatus::Processing),
            "completed" => Ok(ArticleStatus::Completed),
            "failed" => Ok(ArticleStatus::Failed),
            other => Err(ParseArticleStatusError(other.to_owned())),
        }
    }
}

/// The per-day job record owning a day's Articles. At most one row exists
/// per `date`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Task {
    pub date: String,
    pub status: TaskStatus,
    pub total_articles: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The persistent per-story processing record for a day.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Article {
    pub task_date: String,
    pub story_id: i64,
    pub rank: i64,
    pub status: ArticleStatus,
    pub title: String,
    pub title_chinese: Option<String>,
    pub content: Option<String>,
    pub content_chinese: Option<String>,
    pub comment_summary: Option<String>,
    pub url: String,
    pub score: i64,
    pub timestamp: i64,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written by `completeArticle` (C8). Kept as a standalone struct so
/// callers cannot accidentally omit a required field.
#[derive(Debug, Clone, Default)]
pub struct CompletedFields {
    pub title_chinese: String,
    pub content_chinese: Option<String>,
    pub comment_summary: Option<String>,
}

/// Derived deterministically from a `completed` Article. Owned transiently
/// by the Aggregator during one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedStory {
    pub rank: i64,
    pub story_id: i64,
    pub title_chinese: String,
    pub title_english: String,
    pub score: i64,
    pub url: String,
    pub time: String,
    pub timestamp: i64,
    pub description: String,
    pub comment_summary: Option<String>,
}

/// Snapshot returned by `Task Store::snapshot` for the `/task-status`
/// endpoint and for the state machine's "any pending/processing left?"
/// check.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task: Task,
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.completed + self.failed
    }
}
