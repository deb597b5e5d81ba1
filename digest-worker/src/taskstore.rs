//! C8 Task Store: durable per-day Task + Article state, with atomic
//! claim/transition operations. The single source of truth every other
//! component writes through.
//!
//! Grounded on `hook-common`'s evolved `pgqueue.rs` (`.conflict-side-0`):
//! `dequeue_tx`'s `WITH available AS (SELECT ... FOR UPDATE SKIP LOCKED)
//! UPDATE ... RETURNING` atomic-claim CTE, and the compare-and-set shape of
//! its job-transition methods (`WHERE queue = $1 AND id = $2 AND status =
//! $3`). SQLite has no `SKIP LOCKED`; since this crate runs a single writer
//! against its own file (see SPEC_FULL.md REDESIGN FLAGS), a plain
//! `BEGIN IMMEDIATE` transaction around the same `UPDATE ... RETURNING`
//! shape gives the same atomicity guarantee without needing row locking.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;

use digest_common::models::{Article, ArticleStatus, CompletedFields, StatusCounts, Story, Task, TaskSnapshot, TaskStatus};

use crate::error::StoreError;

pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                date TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                total_articles INTEGER NOT NULL DEFAULT 0,
                published_at TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                task_date TEXT NOT NULL REFERENCES tasks(date),
                story_id INTEGER NOT NULL,
                rank INTEGER NOT NULL,
                status TEXT NOT NULL,
                title TEXT NOT NULL,
                title_chinese TEXT,
                content TEXT,
                content_chinese TEXT,
                comment_summary TEXT,
                url TEXT NOT NULL,
                score INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (task_date, story_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS articles_task_status_rank ON articles (task_date, status, rank)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// `getOrCreateTask(date) -> Task`.
    pub async fn get_or_create_task(&self, date: &str) -> Result<Task, StoreError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO tasks (date, status, total_articles, created_at, updated_at) \
             VALUES (?1, 'init', 0, ?2, ?2) \
             ON CONFLICT (date) DO NOTHING",
        )
        .bind(date)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_task(date).await?.ok_or_else(|| StoreError::TaskNotFound(date.to_string()))
    }

    pub async fn get_task(&self, date: &str) -> Result<Option<Task>, StoreError> {
        let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE date = ?1")
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    /// `insertArticles(date, Story[]) -> void`. Writes all rows as
    /// `pending` inside one transaction; no partial insertion.
    pub async fn insert_articles(&self, date: &str, stories: &[Story]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        for (index, story) in stories.iter().enumerate() {
            let rank = (index + 1) as i64;
            sqlx::query(
                "INSERT INTO articles \
                 (task_date, story_id, rank, status, title, url, score, timestamp, retry_count, updated_at) \
                 VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?7, 0, ?8) \
                 ON CONFLICT (task_date, story_id) DO NOTHING",
            )
            .bind(date)
            .bind(story.id)
            .bind(rank)
            .bind(&story.title)
            .bind(story.canonical_url())
            .bind(story.score)
            .bind(story.created_at.timestamp())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE tasks SET total_articles = ?1, updated_at = ?2 WHERE date = ?3")
            .bind(stories.len() as i64)
            .bind(now)
            .bind(date)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// `listStories(date, status) -> Article[]`, ordered by rank ascending.
    pub async fn list_stories(&self, date: &str, status: ArticleStatus) -> Result<Vec<Article>, StoreError> {
        let articles = sqlx::query_as::<_, Article>(
            "SELECT * FROM articles WHERE task_date = ?1 AND status = ?2 ORDER BY rank ASC",
        )
        .bind(date)
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    /// `claimPendingBatch(date, n) -> Article[]`. Atomically selects up to
    /// `n` pending rows ordered by rank ascending and transitions them to
    /// `processing`.
    pub async fn claim_pending_batch(&self, date: &str, n: u32) -> Result<Vec<Article>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let claimed_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT story_id FROM articles \
             WHERE task_date = ?1 AND status = 'pending' \
             ORDER BY rank ASC LIMIT ?2",
        )
        .bind(date)
        .bind(n)
        .fetch_all(&mut *tx)
        .await?;

        if claimed_ids.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        for story_id in &claimed_ids {
            sqlx::query(
                "UPDATE articles SET status = 'processing', updated_at = ?1 \
                 WHERE task_date = ?2 AND story_id = ?3 AND status = 'pending'",
            )
            .bind(now)
            .bind(date)
            .bind(story_id)
            .execute(&mut *tx)
            .await?;
        }

        let claimed = sqlx::query_as::<_, Article>(
            "SELECT * FROM articles WHERE task_date = ?1 AND story_id IN (SELECT value FROM json_each(?2)) ORDER BY rank ASC",
        )
        .bind(date)
        .bind(serde_json::to_string(&claimed_ids).unwrap_or_default())
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(claimed)
    }

    /// `completeArticle(date, storyId, fields) -> void`. Idempotent on
    /// re-application of identical fields.
    pub async fn complete_article(&self, date: &str, story_id: i64, fields: CompletedFields) -> Result<(), StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE articles SET status = 'completed', title_chinese = ?1, content_chinese = ?2, \
             comment_summary = ?3, updated_at = ?4 \
             WHERE task_date = ?5 AND story_id = ?6",
        )
        .bind(fields.title_chinese)
        .bind(fields.content_chinese)
        .bind(fields.comment_summary)
        .bind(now)
        .bind(date)
        .bind(story_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ArticleNotFound { task_date: date.to_string(), story_id });
        }
        Ok(())
    }

    /// `failArticle(date, storyId, message) -> void`.
    pub async fn fail_article(&self, date: &str, story_id: i64, message: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE articles SET status = 'failed', error_message = ?1, retry_count = retry_count + 1, updated_at = ?2 \
             WHERE task_date = ?3 AND story_id = ?4",
        )
        .bind(message)
        .bind(now)
        .bind(date)
        .bind(story_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ArticleNotFound { task_date: date.to_string(), story_id });
        }
        Ok(())
    }

    /// `retryFailed(date) -> int`. Resets all `failed` rows to `pending`,
    /// incrementing `retryCount` on each; returns the count reset.
    pub async fn retry_failed(&self, date: &str) -> Result<u64, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE articles SET status = 'pending', retry_count = retry_count + 1, updated_at = ?1 \
             WHERE task_date = ?2 AND status = 'failed'",
        )
        .bind(now)
        .bind(date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// `transitionTask(date, from, to) -> bool`. Compare-and-set on
    /// `status`; returns true iff applied. Mirrors `hook-common/src/pgqueue.rs`'s
    /// `AND queue = $1 ... AND status = $3` CAS shape so two concurrent
    /// invocations cannot double-advance.
    pub async fn transition_task(&self, date: &str, from: TaskStatus, to: TaskStatus) -> Result<bool, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE tasks SET status = ?1, updated_at = ?2 \
             WHERE date = ?3 AND status = ?4",
        )
        .bind(to.to_string())
        .bind(now)
        .bind(date)
        .bind(from.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_published(&self, date: &str) -> Result<bool, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE tasks SET status = 'published', published_at = ?1, updated_at = ?1 \
             WHERE date = ?2 AND status = 'aggregating'",
        )
        .bind(now)
        .bind(date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_failed(&self, date: &str, message: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query("UPDATE tasks SET status = 'failed', error_message = ?1, updated_at = ?2 WHERE date = ?3")
            .bind(message)
            .bind(now)
            .bind(date)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// `snapshot(date)`: the task row plus a per-status count of its
    /// articles, used by the state machine to decide the next phase and by
    /// the `/task-status` route.
    pub async fn snapshot(&self, date: &str) -> Result<TaskSnapshot, StoreError> {
        let task = self
            .get_task(date)
            .await?
            .ok_or_else(|| StoreError::TaskNotFound(date.to_string()))?;

        let rows: Vec<(ArticleStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM articles WHERE task_date = ?1 GROUP BY status",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status {
                ArticleStatus::Pending => counts.pending = count,
                ArticleStatus::Processing => counts.processing = count,
                ArticleStatus::Completed => counts.completed = count,
                ArticleStatus::Failed => counts.failed = count,
            }
        }

        Ok(TaskSnapshot { task, counts })
    }

    /// `getCompletedOrdered(date)`: completed articles ordered by rank, for
    /// the Aggregator (C11).
    pub async fn get_completed_ordered(&self, date: &str) -> Result<Vec<Article>, StoreError> {
        let articles = sqlx::query_as::<_, Article>(
            "SELECT * FROM articles WHERE task_date = ?1 AND status = 'completed' ORDER BY rank ASC",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn test_store() -> TaskStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = TaskStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn story(id: i64, score: i64) -> Story {
        Story {
            id,
            title: format!("story {id}"),
            url: format!("https://example.com/{id}"),
            score,
            created_at: Utc.with_ymd_and_hms(2026, 7, 27, 0, 0, 0).unwrap(),
            author: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn claim_pending_batch_is_single_advance_under_race() {
        let store = test_store().await;
        store.get_or_create_task("2026-07-27").await.unwrap();
        store
            .insert_articles("2026-07-27", &[story(1, 10), story(2, 20), story(3, 30)])
            .await
            .unwrap();

        let first = store.claim_pending_batch("2026-07-27", 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].story_id, 1);

        let second = store.claim_pending_batch("2026-07-27", 2).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].story_id, 3);

        let third = store.claim_pending_batch("2026-07-27", 2).await.unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn transition_task_is_compare_and_set() {
        let store = test_store().await;
        store.get_or_create_task("2026-07-27").await.unwrap();

        let applied = store
            .transition_task("2026-07-27", TaskStatus::Init, TaskStatus::ListFetched)
            .await
            .unwrap();
        assert!(applied);

        let double_advance = store
            .transition_task("2026-07-27", TaskStatus::Init, TaskStatus::ListFetched)
            .await
            .unwrap();
        assert!(!double_advance);
    }

    #[tokio::test]
    async fn retry_failed_resets_only_failed_rows() {
        let store = test_store().await;
        store.get_or_create_task("2026-07-27").await.unwrap();
        store.insert_articles("2026-07-27", &[story(1, 10)]).await.unwrap();
        store.claim_pending_batch("2026-07-27", 1).await.unwrap();
        store.fail_article("2026-07-27", 1, "boom").await.unwrap();

        let reset = store.retry_failed("2026-07-27").await.unwrap();
        assert_eq!(reset, 1);

        let snapshot = store.snapshot("2026-07-27").await.unwrap();
        assert_eq!(snapshot.counts.pending, 1);
        assert_eq!(snapshot.counts.failed, 0);

        let pending = store.list_stories("2026-07-27", ArticleStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 1);
    }

    #[tokio::test]
    async fn list_stories_filters_by_status_ordered_by_rank() {
        let store = test_store().await;
        store.get_or_create_task("2026-07-27").await.unwrap();
        store
            .insert_articles("2026-07-27", &[story(1, 10), story(2, 20), story(3, 30)])
            .await
            .unwrap();
        store.claim_pending_batch("2026-07-27", 2).await.unwrap();

        let processing = store.list_stories("2026-07-27", ArticleStatus::Processing).await.unwrap();
        assert_eq!(processing.len(), 2);
        assert_eq!(processing[0].story_id, 1);
        assert_eq!(processing[1].story_id, 2);

        let pending = store.list_stories("2026-07-27", ArticleStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].story_id, 3);
    }
}
