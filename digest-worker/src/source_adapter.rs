//! C4 Source Adapter: resolves a day's candidate stories from the
//! HackerNews API.
//!
//! Grounded on `other_examples/…chunghha-gpui_hn_app__src-api-mod.rs`'s
//! `StoryListType`/`beststories` two-call shape (an order-preserving id
//! list, then per-id detail lookups), composed with
//! `digest_common::fetch::BudgetedFetcher` instead of a bare reqwest call.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use digest_common::error::FetchError;
use digest_common::fetch::BudgetedFetcher;
use digest_common::models::{Comment, Story};

const BEST_STORIES_URL: &str = "https://hacker-news.firebaseio.com/v0/beststories.json";
const ITEM_DETAIL_BATCH_SIZE: usize = 100;
const MAX_DETAIL_PAGES: usize = 10;
const MAX_COMMENTS_PER_STORY: usize = 10;

#[derive(Debug, Deserialize)]
struct HnComment {
    #[serde(default)]
    text: String,
    #[serde(default)]
    by: String,
    #[serde(default)]
    time: i64,
    #[serde(default)]
    dead: bool,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct HnItem {
    id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    time: i64,
    #[serde(default)]
    by: String,
    #[serde(default)]
    dead: bool,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    kids: Vec<i64>,
}

pub struct SourceAdapter<'a> {
    fetcher: &'a BudgetedFetcher,
    story_limit: usize,
    time_window_hours: u32,
}

impl<'a> SourceAdapter<'a> {
    pub fn new(fetcher: &'a BudgetedFetcher, story_limit: u32, time_window_hours: u32) -> Self {
        Self {
            fetcher,
            story_limit: story_limit as usize,
            time_window_hours,
        }
    }

    /// `fetchDailyCandidates(date) -> Story[]` of length <= `storyLimit`.
    ///
    /// Partial batch-detail failures are logged and skipped rather than
    /// aborting the whole call; if zero stories survive the time-window
    /// filter, returns the empty slice.
    pub async fn fetch_daily_candidates(&self, day_start: DateTime<Utc>) -> Result<Vec<Story>, FetchError> {
        let day_end = day_start + chrono::Duration::hours(self.time_window_hours as i64);

        let id_list_body = self.fetcher.get(BEST_STORIES_URL, true).await?;
        let ids: Vec<i64> = serde_json::from_str(&id_list_body).map_err(|e| {
            FetchError::new(digest_common::error::FailureCategory::Parse, e.to_string(), None)
        })?;

        let mut items: Vec<HnItem> = Vec::new();
        for (page, chunk) in ids.chunks(ITEM_DETAIL_BATCH_SIZE).enumerate() {
            if page >= MAX_DETAIL_PAGES {
                break;
            }
            for &id in chunk {
                match self.fetch_item(id).await {
                    Ok(Some(item)) if !item.dead && !item.deleted => items.push(item),
                    Ok(_) => {}
                    Err(err) => warn!(story_id = id, error = %err, "skipping story detail fetch failure"),
                }
            }
        }

        let mut stories: Vec<Story> = items
            .into_iter()
            .filter_map(|item| {
                let created_at = DateTime::from_timestamp(item.time, 0)?;
                if created_at < day_start || created_at >= day_end {
                    return None;
                }
                Some(Story {
                    id: item.id,
                    title: item.title,
                    url: item.url,
                    score: item.score,
                    created_at,
                    author: item.by,
                })
            })
            .collect();

        stories.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| b.created_at.cmp(&a.created_at)));
        stories.truncate(self.story_limit);

        Ok(stories)
    }

    async fn fetch_item(&self, id: i64) -> Result<Option<HnItem>, FetchError> {
        let url = format!("https://hacker-news.firebaseio.com/v0/item/{id}.json");
        let body = self.fetcher.get(&url, true).await?;
        let item: Option<HnItem> = serde_json::from_str(&body).map_err(|e| {
            FetchError::new(digest_common::error::FailureCategory::Parse, e.to_string(), None)
        })?;
        Ok(item)
    }

    /// Fetches up to 10 top-level comments for `story_id`. Used by the Batch
    /// Executor (C10) just before `summarizeComments`; a `Comment` is
    /// transient and never persisted across triggers.
    ///
    /// Per-comment fetch failures are logged and skipped, matching the
    /// Source Adapter's own partial-failure tolerance for item details.
    pub async fn fetch_top_comments(&self, story_id: i64) -> Result<Vec<Comment>, FetchError> {
        let Some(story_item) = self.fetch_item(story_id).await? else {
            return Ok(Vec::new());
        };

        let mut comments = Vec::new();
        for kid_id in story_item.kids.iter().take(MAX_COMMENTS_PER_STORY) {
            let url = format!("https://hacker-news.firebaseio.com/v0/item/{kid_id}.json");
            match self.fetcher.get(&url, true).await {
                Ok(body) => match serde_json::from_str::<Option<HnComment>>(&body) {
                    Ok(Some(comment)) if !comment.dead && !comment.deleted => {
                        comments.push(Comment {
                            story_id,
                            author: comment.by,
                            text: comment.text,
                            created_at: DateTime::from_timestamp(comment.time, 0).unwrap_or_else(Utc::now),
                        });
                    }
                    Ok(_) => {}
                    Err(err) => warn!(comment_id = kid_id, error = %err, "skipping unparseable comment"),
                },
                Err(err) => warn!(comment_id = kid_id, error = %err, "skipping comment fetch failure"),
            }
        }

        Ok(comments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_by_score_descending_then_created_at_descending() {
        let base = DateTime::from_timestamp(0, 0).unwrap();
        let mut stories = vec![
            Story { id: 1, title: "a".into(), url: "".into(), score: 10, created_at: base, author: "x".into() },
            Story { id: 2, title: "b".into(), url: "".into(), score: 30, created_at: base, author: "x".into() },
            Story { id: 3, title: "c".into(), url: "".into(), score: 30, created_at: base + chrono::Duration::seconds(5), author: "x".into() },
        ];
        stories.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| b.created_at.cmp(&a.created_at)));
        assert_eq!(stories[0].id, 3);
        assert_eq!(stories[1].id, 2);
        assert_eq!(stories[2].id, 1);
    }
}
