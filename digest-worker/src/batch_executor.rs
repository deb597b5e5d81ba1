//! C10 Batch Executor: claims up to `n` pending articles for a date and
//! drives the per-story pipeline (extract -> translate -> summarize ->
//! fetch comments -> summarize comments) concurrently across the batch.
//!
//! Grounded on `hook-worker/src/worker.rs`'s
//! `spawn_webhook_job_processing_task`/`process_webhook_job` pair: acquire a
//! concurrency slot, run the per-item pipeline, write the result back
//! through the store. Article positions in the published output are
//! determined solely by `rank` (set once at `insertArticles` time); this
//! module's internal concurrency order never affects it.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{error, warn};

use digest_common::models::{Article, CompletedFields};

use crate::content_extractor::ContentExtractor;
use crate::error::StoreError;
use crate::source_adapter::SourceAdapter;
use crate::taskstore::TaskStore;
use crate::translator::Translator;

const DEFAULT_CONCURRENCY: usize = 5;

/// Wall-clock budget for one `runBatch` call. Set comfortably below the
/// host invocation's own budget so Task Store writes for already-completed
/// items flush before the host terminates the invocation.
const BATCH_DEADLINE: Duration = Duration::from_secs(240);

pub struct BatchExecutor<'a> {
    store: &'a TaskStore,
    source: &'a SourceAdapter<'a>,
    extractor: &'a ContentExtractor<'a>,
    translator: &'a Translator<'a>,
    summary_max_length: u32,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(
        store: &'a TaskStore,
        source: &'a SourceAdapter<'a>,
        extractor: &'a ContentExtractor<'a>,
        translator: &'a Translator<'a>,
        summary_max_length: u32,
    ) -> Self {
        Self {
            store,
            source,
            extractor,
            translator,
            summary_max_length,
        }
    }

    /// `runBatch(date, n)`: claims up to `n` pending articles and processes
    /// them concurrently (bounded by `defaultConcurrency`). `BATCH_DEADLINE`
    /// bounds the whole batch, not any single article: items still in flight
    /// when it elapses are left in `processing` (the per-article future is
    /// dropped mid-flight) and only an explicit `retryFailed` moves them back
    /// to `pending` — deliberately no auto-revert on deadline expiry.
    pub async fn run_batch(&self, date: &str, n: u32) -> Result<(), StoreError> {
        let claimed = self.store.claim_pending_batch(date, n).await?;
        if claimed.is_empty() {
            return Ok(());
        }

        metrics::counter!("digest_articles_claimed_total").increment(claimed.len() as u64);
        let claimed_count = claimed.len();
        let batch_started = tokio::time::Instant::now();

        let outcome = tokio::time::timeout(
            BATCH_DEADLINE,
            stream::iter(claimed).for_each_concurrent(DEFAULT_CONCURRENCY, |article| async move {
                let started = tokio::time::Instant::now();
                match self.process_one(&article).await {
                    Ok(fields) => {
                        if let Err(err) = self.store.complete_article(date, article.story_id, fields).await {
                            error!(story_id = article.story_id, error = %err, "failed to write completed article");
                        } else {
                            metrics::counter!("digest_articles_completed_total").increment(1);
                            metrics::histogram!("digest_article_processing_duration_seconds")
                                .record(started.elapsed().as_secs_f64());
                        }
                    }
                    Err(reason) => {
                        if let Err(err) = self.store.fail_article(date, article.story_id, &reason).await {
                            error!(story_id = article.story_id, error = %err, "failed to write failed article");
                        } else {
                            metrics::counter!("digest_articles_failed_total").increment(1);
                        }
                    }
                }
            }),
        )
        .await;

        metrics::histogram!("hn_digest_batch_duration_seconds")
            .record(batch_started.elapsed().as_secs_f64());

        if outcome.is_err() {
            metrics::counter!("digest_articles_deadline_exceeded_total").increment(claimed_count as u64);
            warn!(
                date,
                claimed_count, "batch deadline exceeded; in-flight articles left in processing for a future retry"
            );
        }

        Ok(())
    }

    /// Runs the per-story pipeline. Returns the fields to persist via
    /// `completeArticle`, or an error message for `failArticle`.
    ///
    /// "Hard failure" is narrowly scoped: article summarization, comment
    /// summarization, and the content extractor never propagate (they
    /// always produce a fallback value by their own contracts), so the
    /// only failure this pipeline can observe is title translation
    /// exhausting its retries.
    async fn process_one(&self, article: &Article) -> Result<CompletedFields, String> {
        let url = if article.url.is_empty() {
            format!("hn-item://{}", article.story_id)
        } else {
            article.url.clone()
        };

        let extracted = self.extractor.extract(&url).await;

        let title_chinese = self
            .translator
            .translate_title_result(&article.title)
            .await
            .map_err(|err| format!("title translation exhausted retries: {err}"))?;

        let content_chinese = self
            .translator
            .summarize_article(extracted.full_content.as_deref(), extracted.description.as_deref(), self.summary_max_length)
            .await;

        let comments = match self.source.fetch_top_comments(article.story_id).await {
            Ok(comments) => comments,
            Err(err) => {
                warn!(story_id = article.story_id, error = %err, "comment fetch failed, proceeding without comments");
                Vec::new()
            }
        };
        let comment_summary = self.translator.summarize_comments(&comments, self.summary_max_length).await;

        Ok(CompletedFields {
            title_chinese,
            content_chinese: Some(content_chinese),
            comment_summary,
        })
    }
}
