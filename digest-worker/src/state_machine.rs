//! C9 State Machine: drives one day's Task through
//! `init -> listFetched -> processing -> aggregating -> published|failed`,
//! one phase-step per [`StateMachine::advance`] call.
//!
//! Grounded on `hook-worker/src/worker.rs`'s `WebhookWorker::run` polling
//! loop (`wait_for_job` -> `process_webhook_job` -> persist result),
//! generalized from "one job at a time forever" to "each trigger advances
//! one Task by one phase-step". A cron tick or manual HTTP trigger maps to
//! one call; a date's task reaches `published` only after enough separate
//! triggers have each run one step, matching the crash-resume scenario
//! where the task must survive being re-triggered mid-batch.

use chrono::{NaiveDate, TimeZone, Utc};
use tracing::{error, info, warn};

use digest_common::models::{Story, TaskSnapshot, TaskStatus};

use crate::aggregator;
use crate::batch_executor::BatchExecutor;
use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::{EngineError, PipelineError};
use crate::publishers::{self, Publisher, PublishRequest};
use crate::source_adapter::SourceAdapter;
use crate::taskstore::TaskStore;

pub struct StateMachine<'a> {
    store: &'a TaskStore,
    source: &'a SourceAdapter<'a>,
    classifier: &'a Classifier<'a>,
    batch_executor: &'a BatchExecutor<'a>,
    publishers: &'a [Box<dyn Publisher>],
    batch_size: u32,
}

impl<'a> StateMachine<'a> {
    pub fn new(
        store: &'a TaskStore,
        source: &'a SourceAdapter<'a>,
        classifier: &'a Classifier<'a>,
        batch_executor: &'a BatchExecutor<'a>,
        publishers: &'a [Box<dyn Publisher>],
        batch_size: u32,
    ) -> Self {
        Self { store, source, classifier, batch_executor, publishers, batch_size }
    }

    /// Advances `date`'s task by exactly one phase's worth of work, then
    /// returns. A single invocation never runs more than one batch and
    /// never both processes the last batch and publishes in the same
    /// call — later triggers re-enter the same state and make further
    /// progress, per the chosen "a trigger does one phase-step" reading
    /// (many short invocations, not one that runs a day to completion).
    pub async fn advance(&self, date: &str) -> Result<TaskSnapshot, EngineError> {
        self.store.get_or_create_task(date).await?;
        let snapshot = self.store.snapshot(date).await?;
        info!(date, status = %snapshot.task.status, counts = ?snapshot.counts, "state machine tick");

        match decide(snapshot.task.status, snapshot.counts.pending, snapshot.counts.processing) {
            Action::FetchList => {
                if let Err(err) = self.run_list_fetch(date).await {
                    self.fail_task(date, &err.to_string()).await;
                    return Err(err);
                }
            }
            Action::AdvanceToAggregating => {
                let _ = self.store.transition_task(date, snapshot.task.status, TaskStatus::Aggregating).await?;
            }
            Action::RunBatch => {
                if snapshot.task.status == TaskStatus::ListFetched {
                    let _ = self.store.transition_task(date, TaskStatus::ListFetched, TaskStatus::Processing).await?;
                }
                if let Err(err) = self.batch_executor.run_batch(date, self.batch_size).await {
                    self.fail_task(date, &err.to_string()).await;
                    return Err(err.into());
                }
                // Opportunistic same-call advance: if that batch drained the
                // last pending/processing rows, flip the task straight to
                // aggregating rather than making the next trigger discover
                // it idle. This never performs aggregating's own work
                // (rendering/publishing) in this call.
                let post = self.store.snapshot(date).await?;
                if post.counts.pending == 0 && post.counts.processing == 0 {
                    let _ = self.store.transition_task(date, TaskStatus::Processing, TaskStatus::Aggregating).await?;
                }
            }
            Action::Publish => {
                if let Err(err) = self.run_publish(date).await {
                    self.fail_task(date, &err.to_string()).await;
                    return Err(err);
                }
            }
            Action::Noop => {}
        }

        Ok(self.store.snapshot(date).await?)
    }

    async fn run_list_fetch(&self, date: &str) -> Result<(), EngineError> {
        let day_start = parse_date(date)?;
        let candidates = self
            .source
            .fetch_daily_candidates(day_start)
            .await
            .map_err(PipelineError::from)?;

        let filtered: Vec<Story> = self.classifier.filter(candidates).await;

        self.store.insert_articles(date, &filtered).await?;
        self.store.transition_task(date, TaskStatus::Init, TaskStatus::ListFetched).await?;
        metrics::counter!("hn_digest_jobs_total").increment(1);
        Ok(())
    }

    async fn run_publish(&self, date: &str) -> Result<(), EngineError> {
        let completed = self.store.get_completed_ordered(date).await?;
        let rendered = aggregator::render(date, completed);

        let request = PublishRequest {
            markdown: &rendered.markdown,
            date_str: date,
            stories: &rendered.stories,
            file_name: &rendered.file_name,
        };

        publishers::fan_out(self.publishers, &request)
            .await
            .map_err(PipelineError::from)?;

        let applied = self.store.mark_published(date).await?;
        if !applied {
            warn!(date, "mark_published found task already past aggregating");
        } else {
            metrics::counter!("hn_digest_jobs_completed").increment(1);
        }
        Ok(())
    }

    async fn fail_task(&self, date: &str, message: &str) {
        error!(date, error = message, "task failed");
        if let Err(err) = self.store.mark_failed(date, message).await {
            error!(date, error = %err, "failed to record task failure");
        } else {
            metrics::counter!("hn_digest_jobs_failed").increment(1);
        }
    }
}

/// The one unit of work a single [`StateMachine::advance`] call performs,
/// chosen purely from a task's current status and article counts. Kept
/// separate from `advance` so the one-phase-step contract is testable
/// without a live store/source/classifier/executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    FetchList,
    RunBatch,
    AdvanceToAggregating,
    Publish,
    Noop,
}

fn decide(status: TaskStatus, pending: i64, processing: i64) -> Action {
    match status {
        TaskStatus::Init => Action::FetchList,
        TaskStatus::ListFetched | TaskStatus::Processing => {
            if pending == 0 && processing == 0 {
                Action::AdvanceToAggregating
            } else {
                Action::RunBatch
            }
        }
        TaskStatus::Aggregating => Action::Publish,
        TaskStatus::Published | TaskStatus::Failed => Action::Noop,
    }
}

fn parse_date(date: &str) -> Result<chrono::DateTime<Utc>, EngineError> {
    let naive = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| PipelineError::InvalidDate(date.to_string()))?;
    let naive_midnight = naive.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    Ok(Utc.from_utc_datetime(&naive_midnight))
}

/// Builds the components a [`StateMachine`] needs for one `date` invocation
/// out of the application's long-lived `Config`, keeping the enabled
/// publisher list a per-call decision (so `LOCAL_TEST_MODE`/`GITHUB_ENABLED`/
/// `TELEGRAM_ENABLED` can be read once at startup without re-reading env).
pub fn enabled_publishers(config: &Config, http_client: reqwest::Client) -> Result<Vec<Box<dyn Publisher>>, EngineError> {
    let mut publishers: Vec<Box<dyn Publisher>> = Vec::new();

    if config.github.enabled {
        let token = config.github.token.as_deref().unwrap_or_default();
        let target_repo = config.github.target_repo.as_deref().unwrap_or_default();
        let publisher = crate::publishers::git::GitPublisher::new(token, target_repo, &config.github.target_branch)
            .map_err(PipelineError::from)?;
        publishers.push(Box::new(publisher));
    }

    if config.telegram.enabled {
        let bot_token = config.telegram.bot_token.clone().unwrap_or_default();
        let channel_id = config.telegram.channel_id.clone().unwrap_or_default();
        publishers.push(Box::new(crate::publishers::chat::ChatPublisher::new(
            http_client,
            bot_token,
            channel_id,
            config.telegram.batch_size,
        )));
    }

    if config.local_test_mode {
        publishers.push(Box::new(crate::publishers::terminal::TerminalPublisher));
    }

    if publishers.is_empty() {
        return Err(EngineError::NoPublisherConfigured);
    }

    Ok(publishers)
}

#[cfg(test)]
mod tests {
    use super::{decide, parse_date, Action};
    use digest_common::models::TaskStatus;

    #[test]
    fn parses_well_formed_date() {
        let parsed = parse_date("2026-07-27").unwrap();
        assert_eq!(parsed.to_string(), "2026-07-27 00:00:00 UTC");
    }

    #[test]
    fn rejects_malformed_date() {
        assert!(parse_date("07/27/2026").is_err());
        assert!(parse_date("not-a-date").is_err());
    }

    #[test]
    fn init_always_fetches_the_list() {
        assert_eq!(decide(TaskStatus::Init, 0, 0), Action::FetchList);
        assert_eq!(decide(TaskStatus::Init, 12, 3), Action::FetchList);
    }

    #[test]
    fn list_fetched_with_pending_rows_runs_a_batch_instead_of_aggregating() {
        // This is the crash-resume invariant: a freshly listed day (12
        // pending, 0 processing) must run exactly one batch per trigger,
        // never jump straight to aggregating.
        assert_eq!(decide(TaskStatus::ListFetched, 12, 0), Action::RunBatch);
    }

    #[test]
    fn processing_with_rows_still_outstanding_runs_another_batch() {
        assert_eq!(decide(TaskStatus::Processing, 7, 0), Action::RunBatch);
        assert_eq!(decide(TaskStatus::Processing, 0, 2), Action::RunBatch);
        assert_eq!(decide(TaskStatus::Processing, 3, 1), Action::RunBatch);
    }

    #[test]
    fn processing_or_list_fetched_with_nothing_outstanding_advances_to_aggregating() {
        assert_eq!(decide(TaskStatus::Processing, 0, 0), Action::AdvanceToAggregating);
        assert_eq!(decide(TaskStatus::ListFetched, 0, 0), Action::AdvanceToAggregating);
    }

    #[test]
    fn aggregating_publishes() {
        assert_eq!(decide(TaskStatus::Aggregating, 0, 0), Action::Publish);
    }

    #[test]
    fn terminal_states_are_noop() {
        assert_eq!(decide(TaskStatus::Published, 0, 0), Action::Noop);
        assert_eq!(decide(TaskStatus::Failed, 5, 1), Action::Noop);
    }
}
