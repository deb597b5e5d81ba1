//! C12 Publisher Fan-out: Git (hard), Chat (soft), Terminal (soft) sinks,
//! run sequentially in that order.

pub mod chat;
pub mod git;
pub mod terminal;

use tracing::{error, warn};

use digest_common::models::ProcessedStory;

use crate::error::PublishError;

pub struct PublishRequest<'a> {
    pub markdown: &'a str,
    pub date_str: &'a str,
    pub stories: &'a [ProcessedStory],
    pub file_name: &'a str,
}

#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, request: &PublishRequest<'_>) -> Result<(), PublishError>;

    /// Whether this sink's failure should abort the remaining fan-out.
    fn is_hard(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Runs each enabled publisher in order (Git, Chat, Terminal). A hard-sink
/// failure propagates and aborts the remaining fan-out; a soft-sink
/// failure is logged and the fan-out continues.
pub async fn fan_out(publishers: &[Box<dyn Publisher>], request: &PublishRequest<'_>) -> Result<(), PublishError> {
    for publisher in publishers {
        match publisher.publish(request).await {
            Ok(()) => {
                metrics::counter!("hn_digest_publish_total", "sink" => publisher.name()).increment(1);
            }
            Err(err) if publisher.is_hard() => {
                error!(sink = publisher.name(), error = %err, "hard-failure publisher aborted fan-out");
                return Err(err);
            }
            Err(err) => {
                warn!(sink = publisher.name(), error = %err, "soft-failure publisher failed, continuing");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FakePublisher {
        hard: bool,
        fails: bool,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Publisher for FakePublisher {
        async fn publish(&self, _request: &PublishRequest<'_>) -> Result<(), PublishError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fails { Err(PublishError::Chat("boom".to_string())) } else { Ok(()) }
        }

        fn is_hard(&self) -> bool {
            self.hard
        }

        fn name(&self) -> &'static str {
            "fake"
        }
    }

    fn request() -> PublishRequest<'static> {
        PublishRequest { markdown: "", date_str: "2026-07-27", stories: &[], file_name: "2026-07-27-daily.md" }
    }

    #[tokio::test]
    async fn soft_failure_does_not_abort_fan_out() {
        let failing = Box::new(FakePublisher { hard: false, fails: true, calls: AtomicUsize::new(0) });
        let succeeding = Box::new(FakePublisher { hard: false, fails: false, calls: AtomicUsize::new(0) });
        let publishers: Vec<Box<dyn Publisher>> = vec![failing, succeeding];

        let result = fan_out(&publishers, &request()).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn hard_failure_aborts_remaining_fan_out() {
        struct CountingPublisher(AtomicUsize);

        #[async_trait::async_trait]
        impl Publisher for CountingPublisher {
            async fn publish(&self, _request: &PublishRequest<'_>) -> Result<(), PublishError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            fn is_hard(&self) -> bool {
                false
            }
            fn name(&self) -> &'static str {
                "counting"
            }
        }

        let failing = Box::new(FakePublisher { hard: true, fails: true, calls: AtomicUsize::new(0) });
        let never_reached = Box::new(CountingPublisher(AtomicUsize::new(0)));
        let publishers: Vec<Box<dyn Publisher>> = vec![failing, never_reached];

        let result = fan_out(&publishers, &request()).await;

        assert!(result.is_err());
    }
}
