//! Terminal sink (soft): writes the Markdown and a formatted summary to
//! standard output. Never fails.
//!
//! Grounded on `hook-worker/src/main.rs`'s trivial infallible `index()`
//! handler — the simplest possible publisher shape.

use async_trait::async_trait;

use super::{PublishRequest, Publisher};
use crate::error::PublishError;

pub struct TerminalPublisher;

impl TerminalPublisher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for TerminalPublisher {
    async fn publish(&self, request: &PublishRequest<'_>) -> Result<(), PublishError> {
        println!("==== {} ====", request.file_name);
        println!("{}", request.markdown);
        println!("---- summary ----");
        for story in request.stories {
            println!(
                "{}. {} ({} points) {}",
                story.rank, story.title_chinese, story.score, story.url
            );
        }
        println!("{} stories published for {}", request.stories.len(), request.date_str);
        Ok(())
    }

    fn is_hard(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "terminal"
    }
}
