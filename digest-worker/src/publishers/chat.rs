//! Chat sink (soft): Telegram channel delivery. Formats one message per
//! group of Processed Stories directly from the structured data (never by
//! re-parsing the rendered Markdown), respecting Telegram's per-message
//! character cap, and logs (rather than aborts on) a single message's
//! delivery failure.
//!
//! Grounded on `ThirdKeyAI-Symbiont`'s Slack `SlackApiClient` (plain
//! reqwest + token-authenticated JSON POST), retargeted at Telegram's
//! `sendMessage` endpoint (bot-token-in-path rather than bearer header).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::{PublishRequest, Publisher};
use crate::error::PublishError;
use digest_common::models::ProcessedStory;

/// Telegram's documented maximum message length.
const TELEGRAM_MESSAGE_CAP: usize = 4096;
const INTER_MESSAGE_DELAY: Duration = Duration::from_millis(350);

#[derive(Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct ChatPublisher {
    client: reqwest::Client,
    bot_token: String,
    channel_id: String,
    batch_size: usize,
}

impl ChatPublisher {
    pub fn new(client: reqwest::Client, bot_token: String, channel_id: String, batch_size: u32) -> Self {
        Self {
            client,
            bot_token,
            channel_id,
            batch_size: batch_size.clamp(1, 10) as usize,
        }
    }

    async fn send(&self, text: &str) -> Result<(), PublishError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "chat_id": self.channel_id, "text": text }))
            .send()
            .await
            .map_err(|e| PublishError::Chat(format!("sendMessage request failed: {e}")))?;

        let body: SendMessageResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Chat(format!("sendMessage response parse failed: {e}")))?;

        if !body.ok {
            return Err(PublishError::Chat(format!(
                "sendMessage rejected: {}",
                body.description.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for ChatPublisher {
    async fn publish(&self, request: &PublishRequest<'_>) -> Result<(), PublishError> {
        let messages = build_messages(request.stories, self.batch_size);
        let mut last_error = None;

        for (index, message) in messages.iter().enumerate() {
            if let Err(err) = self.send(message).await {
                warn!(error = %err, message_index = index, "chat message delivery failed, continuing with next story");
                last_error = Some(err);
            }
            if index + 1 < messages.len() {
                tokio::time::sleep(INTER_MESSAGE_DELAY).await;
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn is_hard(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

/// Groups stories into chunks of `batch_size`, formatting each chunk as one
/// message. Any chunk whose formatted text exceeds Telegram's per-message
/// cap is split down to one story per message.
fn build_messages(stories: &[ProcessedStory], batch_size: usize) -> Vec<String> {
    let mut messages = Vec::new();

    for chunk in stories.chunks(batch_size.max(1)) {
        let combined = chunk.iter().map(format_story).collect::<Vec<_>>().join("\n\n");
        if combined.len() <= TELEGRAM_MESSAGE_CAP {
            messages.push(combined);
        } else {
            for story in chunk {
                messages.push(format_story(story));
            }
        }
    }

    messages
}

fn format_story(story: &ProcessedStory) -> String {
    let mut text = format!(
        "{}. {}\n{}\n{}\n{}",
        story.rank, story.title_chinese, story.title_english, story.time, story.url
    );
    text.push_str("\n\n");
    text.push_str(&story.description);
    if let Some(comment_summary) = &story.comment_summary {
        text.push_str("\n\n评论要点:\n");
        text.push_str(comment_summary);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn story(rank: i64) -> ProcessedStory {
        ProcessedStory {
            rank,
            story_id: rank,
            title_chinese: "标题".to_string(),
            title_english: "Title".to_string(),
            score: 10,
            url: "https://example.com".to_string(),
            time: "2026-07-27 00:00:00 UTC".to_string(),
            timestamp: Utc::now().timestamp(),
            description: "desc".to_string(),
            comment_summary: None,
        }
    }

    #[test]
    fn groups_stories_within_batch_size() {
        let stories = vec![story(1), story(2), story(3)];
        let messages = build_messages(&stories, 2);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn splits_oversized_chunk_into_individual_messages() {
        let mut stories = vec![story(1), story(2)];
        stories[0].description = "x".repeat(TELEGRAM_MESSAGE_CAP);
        let messages = build_messages(&stories, 2);
        assert_eq!(messages.len(), 2);
    }
}
