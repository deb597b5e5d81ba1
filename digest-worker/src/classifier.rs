//! C7 Content Classifier: optional SAFE/SENSITIVE batch filter, fail-open.
//!
//! Grounded on the LLM Client's own JSON-array-with-verification escape
//! hatch (`expectJSONArray`), reused here for the classifier's
//! `{index, classification}` array contract instead of a translation array.

use serde::Deserialize;
use tracing::warn;

use digest_common::llm::{ChatCompletionRequest, ChatMessage, LlmClient, Provider};
use digest_common::models::Story;

use crate::config::ContentFilterSensitivity;

#[derive(Deserialize)]
struct Classification {
    index: usize,
    classification: String,
}

pub struct Classifier<'a> {
    llm: &'a LlmClient,
    provider: Provider,
    model: String,
    enabled: bool,
    sensitivity: ContentFilterSensitivity,
}

impl<'a> Classifier<'a> {
    pub fn new(llm: &'a LlmClient, provider: Provider, model: String, enabled: bool, sensitivity: ContentFilterSensitivity) -> Self {
        Self { llm, provider, model, enabled, sensitivity }
    }

    /// `filter(stories[], sensitivity) -> stories[]`, order preserved.
    /// Disabled configuration and any classifier failure both return the
    /// input unfiltered (fail-open).
    pub async fn filter(&self, stories: Vec<Story>) -> Vec<Story> {
        if !self.enabled || stories.is_empty() {
            return stories;
        }

        let prompt = build_prompt(&stories, self.sensitivity);
        let request = ChatCompletionRequest {
            provider: self.provider,
            model: self.model.clone(),
            messages: vec![ChatMessage::system(prompt), ChatMessage::user("Classify the stories above.")],
            temperature: 0.0,
            expect_json_array_len: Some(stories.len()),
        };

        let response = match self.llm.chat_completion(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "classifier call failed, failing open");
                return stories;
            }
        };

        let Some(parsed_array) = response.parsed_array else {
            warn!("classifier response missing parsed array, failing open");
            return stories;
        };

        let classifications: Vec<Classification> = match parsed_array
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(values) => values,
            Err(err) => {
                warn!(error = %err, "classifier items did not match expected shape, failing open");
                return stories;
            }
        };

        if classifications.len() != stories.len() {
            warn!("classifier array length mismatch, failing open");
            return stories;
        }

        let mut sensitive_indices = vec![false; stories.len()];
        for item in &classifications {
            let Some(slot) = sensitive_indices.get_mut(item.index) else {
                warn!(index = item.index, "classifier returned out-of-range index, failing open");
                return stories;
            };
            match item.classification.as_str() {
                "SAFE" => *slot = false,
                "SENSITIVE" => *slot = true,
                other => {
                    warn!(token = other, "classifier returned unknown token, failing open");
                    return stories;
                }
            }
        }

        stories
            .into_iter()
            .zip(sensitive_indices)
            .filter_map(|(story, sensitive)| if sensitive { None } else { Some(story) })
            .collect()
    }
}

fn build_prompt(stories: &[Story], sensitivity: ContentFilterSensitivity) -> String {
    let rubric = match sensitivity {
        ContentFilterSensitivity::Low => {
            "Flag only content that is explicitly legal-risk, adult, or graphically violent."
        }
        ContentFilterSensitivity::Medium => {
            "Flag content that is Chinese-politically sensitive or describes illegal activity, \
             in addition to the low-sensitivity rubric."
        }
        ContentFilterSensitivity::High => {
            "Flag any politically-adjacent material at all, in addition to the medium-sensitivity rubric."
        }
    };

    let mut prompt = format!(
        "You are a content safety classifier. {rubric}\n\
         Respond with a JSON array of exactly {} objects, each \
         {{\"index\": <int>, \"classification\": \"SAFE\"|\"SENSITIVE\"}}, one per \
         title below, in the same order.\n\n",
        stories.len()
    );
    for (index, story) in stories.iter().enumerate() {
        prompt.push_str(&format!("{index}: {}\n", story.title));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn story(id: i64, title: &str) -> Story {
        Story { id, title: title.to_string(), url: String::new(), score: 1, created_at: Utc::now(), author: "x".into() }
    }

    #[test]
    fn prompt_lists_all_titles_with_indices() {
        let stories = vec![story(1, "first"), story(2, "second")];
        let prompt = build_prompt(&stories, ContentFilterSensitivity::Medium);
        assert!(prompt.contains("0: first"));
        assert!(prompt.contains("1: second"));
    }
}
