//! C6 Translator / Summarizer: title translation, article summarization,
//! and comment-digest summarization, plus positionally-correct batched
//! variants of each.
//!
//! Grounded on `hook-common`'s evolved `pgqueue.rs` scatter/gather-by-
//! original-row idiom (`PgTransactionBatch` claims N rows and writes N
//! results back by id), generalized here to "scatter/gather by original
//! index" over LLM calls instead of database rows. Positional mapping is
//! the principal correctness property of this module and is covered
//! directly by its tests.

use futures::stream::{self, StreamExt};

use digest_common::error::LlmError;
use digest_common::llm::{ChatCompletionRequest, ChatMessage, LlmClient, Provider};
use digest_common::models::Comment;

const DEFAULT_CONCURRENCY: usize = 5;
const COMMENT_BYTE_CAP: usize = 5000;
const MIN_COMMENTS_FOR_SUMMARY: usize = 3;

pub struct Translator<'a> {
    llm: &'a LlmClient,
    provider: Provider,
    model: String,
}

impl<'a> Translator<'a> {
    pub fn new(llm: &'a LlmClient, provider: Provider, model: String) -> Self {
        Self { llm, provider, model }
    }

    /// `translateTitle(title) -> String`. Chinese-already titles are
    /// returned unchanged; on any failure after C3's retries, falls back
    /// to the original title. Thin wrapper over [`Self::translate_title_result`]
    /// for callers that only want the always-succeeds public contract.
    pub async fn translate_title(&self, title: &str) -> String {
        match self.translate_title_result(title).await {
            Ok(translated) => translated,
            Err(err) => {
                tracing::warn!(title, error = %err, "title translation failed, falling back to original");
                title.to_string()
            }
        }
    }

    /// Fallible variant of `translateTitle`, used by the Batch Executor
    /// (C10) to distinguish genuine retry exhaustion — the one hard-failure
    /// trigger in the per-story pipeline — from the always-succeeds public
    /// contract above.
    pub async fn translate_title_result(&self, title: &str) -> Result<String, LlmError> {
        if is_predominantly_chinese(title) {
            return Ok(title.to_string());
        }

        let request = ChatCompletionRequest {
            provider: self.provider,
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(
                    "Translate the following HackerNews title to Chinese. Preserve \
                     programming-language names, well-known product or company names, \
                     and uppercase acronyms verbatim; translate surrounding \
                     natural-language text.",
                ),
                ChatMessage::user(title),
            ],
            temperature: 0.2,
            expect_json_array_len: None,
        };

        self.llm.chat_completion(request).await.map(|response| response.content.trim().to_string())
    }

    /// `translateTitles(titles[]) -> String[]`. `out[i]` corresponds to
    /// `in[i]` by position; empty inputs are scattered the empty-string
    /// sentinel without dispatching a call.
    pub async fn translate_titles(&self, titles: &[String]) -> Vec<String> {
        scatter_gather(titles, String::new(), DEFAULT_CONCURRENCY, |title| async move {
            self.translate_title(title).await
        })
        .await
    }

    /// `summarizeArticle(content, fallbackDescription, maxLen) -> String`.
    pub async fn summarize_article(&self, content: Option<&str>, fallback_description: Option<&str>, max_len: u32) -> String {
        let source = match (content.filter(|s| !s.is_empty()), fallback_description.filter(|s| !s.is_empty())) {
            (Some(c), _) => c,
            (None, Some(d)) => d,
            (None, None) => return "（无可用摘要内容）".to_string(),
        };

        let target_len = max_len.clamp(100, 500);
        let request = ChatCompletionRequest {
            provider: self.provider,
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(format!(
                    "Summarize the following article in Chinese, targeting approximately \
                     {target_len} characters. Condense even if the source is short."
                )),
                ChatMessage::user(source),
            ],
            temperature: 0.3,
            expect_json_array_len: None,
        };

        match self.llm.chat_completion(request).await {
            Ok(response) => response.content.trim().to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "article summarization failed");
                "（摘要生成失败）".to_string()
            }
        }
    }

    /// `summarizeArticles(...) -> String[]` positionally-correct variant.
    pub async fn summarize_articles(&self, items: &[(Option<String>, Option<String>)], max_len: u32) -> Vec<String> {
        let futures_items: Vec<_> = items.to_vec();
        stream::iter(futures_items)
            .map(|(content, fallback)| async move {
                self.summarize_article(content.as_deref(), fallback.as_deref(), max_len).await
            })
            .buffered(DEFAULT_CONCURRENCY)
            .collect()
            .await
    }

    /// `summarizeComments(comments[][], maxLen) -> Option<String>[]`
    /// positionally-correct variant: `out[i]` summarizes `comment_sets[i]`.
    pub async fn summarize_comments_batch(&self, comment_sets: &[Vec<Comment>], max_len: u32) -> Vec<Option<String>> {
        let items: Vec<Vec<Comment>> = comment_sets.to_vec();
        stream::iter(items.into_iter().enumerate())
            .map(|(index, comments)| async move { (index, self.summarize_comments(&comments, max_len).await) })
            .buffer_unordered(DEFAULT_CONCURRENCY)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .fold(vec![None; comment_sets.len()], |mut acc, (index, value)| {
                acc[index] = value;
                acc
            })
    }

    /// `summarizeComments(comments[], maxLen) -> Option<String>`. Returns
    /// `None` when fewer than 3 comments have non-empty text — an expected
    /// condition, not a failure.
    pub async fn summarize_comments(&self, comments: &[Comment], max_len: u32) -> Option<String> {
        let non_empty: Vec<&Comment> = comments.iter().filter(|c| !c.text.trim().is_empty()).collect();
        if non_empty.len() < MIN_COMMENTS_FOR_SUMMARY {
            return None;
        }

        let mut concatenated = String::new();
        for comment in &non_empty {
            if concatenated.len() >= COMMENT_BYTE_CAP {
                break;
            }
            concatenated.push_str(&comment.text);
            concatenated.push('\n');
        }
        concatenated.truncate(COMMENT_BYTE_CAP);

        let request = ChatCompletionRequest {
            provider: self.provider,
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(format!(
                    "Summarize the discussion in these HackerNews comments in Chinese, \
                     targeting {max_len} characters. Preserve technical terms verbatim. \
                     Capture the dominant viewpoint and any clearly articulated \
                     counterpoints with their key arguments. Include concrete numbers, \
                     libraries, or alternatives if mentioned."
                )),
                ChatMessage::user(concatenated),
            ],
            temperature: 0.3,
            expect_json_array_len: None,
        };

        match self.llm.chat_completion(request).await {
            Ok(response) => Some(response.content.trim().to_string()),
            Err(err) => {
                tracing::warn!(error = %err, "comment summarization failed");
                None
            }
        }
    }
}

fn is_predominantly_chinese(text: &str) -> bool {
    let non_whitespace: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if non_whitespace.is_empty() {
        return false;
    }
    let cjk_count = non_whitespace.iter().filter(|c| is_cjk(**c)).count();
    cjk_count * 2 > non_whitespace.len()
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3400..=0x4DBF // CJK Extension A
        | 0x3000..=0x303F // CJK punctuation
        | 0xFF00..=0xFFEF // fullwidth forms
    )
}

/// Scatter/gather-by-original-index: empty inputs are filtered before
/// dispatch, results of the remaining items are computed concurrently, and
/// the output buffer (pre-sized to the full input length) is filled back
/// at each item's original index. A completed batch never shifts
/// positions.
async fn scatter_gather<F, Fut>(inputs: &[String], empty_sentinel: String, concurrency: usize, f: F) -> Vec<String>
where
    F: Fn(&str) -> Fut,
    Fut: std::future::Future<Output = String>,
{
    let mut output = vec![empty_sentinel; inputs.len()];

    let non_empty: Vec<(usize, &String)> = inputs
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_empty())
        .collect();

    let results: Vec<(usize, String)> = stream::iter(non_empty)
        .map(|(index, text)| {
            let f = &f;
            async move { (index, f(text).await) }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    for (index, value) in results {
        output[index] = value;
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_predominantly_chinese_title() {
        assert!(is_predominantly_chinese("这是一个关于编程的故事"));
        assert!(!is_predominantly_chinese("Show HN: my new Rust crate"));
    }

    #[test]
    fn mixed_title_with_majority_latin_is_not_chinese() {
        assert!(!is_predominantly_chinese("Rust 1.0 发布"));
    }

    #[tokio::test]
    async fn scatter_gather_preserves_position_and_skips_empty_inputs() {
        let inputs = vec!["a".to_string(), "".to_string(), "c".to_string()];
        let output = scatter_gather(&inputs, "EMPTY".to_string(), 4, |s| async move { s.to_uppercase() }).await;
        assert_eq!(output, vec!["A".to_string(), "EMPTY".to_string(), "C".to_string()]);
    }

    fn comment(story_id: i64, text: &str) -> Comment {
        Comment { story_id, author: "x".to_string(), text: text.to_string(), created_at: chrono::Utc::now() }
    }

    #[tokio::test]
    async fn summarize_comments_batch_preserves_position_for_below_threshold_sets() {
        // Every set here has fewer than MIN_COMMENTS_FOR_SUMMARY non-empty
        // comments, so `summarize_comments` returns `None` on its fast path
        // without dispatching any chat-completion call, letting this test
        // exercise positional mapping without a live LLM client.
        let gate = digest_common::concurrency::ConcurrencyGate::new(std::iter::empty::<(String, usize)>());
        let llm = LlmClient::new(
            reqwest::Client::new(),
            gate,
            digest_common::llm::LlmClientConfig {
                api_keys: std::collections::HashMap::new(),
                max_retries: 1,
                provider_min_delay: std::collections::HashMap::new(),
                gate_acquire_timeout: std::time::Duration::from_secs(5),
                openrouter_site_url: None,
                openrouter_site_name: None,
            },
        );
        let translator = Translator::new(&llm, Provider::Deepseek, "test-model".to_string());

        let sets = vec![
            vec![comment(1, "one")],
            vec![],
            vec![comment(3, "a"), comment(3, "b")],
        ];
        let output = translator.summarize_comments_batch(&sets, 300).await;
        assert_eq!(output.len(), 3);
        assert!(output.iter().all(Option::is_none));
    }
}
