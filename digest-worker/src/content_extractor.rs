//! C5 Content Extractor: best-effort article full-text / description
//! extraction, with a crawler-API fallback.
//!
//! Grounded on `hook-common/src/webhook.rs`'s layered fallback-error
//! construction (match on failure mode, build a specific variant), applied
//! here to an extraction fallback chain instead of a delivery-error
//! classification; uses the `scraper` crate for HTML/CSS-selector text
//! extraction, readability, and meta-description extraction.

use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::warn;

use digest_common::fetch::BudgetedFetcher;

pub struct ExtractedContent {
    pub full_content: Option<String>,
    pub description: Option<String>,
}

pub struct ContentExtractor<'a> {
    fetcher: &'a BudgetedFetcher,
    client: &'a reqwest::Client,
    crawler_api_url: Option<String>,
    crawler_api_token: Option<String>,
}

#[derive(Deserialize)]
struct CrawlerResponse {
    success: bool,
    markdown: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    error: Option<String>,
}

impl<'a> ContentExtractor<'a> {
    pub fn new(
        fetcher: &'a BudgetedFetcher,
        client: &'a reqwest::Client,
        crawler_api_url: Option<String>,
        crawler_api_token: Option<String>,
    ) -> Self {
        Self { fetcher, client, crawler_api_url, crawler_api_token }
    }

    /// `extract(url) -> {fullContent, description}`. Never throws; returns
    /// `{None, None}` on total failure so downstream fallbacks can render a
    /// placeholder.
    pub async fn extract(&self, url: &str) -> ExtractedContent {
        let html = match self.fetcher.get(url, false).await {
            Ok(body) => body,
            Err(err) => {
                warn!(url, error = %err, "article fetch failed, trying crawler fallback");
                return self.crawler_fallback(url).await;
            }
        };

        let document = Html::parse_document(&html);
        let full_content = extract_readable_text(&document);
        let description = extract_meta_description(&document);

        if full_content.is_some() || description.is_some() {
            return ExtractedContent { full_content, description };
        }

        self.crawler_fallback(url).await
    }

    async fn crawler_fallback(&self, url: &str) -> ExtractedContent {
        let Some(crawler_url) = self.crawler_api_url.as_deref() else {
            return ExtractedContent { full_content: None, description: None };
        };

        let mut request = self.client.post(crawler_url).json(&serde_json::json!({ "url": url }));
        if let Some(token) = &self.crawler_api_token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => match response.json::<CrawlerResponse>().await {
                Ok(body) if body.success => ExtractedContent { full_content: body.markdown, description: None },
                Ok(_) => ExtractedContent { full_content: None, description: None },
                Err(err) => {
                    warn!(url, error = %err, "crawler response parse failure");
                    ExtractedContent { full_content: None, description: None }
                }
            },
            Ok(response) => {
                warn!(url, status = %response.status(), "crawler fallback returned non-2xx");
                ExtractedContent { full_content: None, description: None }
            }
            Err(err) => {
                warn!(url, error = %err, "crawler fallback request failed");
                ExtractedContent { full_content: None, description: None }
            }
        }
    }
}

fn extract_readable_text(document: &Html) -> Option<String> {
    let selector = Selector::parse("article, main, [role='main']").ok()?;
    let text: String = document
        .select(&selector)
        .next()?
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn extract_meta_description(document: &Html) -> Option<String> {
    let selector = Selector::parse("meta[name='description']").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_article_tag_text() {
        let html = Html::parse_document("<html><body><article><p>Hello world.</p></article></body></html>");
        assert_eq!(extract_readable_text(&html).as_deref(), Some("Hello world."));
    }

    #[test]
    fn falls_back_to_meta_description() {
        let html = Html::parse_document("<html><head><meta name=\"description\" content=\"a summary\"></head><body></body></html>");
        assert_eq!(extract_meta_description(&html).as_deref(), Some("a summary"));
    }

    #[test]
    fn returns_none_when_nothing_present() {
        let html = Html::parse_document("<html><body><div>no article tag</div></body></html>");
        assert_eq!(extract_readable_text(&html), None);
        assert_eq!(extract_meta_description(&html), None);
    }
}
