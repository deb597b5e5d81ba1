//! C11 Aggregator: renders the canonical Jekyll front-matter Markdown
//! artifact from a day's completed articles.
//!
//! Grounded on `hook-common/src/webhook.rs::HttpMethod`'s `Display`-based,
//! match-and-write-string assembly convention, applied here via
//! `std::fmt::Write` to build the rendered document incrementally instead
//! of a single format string.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use digest_common::models::{Article, ProcessedStory};

pub struct RenderedDigest {
    pub markdown: String,
    pub file_name: String,
    pub stories: Vec<ProcessedStory>,
}

/// `render(date) -> {markdown, fileName, metadata}`. Takes the already
/// fetched completed articles (ordered by rank) rather than owning the
/// store lookup, so it stays a pure function of its input.
pub fn render(date: &str, completed: Vec<Article>) -> RenderedDigest {
    let stories: Vec<ProcessedStory> = completed
        .into_iter()
        .enumerate()
        .map(|(index, article)| to_processed_story(index as i64 + 1, article))
        .collect();

    let mut markdown = String::new();
    write_front_matter(&mut markdown, date);
    for story in &stories {
        write_story_section(&mut markdown, story);
    }

    RenderedDigest {
        markdown,
        file_name: format!("{date}-daily.md"),
        stories,
    }
}

fn to_processed_story(rank: i64, article: Article) -> ProcessedStory {
    let time = DateTime::from_timestamp(article.timestamp, 0)
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string();

    ProcessedStory {
        rank,
        story_id: article.story_id,
        title_chinese: article.title_chinese.unwrap_or_else(|| article.title.clone()),
        title_english: article.title,
        score: article.score,
        url: article.url,
        time,
        timestamp: article.timestamp,
        description: article.content_chinese.unwrap_or_default(),
        comment_summary: article.comment_summary,
    }
}

fn write_front_matter(out: &mut String, date: &str) {
    let _ = write!(
        out,
        "---\nlayout: post\ntitle: HackerNews Daily - {date}\ndate: {date}\n---\n\n"
    );
}

fn write_story_section(out: &mut String, story: &ProcessedStory) {
    let _ = write!(out, "## {}. {}\n\n", story.rank, story.title_chinese);
    let _ = write!(out, "{}\n\n", story.title_english);
    let _ = write!(out, "**发布时间**: {}\n\n", story.time);
    let _ = write!(out, "**链接**: [{}]({})\n\n", story.url, story.url);
    let _ = write!(out, "**描述**:\n\n{}\n\n", story.description);
    if let Some(comment_summary) = &story.comment_summary {
        let _ = write!(out, "**评论要点**:\n\n{comment_summary}\n\n");
    }
    let _ = write!(
        out,
        "*[HackerNews](https://news.ycombinator.com/item?id={})*\n\n---\n\n",
        story.story_id
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use digest_common::models::ArticleStatus;

    fn article(story_id: i64, rank: i64) -> Article {
        Article {
            task_date: "2026-07-27".to_string(),
            story_id,
            rank,
            status: ArticleStatus::Completed,
            title: "English Title".to_string(),
            title_chinese: Some("中文标题".to_string()),
            content: Some("content".to_string()),
            content_chinese: Some("中文描述".to_string()),
            comment_summary: Some("要点摘要".to_string()),
            url: "https://example.com".to_string(),
            score: 100,
            timestamp: 1_700_000_000,
            retry_count: 0,
            error_message: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn renumbers_rank_contiguously_over_survivors() {
        let completed = vec![article(1, 1), article(5, 5)];
        let rendered = render("2026-07-27", completed);
        assert_eq!(rendered.stories[0].rank, 1);
        assert_eq!(rendered.stories[1].rank, 2);
    }

    #[test]
    fn omits_comment_section_when_none() {
        let mut story = article(1, 1);
        story.comment_summary = None;
        let rendered = render("2026-07-27", vec![story]);
        assert!(!rendered.markdown.contains("评论要点"));
    }

    #[test]
    fn file_name_uses_iso_date() {
        let rendered = render("2026-07-27", vec![]);
        assert_eq!(rendered.file_name, "2026-07-27-daily.md");
    }
}
