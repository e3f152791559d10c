use anyhow::{Context, Result};
use chrono::Utc;
use common::FeedConfig;
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::article::NewArticle;
use crate::news::NewsService;

const SUMMARY_CHARS: usize = 280;

#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 3,
        }
    }
}

impl FetchSettings {
    pub fn from_config(config: Option<&common::IngestionConfig>) -> Self {
        let defaults = Self::default();
        Self {
            timeout_secs: config
                .and_then(|c| c.fetch_timeout_seconds)
                .unwrap_or(defaults.timeout_secs),
            max_retries: config
                .and_then(|c| c.max_retries)
                .unwrap_or(defaults.max_retries)
                .max(1),
        }
    }
}

/// What one refresh did
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub feeds_checked: usize,
    pub feeds_failed: usize,
    pub new_article_ids: Vec<String>,
    /// Entries already stored or without a link
    pub skipped: usize,
}

/// Fetches a feed from the given URL and parses it.
/// Retries network errors, 5xx and 429 with exponential backoff; other 4xx fail at once.
pub async fn fetch_and_parse_feed(url: &str, settings: FetchSettings) -> Result<Feed> {
    let client = Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .user_agent("ZipTales/0.1.0")
        .build()
        .context("failed to build reqwest client")?;

    let mut last_error = None;

    for attempt in 1..=settings.max_retries {
        if attempt > 1 {
            let backoff = Duration::from_secs(2u64.pow(attempt - 2)); // 1s, 2s, 4s...
            info!("Retrying feed fetch for {} (attempt {}/{}) after {:?}...", url, attempt, settings.max_retries, backoff);
            tokio::time::sleep(backoff).await;
        }

        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let bytes = response.bytes().await.context("failed to read response body")?;
                    let feed = parser::parse(bytes.as_ref()).context("failed to parse feed")?;
                    return Ok(feed);
                } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    last_error = Some(anyhow::anyhow!("feed fetch failed with status: {}", status));
                } else {
                    return Err(anyhow::anyhow!("feed fetch failed with status: {}", status));
                }
            }
            Err(e) => {
                last_error = Some(anyhow::Error::new(e).context("network error during fetch"));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error after retries")))
}

/// Pull every configured feed once and store the entries not seen before.
/// A failing feed is logged and counted; it does not stop the others.
pub async fn refresh_feeds(
    service: &NewsService,
    feeds: &[FeedConfig],
    settings: FetchSettings,
) -> Result<RefreshReport> {
    let mut report = RefreshReport::default();

    for feed_cfg in feeds {
        report.feeds_checked += 1;
        match fetch_and_parse_feed(&feed_cfg.url, settings).await {
            Ok(feed) => {
                info!("Fetched feed '{}': {} items", feed_cfg.url, feed.entries.len());
                match store_feed_entries(service, feed_cfg, &feed).await {
                    Ok((ids, skipped)) => {
                        info!("Stored {} new articles from '{}'", ids.len(), feed_cfg.url);
                        report.new_article_ids.extend(ids);
                        report.skipped += skipped;
                    }
                    Err(e) => {
                        error!("refresh: failed to store entries of {}: {:#}", feed_cfg.url, e);
                        report.feeds_failed += 1;
                    }
                }
            }
            Err(e) => {
                error!("refresh: failed to fetch feed {}: {:#}", feed_cfg.url, e);
                report.feeds_failed += 1;
            }
        }
    }

    Ok(report)
}

/// Score and store the entries of `feed` whose link is not stored yet.
/// Returns the new article ids and the number of skipped entries.
pub async fn store_feed_entries(
    service: &NewsService,
    feed_cfg: &FeedConfig,
    feed: &Feed,
) -> Result<(Vec<String>, usize)> {
    let source = feed_cfg
        .title
        .clone()
        .or_else(|| feed.title.as_ref().map(|t| t.content.clone()))
        .unwrap_or_else(|| feed_cfg.url.clone());
    let category = feed_cfg.category.clone().unwrap_or_default();

    let mut new_ids = Vec::new();
    let mut skipped = 0;

    for entry in &feed.entries {
        let Some(new) = entry_to_article(entry, &source, &category) else {
            skipped += 1;
            continue;
        };

        let url = new.url.clone().unwrap_or_default();
        if service.store().find_by_url(&url).await?.is_some() {
            debug!("Skipping already stored entry: {}", url);
            skipped += 1;
            continue;
        }

        let (article, _) = service.score_and_store(new, None).await?;
        new_ids.push(article.id);
    }

    Ok((new_ids, skipped))
}

/// Map a feed entry to a submission. Entries without a link are dropped.
pub fn entry_to_article(entry: &Entry, source: &str, category: &str) -> Option<NewArticle> {
    let url = entry.links.first().map(|l| l.href.clone()).filter(|u| !u.is_empty())?;
    let title = entry
        .title
        .as_ref()
        .map(|t| to_plain_text(&t.content))
        .unwrap_or_default();

    let summary_html = entry.summary.as_ref().map(|s| s.content.clone());
    let content = entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .or_else(|| summary_html.clone())
        .map(|html| to_plain_text(&html))
        .unwrap_or_default();
    let summary = summary_html
        .map(|html| to_plain_text(&html))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| content.chars().take(SUMMARY_CHARS).collect());

    Some(NewArticle {
        title,
        summary,
        content,
        author: entry.authors.first().map(|p| p.name.clone()).unwrap_or_default(),
        source: source.to_string(),
        category: category.to_string(),
        url: Some(url),
        published_at: Some(entry.published.or(entry.updated).unwrap_or_else(Utc::now)),
        tags: entry
            .categories
            .iter()
            .map(|c| c.label.clone().unwrap_or_else(|| c.term.clone()))
            .collect(),
        location: None,
        image_url: entry_image(entry),
    })
}

/// First thumbnail, else the first image attachment (RSS enclosure, media:content).
fn entry_image(entry: &Entry) -> Option<String> {
    entry.media.iter().find_map(|media| {
        media
            .thumbnails
            .first()
            .map(|t| t.image.uri.clone())
            .or_else(|| {
                media
                    .content
                    .iter()
                    .filter(|c| {
                        c.content_type
                            .as_ref()
                            .map_or(false, |t| t.to_string().starts_with("image/"))
                    })
                    .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
            })
    })
}

fn to_plain_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), 200) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            debug!("html2text failed, keeping raw text: {}", e);
            html.trim().to_string()
        }
    }
}
