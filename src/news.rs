use crate::config::SourceSpec;
use crate::utils::{clean_text, write_json};
use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub body: String,
    /// ISO-8601, UTC.
    pub ts: String,
    pub source: String,
    pub url: String,
}

/// One feed entry, before cleaning and filtering.
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub title: String,
    pub summary: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
}

impl From<feed_rs::model::Entry> for RawEntry {
    fn from(entry: feed_rs::model::Entry) -> Self {
        let summary = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .unwrap_or_default();
        Self {
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            summary,
            link: entry.links.first().map(|l| l.href.clone()).unwrap_or_default(),
            published: entry.published.or(entry.updated),
        }
    }
}

pub fn parse_feed(content: &[u8]) -> anyhow::Result<Vec<RawEntry>> {
    let feed = feed_rs::parser::parse(content).context("failed to parse feed")?;
    Ok(feed.entries.into_iter().map(RawEntry::from).collect())
}

pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> anyhow::Result<Vec<RawEntry>> {
    let body = client
        .get(url)
        .header(USER_AGENT, "newsreel/0.1")
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    debug!("Fetched {} bytes from {}", body.len(), url);
    parse_feed(&body)
}

pub fn entry_hash(title: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn matches_any(blob: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| blob.contains(&k.to_lowercase()))
}

/// Selects items from already-fetched entries, in traversal order.
/// Deduplication is shared across every source in `batches`.
pub fn collect_items(
    batches: Vec<(String, Vec<RawEntry>)>,
    include: &[String],
    exclude: &[String],
) -> Vec<NewsItem> {
    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for (source, entries) in batches {
        for entry in entries {
            let title = clean_text(&entry.title);
            let body = clean_text(&entry.summary);
            if title.is_empty() {
                continue;
            }

            let blob = format!("{} {}", title, body).to_lowercase();
            if !include.is_empty() && !matches_any(&blob, include) {
                debug!("Skipping (no include keyword): {}", title);
                continue;
            }
            if matches_any(&blob, exclude) {
                debug!("Skipping (excluded keyword): {}", title);
                continue;
            }

            if !seen.insert(entry_hash(&title, &entry.link)) {
                debug!("Skipping duplicate: {}", title);
                continue;
            }

            let ts = entry.published.unwrap_or_else(Utc::now);
            results.push(NewsItem {
                title,
                body,
                ts: ts.to_rfc3339_opts(SecondsFormat::Secs, false),
                source: source.clone(),
                url: entry.link,
            });
        }
    }
    results
}

/// Fetches every source and writes the selected items to `log_path`.
/// A source that cannot be fetched or parsed contributes no entries.
pub async fn fetch_and_normalize(
    sources: &[SourceSpec],
    include: &[String],
    exclude: &[String],
    log_path: Option<&Path>,
) -> anyhow::Result<Vec<NewsItem>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let mut batches = Vec::with_capacity(sources.len());
    for src in sources {
        info!("Fetching feed {} ({})", src.name, src.url);
        let entries = match fetch_feed(&client, &src.url).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Feed {} unavailable: {:#}", src.name, e);
                Vec::new()
            }
        };
        batches.push((src.name.clone(), entries));
    }

    let items = collect_items(batches, include, exclude);
    if let Some(path) = log_path {
        write_json(path, &items)?;
    }
    Ok(items)
}

/// Converts a feed timestamp to ISO-8601 UTC. Anything unparseable maps to now.
pub fn to_iso_utc(raw: &str) -> String {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
                .ok()
                .map(|naive| naive.and_utc())
        });
    parsed
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Reads the bundled sample items. Timestamps are normalized on the way in.
pub fn load_sample(path: &Path) -> anyhow::Result<Vec<NewsItem>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading sample news {}", path.display()))?;
    let mut items: Vec<NewsItem> = serde_json::from_str(&data)?;
    for item in &mut items {
        item.ts = to_iso_utc(&item.ts);
    }
    Ok(items)
}
