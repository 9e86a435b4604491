//! HTML fetch stage.
//!
//! Downloads the submitted page and extracts the draft metadata and the draft
//! transcript that the human reviews at the metadata checkpoint.

use std::sync::{Arc, LazyLock, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::traits::{StageContext, StageExecutor, StageOutput};
use crate::database::models::JobLogEntry;
use crate::domain::{Metadata, Segment, Stage};
use crate::{Error, Result};

/// Where raw pages come from.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// HTTP client settings for page downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_user_agent() -> String {
    format!("clipflow/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpClientConfig {
    /// Read `HTTP_USER_AGENT` and `HTTP_TIMEOUT_SECS`, falling back to the defaults.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();
        if let Ok(agent) = std::env::var("HTTP_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(secs) = std::env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout_secs = secs;
        }
        config
    }
}

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// reqwest-backed page source.
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        install_rustls_provider();
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Metadata and transcript extracted from a page.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    pub metadata: Metadata,
    pub segments: Vec<Segment>,
}

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<[^>]*class\s*=\s*["'][^"']*\bcontent-date\b[^"']*["'][^>]*>(.*?)</p>"#)
        .expect("valid regex")
});
static YOUTUBE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)youtube[^"'\s]*\.com/embed/([A-Za-z0-9_-]+)"#).expect("valid regex")
});
static TRANSCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<[^>]*\bid\s*=\s*["']transcript0["'][^>]*>(.*?)(?:</div>|$)"#)
        .expect("valid regex")
});
static BR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
/// `Speaker, Company (MM:SS):` or `(HH:MM:SS):` for a continuation.
static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?P<speaker>[^,(]+?)(?:,\s*(?P<company>[^(]+?))?)?\s*\((?P<ts>\d{1,2}:\d{2}:\d{2}|\d{1,2}:\d{2})\):$",
    )
    .expect("valid regex")
});

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn strip_tags(fragment: &str) -> String {
    decode_entities(TAG_RE.replace_all(fragment, "").trim())
}

/// Seconds for `MM:SS` or `HH:MM:SS`.
pub fn parse_timestamp(ts: &str) -> Option<f64> {
    let parts = ts
        .split(':')
        .map(|p| p.parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    let seconds = match parts.as_slice() {
        [m, s] if *s < 60 => m * 60 + s,
        [h, m, s] if *m < 60 && *s < 60 => h * 3600 + m * 60 + s,
        _ => return None,
    };
    Some(f64::from(seconds))
}

/// Content key of a segment. Two speakers repeating the same words at the
/// same timestamp still get distinct keys.
pub fn segment_hash(
    text: &str,
    speaker: &str,
    start: f64,
    end: f64,
    title: &str,
    date: &str,
) -> String {
    let (start, end) = (start.to_string(), end.to_string());
    let mut hasher = Sha256::new();
    for part in [text, speaker, start.as_str(), end.as_str(), title, date] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

struct OpenSegment {
    speaker: String,
    company: String,
    start: f64,
    lines: Vec<String>,
}

/// Split a transcript block into speaker segments.
///
/// A header without a speaker continues the previous speaker from a new
/// timestamp. Each segment ends where the next one starts; the last one ends
/// at its own start.
pub fn parse_transcript(block: &str, title: &str, date: &str) -> Vec<Segment> {
    let text = BR_RE.replace_all(block, "\n");
    let mut finished: Vec<(OpenSegment, f64)> = Vec::new();
    let mut current: Option<OpenSegment> = None;

    for line in text.lines().map(strip_tags).filter(|l| !l.is_empty()) {
        if !HEADER_RE.is_match(&line) {
            if let Some(open) = current.as_mut() {
                open.lines.push(line);
            }
            continue;
        }
        let Some(caps) = HEADER_RE.captures(&line) else {
            continue;
        };
        let Some(start) = caps.name("ts").and_then(|m| parse_timestamp(m.as_str())) else {
            continue;
        };
        let speaker = caps.name("speaker").map(|m| m.as_str().trim().to_string());
        let company = caps.name("company").map(|m| m.as_str().trim().to_string());

        let next = match (speaker, current.as_ref()) {
            (Some(speaker), _) => OpenSegment {
                speaker,
                company: company.unwrap_or_else(|| "Unknown".to_string()),
                start,
                lines: Vec::new(),
            },
            (None, Some(previous)) => OpenSegment {
                speaker: previous.speaker.clone(),
                company: previous.company.clone(),
                start,
                lines: Vec::new(),
            },
            (None, None) => continue,
        };
        if let Some(done) = current.replace(next) {
            finished.push((done, start));
        }
    }
    if let Some(last) = current {
        let end = last.start;
        finished.push((last, end));
    }

    finished
        .into_iter()
        .filter(|(open, _)| !open.lines.is_empty())
        .map(|(open, end)| {
            let end = end.max(open.start);
            let text = open.lines.join(" ");
            Segment {
                segment_hash: segment_hash(&text, &open.speaker, open.start, end, title, date),
                text,
                speaker: open.speaker,
                company: open.company,
                start_time: open.start,
                end_time: end,
                subjects: Vec::new(),
                clip_key: None,
            }
        })
        .collect()
}

/// Extract metadata and transcript from a raw page.
pub fn parse_page(html: &str, source_url: &str) -> Result<ParsedPage> {
    let youtube_id = YOUTUBE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::stage_failed(Stage::HtmlFetch, "no YouTube embed found in page"))?;

    let block = TRANSCRIPT_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| Error::stage_failed(Stage::HtmlFetch, "no transcript element found in page"))?;

    let title = TITLE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| strip_tags(m.as_str()))
        .unwrap_or_default();
    let date = DATE_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| strip_tags(m.as_str()))
        .unwrap_or_default();

    let segments = parse_transcript(block, &title, &date);
    Ok(ParsedPage {
        metadata: Metadata {
            title,
            date,
            youtube_id,
            source: source_url.to_string(),
        },
        segments,
    })
}

/// Stage executor that fetches and parses the submitted page.
pub struct HtmlFetcher {
    source: Arc<dyn PageSource>,
}

impl HtmlFetcher {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl StageExecutor for HtmlFetcher {
    fn stage(&self) -> Stage {
        Stage::HtmlFetch
    }

    fn name(&self) -> &'static str {
        "html_fetcher"
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput> {
        let url = &ctx.job.url;
        let html = self.source.fetch(url).await?;
        let page = parse_page(&html, url)?;

        debug!(
            job_id = ctx.job_id(),
            youtube_id = %page.metadata.youtube_id,
            segments = page.segments.len(),
            "Parsed page"
        );

        let summary = format!(
            "Fetched {} ({} bytes): title '{}', YouTube id {}, {} transcript segments",
            url,
            html.len(),
            page.metadata.title,
            page.metadata.youtube_id,
            page.segments.len()
        );
        Ok(StageOutput {
            metadata: Some(page.metadata),
            segments: Some(page.segments),
            ..Default::default()
        }
        .log(JobLogEntry::info(summary)))
    }
}
