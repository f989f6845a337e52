//! Page fetching and HTML-to-text extraction

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::Html;
use tracing::{debug, instrument, warn};

use crate::config::{ExtractConfig, HttpConfig};

/// Redirect hops followed before giving up
const MAX_REDIRECTS: usize = 10;

/// Source of observation text for a URL
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url` and return its readable text
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Fetches pages over HTTP(S) and flattens them to plain text
#[derive(Debug, Clone)]
pub struct Extractor {
    client: reqwest::Client,
    max_chars: usize,
}

impl Extractor {
    pub fn new(config: &ExtractConfig, http: &HttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(config.user_agent.as_str());
        if let Some(timeout) = http.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            max_chars: config.max_chars,
        })
    }

    /// GET `url`, strip markup and return at most `max_chars` characters of text
    #[instrument(skip(self), fields(max_chars = self.max_chars))]
    pub async fn fetch_and_extract(&self, url: &str) -> Result<String> {
        let parsed = url::Url::parse(url).with_context(|| format!("invalid URL: {}", url))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("unsupported URL scheme: {}", parsed.scheme());
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .context("fetch failed")?;

        let status = response.status();
        debug!(status = %status, final_url = %response.url(), "HTTP response received");
        if !status.is_success() {
            warn!(status = %status, "HTTP error response");
            anyhow::bail!("fetch failed: {}", status.as_u16());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        let body = response
            .text()
            .await
            .context("failed to read response body")?;

        // Markup is stripped whatever the declared type; only JSON is kept as is.
        let text = if content_type.contains("json") {
            collapse_whitespace(&body)
        } else {
            html_to_text(&body)
        };

        let text = truncate_chars(&text, self.max_chars);
        debug!(chars = text.chars().count(), "Extracted page text");
        Ok(text.to_string())
    }
}

#[async_trait]
impl PageFetcher for Extractor {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.fetch_and_extract(url).await
    }
}

/// Convert an HTML document to a single line of text.
///
/// `script`, `style` and `noscript` contents are dropped, every tag becomes a
/// word boundary, and whitespace runs collapse to one space.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut pieces: Vec<&str> = Vec::new();
    let mut skip_depth = 0usize;

    for edge in document.root_element().traverse() {
        match edge {
            ego_tree::iter::Edge::Open(node) => {
                if skip_depth > 0 {
                    if node.value().is_element() {
                        skip_depth += 1;
                    }
                    continue;
                }

                match node.value() {
                    scraper::Node::Text(text) => pieces.push(&**text),
                    scraper::Node::Element(el) => {
                        if matches!(el.name(), "script" | "style" | "noscript") {
                            skip_depth = 1;
                        }
                    }
                    _ => {}
                }
            }
            ego_tree::iter::Edge::Close(node) => {
                if skip_depth > 0 && node.value().is_element() {
                    skip_depth -= 1;
                }
            }
        }
    }

    collapse_whitespace(&pieces.join(" "))
}

/// Collapse whitespace runs to single spaces and trim both ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Longest prefix of `text` with at most `max_chars` characters (UTF-8 safe)
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
