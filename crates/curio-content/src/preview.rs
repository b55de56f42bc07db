//! Link previews: title, description and thumbnail of a web page.
//!
//! YouTube and Twitter/X links get dedicated handling because their pages
//! are hostile to scraping. Everything else is read from OpenGraph tags,
//! falling back to `<title>`, the meta description and the first paragraph.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use curio_core::defaults::{PREVIEW_SNIPPET_CHARS, PREVIEW_TIMEOUT_SECS};
use curio_core::text::truncate_chars;
use curio_core::{Error, Result};

/// Default Twitter/X oEmbed endpoint.
pub const TWITTER_OEMBED_URL: &str = "https://publish.twitter.com/oembed";

static YOUTUBE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:https?://)?(?:www\.)?(?:youtube\.com/(?:watch\?v=|embed/)|youtu\.be/)([a-zA-Z0-9_-]+)",
    )
    .expect("youtube regex is valid")
});

static TWITTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?(?:twitter\.com|x\.com)/([a-zA-Z0-9_]+)/status/([0-9]+)")
        .expect("twitter regex is valid")
});

static META_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("meta regex is valid"));

static IMG_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("img regex is valid"));

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute regex is valid")
});

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex is valid"));

static PARAGRAPH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").expect("paragraph regex is valid"));

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex is valid"));

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

/// What a link looks like when shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPreview {
    pub title: String,
    pub description: String,
    pub thumbnail_url: String,
}

/// Fetches link previews.
#[async_trait]
pub trait LinkPreviewer: Send + Sync {
    async fn preview(&self, url: &str) -> Result<LinkPreview>;
}

// =============================================================================
// HTML HELPERS
// =============================================================================

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Visible text of an HTML fragment, whitespace collapsed.
fn html_text(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    let decoded = decode_entities(&stripped);
    WHITESPACE_RE.replace_all(decoded.trim(), " ").into_owned()
}

fn attributes(tag: &str) -> HashMap<String, String> {
    ATTR_RE
        .captures_iter(tag)
        .map(|c| {
            let value = c.get(2).or_else(|| c.get(3)).map_or("", |m| m.as_str());
            (c[1].to_lowercase(), decode_entities(value))
        })
        .collect()
}

/// `content` of the first `<meta>` whose `property` or `name` is one of `keys`.
fn meta_content(html: &str, keys: &[&str]) -> Option<String> {
    for key in keys {
        for tag in META_TAG_RE.find_iter(html) {
            let attrs = attributes(tag.as_str());
            let named = [attrs.get("property"), attrs.get("name")]
                .into_iter()
                .flatten()
                .any(|v| v.eq_ignore_ascii_case(key));
            if !named {
                continue;
            }
            if let Some(content) = attrs.get("content").filter(|c| !c.trim().is_empty()) {
                return Some(content.trim().to_string());
            }
        }
    }
    None
}

fn page_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .map(|c| html_text(&c[1]))
        .filter(|t| !t.is_empty())
}

fn snippet(text: &str) -> String {
    if text.chars().count() > PREVIEW_SNIPPET_CHARS {
        format!("{}...", truncate_chars(text, PREVIEW_SNIPPET_CHARS))
    } else {
        text.to_string()
    }
}

fn resolve(base: &str, href: &str) -> String {
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

fn thumbnail(base: &str, html: &str) -> String {
    if let Some(image) = meta_content(html, &["og:image", "twitter:image"]) {
        return resolve(base, &image);
    }
    // First reasonably sized inline image.
    for tag in IMG_TAG_RE.find_iter(html) {
        let attrs = attributes(tag.as_str());
        let Some(src) = attrs.get("src") else {
            continue;
        };
        let wide_enough = attrs
            .get("width")
            .map_or(true, |w| w.trim().parse::<u32>().map_or(false, |w| w > 100));
        if wide_enough && (src.starts_with("http") || src.starts_with('/')) {
            return resolve(base, src);
        }
    }
    String::new()
}

/// Preview of a generic page from its HTML.
pub fn parse_page(base_url: &str, html: &str) -> LinkPreview {
    let title = meta_content(html, &["og:title"])
        .or_else(|| page_title(html))
        .unwrap_or_default();
    let description = meta_content(html, &["og:description", "description"])
        .or_else(|| {
            PARAGRAPH_RE
                .captures_iter(html)
                .map(|c| html_text(&c[1]))
                .find(|t| !t.is_empty())
                .map(|t| snippet(&t))
        })
        .unwrap_or_default();
    LinkPreview {
        title,
        description,
        thumbnail_url: thumbnail(base_url, html),
    }
}

fn with_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

// =============================================================================
// HTTP PREVIEWER
// =============================================================================

#[derive(Debug, Deserialize)]
struct TweetEmbed {
    #[serde(default)]
    author_name: String,
    #[serde(default)]
    html: String,
}

/// Link previewer fetching pages over HTTP.
pub struct HttpLinkPreviewer {
    client: Client,
    twitter_oembed_url: String,
}

impl Default for HttpLinkPreviewer {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpLinkPreviewer {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(PREVIEW_TIMEOUT_SECS))
            .user_agent(concat!("curio/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            twitter_oembed_url: TWITTER_OEMBED_URL.to_string(),
        }
    }

    pub fn with_twitter_oembed_url(mut self, url: impl Into<String>) -> Self {
        self.twitter_oembed_url = url.into();
        self
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Request(format!(
                "preview fetch returned {}",
                response.status()
            )));
        }
        Ok(response.text().await?)
    }

    async fn youtube(&self, url: &str, video_id: &str) -> LinkPreview {
        let mut preview = LinkPreview {
            thumbnail_url: format!("https://img.youtube.com/vi/{}/maxresdefault.jpg", video_id),
            ..Default::default()
        };
        match self.fetch_html(&with_scheme(url)).await {
            Ok(html) => {
                if let Some(title) = page_title(&html) {
                    preview.title = title.trim_end_matches(" - YouTube").to_string();
                }
                preview.description = meta_content(&html, &["description"]).unwrap_or_default();
            }
            Err(e) => warn!(video_id, error = %e, "YouTube page fetch failed"),
        }
        preview
    }

    async fn tweet(&self, url: &str, username: &str, tweet_id: &str) -> LinkPreview {
        let mut preview = LinkPreview {
            title: format!("@{} on X", username),
            description: format!("Post {}", tweet_id),
            ..Default::default()
        };
        let embed = async {
            let response = self
                .client
                .get(&self.twitter_oembed_url)
                .query(&[("url", with_scheme(url))])
                .send()
                .await?
                .error_for_status()?;
            Ok::<TweetEmbed, reqwest::Error>(response.json().await?)
        };
        match embed.await {
            Ok(embed) => {
                if !embed.author_name.is_empty() {
                    preview.title = format!("{} (@{})", embed.author_name, username);
                }
                let text = html_text(&embed.html);
                if !text.is_empty() {
                    preview.description = snippet(&text);
                }
            }
            Err(e) => warn!(tweet_id, error = %e, "Tweet oEmbed failed, using basic preview"),
        }
        preview
    }
}

#[async_trait]
impl LinkPreviewer for HttpLinkPreviewer {
    #[instrument(skip(self), fields(subsystem = "content", component = "preview", op = "preview"))]
    async fn preview(&self, url: &str) -> Result<LinkPreview> {
        if let Some(caps) = YOUTUBE_RE.captures(url) {
            return Ok(self.youtube(url, &caps[1]).await);
        }
        if let Some(caps) = TWITTER_RE.captures(url) {
            return Ok(self.tweet(url, &caps[1], &caps[2]).await);
        }

        let target = with_scheme(url);
        let html = self.fetch_html(&target).await?;
        let preview = parse_page(&target, &html);
        debug!(title = %preview.title, "Fetched page preview");
        Ok(preview)
    }
}
