use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::App;
use crate::error::EngineError;

const MIN_SUMMARY_LEN: usize = 100;
const MAX_SUMMARY_LEN: usize = 2000;
const MIN_ANCHOR_TEXT_LEN: usize = 5;
const WIDEN_ANCHOR_TEXT_LEN: usize = 10;

#[derive(Debug, Clone)]
pub struct ExtractedArticle {
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkItem {
    pub title: String,
    pub url: url::Url,
}

#[derive(Debug, Clone)]
pub struct RssItem {
    pub title: String,
    pub url: url::Url,
    pub description: Option<String>,
}

static NOISE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)share this:?",
        r"(?i)follow us on twitter",
        r"(?i)like us on facebook",
        r"(?i)subscribe to our newsletter",
        r"(?i)comments\?",
        r"©\s*\d{4}",
        r"(?i)all rights reserved",
        r"(?i)terms of [Ss]ervice",
        r"(?i)privacy [Pp]olicy",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static noise pattern compiles"))
    .collect()
});

fn clean_text(text: &str) -> String {
    let mut cleaned = text.to_string();
    for pattern in NOISE_PATTERNS.iter() {
        cleaned = pattern.replace_all(&cleaned, "").to_string();
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_summary(text: &str) -> String {
    if text.chars().count() <= MAX_SUMMARY_LEN {
        return text.to_string();
    }
    text.chars().take(MAX_SUMMARY_LEN).collect()
}

/// Secondary fallback extractor: joins `<p>` tag text, used when the primary
/// readability-style pass comes back below the minimum summary floor.
fn extract_with_selectors(html: &str) -> Option<ExtractedArticle> {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("title, h1").ok()?;
    let paragraph_selector = Selector::parse("p").ok()?;

    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())?;

    let summary = document
        .select(&paragraph_selector)
        .map(|el| el.text().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ");

    Some(ExtractedArticle {
        title,
        summary: truncate_summary(&clean_text(&summary)),
    })
}

/// Extracts `(title, summary)` from an already-rendered article, given the
/// HTML that `article_scraper` produced for `url`. Falls back to a
/// CSS-selector scrape when the readability-style summary is too short.
pub fn extract_article(
    html: &str,
    readability_title: Option<String>,
) -> Result<ExtractedArticle, EngineError> {
    let mut article = extract_with_selectors(html).ok_or(EngineError::ExtractionEmpty)?;
    if let Some(title) = readability_title {
        if !title.trim().is_empty() {
            article.title = title;
        }
    }

    if article.summary.is_empty() && article.title.is_empty() {
        return Err(EngineError::ExtractionEmpty);
    }

    Ok(article)
}

/// Fetches `url` with the shared HTTP client and extracts article content
/// via `article_scraper`'s readability-style pass, falling back to a raw
/// CSS-selector scrape when the summary comes back too short.
#[tracing::instrument(skip(ctx))]
pub async fn fetch_article(ctx: &App, url: &url::Url) -> Result<ExtractedArticle, EngineError> {
    let scraped = article_scraper::ArticleScraper::new(None)
        .await
        .parse(url, false, &ctx.http, None)
        .await
        .map_err(|err| EngineError::TransientNetwork(err.to_string()))?;

    let html = scraped
        .html
        .as_ref()
        .ok_or(EngineError::ExtractionEmpty)?
        .clone();

    let mut article = extract_article(&html, scraped.title.clone())?;

    if article.summary.chars().count() < MIN_SUMMARY_LEN {
        let raw = ctx
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|err| EngineError::TransientNetwork(err.to_string()))?
            .text()
            .await
            .map_err(|err| EngineError::TransientNetwork(err.to_string()))?;

        if let Some(fallback) = extract_with_selectors(&raw) {
            if fallback.summary.chars().count() > article.summary.chars().count() {
                article.summary = fallback.summary;
                if article.title.is_empty() {
                    article.title = fallback.title;
                }
            }
        }
    }

    Ok(article)
}

/// Normalizes a URL for dedupe/identity purposes: drops the fragment and a
/// trailing slash on a non-root path, so `https://ex.com/a` and
/// `https://ex.com/a/` refer to the same article.
pub fn canonicalize_url(mut url: url::Url) -> url::Url {
    url.set_fragment(None);
    if url.path().ends_with('/') && url.path() != "/" {
        let trimmed = url.path().trim_end_matches('/').to_string();
        url.set_path(&trimmed);
    }
    url
}

fn same_registrable_domain(a: &url::Url, b: &url::Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(ha), Some(hb)) => {
            let strip = |h: &str| h.strip_prefix("www.").unwrap_or(h).to_string();
            strip(ha) == strip(hb)
        }
        _ => false,
    }
}

/// Extracts same-domain `http(s)` links with non-trivial anchor text,
/// widening to the parent element's text when the anchor text is short, and
/// dedupes by (title, url).
pub fn extract_links(html: &str, base_url: &url::Url) -> Vec<LinkItem> {
    let document = Html::parse_document(html);
    let Ok(anchor_selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for el in document.select(&anchor_selector) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') {
            continue;
        }

        let Ok(mut resolved) = base_url.join(href) else {
            continue;
        };
        resolved.set_fragment(None);

        if !resolved.scheme().starts_with("http") {
            continue;
        }
        if !same_registrable_domain(base_url, &resolved) {
            continue;
        }

        let anchor_text = el.text().collect::<String>().trim().to_string();
        let title = if anchor_text.chars().count() < WIDEN_ANCHOR_TEXT_LEN {
            let parent_text = el
                .parent()
                .and_then(scraper::ElementRef::wrap)
                .map(|p| p.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            if parent_text.chars().count() > anchor_text.chars().count() {
                parent_text
            } else {
                anchor_text
            }
        } else {
            anchor_text
        };

        if title.chars().count() < MIN_ANCHOR_TEXT_LEN {
            continue;
        }

        let key = (title.clone(), resolved.to_string());
        if seen.insert(key) {
            out.push(LinkItem {
                title,
                url: resolved,
            });
        }
    }

    out
}

/// Parses an RSS/Atom feed body into `(title, url, description)` items.
pub fn extract_rss(body: &str) -> Vec<RssItem> {
    let Ok(feed) = feed_rs::parser::parse(body.as_bytes()) else {
        return Vec::new();
    };

    feed.entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.map(|t| t.content)?;
            let link = entry.links.first()?.href.clone();
            let url = url::Url::parse(&link).ok()?;
            let description = entry.summary.map(|s| s.content);
            Some(RssItem {
                title,
                url,
                description,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_extract_picks_title_and_paragraphs() {
        let html = "<html><head><title>Hello</title></head><body><p>First paragraph with enough content to pass the floor repeated several times over to be long enough for the test to matter here.</p></body></html>";
        let article = extract_with_selectors(html).unwrap();
        assert_eq!(article.title, "Hello");
        assert!(article.summary.contains("First paragraph"));
    }

    #[test]
    fn clean_text_strips_noise_patterns() {
        let input = "Real content here. Share this: on twitter. \u{00A9} 2024 All rights reserved.";
        let cleaned = clean_text(input);
        assert!(cleaned.contains("Real content here"));
        assert!(!cleaned.to_lowercase().contains("share this"));
        assert!(!cleaned.to_lowercase().contains("all rights reserved"));
    }

    #[test]
    fn extract_links_filters_cross_domain_and_short_anchor_text() {
        let base = url::Url::parse("https://example.com/").unwrap();
        let html = r#"
            <html><body>
            <a href="/a">Long enough anchor text</a>
            <a href="https://other.com/b">Also long enough text here</a>
            <a href="/c">Hi</a>
            <a href="#frag">Ignore fragment only</a>
            </body></html>
        "#;
        let links = extract_links(html, &base);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "Long enough anchor text");
    }

    #[test]
    fn canonicalize_strips_fragment_and_trailing_slash() {
        let url = url::Url::parse("https://ex.com/a/#section").unwrap();
        assert_eq!(canonicalize_url(url).as_str(), "https://ex.com/a");
        let root = url::Url::parse("https://ex.com/").unwrap();
        assert_eq!(canonicalize_url(root).as_str(), "https://ex.com/");
    }

    #[test]
    fn extract_rss_parses_items() {
        let body = r#"<?xml version="1.0"?>
        <rss version="2.0"><channel>
        <item><title>Hello</title><link>https://ex.com/a</link><description>Desc</description></item>
        </channel></rss>"#;
        let items = extract_rss(body);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Hello");
        assert_eq!(items[0].url.as_str(), "https://ex.com/a");
    }
}
