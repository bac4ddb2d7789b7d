//! HTML parsing for fetched pages
//!
//! Extracts the title and the outgoing links of a page. Links come back in
//! canonical form, deduplicated, in document order, with their anchor text.

use crate::url::canonicalize_url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// A link found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutLink {
    /// Canonical target URL
    pub url: Url,
    /// Trimmed anchor text, when the link has any
    pub anchor: Option<String>,
}

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct HtmlPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Outgoing links, at most the requested number
    pub links: Vec<OutLink>,
}

/// Parses HTML content and extracts the title and outgoing links
///
/// Links are taken from `<a href>`, `<area href>`, `<frame src>`,
/// `<iframe src>` and `<link rel="canonical">`, resolved against the page's
/// `<base href>` when present and `page_url` otherwise. Download links and
/// non-http(s) targets are skipped.
///
/// # Example
///
/// ```
/// use tidepool::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let page_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &page_url, 100);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].url.as_str(), "https://example.com/page");
/// ```
pub fn parse_html(html: &str, page_url: &Url, max_links: usize) -> HtmlPage {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let base = base_url(&document, page_url);
    let links = extract_links(&document, &base, max_links);

    HtmlPage { title, links }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = selector("title")?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn base_url(document: &Html, page_url: &Url) -> Url {
    selector("base[href]")
        .and_then(|s| {
            document
                .select(&s)
                .next()
                .and_then(|element| element.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| page_url.clone())
}

fn extract_links(document: &Html, base: &Url, max_links: usize) -> Vec<OutLink> {
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    let sources = [
        ("a[href], area[href]", "href"),
        ("frame[src], iframe[src]", "src"),
        ("link[rel='canonical'][href]", "href"),
    ];

    for (css, attr) in sources {
        let Some(sel) = selector(css) else {
            continue;
        };

        for element in document.select(&sel) {
            if links.len() >= max_links {
                tracing::debug!("Page {} has more than {} links", base, max_links);
                return links;
            }

            if element.value().attr("download").is_some() {
                continue;
            }

            let Some(url) = element.value().attr(attr).and_then(|href| resolve_link(href, base))
            else {
                continue;
            };

            if seen.insert(url.as_str().to_string()) {
                links.push(OutLink {
                    url,
                    anchor: anchor_text(&element),
                });
            }
        }
    }

    links
}

fn anchor_text(element: &ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Resolves a link href to a canonical URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel:, data: targets
/// - fragment-only links
/// - anything that does not canonicalize to an http(s) URL
fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    canonicalize_url(href, Some(base)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://example.com/dir/page").unwrap()
    }

    fn link_strings(html: &str) -> Vec<String> {
        parse_html(html, &page_url(), 100)
            .links
            .into_iter()
            .map(|l| l.url.to_string())
            .collect()
    }

    #[test]
    fn test_extract_title() {
        let html = r#"<html><head><title>  Test Page  </title></head><body></body></html>"#;
        let parsed = parse_html(html, &page_url(), 100);
        assert_eq!(parsed.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_no_title() {
        let parsed = parse_html("<html><head></head><body></body></html>", &page_url(), 100);
        assert_eq!(parsed.title, None);
    }

    #[test]
    fn test_relative_links_are_resolved_and_canonical() {
        let html = r#"<a href="other?b=2&a=1#frag">x</a><a href="/Root/../top">y</a>"#;
        assert_eq!(
            link_strings(html),
            vec![
                "https://example.com/dir/other?a=1&b=2",
                "https://example.com/top"
            ]
        );
    }

    #[test]
    fn test_base_href_changes_resolution() {
        let html = r#"<html><head><base href="https://cdn.example.com/assets/"></head>
            <body><a href="img">x</a></body></html>"#;
        assert_eq!(link_strings(html), vec!["https://cdn.example.com/assets/img"]);
    }

    #[test]
    fn test_skips_non_http_targets() {
        let html = r##"
            <a href="javascript:void(0)">a</a>
            <a href="MAILTO:test@example.com">b</a>
            <a href="tel:+1234567890">c</a>
            <a href="data:text/html,hi">d</a>
            <a href="#section">e</a>
            <a href="ftp://example.com/file">f</a>
            <a href="/file.pdf" download>g</a>
            <a href="/valid">h</a>
        "##;
        assert_eq!(link_strings(html), vec!["https://example.com/valid"]);
    }

    #[test]
    fn test_frames_and_canonical_links() {
        let html = r#"<html><head><link rel="canonical" href="https://example.com/canonical"></head>
            <body><iframe src="/embedded"></iframe></body></html>"#;
        let links = link_strings(html);
        assert!(links.contains(&"https://example.com/embedded".to_string()));
        assert!(links.contains(&"https://example.com/canonical".to_string()));
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let html = r#"<a href="/a">1</a><a href="/a#x">2</a><a href="https://EXAMPLE.com/a">3</a>"#;
        assert_eq!(link_strings(html), vec!["https://example.com/a"]);
    }

    #[test]
    fn test_anchor_text_is_collapsed() {
        let html = "<a href=\"/a\">  Read\n   <b>more</b> </a><a href=\"/b\"><img src=\"x.png\"></a>";
        let parsed = parse_html(html, &page_url(), 100);
        assert_eq!(parsed.links[0].anchor.as_deref(), Some("Read more"));
        assert_eq!(parsed.links[1].anchor, None);
    }

    #[test]
    fn test_link_limit() {
        let html: String = (0..10).map(|i| format!("<a href=\"/p{}\">p</a>", i)).collect();
        let parsed = parse_html(&html, &page_url(), 3);
        assert_eq!(parsed.links.len(), 3);
        assert_eq!(parsed.links[0].url.as_str(), "https://example.com/p0");
    }
}
