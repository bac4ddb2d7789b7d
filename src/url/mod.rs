//! URL handling module for Tidepool
//!
//! This module provides URL canonicalization, domain/sub-domain splitting and
//! the `WebUrl` work item that flows through the frontier.

mod domain;
mod normalize;

pub use domain::split_host;
pub use normalize::canonicalize_url;

use url::Url;

/// A canonical URL scheduled (or about to be scheduled) for fetching
///
/// The canonical URL is the join key between the document-id store and the
/// frontier: an item is only ever built after its `doc_id` has been recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebUrl {
    /// Canonical URL
    pub url: Url,

    /// Document id assigned to the canonical URL
    pub doc_id: i64,

    /// Document id of the page that linked here (none for seeds)
    pub parent_doc_id: Option<i64>,

    /// URL of the page that linked here (none for seeds)
    pub parent_url: Option<String>,

    /// Link distance from the seed this URL was reached from
    pub depth: u16,

    /// Anchor text of the link, if any
    pub anchor: Option<String>,

    /// Priority value (lower is fetched first)
    pub priority: u8,
}

impl WebUrl {
    /// Builds the depth-0 work item for a seed
    pub fn seed(url: Url, doc_id: i64) -> Self {
        Self {
            url,
            doc_id,
            parent_doc_id: None,
            parent_url: None,
            depth: 0,
            anchor: None,
            priority: 0,
        }
    }

    /// Builds a work item for a link found on `parent`
    pub fn child_of(parent: &WebUrl, url: Url, doc_id: i64, depth: u16) -> Self {
        Self {
            url,
            doc_id,
            parent_doc_id: Some(parent.doc_id),
            parent_url: Some(parent.url.to_string()),
            depth,
            anchor: None,
            priority: parent.priority,
        }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Registrable domain, e.g. `example.co.uk` for `shop.example.co.uk`
    pub fn domain(&self) -> String {
        split_host(&self.url).1
    }

    /// Labels in front of the registrable domain, empty when there are none
    pub fn sub_domain(&self) -> String {
        split_host(&self.url).0
    }

    /// `sub_domain.domain`, or just the domain when there is no sub-domain
    pub fn host_key(&self) -> String {
        let (sub, domain) = split_host(&self.url);
        if sub.is_empty() {
            domain
        } else {
            format!("{}.{}", sub, domain)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_url(raw: &str) -> WebUrl {
        WebUrl::seed(canonicalize_url(raw, None).unwrap(), 1)
    }

    #[test]
    fn test_seed_has_depth_zero() {
        let seed = web_url("http://example.com/x");
        assert_eq!(seed.depth, 0);
        assert_eq!(seed.parent_doc_id, None);
    }

    #[test]
    fn test_child_records_parent() {
        let parent = web_url("http://example.com/");
        let child = WebUrl::child_of(
            &parent,
            canonicalize_url("http://example.com/a", None).unwrap(),
            2,
            1,
        );
        assert_eq!(child.parent_doc_id, Some(1));
        assert_eq!(child.parent_url.as_deref(), Some("http://example.com/"));
        assert_eq!(child.depth, 1);
    }

    #[test]
    fn test_host_key() {
        assert_eq!(web_url("http://Example.com/x").host_key(), "example.com");
        assert_eq!(web_url("http://Blog.Example.com/x").host_key(), "blog.example.com");
        assert_eq!(web_url("http://a.b.example.com/").sub_domain(), "a.b");
    }
}
