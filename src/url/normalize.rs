use crate::UrlError;
use url::Url;

/// Canonicalizes a URL, optionally resolving it against a context URL
///
/// # Canonicalization Steps
///
/// 1. Resolve against `context` when given, otherwise parse as absolute
/// 2. Reject anything that is not http or https
/// 3. Lowercase the host (default ports are dropped by the parser)
/// 4. Normalize path:
///    - Remove dot segments (. and ..)
///    - Collapse repeated slashes
///    - Empty path becomes /
///    - A trailing slash is kept, `/dir/` and `/dir` stay distinct
/// 5. Remove fragment (everything after #)
/// 6. Sort query parameters by key, drop an empty query string
///
/// # Arguments
///
/// * `href` - The raw URL or link target
/// * `context` - The page the link was found on, if any
///
/// # Returns
///
/// * `Ok(Url)` - Canonical URL
/// * `Err(UrlError)` - The input cannot be turned into a crawlable URL
///
/// # Examples
///
/// ```
/// use tidepool::url::canonicalize_url;
///
/// let url = canonicalize_url("HTTP://Example.COM:80/a/../b?z=1&a=2#top", None).unwrap();
/// assert_eq!(url.as_str(), "http://example.com/b?a=2&z=1");
/// ```
pub fn canonicalize_url(href: &str, context: Option<&Url>) -> Result<Url, UrlError> {
    let href = href.trim();
    if href.is_empty() {
        return Err(UrlError::Malformed("empty URL".to_string()));
    }

    let mut url = match context {
        Some(base) => base.join(href),
        None => Url::parse(href),
    }
    .map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    if host.is_empty() {
        return Err(UrlError::MissingHost);
    }
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = sorted_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and repeated slashes
fn normalize_path(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }

    let trailing_slash = path.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", segments.join("/"));
    if trailing_slash {
        result.push('/');
    }
    result
}

/// Returns query parameters sorted by key, dropping empty keys
fn sorted_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.is_empty())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_http_scheme() {
        let result = canonicalize_url("http://example.com/page", None).unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_keeps_trailing_slash() {
        let result = canonicalize_url("https://example.com/dir/", None).unwrap();
        assert_eq!(result.as_str(), "https://example.com/dir/");
    }

    #[test]
    fn test_empty_path_becomes_root() {
        let result = canonicalize_url("https://example.com", None).unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_fragment() {
        let result = canonicalize_url("https://example.com/page#section", None).unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_sort_query_params() {
        let result = canonicalize_url("https://example.com/page?b=2&a=1", None).unwrap();
        assert_eq!(result.as_str(), "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn test_empty_query_removed() {
        let result = canonicalize_url("https://example.com/page?", None).unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_normalize_path_with_dots() {
        let result = canonicalize_url("https://example.com/a/../b/./c", None).unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_multiple_slashes() {
        let result = canonicalize_url("https://example.com///path//to///page", None).unwrap();
        assert_eq!(result.as_str(), "https://example.com/path/to/page");
    }

    #[test]
    fn test_lowercase_host_keeps_path_case() {
        let result = canonicalize_url("https://EXAMPLE.COM/Page", None).unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_default_port_dropped() {
        let result = canonicalize_url("http://example.com:80/", None).unwrap();
        assert_eq!(result.as_str(), "http://example.com/");

        let result = canonicalize_url("http://example.com:8080/", None).unwrap();
        assert_eq!(result.as_str(), "http://example.com:8080/");
    }

    #[test]
    fn test_resolves_relative_against_context() {
        let base = Url::parse("https://example.com/docs/index.html").unwrap();
        let result = canonicalize_url("../about#team", Some(&base)).unwrap();
        assert_eq!(result.as_str(), "https://example.com/about");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = canonicalize_url("ftp://example.com/page", None);
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));

        let base = Url::parse("https://example.com/").unwrap();
        let result = canonicalize_url("mailto:someone@example.com", Some(&base));
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_malformed_url() {
        assert!(canonicalize_url("not a url", None).is_err());
        assert!(canonicalize_url("   ", None).is_err());
    }
}
