//! Registrable-domain splitting backed by the Public Suffix List

use url::{Host, Url};

/// Splits a URL host into `(sub_domain, domain)`
///
/// The domain is the registrable part of the host according to the Public
/// Suffix List, private suffixes included, so `user.github.io` is its own
/// domain. IP hosts, single-label hosts and bare public suffixes are returned
/// whole as the domain. Both parts are lowercase.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use tidepool::url::split_host;
///
/// let url = Url::parse("https://blog.Example.com/post").unwrap();
/// assert_eq!(split_host(&url), ("blog".to_string(), "example.com".to_string()));
///
/// let url = Url::parse("https://shop.example.co.uk/").unwrap();
/// assert_eq!(split_host(&url), ("shop".to_string(), "example.co.uk".to_string()));
/// ```
pub fn split_host(url: &Url) -> (String, String) {
    match url.host() {
        Some(Host::Domain(host)) => split_domain_name(&host.to_lowercase()),
        Some(Host::Ipv4(ip)) => (String::new(), ip.to_string()),
        Some(Host::Ipv6(ip)) => (String::new(), ip.to_string()),
        None => (String::new(), String::new()),
    }
}

fn split_domain_name(host: &str) -> (String, String) {
    let host = host.trim_end_matches('.');
    let domain = match psl::domain_str(host) {
        Some(domain) => domain,
        None => return (String::new(), host.to_string()),
    };

    let sub_domain = host[..host.len() - domain.len()].trim_end_matches('.');
    (sub_domain.to_string(), domain.to_string())
}
