use url::{Host, Url};

/// Second-level labels under which registrations happen one level deeper
/// (`example.co.uk`, `example.com.au`)
const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "net", "org", "gov", "ac", "edu", "ne", "or"];

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use arw_crawler::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the serialized origin (`scheme://host[:port]`) of a URL
///
/// Path, query and fragment are stripped; this is the key discovery results
/// are cached under.
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Approximates the registered domain of a URL's host
///
/// IP addresses and single-label hosts are returned unchanged. For names the
/// last two labels are kept, or three when the second-to-last label is a
/// common second-level registry (`co.uk`, `com.au`).
pub fn registered_domain(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Ipv4(ip) => Some(ip.to_string()),
        Host::Ipv6(ip) => Some(ip.to_string()),
        Host::Domain(domain) => Some(registered_domain_of(domain)),
    }
}

fn registered_domain_of(domain: &str) -> String {
    let domain = domain.trim_end_matches('.').to_lowercase();
    let labels: Vec<&str> = domain.split('.').collect();

    if labels.len() <= 2 {
        return domain;
    }

    let second_level = labels[labels.len() - 2];
    let tld = labels[labels.len() - 1];
    let keep = if tld.len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&second_level) {
        3
    } else {
        2
    };

    labels[labels.len() - keep..].join(".")
}

/// Returns true when both URLs share a registered domain
pub fn same_registered_domain(a: &Url, b: &Url) -> bool {
    match (registered_domain(a), registered_domain(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
