//! URL handling module
//!
//! This module provides URL normalization, origin extraction and the
//! registered-domain comparison used for link classification and crawl scope.

mod domain;
mod normalize;

pub use domain::{extract_domain, origin_of, registered_domain, same_registered_domain};
pub use normalize::{normalize_parsed, normalize_url};

use url::Url;

/// Whether a link points inside or outside the source page's site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkScope {
    Internal,
    External,
}

/// Classifies a link relative to the page it was found on
pub fn classify_link(source: &Url, link: &Url) -> LinkScope {
    if same_registered_domain(source, link) {
        LinkScope::Internal
    } else {
        LinkScope::External
    }
}

/// Parses and validates a user-supplied URL
///
/// Only absolute HTTP(S) URLs with a host are accepted.
pub fn parse_input_url(input: &str) -> crate::Result<Url> {
    normalize_url(input).map_err(|e| crate::ArwError::Validation(format!("{}: {}", input, e)))
}
