//! URL handling module for Kibble-Ingest
//!
//! Detail-page URL canonicalization and site origins for the HTML catalog
//! sources.

mod normalize;

pub use normalize::{canonical_detail_url, is_tracking_param};

use crate::{UrlError, UrlResult};
use url::Url;

/// Returns the origin (`scheme://host[:port]`) a URL belongs to
///
/// robots.txt is resolved and cached per origin.
///
/// # Examples
///
/// ```
/// use kibble_ingest::url::site_origin;
/// use url::Url;
///
/// let url = Url::parse("https://shop.example:8443/p/1?x=1").unwrap();
/// assert_eq!(site_origin(&url).unwrap(), "https://shop.example:8443");
/// ```
pub fn site_origin(url: &Url) -> UrlResult<String> {
    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }
    Ok(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_origin_default_port() {
        let url = Url::parse("https://shop.example/hundefutter?page=1").unwrap();
        assert_eq!(site_origin(&url).unwrap(), "https://shop.example");
    }

    #[test]
    fn test_site_origin_with_port() {
        let url = Url::parse("http://127.0.0.1:4040/listing").unwrap();
        assert_eq!(site_origin(&url).unwrap(), "http://127.0.0.1:4040");
    }

    #[test]
    fn test_site_origin_without_host() {
        let url = Url::parse("data:text/plain,hello").unwrap();
        assert!(matches!(site_origin(&url), Err(UrlError::MissingHost)));
    }
}
