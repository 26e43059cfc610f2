use crate::UrlError;
use url::Url;

/// Query parameters that identify a click, not a product
const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "msclkid",
    "mc_eid",
    "srsltid",
    "ref",
    "sid",
    "affiliate",
];

/// Canonicalizes a product detail URL found on a listing page
///
/// # Canonicalization Steps
///
/// 1. Resolve `href` against the listing page URL; reject if malformed
/// 2. Accept only http and https
/// 3. Lowercase the host
/// 4. Remove the fragment
/// 5. Remove tracking query parameters (`utm_*` and click ids)
/// 6. Sort remaining query parameters, dropping an empty query
///
/// Scheme, `www.` and the path are kept: shops route on them.
///
/// # Arguments
///
/// * `href` - The link target as written in the listing page
/// * `base` - The listing page URL
///
/// # Returns
///
/// * `Ok(Url)` - Canonical detail URL
/// * `Err(UrlError)` - The link cannot lead to a detail page
///
/// # Examples
///
/// ```
/// use kibble_ingest::url::canonical_detail_url;
/// use url::Url;
///
/// let base = Url::parse("https://Shop.Example/hundefutter?page=2").unwrap();
/// let url = canonical_detail_url("/p/lamm-reis?utm_source=nl&size=12kg#reviews", &base).unwrap();
/// assert_eq!(url.as_str(), "https://shop.example/p/lamm-reis?size=12kg");
/// ```
pub fn canonical_detail_url(href: &str, base: &Url) -> Result<Url, UrlError> {
    let mut url = base
        .join(href.trim())
        .map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("host {}: {}", host, e)))?;

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort();
    params
}

/// Checks if a query parameter is a tracking parameter
pub fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://shop.example/hundefutter?page=3").unwrap()
    }

    #[test]
    fn test_relative_link_is_resolved() {
        let url = canonical_detail_url("/p/123", &base()).unwrap();
        assert_eq!(url.as_str(), "https://shop.example/p/123");

        let url = canonical_detail_url("trocken/456", &base()).unwrap();
        assert_eq!(url.as_str(), "https://shop.example/trocken/456");
    }

    #[test]
    fn test_scheme_and_www_are_kept() {
        let url = canonical_detail_url("http://WWW.Shop.Example/p/1", &base()).unwrap();
        assert_eq!(url.as_str(), "http://www.shop.example/p/1");
    }

    #[test]
    fn test_remove_fragment() {
        let url = canonical_detail_url("/p/1#bewertungen", &base()).unwrap();
        assert_eq!(url.as_str(), "https://shop.example/p/1");
    }

    #[test]
    fn test_remove_tracking_params() {
        let url =
            canonical_detail_url("/p/1?utm_source=nl&utm_campaign=x&gclid=abc", &base()).unwrap();
        assert_eq!(url.as_str(), "https://shop.example/p/1");
    }

    #[test]
    fn test_sort_and_keep_variant_params() {
        let url = canonical_detail_url("/p/1?variant=2&size=12kg&fbclid=z", &base()).unwrap();
        assert_eq!(url.as_str(), "https://shop.example/p/1?size=12kg&variant=2");
    }

    #[test]
    fn test_query_values_stay_encoded() {
        let url = canonical_detail_url("/search?q=lamm%20%26%20reis", &base()).unwrap();
        assert_eq!(url.as_str(), "https://shop.example/search?q=lamm+%26+reis");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = canonical_detail_url("ftp://shop.example/p/1", &base());
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));

        let result = canonical_detail_url("mailto:info@shop.example", &base());
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_tracking_param_detection() {
        assert!(is_tracking_param("utm_medium"));
        assert!(is_tracking_param("utm_custom"));
        assert!(is_tracking_param("fbclid"));
        assert!(!is_tracking_param("page"));
        assert!(!is_tracking_param("size"));
    }
}
