use crate::UrlError;
use url::Url;

/// Query parameters retained during normalization
///
/// Everything else (sort orders, tracking, session state) is dropped so that
/// surface-different URLs denoting the same resource collapse to one
/// frontier entry. This allow-list is the sole deduplication mechanism.
const RETAINED_PARAMS: &[&str] = &["id", "page", "doc_id", "api_key", "search"];

/// Normalizes a URL for frontier deduplication
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject non-HTTP(S) schemes
/// 2. Lowercase the host
/// 3. Remove the fragment
/// 4. Keep only the allow-listed query parameters, sorted by key
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or(UrlError::MissingDomain)?
        .to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    url.set_fragment(None);

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| RETAINED_PARAMS.contains(&key.as_ref()))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        params.sort_by(|a, b| a.0.cmp(&b.0));

        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query));
        }
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_lowercase_host() {
        let result = normalize_url("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_drop_unlisted_params() {
        let result = normalize_url("https://example.com/page?sort=desc&utm_source=x").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_retain_allowed_params() {
        let result = normalize_url("https://example.com/reg?page=2&id=7").unwrap();
        assert_eq!(result.as_str(), "https://example.com/reg?id=7&page=2");
    }

    #[test]
    fn test_mixed_params_sorted() {
        let result =
            normalize_url("https://example.com/reg?search=tax&sort=asc&doc_id=5").unwrap();
        assert_eq!(result.as_str(), "https://example.com/reg?doc_id=5&search=tax");
    }

    #[test]
    fn test_surface_variants_collapse() {
        let a = normalize_url("https://Example.com/reg?sort=asc&id=1#top").unwrap();
        let b = normalize_url("https://example.com/reg?id=1&order=desc").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_url("not a url").is_err());
    }
}
