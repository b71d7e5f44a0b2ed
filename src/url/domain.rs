use url::Url;

/// Extracts the domain (host) from a URL
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks whether a URL's domain ends with one of the allowed suffixes
///
/// A suffix of ".gov.ua" matches both "data.gov.ua" and "gov.ua" itself.
pub fn is_allowed_domain(url: &Url, allowed_suffixes: &[String]) -> bool {
    let Some(domain) = extract_domain(url) else {
        return false;
    };

    allowed_suffixes.iter().any(|suffix| {
        let bare = suffix.trim_start_matches('.');
        domain == bare || domain.ends_with(suffix.as_str())
            || (suffix.starts_with('.') && domain.ends_with(&format!(".{}", bare)))
    })
}
