use crate::UrlError;
use url::Url;

/// Query parameters that identify a visit rather than a document
const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "yclid",
    "_openstat",
    "from",
    "ref",
    "rb_clickid",
];

/// Canonicalizes a URL so that the same document always yields the same string
///
/// The canonical form feeds record fingerprints, so two links to one review
/// must agree even when they differ in scheme, `www.` prefix, fragment or
/// click-tracking parameters.
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Force the `https` scheme
/// 3. Lowercase the host and strip a leading `www.`
/// 4. Collapse dot segments, duplicate slashes and the trailing slash
/// 5. Drop the fragment
/// 6. Drop tracking parameters, sort the rest, drop an empty query
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Canonical URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
///
/// # Examples
///
/// ```
/// use review_harvester::url::normalize_url;
///
/// let url = normalize_url("http://WWW.DROM.RU/reviews/toyota/camry/#top").unwrap();
/// assert_eq!(url.as_str(), "https://drom.ru/reviews/toyota/camry");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    match url.scheme() {
        "https" => {}
        "http" => url
            .set_scheme("https")
            .map_err(|_| UrlError::Malformed(format!("Cannot upgrade scheme of {}", url_str)))?,
        other => {
            return Err(UrlError::InvalidScheme(format!(
                "Only HTTP and HTTPS schemes are supported, got: {}",
                other
            )))
        }
    }

    let host = url
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or(UrlError::MissingDomain)?;
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let path = normalize_path(url.path());
    url.set_path(&path);

    url.set_fragment(None);

    if url.query().is_some() {
        let kept = filter_and_sort_query_params(&url);
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    Ok(url)
}

/// Removes dot segments, empty segments and the trailing slash
fn normalize_path(path: &str) -> String {
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

    format!("/{}", segments.join("/"))
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_to_https() {
        let result = normalize_url("http://drom.ru/reviews/1").unwrap();
        assert_eq!(result.as_str(), "https://drom.ru/reviews/1");
    }

    #[test]
    fn test_remove_www_and_lowercase() {
        let result = normalize_url("https://WWW.Drive2.RU/r/bmw").unwrap();
        assert_eq!(result.as_str(), "https://drive2.ru/r/bmw");
    }

    #[test]
    fn test_trailing_slash_and_root() {
        assert_eq!(
            normalize_url("https://drom.ru/reviews/").unwrap().as_str(),
            "https://drom.ru/reviews"
        );
        assert_eq!(
            normalize_url("https://drom.ru").unwrap().as_str(),
            "https://drom.ru/"
        );
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://drom.ru/reviews/5#comments").unwrap();
        assert_eq!(result.as_str(), "https://drom.ru/reviews/5");
    }

    #[test]
    fn test_tracking_params_dropped_and_rest_sorted() {
        let result = normalize_url(
            "https://drom.ru/reviews?page=2&utm_source=vk&order=new&yclid=77&from=feed",
        )
        .unwrap();
        assert_eq!(result.as_str(), "https://drom.ru/reviews?order=new&page=2");
    }

    #[test]
    fn test_only_tracking_params_removes_query() {
        let result = normalize_url("https://drom.ru/reviews?utm_medium=mail&fbclid=1").unwrap();
        assert_eq!(result.as_str(), "https://drom.ru/reviews");
    }

    #[test]
    fn test_dot_and_duplicate_segments() {
        let result = normalize_url("https://drom.ru//a/../b/./c//").unwrap();
        assert_eq!(result.as_str(), "https://drom.ru/b/c");
    }

    #[test]
    fn test_path_case_is_kept() {
        let result = normalize_url("https://drom.ru/Reviews/Camry").unwrap();
        assert_eq!(result.as_str(), "https://drom.ru/Reviews/Camry");
    }

    #[test]
    fn test_equivalent_links_agree() {
        let a = normalize_url("http://www.drom.ru/reviews/toyota/camry/123/?utm_campaign=x").unwrap();
        let b = normalize_url("https://drom.ru/reviews/toyota/camry/123#top").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://drom.ru/file");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_malformed_url() {
        assert!(matches!(normalize_url("not a url"), Err(UrlError::Parse(_))));
    }
}
