use crate::storage::UnitKey;
use crate::UrlError;
use url::form_urlencoded::byte_serialize;
use url::Url;

pub const GROUP_PLACEHOLDER: &str = "{group}";
pub const SUBJECT_PLACEHOLDER: &str = "{subject}";
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Returns true if the template walks multiple pages
pub fn has_page_placeholder(template: &str) -> bool {
    template.contains(PAGE_PLACEHOLDER)
}

/// Renders the URL of one page of a work unit
///
/// `{group}` and `{subject}` are percent-encoded before substitution; `{page}`
/// is replaced with the 1-based page number when present.
///
/// # Arguments
///
/// * `template` - Origin URL template
/// * `key` - The work unit being fetched
/// * `page` - 1-based page number
///
/// # Returns
///
/// * `Ok(Url)` - The rendered URL
/// * `Err(UrlError)` - The rendered string is not an HTTP(S) URL
pub fn render_unit_url(template: &str, key: &UnitKey, page: u32) -> Result<Url, UrlError> {
    let rendered = template
        .replace(GROUP_PLACEHOLDER, &encode(&key.group))
        .replace(SUBJECT_PLACEHOLDER, &encode(&key.subject))
        .replace(PAGE_PLACEHOLDER, &page.to_string());

    let url = Url::parse(&rendered).map_err(|e| UrlError::Parse(format!("{}: {}", rendered, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(UrlError::InvalidScheme(other.to_string())),
    }
}

/// Checks that a template names both unit placeholders and renders to a URL
pub fn validate_template(template: &str) -> Result<(), String> {
    for placeholder in [GROUP_PLACEHOLDER, SUBJECT_PLACEHOLDER] {
        if !template.contains(placeholder) {
            return Err(format!("'{}' is missing {}", template, placeholder));
        }
    }

    render_unit_url(template, &UnitKey::new("origin", "group", "subject"), 1)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}
