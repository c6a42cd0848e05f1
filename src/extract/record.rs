use crate::extract::UnitContext;
use crate::url::normalize_url;
use sha2::{Digest, Sha256};

/// Number of body characters that participate in the fingerprint
pub const FINGERPRINT_BODY_CHARS: usize = 100;

/// A normalized content item extracted from one page
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub origin: String,
    pub kind: String,
    pub group: String,
    pub subject: String,
    pub url: String,
    pub title: String,
    pub body: String,
    pub author: Option<String>,
    pub rating: Option<f64>,
    pub year: Option<i32>,
    pub mileage: Option<i64>,
    pub pros: Option<String>,
    pub cons: Option<String>,
    fingerprint: String,
}

impl Record {
    /// Creates a record for the unit in `ctx` and computes its fingerprint
    pub fn new(
        ctx: &UnitContext,
        url: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let title = title.into();
        let body = body.into();
        let fingerprint = content_fingerprint(&url, &title, &body);

        Self {
            origin: ctx.key.origin.clone(),
            kind: ctx.kind.clone(),
            group: ctx.key.group.clone(),
            subject: ctx.key.subject.clone(),
            url,
            title,
            body,
            author: None,
            rating: None,
            year: None,
            mileage: None,
            pros: None,
            cons: None,
            fingerprint,
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }

    pub fn with_rating(mut self, rating: Option<f64>) -> Self {
        self.rating = rating;
        self
    }

    pub fn with_year(mut self, year: Option<i32>) -> Self {
        self.year = year;
        self
    }

    pub fn with_mileage(mut self, mileage: Option<i64>) -> Self {
        self.mileage = mileage;
        self
    }

    pub fn with_pros_cons(mut self, pros: Option<String>, cons: Option<String>) -> Self {
        self.pros = pros;
        self.cons = cons;
        self
    }
}

/// Computes the deduplication fingerprint of a record
///
/// SHA-256 over `canonical_url + "_" + title + "_" + body prefix`, where the
/// body prefix is the first 100 characters (not bytes) of the body. URLs that
/// fail to canonicalize are used verbatim.
pub fn content_fingerprint(url: &str, title: &str, body: &str) -> String {
    let canonical = normalize_url(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string());
    let prefix: String = body.chars().take(FINGERPRINT_BODY_CHARS).collect();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.update(b"_");
    hasher.update(title.as_bytes());
    hasher.update(b"_");
    hasher.update(prefix.as_bytes());
    hex::encode(hasher.finalize())
}
