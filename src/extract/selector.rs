//! Configuration-driven HTML extraction
//!
//! Every element matching the origin's `record-selector` becomes one record.
//! Field selectors are evaluated relative to that element.

use crate::config::OriginConfig;
use crate::crawler::Document;
use crate::extract::{Extractor, ParseError, Record, UnitContext};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Extractor built from CSS selectors
#[derive(Debug, Clone)]
pub struct SelectorExtractor {
    record: Selector,
    title: Selector,
    body: Selector,
    author: Option<Selector>,
    link: Option<Selector>,
    rating: Option<Selector>,
    year: Option<Selector>,
    mileage: Option<Selector>,
    pros: Option<Selector>,
    cons: Option<Selector>,
}

impl SelectorExtractor {
    /// Compiles the selectors of one origin
    pub fn from_origin(origin: &OriginConfig) -> Result<Self, ParseError> {
        Ok(Self {
            record: compile(&origin.record_selector)?,
            title: compile(&origin.title_selector)?,
            body: compile(&origin.body_selector)?,
            author: compile_optional(&origin.author_selector)?,
            link: compile_optional(&origin.link_selector)?,
            rating: compile_optional(&origin.rating_selector)?,
            year: compile_optional(&origin.year_selector)?,
            mileage: compile_optional(&origin.mileage_selector)?,
            pros: compile_optional(&origin.pros_selector)?,
            cons: compile_optional(&origin.cons_selector)?,
        })
    }

    fn extract_one(
        &self,
        element: ElementRef<'_>,
        base_url: &Url,
        ctx: &UnitContext,
    ) -> Option<Record> {
        let title = select_text(element, &self.title).unwrap_or_default();
        let body = select_text(element, &self.body).unwrap_or_default();
        if title.is_empty() && body.is_empty() {
            return None;
        }

        let url = self
            .link
            .as_ref()
            .and_then(|selector| element.select(selector).next())
            .and_then(|link| link.value().attr("href"))
            .and_then(|href| resolve_link(href, base_url))
            .unwrap_or_else(|| base_url.to_string());

        let field = |selector: &Option<Selector>| {
            selector
                .as_ref()
                .and_then(|selector| select_text(element, selector))
        };

        Some(
            Record::new(ctx, url, title, body)
                .with_author(field(&self.author))
                .with_rating(field(&self.rating).as_deref().and_then(parse_rating))
                .with_year(
                    field(&self.year)
                        .as_deref()
                        .and_then(parse_integer)
                        .and_then(|y| i32::try_from(y).ok()),
                )
                .with_mileage(field(&self.mileage).as_deref().and_then(parse_integer))
                .with_pros_cons(field(&self.pros), field(&self.cons)),
        )
    }
}

impl Extractor for SelectorExtractor {
    fn extract(&self, document: &Document, ctx: &UnitContext) -> Result<Vec<Record>, ParseError> {
        let html = Html::parse_document(&document.body);

        let mut matched = 0;
        let mut records = Vec::new();
        for element in html.select(&self.record) {
            matched += 1;
            match self.extract_one(element, &document.final_url, ctx) {
                Some(record) => records.push(record),
                None => tracing::trace!("Skipping empty record element on {}", document.final_url),
            }
        }

        // Matches without content mean the page layout no longer fits the selectors
        if matched > 0 && records.is_empty() {
            return Err(ParseError::NoUsableRecords { matched });
        }

        Ok(records)
    }
}

fn compile(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector).map_err(|e| ParseError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{:?}", e),
    })
}

fn compile_optional(selector: &Option<String>) -> Result<Option<Selector>, ParseError> {
    selector.as_deref().map(compile).transpose()
}

/// Text of the first match, with whitespace collapsed
fn select_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(|found| {
            found
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|s| !s.is_empty())
}

/// Resolves a link href to an absolute HTTP(S) URL
///
/// Returns None for empty hrefs, fragment-only anchors, `javascript:`,
/// `mailto:` and other non-HTTP targets.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute.to_string()),
        _ => None,
    }
}

/// Parses the first decimal number in a rating such as "4,5 из 5"
fn parse_rating(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let number: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    number.trim_end_matches('.').parse().ok()
}

/// Parses an integer that may contain digit-group separators, e.g. "120 000 км"
fn parse_integer(text: &str) -> Option<i64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || c.is_whitespace())
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
