use scraper::{Html, Selector};
use thiserror::Error;

use pulse_core::{number_by_category, tidy_fragments, CATEGORY_KEYWORDS};

use crate::decode::{decode_page, DecodeError};
use crate::fetch::RawPage;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("invalid selector {0:?}")]
    Selector(String),
}

/// CSS selectors naming the page sections worth harvesting, plus the
/// category labels driving the numbering pass. Sections absent from a page
/// are skipped, not errors.
#[derive(Debug, Clone)]
pub struct ExtractRules {
    pub title: String,
    pub summary_sections: Vec<String>,
    pub tables: String,
    pub category_keywords: Vec<String>,
}

impl Default for ExtractRules {
    fn default() -> Self {
        Self {
            title: ".name_left".to_string(),
            summary_sections: vec![
                ".kbyistrengths".to_string(),
                ".swli2.swotliClass".to_string(),
                ".kbyiopportunities".to_string(),
                ".kbyithreats".to_string(),
            ],
            tables: ".oview_table".to_string(),
            category_keywords: CATEGORY_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Turns one fetched page into an ordered list of text fragments.
pub trait FragmentExtractor: Send + Sync {
    fn extract(&self, page: &RawPage) -> Result<Vec<String>, ExtractError>;
}

/// Selector-driven extractor for security overview pages.
///
/// Fragment order mirrors rule order (title, summary sections, then every
/// overview table in document order); the numbering pass depends on it.
#[derive(Debug, Default)]
pub struct OverviewExtractor {
    rules: ExtractRules,
}

impl OverviewExtractor {
    pub fn new(rules: ExtractRules) -> Self {
        Self { rules }
    }
}

impl FragmentExtractor for OverviewExtractor {
    fn extract(&self, page: &RawPage) -> Result<Vec<String>, ExtractError> {
        let decoded = decode_page(&page.bytes, page.content_type.as_deref())?;
        let doc = Html::parse_document(&decoded.text);

        let mut raw = Vec::new();
        if let Some(title) = select_first_text(&doc, &self.rules.title)? {
            raw.push(title);
        }
        for selector in &self.rules.summary_sections {
            if let Some(section) = select_first_text(&doc, selector)? {
                raw.push(section);
            }
        }
        raw.extend(select_all_text(&doc, &self.rules.tables)?);

        let tidy = tidy_fragments(raw);
        Ok(number_by_category(tidy, &self.rules.category_keywords))
    }
}

fn parse_selector(raw: &str) -> Result<Selector, ExtractError> {
    Selector::parse(raw).map_err(|_| ExtractError::Selector(raw.to_string()))
}

fn select_first_text(doc: &Html, raw: &str) -> Result<Option<String>, ExtractError> {
    let selector = parse_selector(raw)?;
    Ok(doc
        .select(&selector)
        .next()
        .map(|node| node.text().collect::<String>()))
}

fn select_all_text(doc: &Html, raw: &str) -> Result<Vec<String>, ExtractError> {
    let selector = parse_selector(raw)?;
    Ok(doc
        .select(&selector)
        .map(|node| node.text().collect::<String>())
        .collect())
}
