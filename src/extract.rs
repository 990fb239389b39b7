use chrono::Local;
use scraper::{ElementRef, Selector};
use tracing::warn;

use crate::error::ExtractError;
use crate::table::{RawRecord, MISSING};

pub const TITLE_SELECTOR: &str = "h3.product-title";
pub const PRICE_SELECTOR: &str = ".price";
pub const DESCRIPTOR_SELECTOR: &str = "p";

/// Lookup surface of one product card.
pub trait CardNode {
    /// Trimmed text of the first descendant matching `selector`.
    fn first_text(&self, selector: &str) -> Result<Option<String>, ExtractError>;
    /// Trimmed text of every descendant matching `selector`, in document order.
    fn texts(&self, selector: &str) -> Result<Vec<String>, ExtractError>;
}

fn compile(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

impl CardNode for ElementRef<'_> {
    fn first_text(&self, selector: &str) -> Result<Option<String>, ExtractError> {
        let sel = compile(selector)?;
        Ok(self.select(&sel).next().map(element_text))
    }

    fn texts(&self, selector: &str) -> Result<Vec<String>, ExtractError> {
        let sel = compile(selector)?;
        Ok(self.select(&sel).map(element_text).collect())
    }
}

/// ISO-8601 local time with microseconds.
pub fn now_timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Build a raw record from one card. Missing parts become `"-"`; a card that
/// cannot be read at all becomes the `"Error"` record.
pub fn extract(card: &impl CardNode) -> RawRecord {
    let timestamp = now_timestamp();
    match try_extract(card, timestamp.clone()) {
        Ok(record) => record,
        Err(e) => {
            warn!("Failed to extract product card: {}", e);
            RawRecord::error(timestamp)
        }
    }
}

fn try_extract(card: &impl CardNode, timestamp: String) -> Result<RawRecord, ExtractError> {
    let title = card.first_text(TITLE_SELECTOR)?;
    let price = card.first_text(PRICE_SELECTOR)?;
    let lines = card.texts(DESCRIPTOR_SELECTOR)?;

    let labelled = |label: &str| -> String {
        lines
            .iter()
            .find_map(|l| l.strip_prefix(label))
            .map(|rest| rest.trim().to_string())
            .unwrap_or_else(|| MISSING.to_string())
    };

    Ok(RawRecord {
        title: title.unwrap_or_else(|| MISSING.to_string()),
        price: price.unwrap_or_else(|| MISSING.to_string()),
        rating: labelled("Rating:"),
        colors: labelled("Colors:"),
        size: labelled("Size:"),
        gender: labelled("Gender:"),
        timestamp,
    })
}
