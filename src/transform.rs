use std::collections::HashSet;

use tracing::{info, warn};

use crate::error::TransformError;
use crate::normalize::{parse_color_count, parse_price, parse_rating};
use crate::table::{Table, Value, COLORS, COLUMNS, GENDER, PRICE, RATING, SIZE, TITLE};

/// USD -> IDR.
pub const DEFAULT_EXCHANGE_RATE: f64 = 16000.0;

const UNKNOWN_TITLE: &str = "Unknown Product";
const PRICE_SENTINELS: &[&str] = &["Price Not Found", "Price Unavailable"];

/// Clean a scraped table. If any step fails the input comes back unchanged.
pub fn transform(table: &Table, exchange_rate: f64) -> Table {
    match try_transform(table.clone(), exchange_rate) {
        Ok(clean) => {
            info!("Transform done: {} clean rows", clean.len());
            clean
        }
        Err(e) => {
            warn!("Transform failed, returning input unchanged: {}", e);
            table.clone()
        }
    }
}

struct Cols {
    title: usize,
    price: usize,
    rating: usize,
    colors: usize,
    size: usize,
    gender: usize,
}

fn try_transform(table: Table, exchange_rate: f64) -> Result<Table, TransformError> {
    let idx = |name: &'static str| table.column_index(name).ok_or(TransformError::MissingColumn(name));
    for name in COLUMNS {
        idx(name)?;
    }
    let c = Cols {
        title: idx(TITLE)?,
        price: idx(PRICE)?,
        rating: idx(RATING)?,
        colors: idx(COLORS)?,
        size: idx(SIZE)?,
        gender: idx(GENDER)?,
    };
    let columns = table.columns().to_vec();
    let mut rows = table.into_rows();

    // 1. duplicates
    let before = rows.len();
    let mut seen = HashSet::new();
    rows.retain(|r| seen.insert(r.clone()));
    info!("Removed {} duplicate rows", before - rows.len());

    // 2. placeholder titles
    let before = rows.len();
    rows.retain(|r| r[c.title].as_text() != Some(UNKNOWN_TITLE));
    info!("Removed {} rows with an invalid title", before - rows.len());

    // 3 + 4. price
    for r in &mut rows {
        let cell = std::mem::replace(&mut r[c.price], Value::Null);
        r[c.price] = convert_price(cell, exchange_rate);
    }

    // 5. unpriced rows
    let before = rows.len();
    rows.retain(|r| !r[c.price].is_null());
    info!("Removed {} rows with an invalid price", before - rows.len());

    // 6 + 7. descriptors
    for r in &mut rows {
        r[c.rating] = match &r[c.rating] {
            Value::Text(s) => Value::float(parse_rating(Some(s.as_str()))),
            Value::Null => Value::float(parse_rating(None)),
            other => other.clone(),
        };
        r[c.colors] = match &r[c.colors] {
            Value::Text(s) => Value::Int(parse_color_count(Some(s.as_str()))),
            Value::Null => Value::Int(parse_color_count(None)),
            other => other.clone(),
        };
        strip_label(&mut r[c.size], "Size:");
        strip_label(&mut r[c.gender], "Gender:");
    }

    // leftover nulls
    for (i, name) in columns.iter().enumerate() {
        if rows.iter().any(|r| r[i].is_null()) {
            warn!("Column {} still contains null values", name);
        }
    }

    // types
    let records = Table::new(columns, rows).to_clean_records()?;
    Ok(Table::from_clean(&records))
}

/// Sentinel texts and unparseable prices become `Null`; numeric cells are
/// taken to be converted already.
fn convert_price(cell: Value, exchange_rate: f64) -> Value {
    match cell {
        Value::Text(s) if PRICE_SENTINELS.contains(&s.as_str()) => Value::Null,
        Value::Text(s) => Value::float(parse_price(Some(s.as_str())).map(|p| p * exchange_rate)),
        Value::Null => Value::float(parse_price(None).map(|p| p * exchange_rate)),
        numeric => numeric,
    }
}

fn strip_label(cell: &mut Value, label: &str) {
    if let Value::Text(s) = cell {
        let trimmed = s.trim();
        *s = trimmed
            .strip_prefix(label)
            .unwrap_or(trimmed)
            .trim()
            .to_string();
    }
}
