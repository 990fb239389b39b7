use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::error::TransformError;

pub const TITLE: &str = "Title";
pub const PRICE: &str = "Price";
pub const RATING: &str = "Rating";
pub const COLORS: &str = "Colors";
pub const SIZE: &str = "Size";
pub const GENDER: &str = "Gender";
pub const TIMESTAMP: &str = "Timestamp";

pub const COLUMNS: [&str; 7] = [TITLE, PRICE, RATING, COLORS, SIZE, GENDER, TIMESTAMP];

/// Placeholder for a sub-field the card did not have.
pub const MISSING: &str = "-";

// ── Records ──

/// One product card as scraped: every field is text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RawRecord {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Price")]
    pub price: String,
    #[serde(rename = "Rating")]
    pub rating: String,
    #[serde(rename = "Colors")]
    pub colors: String,
    #[serde(rename = "Size")]
    pub size: String,
    #[serde(rename = "Gender")]
    pub gender: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

impl RawRecord {
    /// The record emitted for a card that could not be read at all.
    pub fn error(timestamp: String) -> Self {
        RawRecord {
            title: "Error".into(),
            price: MISSING.into(),
            rating: MISSING.into(),
            colors: MISSING.into(),
            size: MISSING.into(),
            gender: MISSING.into(),
            timestamp,
        }
    }
}

/// One product after cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanRecord {
    pub title: String,
    pub price: f64,
    pub rating: Option<f64>,
    pub colors: i64,
    pub size: String,
    pub gender: String,
    pub timestamp: String,
}

// ── Cells ──

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Text(String),
    Float(f64),
    Int(i64),
}

impl Value {
    /// Missing and NaN both become `Null`, so a stored float is never NaN.
    pub fn float(x: Option<f64>) -> Value {
        match x {
            Some(v) if !v.is_nan() => Value::Float(v),
            _ => Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Float(_) => "float",
            Value::Int(_) => "int",
        }
    }

    /// Flat text rendering used by the file and spreadsheet sinks.
    pub fn to_cell(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Float(x) => format_float(*x),
            Value::Int(i) => i.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Text(s) => s.hash(state),
            // -0.0 == 0.0, so both must hash alike
            Value::Float(x) => (if *x == 0.0 { 0u64 } else { x.to_bits() }).hash(state),
            Value::Int(i) => i.hash(state),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// Whole numbers keep a trailing `.0` so a price column reads as decimal.
pub fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        x.to_string()
    }
}

// ── Table ──

/// Column-named, row-major table shared by the transformer and the sinks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Rows are padded with `Null` or cut to the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, Value::Null);
                r
            })
            .collect();
        Table { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub(crate) fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    pub fn from_records(records: &[RawRecord]) -> Self {
        let rows = records
            .iter()
            .map(|r| {
                [&r.title, &r.price, &r.rating, &r.colors, &r.size, &r.gender, &r.timestamp]
                    .into_iter()
                    .map(|s| Value::Text(s.clone()))
                    .collect()
            })
            .collect();
        Table::new(canonical_columns(), rows)
    }

    pub fn from_clean(records: &[CleanRecord]) -> Self {
        let rows = records
            .iter()
            .map(|r| {
                vec![
                    Value::Text(r.title.clone()),
                    Value::Float(r.price),
                    Value::float(r.rating),
                    Value::Int(r.colors),
                    Value::Text(r.size.clone()),
                    Value::Text(r.gender.clone()),
                    Value::Text(r.timestamp.clone()),
                ]
            })
            .collect();
        Table::new(canonical_columns(), rows)
    }

    /// Typed view of the table. Fails on the first cell that cannot be
    /// coerced to its column's type.
    pub fn to_clean_records(&self) -> Result<Vec<CleanRecord>, TransformError> {
        let idx = |name: &'static str| {
            self.column_index(name)
                .ok_or(TransformError::MissingColumn(name))
        };
        let (ti, pi, ri, ci, si, gi, tsi) = (
            idx(TITLE)?,
            idx(PRICE)?,
            idx(RATING)?,
            idx(COLORS)?,
            idx(SIZE)?,
            idx(GENDER)?,
            idx(TIMESTAMP)?,
        );

        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                Ok(CleanRecord {
                    title: coerce_text(&cells[ti]),
                    price: coerce_price(row, &cells[pi])?,
                    rating: coerce_rating(row, &cells[ri])?,
                    colors: coerce_colors(row, &cells[ci])?,
                    size: coerce_text(&cells[si]),
                    gender: coerce_text(&cells[gi]),
                    timestamp: coerce_text(&cells[tsi]),
                })
            })
            .collect()
    }
}

fn canonical_columns() -> Vec<String> {
    COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn coerce_text(v: &Value) -> String {
    v.to_cell()
}

fn incompatible(row: usize, column: &'static str, v: &Value, expected: &'static str) -> TransformError {
    TransformError::Incompatible {
        row,
        column,
        found: v.kind(),
        expected,
    }
}

fn coerce_price(row: usize, v: &Value) -> Result<f64, TransformError> {
    match v {
        Value::Float(x) => Ok(*x),
        Value::Int(i) => Ok(*i as f64),
        _ => Err(incompatible(row, PRICE, v, "float")),
    }
}

fn coerce_rating(row: usize, v: &Value) -> Result<Option<f64>, TransformError> {
    match v {
        Value::Null => Ok(None),
        Value::Float(x) => Ok(Some(*x)),
        Value::Int(i) => Ok(Some(*i as f64)),
        Value::Text(_) => Err(incompatible(row, RATING, v, "float")),
    }
}

fn coerce_colors(row: usize, v: &Value) -> Result<i64, TransformError> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Float(x) if x.fract() == 0.0 && x.abs() <= i64::MAX as f64 => Ok(*x as i64),
        _ => Err(incompatible(row, COLORS, v, "int")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(title: &str) -> RawRecord {
        RawRecord {
            title: title.into(),
            price: "$50".into(),
            rating: "⭐4.5/5".into(),
            colors: "3 Colors".into(),
            size: "M".into(),
            gender: "Unisex".into(),
            timestamp: "2025-05-02T17:12:32.329018".into(),
        }
    }

    #[test]
    fn from_records_keeps_order_and_columns() {
        let t = Table::from_records(&[raw("A"), raw("B")]);
        assert_eq!(t.columns(), COLUMNS.map(String::from).as_slice());
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows()[1][0], Value::from("B"));
        assert!(t.rows()[0].iter().all(|v| v.as_text().is_some()));
    }

    #[test]
    fn rows_are_padded_to_width() {
        let t = Table::new(vec!["a".into(), "b".into()], vec![vec![Value::Int(1)]]);
        assert_eq!(t.rows()[0], vec![Value::Int(1), Value::Null]);
    }

    #[test]
    fn clean_records_round_trip() {
        let rec = CleanRecord {
            title: "Hoodie".into(),
            price: 800000.0,
            rating: None,
            colors: 3,
            size: "M".into(),
            gender: "Unisex".into(),
            timestamp: "2025-05-01".into(),
        };
        let t = Table::from_clean(&[rec.clone()]);
        assert!(t.rows()[0][2].is_null());
        assert_eq!(t.to_clean_records().unwrap(), vec![rec]);
    }

    #[test]
    fn text_price_is_not_coercible() {
        let t = Table::from_records(&[raw("A")]);
        let err = t.to_clean_records().unwrap_err();
        assert!(matches!(err, TransformError::Incompatible { column: "Price", .. }));
    }

    #[test]
    fn float_cells_render_like_decimals() {
        assert_eq!(Value::Float(800000.0).to_cell(), "800000.0");
        assert_eq!(Value::Float(99.99).to_cell(), "99.99");
        assert_eq!(Value::Null.to_cell(), "");
    }

    #[test]
    fn zero_signs_compare_and_hash_alike() {
        use std::collections::HashSet;
        let set: HashSet<Value> = [Value::Float(0.0), Value::Float(-0.0)].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_eq!(Value::float(Some(f64::NAN)), Value::Null);
    }
}
