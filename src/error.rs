use thiserror::Error;

/// A card lookup that could not be answered at all (as opposed to a lookup
/// that simply found nothing).
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("missing column {0:?}")]
    MissingColumn(&'static str),
    #[error("row {row}: column {column:?} holds {found}, expected {expected}")]
    Incompatible {
        row: usize,
        column: &'static str,
        found: &'static str,
        expected: &'static str,
    },
}
