use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

// One fractional digit, not followed by a second one.
static RATING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+\.[0-9])(?:[^0-9]|$)").unwrap());
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").unwrap());

/// Price text to a number: drops `$` and thousands separators, then parses.
pub fn parse_price(raw: Option<&str>) -> Option<f64> {
    let Some(raw) = raw else {
        debug!("price is null");
        return None;
    };
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '$' | ',')).collect();
    match cleaned.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        Ok(v) => {
            warn!("Price {:?} parsed to non-finite {}", raw, v);
            None
        }
        Err(e) => {
            warn!("Could not parse price {:?}: {}", raw, e);
            None
        }
    }
}

/// First `d.d` rating in the text, e.g. `⭐4.5/5` -> 4.5.
pub fn parse_rating(raw: Option<&str>) -> Option<f64> {
    let Some(raw) = raw else {
        debug!("rating is null");
        return None;
    };
    let rating = RATING_RE
        .captures(raw)
        .and_then(|c| c[1].parse::<f64>().ok());
    if rating.is_none() {
        warn!("No rating found in {:?}", raw);
    }
    rating
}

/// First run of digits, or 0 when there is none.
pub fn parse_color_count(raw: Option<&str>) -> i64 {
    let Some(raw) = raw else {
        debug!("colors is null");
        return 0;
    };
    let Some(m) = DIGITS_RE.find(raw) else {
        warn!("No color count found in {:?}", raw);
        return 0;
    };
    m.as_str().parse().unwrap_or_else(|e| {
        warn!("Color count {:?} out of range: {}", m.as_str(), e);
        0
    })
}
