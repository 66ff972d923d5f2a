use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::collector::Dataset;
use crate::error::ParseError;
use crate::model::{Field, ItemOrigin, NormalizedRecord, RawRecord};

/// Leading currency marker: "$", "US$", "€", "CDN$ " and the like.
static CURRENCY_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\d.,+\-]*").expect("currency regex is valid"));

/// A raw record the cleaner had to leave out, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Excluded {
    pub origin: ItemOrigin,
    pub error: ParseError,
}

/// Output of [`normalize`]: the clean records plus everything excluded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub records: Vec<NormalizedRecord>,
    pub excluded: Vec<Excluded>,
}

/// Converts every raw record to typed fields.
///
/// A record failing any conversion is excluded whole; nothing is defaulted.
pub fn normalize(dataset: Dataset) -> Normalized {
    let mut out = Normalized::default();

    for raw in dataset {
        match normalize_record(&raw) {
            Ok(record) => out.records.push(record),
            Err(error) => {
                warn!(
                    page = raw.origin.page,
                    index = raw.origin.index,
                    field = %error.field,
                    scope = ?error.scope(),
                    "excluding record: {}",
                    error
                );
                out.excluded.push(Excluded {
                    origin: raw.origin,
                    error,
                });
            }
        }
    }

    debug!(
        kept = out.records.len(),
        excluded = out.excluded.len(),
        "normalization finished"
    );
    out
}

pub fn normalize_record(raw: &RawRecord) -> Result<NormalizedRecord, ParseError> {
    let title = raw
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ParseError::new(Field::Title, "", "title is missing"))?;

    Ok(NormalizedRecord {
        title: title.to_string(),
        price: parse_price(&raw.price_text)?,
        rating: parse_rating(&raw.rating_text)?,
        reviews: parse_reviews(&raw.reviews_text)?,
    })
}

/// `"$1,299.00"` -> `1299.0`
pub fn parse_price(text: &str) -> Result<f64, ParseError> {
    let trimmed = text.trim();
    let amount = CURRENCY_PREFIX.replace(trimmed, "");
    let digits: String = amount.trim().chars().filter(|c| *c != ',').collect();
    if digits.is_empty() {
        return Err(ParseError::new(Field::Price, text, "no amount after currency symbol"));
    }

    let price = parse_finite(Field::Price, text, &digits)?;
    if price < 0.0 {
        return Err(ParseError::new(Field::Price, text, "negative price"));
    }
    Ok(price)
}

/// `"4.5 out of 5 stars"` -> `4.5`
pub fn parse_rating(text: &str) -> Result<f64, ParseError> {
    let token = text
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::new(Field::Rating, text, "empty rating"))?;
    parse_finite(Field::Rating, text, token)
}

/// `"12,000"` -> `12000`
pub fn parse_reviews(text: &str) -> Result<u64, ParseError> {
    let digits: String = text.trim().chars().filter(|c| *c != ',').collect();
    digits
        .parse::<u64>()
        .map_err(|e| ParseError::new(Field::Reviews, text, e.to_string()))
}

fn parse_finite(field: Field, input: &str, number: &str) -> Result<f64, ParseError> {
    let value = number
        .parse::<f64>()
        .map_err(|e| ParseError::new(field, input, e.to_string()))?;
    if !value.is_finite() {
        return Err(ParseError::new(field, input, "not a finite number"));
    }
    Ok(value)
}
