use serde::{Deserialize, Serialize};
use std::fmt;

/// The four fields scraped from every item container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Price,
    Rating,
    Reviews,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Price => "price",
            Field::Rating => "rating",
            Field::Reviews => "reviews",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an item came from: search page number and 1-based position on that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOrigin {
    pub page: u32,
    pub index: usize,
}

impl fmt::Display for ItemOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {} item {}", self.page, self.index)
    }
}

/// One scraped item, exactly as the page rendered it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub origin: ItemOrigin,
    pub title: Option<String>,
    pub price_text: String,
    pub rating_text: String,
    pub reviews_text: String,
}

/// A cleaned item with typed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub title: String,
    pub price: f64,
    pub rating: f64,
    pub reviews: u64,
}

#[cfg(test)]
impl NormalizedRecord {
    /// Renders the record back into the text shapes the listing page uses.
    ///
    /// Floats are written with Rust's shortest round-trip formatting, so
    /// feeding the result through the cleaner yields the same bits again.
    pub fn to_raw(&self, origin: ItemOrigin) -> RawRecord {
        RawRecord {
            origin,
            title: Some(self.title.clone()),
            price_text: format!("${}", self.price),
            rating_text: format!("{} out of 5 stars", self.rating),
            reviews_text: group_thousands(self.reviews),
        }
    }
}

/// `1234567` -> `"1,234,567"`
#[cfg(test)]
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
