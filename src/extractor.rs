use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};
use tracing::{debug, warn};

use crate::error::{ExtractionError, PipelineError};
use crate::fetcher::LoadedPage;
use crate::model::{Field, ItemOrigin, RawRecord};

// Search results layout. Update these together when the listing markup changes.
pub const CONTAINER: &str = "div.s-result-item";
pub const TITLE: &str = "span.a-size-medium.a-color-base.a-text-normal";
pub const PRICE: &str = "span.a-offscreen";
pub const RATING: &str = "span.a-icon-alt";
pub const REVIEWS: &str = "span.a-size-base.s-underline-text";

static DEFAULT_SELECTORS: Lazy<ListingSelectors> = Lazy::new(|| {
    ListingSelectors::new(CONTAINER, TITLE, PRICE, RATING, REVIEWS)
        .expect("built-in listing selectors are valid CSS")
});

/// Parsed CSS selectors for one listing layout.
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    container_css: String,
    container: Selector,
    title: Selector,
    price: Selector,
    rating: Selector,
    reviews: Selector,
}

impl ListingSelectors {
    pub fn new(
        container: &str,
        title: &str,
        price: &str,
        rating: &str,
        reviews: &str,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            container_css: container.to_string(),
            container: parse_selector(container)?,
            title: parse_selector(title)?,
            price: parse_selector(price)?,
            rating: parse_selector(rating)?,
            reviews: parse_selector(reviews)?,
        })
    }

    /// The CSS text of the item-container selector, used to detect that results rendered.
    pub fn container_css(&self) -> &str {
        &self.container_css
    }

    fn for_field(&self, field: Field) -> &Selector {
        match field {
            Field::Title => &self.title,
            Field::Price => &self.price,
            Field::Rating => &self.rating,
            Field::Reviews => &self.reviews,
        }
    }
}

impl Default for ListingSelectors {
    fn default() -> Self {
        DEFAULT_SELECTORS.clone()
    }
}

fn parse_selector(css: &str) -> Result<Selector, PipelineError> {
    Selector::parse(css).map_err(|e| PipelineError::Config(format!("bad selector {:?}: {:?}", css, e)))
}

/// Records pulled from one page, plus the items that had to be dropped.
#[derive(Debug, Default)]
pub struct ExtractedPage {
    pub records: Vec<RawRecord>,
    pub failures: Vec<ExtractionError>,
}

impl ExtractedPage {
    pub fn containers(&self) -> usize {
        self.records.len() + self.failures.len()
    }
}

/// Extracts every complete item on `page`, in page order.
///
/// An item missing any field is dropped and reported in `failures`; the
/// remaining containers are still processed.
pub fn extract_items(page: &LoadedPage, selectors: &ListingSelectors) -> ExtractedPage {
    let mut out = ExtractedPage::default();

    for (i, container) in page.document.select(&selectors.container).enumerate() {
        let origin = ItemOrigin {
            page: page.page_number,
            index: i + 1,
        };
        match extract_item(container, selectors, origin) {
            Ok(record) => {
                debug!(page = origin.page, index = origin.index, "extracted item");
                out.records.push(record);
            }
            Err(e) => {
                warn!(
                    page = origin.page,
                    index = origin.index,
                    field = %e.field,
                    scope = ?e.scope(),
                    "dropping item: {}",
                    e
                );
                out.failures.push(e);
            }
        }
    }

    debug!(
        page = page.page_number,
        url = %page.url,
        containers = out.containers(),
        extracted = out.records.len(),
        "page extraction finished"
    );
    out
}

fn extract_item(
    container: ElementRef<'_>,
    selectors: &ListingSelectors,
    origin: ItemOrigin,
) -> Result<RawRecord, ExtractionError> {
    let text_of = |field: Field| {
        field_text(container, selectors.for_field(field)).ok_or(ExtractionError { origin, field })
    };

    Ok(RawRecord {
        origin,
        title: Some(text_of(Field::Title)?),
        price_text: text_of(Field::Price)?,
        rating_text: text_of(Field::Rating)?,
        reviews_text: text_of(Field::Reviews)?,
    })
}

/// Text of the first match inside `scope`, whitespace-collapsed. Empty text counts as missing.
fn field_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let element = scope.select(selector).next()?;
    let text = element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
