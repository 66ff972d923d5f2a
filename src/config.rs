use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::browser::LaunchSettings;
use crate::error::PipelineError;
use crate::extractor::{self, ListingSelectors};
use crate::fetcher::FetchSettings;
use crate::pipeline::RunSettings;

/// Scrape a product search, clean the listings and chart price/rating distributions.
///
/// Every option can also be set through the environment or a `.env` file.
#[derive(Debug, Clone, Parser)]
#[command(name = "listing-scout", version)]
pub struct Config {
    /// Search keyword
    #[arg(env = "SCOUT_KEYWORD", default_value = "smartphone")]
    pub keyword: String,

    /// Number of result pages to scrape, starting at page 1
    #[arg(short, long, env = "SCOUT_PAGES", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub pages: u32,

    /// Search endpoint; `k` and `page` query parameters are appended
    #[arg(long, env = "SCOUT_BASE_URL", default_value = "https://www.amazon.com/s")]
    pub base_url: String,

    /// Where the histogram image is written
    #[arg(short, long, env = "SCOUT_OUTPUT", default_value = "analysis_report.png")]
    pub output: PathBuf,

    /// Chrome/Chromium binary (auto-detected when omitted)
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, env = "SCOUT_HEADFUL")]
    pub headful: bool,

    /// Max time to wait for the first result item to render
    #[arg(long, env = "SCOUT_SETTLE_TIMEOUT_MS", default_value_t = 15_000)]
    pub settle_timeout_ms: u64,

    #[arg(long, env = "SCOUT_POLL_INTERVAL_MS", default_value_t = 250)]
    pub poll_interval_ms: u64,

    /// Fixed wait used when no result item shows up in time
    #[arg(long, env = "SCOUT_FALLBACK_DELAY_MS", default_value_t = 5_000)]
    pub fallback_delay_ms: u64,

    /// Pause before retrying a failed page load
    #[arg(long, env = "SCOUT_RETRY_BACKOFF_MS", default_value_t = 2_000)]
    pub retry_backoff_ms: u64,

    /// TTF font for chart labels (searches common system fonts when omitted)
    #[arg(long, env = "SCOUT_FONT_PATH")]
    pub font_path: Option<PathBuf>,

    /// CSS selector for one search result item
    #[arg(long, env = "SCOUT_CONTAINER_SELECTOR", default_value = extractor::CONTAINER)]
    pub container_selector: String,

    /// Item-scoped selectors for the four extracted fields
    #[arg(long, env = "SCOUT_TITLE_SELECTOR", default_value = extractor::TITLE)]
    pub title_selector: String,

    #[arg(long, env = "SCOUT_PRICE_SELECTOR", default_value = extractor::PRICE)]
    pub price_selector: String,

    #[arg(long, env = "SCOUT_RATING_SELECTOR", default_value = extractor::RATING)]
    pub rating_selector: String,

    #[arg(long, env = "SCOUT_REVIEWS_SELECTOR", default_value = extractor::REVIEWS)]
    pub reviews_selector: String,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write the cleaned records to this JSON file
    #[arg(long, env = "SCOUT_DUMP_RECORDS")]
    pub dump_records: Option<PathBuf>,
}

impl Config {
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            settle_timeout: Duration::from_millis(self.settle_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            fallback_delay: Duration::from_millis(self.fallback_delay_ms),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn launch_settings(&self) -> LaunchSettings {
        LaunchSettings {
            headless: !self.headful,
            chrome_path: self.chrome_path.clone(),
        }
    }

    /// Parses the listing selectors; a malformed one fails before the browser starts.
    pub fn selectors(&self) -> Result<ListingSelectors, PipelineError> {
        ListingSelectors::new(
            &self.container_selector,
            &self.title_selector,
            &self.price_selector,
            &self.rating_selector,
            &self.reviews_selector,
        )
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            keyword: self.keyword.clone(),
            pages: self.pages,
            base_url: self.base_url.clone(),
            output: self.output.clone(),
            fetch: self.fetch_settings(),
        }
    }
}
