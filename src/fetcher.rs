use anyhow::Result;
use rand::Rng;
use scraper::Html;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::browser::PageRenderer;
use crate::error::NavigationError;

/// A navigation is retried once before the page is given up.
const MAX_ATTEMPTS: u32 = 2;

/// Timing knobs for loading one search page.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Upper bound on polling for the first item container.
    pub settle_timeout: Duration,
    pub poll_interval: Duration,
    /// Extra wait when polling times out, before extracting whatever is there.
    pub fallback_delay: Duration,
    /// Pause before the retry; up to a quarter more is added as jitter.
    pub retry_backoff: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            settle_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
            fallback_delay: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// A search page after rendering settled.
pub struct LoadedPage {
    pub page_number: u32,
    pub url: String,
    pub document: Html,
}

/// `https://www.amazon.com/s` + `usb c hub` + 2 -> `https://www.amazon.com/s?k=usb%20c%20hub&page=2`
pub fn search_url(base_url: &str, keyword: &str, page_number: u32) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}k={}&page={}",
        base_url,
        separator,
        urlencoding::encode(keyword),
        page_number
    )
}

pub struct PageFetcher<'a> {
    base_url: &'a str,
    /// CSS selector whose presence means results have rendered.
    ready_selector: &'a str,
    settings: &'a FetchSettings,
}

impl<'a> PageFetcher<'a> {
    pub fn new(base_url: &'a str, ready_selector: &'a str, settings: &'a FetchSettings) -> Self {
        Self {
            base_url,
            ready_selector,
            settings,
        }
    }

    pub async fn fetch_page<R: PageRenderer>(
        &self,
        renderer: &mut R,
        keyword: &str,
        page_number: u32,
    ) -> Result<LoadedPage, NavigationError> {
        let url = search_url(self.base_url, keyword, page_number);
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            debug!(page = page_number, attempt, %url, "fetching search page");
            match self.load(renderer, &url).await {
                Ok(html) => {
                    return Ok(LoadedPage {
                        page_number,
                        url,
                        document: Html::parse_document(&html),
                    });
                }
                Err(e) => {
                    last_error = format!("{:#}", e);
                    warn!(page = page_number, attempt, error = %last_error, "page load failed");
                    if attempt < MAX_ATTEMPTS {
                        let backoff = self.backoff_with_jitter();
                        debug!(page = page_number, ?backoff, "retrying after backoff");
                        sleep(backoff).await;
                    }
                }
            }
        }

        Err(NavigationError {
            page: page_number,
            url,
            attempts: MAX_ATTEMPTS,
            cause: last_error,
        })
    }

    async fn load<R: PageRenderer>(&self, renderer: &mut R, url: &str) -> Result<String> {
        renderer.navigate(url)?;

        let settled = renderer
            .wait_for(
                self.ready_selector,
                self.settings.settle_timeout,
                self.settings.poll_interval,
            )
            .await?;
        if !settled {
            warn!(
                %url,
                timeout = ?self.settings.settle_timeout,
                "no item container appeared, falling back to fixed delay"
            );
            sleep(self.settings.fallback_delay).await;
        }

        renderer.content()
    }

    fn backoff_with_jitter(&self) -> Duration {
        let base = self.settings.retry_backoff;
        let max_jitter = base.as_millis() as u64 / 4;
        let jitter = if max_jitter == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max_jitter)
        };
        base + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::ScriptedRenderer;
    use scraper::Selector;
    use tokio::time::Instant;

    const BASE: &str = "https://shop.test/s";
    const READY: &str = "div.s-result-item";

    fn settings() -> FetchSettings {
        FetchSettings {
            settle_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
            fallback_delay: Duration::from_millis(1000),
            retry_backoff: Duration::from_millis(400),
        }
    }

    #[test]
    fn search_url_encodes_keyword() {
        assert_eq!(
            search_url("https://www.amazon.com/s", "smartphone", 1),
            "https://www.amazon.com/s?k=smartphone&page=1"
        );
        assert_eq!(
            search_url("https://www.amazon.com/s", "usb c hub & cable/50%", 3),
            "https://www.amazon.com/s?k=usb%20c%20hub%20%26%20cable%2F50%25&page=3"
        );
        assert_eq!(
            search_url("https://shop.test/search?lang=en", "tea", 2),
            "https://shop.test/search?lang=en&k=tea&page=2"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn loads_page_once_containers_render() {
        let url = search_url(BASE, "tea", 1);
        let mut renderer = ScriptedRenderer::new()
            .page(&url, "<div class='s-result-item'><span>Green tea</span></div>");
        let settings = settings();
        let fetcher = PageFetcher::new(BASE, READY, &settings);

        let started = Instant::now();
        let page = fetcher.fetch_page(&mut renderer, "tea", 1).await.unwrap();

        assert_eq!(page.page_number, 1);
        assert_eq!(page.url, url);
        let containers = Selector::parse(READY).unwrap();
        assert_eq!(page.document.select(&containers).count(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(renderer.visits, vec![url]);
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_fixed_delay_when_nothing_renders() {
        let url = search_url(BASE, "tea", 1);
        let mut renderer = ScriptedRenderer::new().page(&url, "<p>No results</p>");
        let settings = settings();
        let fetcher = PageFetcher::new(BASE, READY, &settings);

        let started = Instant::now();
        let page = fetcher.fetch_page(&mut renderer, "tea", 1).await.unwrap();

        assert_eq!(page.page_number, 1);
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_navigation_once() {
        let url = search_url(BASE, "tea", 2);
        let mut renderer = ScriptedRenderer::new()
            .page(&url, "<div class='s-result-item'></div>")
            .failing(&url, 1);
        let settings = settings();
        let fetcher = PageFetcher::new(BASE, READY, &settings);

        let started = Instant::now();
        let page = fetcher.fetch_page(&mut renderer, "tea", 2).await.unwrap();

        assert_eq!(page.page_number, 2);
        assert_eq!(renderer.visits.len(), 2);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(400) && waited <= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_second_failure() {
        let url = search_url(BASE, "tea", 1);
        let mut renderer = ScriptedRenderer::new()
            .page(&url, "<div class='s-result-item'></div>")
            .failing(&url, 2);
        let settings = settings();
        let fetcher = PageFetcher::new(BASE, READY, &settings);

        let err = fetcher.fetch_page(&mut renderer, "tea", 1).await.err().unwrap();

        assert_eq!(err.page, 1);
        assert_eq!(err.attempts, 2);
        assert_eq!(err.url, url);
        assert!(err.cause.contains("ERR_CONNECTION_RESET"));
        assert_eq!(renderer.visits.len(), 2);
    }
}
