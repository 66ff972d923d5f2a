use std::path::PathBuf;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::browser::{BrowserSession, PageRenderer};
use crate::chart::ChartRenderer;
use crate::cleaner::{self, Excluded};
use crate::collector::{self, Dataset};
use crate::error::{ExtractionError, NavigationError, PipelineError};
use crate::extractor::{self, ListingSelectors};
use crate::fetcher::{FetchSettings, PageFetcher};
use crate::model::NormalizedRecord;
use crate::report::{self, Report};

/// What one run is asked to do.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub keyword: String,
    pub pages: u32,
    pub base_url: String,
    pub output: PathBuf,
    pub fetch: FetchSettings,
}

/// Everything lost along the way, by granularity.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub pages_loaded: Vec<u32>,
    pub page_failures: Vec<NavigationError>,
    pub item_failures: Vec<ExtractionError>,
    pub excluded: Vec<Excluded>,
}

impl Diagnostics {
    pub fn is_lossless(&self) -> bool {
        self.page_failures.is_empty() && self.item_failures.is_empty() && self.excluded.is_empty()
    }
}

/// Per-run state handed to each stage.
pub struct RunContext {
    pub run_id: Uuid,
    pub diagnostics: Diagnostics,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            diagnostics: Diagnostics::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every page loaded and every item made it into the report.
    Complete,
    /// The report covers fewer items than the pages listed.
    Partial,
}

pub struct RunSummary {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub report: Report,
    pub records: Vec<NormalizedRecord>,
    pub diagnostics: Diagnostics,
}

pub struct Pipeline<C> {
    settings: RunSettings,
    selectors: ListingSelectors,
    chart: C,
}

impl<C: ChartRenderer> Pipeline<C> {
    pub fn new(settings: RunSettings, selectors: ListingSelectors, chart: C) -> Self {
        Self {
            settings,
            selectors,
            chart,
        }
    }

    /// Opens a browser session with `open`, scrapes, cleans and reports.
    ///
    /// The session is closed before cleaning starts, and on every early exit.
    pub async fn run<R, F>(&self, open: F) -> Result<RunSummary, PipelineError>
    where
        R: PageRenderer,
        F: FnOnce() -> anyhow::Result<R>,
    {
        let mut ctx = RunContext::new();
        let span = info_span!("run", run_id = %ctx.run_id, keyword = %self.settings.keyword);

        async move {
            info!(pages = self.settings.pages, "starting scrape");
            let mut session = BrowserSession::open(open).map_err(|e| {
                error!("could not open browser session: {:#}", e);
                PipelineError::Session(e)
            })?;

            let dataset = self.scrape(session.renderer_mut(), &mut ctx).await;
            if let Err(e) = session.close() {
                warn!("browser session did not close cleanly: {:#}", e);
            }
            info!(records = dataset.len(), "scrape finished");

            self.finish(dataset, ctx)
        }
        .instrument(span)
        .await
    }

    /// Fetches and extracts every page in order. Failed pages contribute nothing.
    pub async fn scrape<R: PageRenderer>(&self, renderer: &mut R, ctx: &mut RunContext) -> Dataset {
        let fetcher = PageFetcher::new(
            &self.settings.base_url,
            self.selectors.container_css(),
            &self.settings.fetch,
        );
        let mut pages = Vec::new();

        for page_number in 1..=self.settings.pages {
            let span = info_span!("page", page = page_number);
            let records = async {
                match fetcher.fetch_page(renderer, &self.settings.keyword, page_number).await {
                    Ok(page) => {
                        let extracted = extractor::extract_items(&page, &self.selectors);
                        info!(
                            containers = extracted.containers(),
                            kept = extracted.records.len(),
                            "page extracted"
                        );
                        ctx.diagnostics.pages_loaded.push(page_number);
                        ctx.diagnostics.item_failures.extend(extracted.failures);
                        extracted.records
                    }
                    Err(e) => {
                        warn!(scope = ?e.scope(), "skipping page: {}", e);
                        ctx.diagnostics.page_failures.push(e);
                        Vec::new()
                    }
                }
            }
            .instrument(span)
            .await;

            pages.push(records);
        }

        let dataset = collector::collect(pages);
        if dataset.is_empty() {
            warn!("no items extracted from any page");
        }
        dataset
    }

    fn finish(&self, dataset: Dataset, mut ctx: RunContext) -> Result<RunSummary, PipelineError> {
        let normalized = cleaner::normalize(dataset);
        ctx.diagnostics.excluded = normalized.excluded;
        let diagnostics = ctx.diagnostics;

        if normalized.records.is_empty() {
            let err = PipelineError::NoRecords {
                pages_requested: self.settings.pages,
                pages_failed: diagnostics.page_failures.len(),
                items_dropped: diagnostics.item_failures.len(),
                records_excluded: diagnostics.excluded.len(),
            };
            error!(scope = ?err.scope(), "{}", err);
            return Err(err);
        }

        let report = report::generate(&normalized.records, &self.chart, &self.settings.output)?;

        let outcome = if diagnostics.is_lossless() {
            RunOutcome::Complete
        } else {
            RunOutcome::Partial
        };
        debug!(?outcome, records = normalized.records.len(), "run finished");

        Ok(RunSummary {
            run_id: ctx.run_id,
            outcome,
            report,
            records: normalized.records,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::ScriptedRenderer;
    use crate::chart::Panel;
    use crate::error::RenderError;
    use crate::extractor::fixtures::{listing_page, Item};
    use crate::fetcher::search_url;
    use crate::model::{Field, ItemOrigin};
    use std::path::Path;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const BASE: &str = "https://shop.test/s";

    struct NullChart;

    impl ChartRenderer for NullChart {
        fn render(&self, _panels: &[Panel<'_>], _path: &Path) -> Result<(), RenderError> {
            Ok(())
        }
    }

    struct BrokenChart;

    impl ChartRenderer for BrokenChart {
        fn render(&self, _panels: &[Panel<'_>], path: &Path) -> Result<(), RenderError> {
            Err(RenderError::new(path, "read-only file system"))
        }
    }

    fn settings(pages: u32) -> RunSettings {
        RunSettings {
            keyword: "phone".to_string(),
            pages,
            base_url: BASE.to_string(),
            output: PathBuf::from("analysis_report.png"),
            fetch: FetchSettings {
                settle_timeout: Duration::from_millis(200),
                poll_interval: Duration::from_millis(50),
                fallback_delay: Duration::from_millis(100),
                retry_backoff: Duration::from_millis(100),
            },
        }
    }

    fn url(page: u32) -> String {
        search_url(BASE, "phone", page)
    }

    fn two_page_site() -> ScriptedRenderer {
        let mut missing_rating = Item::new("P2-2", "$15.00", "4.0 out of 5 stars", "40");
        missing_rating.rating = None;

        ScriptedRenderer::new()
            .page(
                url(1),
                listing_page(&[
                    Item::new("P1-1", "$19.99", "4.5 out of 5 stars", "1,234"),
                    Item::new("P1-2", "$1,299.00", "4.8 out of 5 stars", "12,000"),
                    Item::new("P1-3", "$5.00", "3.0 out of 5 stars", "7"),
                ]),
            )
            .page(
                url(2),
                listing_page(&[
                    Item::new("P2-1", "$25.50", "4.1 out of 5 stars", "300"),
                    missing_rating,
                    Item::new("P2-3", "$99.99", "4.9 out of 5 stars", "2,001"),
                ]),
            )
    }

    #[tokio::test(start_paused = true)]
    async fn item_with_missing_rating_is_the_only_loss() {
        let pipeline = Pipeline::new(settings(2), ListingSelectors::default(), NullChart);

        let summary = pipeline.run(|| Ok(two_page_site())).await.unwrap();

        assert_eq!(summary.records.len(), 5);
        let expected: u64 = summary.records.iter().map(|r| r.reviews).sum();
        assert_eq!(expected, 1234 + 12000 + 7 + 300 + 2001);
        assert_eq!(summary.report.total_reviews, expected);
        assert_eq!(summary.report.record_count, 5);
        assert_eq!(summary.outcome, RunOutcome::Partial);
        assert_eq!(
            summary.diagnostics.item_failures,
            vec![ExtractionError {
                origin: ItemOrigin { page: 2, index: 2 },
                field: Field::Rating,
            }]
        );
        assert_eq!(summary.diagnostics.pages_loaded, vec![1, 2]);

        let titles: Vec<_> = summary.records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["P1-1", "P1-2", "P1-3", "P2-1", "P2-3"]);
        assert_eq!(summary.records[1].price, 1299.0);
        assert_eq!(summary.records[1].reviews, 12000);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_page_does_not_block_the_others() {
        let site = two_page_site().failing(url(1), 2);
        let pipeline = Pipeline::new(settings(2), ListingSelectors::default(), NullChart);

        let summary = pipeline.run(|| Ok(site)).await.unwrap();

        assert_eq!(summary.records.len(), 2);
        assert!(summary.records.iter().all(|r| r.title.starts_with("P2-")));
        assert_eq!(summary.diagnostics.page_failures.len(), 1);
        assert_eq!(summary.diagnostics.page_failures[0].page, 1);
        assert_eq!(summary.diagnostics.pages_loaded, vec![2]);
        assert_eq!(summary.outcome, RunOutcome::Partial);
    }

    #[tokio::test(start_paused = true)]
    async fn large_page_count_is_scraped_page_by_page() {
        let mut site = two_page_site();
        let pipeline = Pipeline::new(settings(20_000), ListingSelectors::default(), NullChart);
        let mut ctx = RunContext::new();

        let dataset = pipeline.scrape(&mut site, &mut ctx).await;

        assert_eq!(dataset.len(), 5);
        assert_eq!(ctx.diagnostics.pages_loaded, vec![1, 2]);
        assert_eq!(ctx.diagnostics.page_failures.len(), 19_998);
        assert_eq!(ctx.diagnostics.page_failures.last().unwrap().page, 20_000);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_run_is_complete() {
        let site = ScriptedRenderer::new().page(
            url(1),
            listing_page(&[Item::new("Only", "$10.00", "4.0 out of 5 stars", "5")]),
        );
        let pipeline = Pipeline::new(settings(1), ListingSelectors::default(), NullChart);

        let summary = pipeline.run(|| Ok(site)).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Complete);
        assert_eq!(summary.report.average_price, Some(10.0));
        assert!(summary.diagnostics.is_lossless());
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_record_makes_run_partial() {
        let site = ScriptedRenderer::new().page(
            url(1),
            listing_page(&[
                Item::new("Good", "$10.00", "4.0 out of 5 stars", "5"),
                Item::new("Bad price", "See options", "4.0 out of 5 stars", "5"),
            ]),
        );
        let pipeline = Pipeline::new(settings(1), ListingSelectors::default(), NullChart);

        let summary = pipeline.run(|| Ok(site)).await.unwrap();

        assert_eq!(summary.records.len(), 1);
        assert_eq!(summary.diagnostics.excluded.len(), 1);
        assert_eq!(summary.diagnostics.excluded[0].error.field, Field::Price);
        assert_eq!(summary.outcome, RunOutcome::Partial);
    }

    #[tokio::test(start_paused = true)]
    async fn no_records_is_a_distinct_failure() {
        let site = ScriptedRenderer::new()
            .failing(url(1), 2)
            .page(url(2), "<html><body><p>No results</p></body></html>");
        let closes = site.close_counter();
        let pipeline = Pipeline::new(settings(2), ListingSelectors::default(), NullChart);

        let err = pipeline.run(|| Ok(site)).await.err().unwrap();

        match err {
            PipelineError::NoRecords {
                pages_requested,
                pages_failed,
                items_dropped,
                records_excluded,
            } => {
                assert_eq!(pages_requested, 2);
                assert_eq!(pages_failed, 1);
                assert_eq!(items_dropped, 0);
                assert_eq!(records_excluded, 0);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn session_failure_is_terminal() {
        let pipeline = Pipeline::new(settings(1), ListingSelectors::default(), NullChart);

        let err = pipeline
            .run(|| -> anyhow::Result<ScriptedRenderer> { Err(anyhow::anyhow!("chrome binary not found")) })
            .await
            .err()
            .unwrap();

        assert!(matches!(err, PipelineError::Session(_)));
        assert!(err.to_string().contains("chrome binary not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn render_failure_still_returns_statistics() {
        let pipeline = Pipeline::new(settings(2), ListingSelectors::default(), BrokenChart);

        let err = pipeline.run(|| Ok(two_page_site())).await.err().unwrap();

        match err {
            PipelineError::Render(failure) => {
                assert_eq!(failure.report.record_count, 5);
                assert_eq!(failure.report.total_reviews, 1234 + 12000 + 7 + 300 + 2001);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn browser_is_closed_after_a_successful_run() {
        let site = two_page_site();
        let closes = site.close_counter();
        let pipeline = Pipeline::new(settings(2), ListingSelectors::default(), NullChart);

        pipeline.run(|| Ok(site)).await.unwrap();

        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
