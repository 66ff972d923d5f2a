mod browser;
mod chart;
mod cleaner;
mod collector;
mod config;
mod error;
mod extractor;
mod fetcher;
mod model;
mod pipeline;
mod report;
mod wait;

use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use tracing::{error, info, warn};

use crate::browser::ChromeRenderer;
use crate::chart::BitmapChart;
use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::{Pipeline, RunOutcome};
use crate::report::Report;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::parse();
    let selectors = config.selectors().map_err(|e| {
        error!(scope = ?e.scope(), "invalid configuration");
        e
    })?;
    let launch = config.launch_settings();
    let chart = BitmapChart::new(config.font_path.as_deref());
    let pipeline = Pipeline::new(config.run_settings(), selectors, chart);

    match pipeline.run(|| ChromeRenderer::launch(&launch)).await {
        Ok(summary) => {
            print_report(&summary.report, config.json)?;
            if let Some(path) = &config.dump_records {
                report::write_records_json(path, &summary.records)?;
                info!(path = %path.display(), "records written");
            }
            match summary.outcome {
                RunOutcome::Complete => info!(run_id = %summary.run_id, "run complete"),
                RunOutcome::Partial => warn!(
                    run_id = %summary.run_id,
                    pages_loaded = summary.diagnostics.pages_loaded.len(),
                    pages_failed = summary.diagnostics.page_failures.len(),
                    items_dropped = summary.diagnostics.item_failures.len(),
                    records_excluded = summary.diagnostics.excluded.len(),
                    "run finished with partial data"
                ),
            }
            info!(path = %config.output.display(), "chart saved");
            Ok(())
        }
        Err(PipelineError::Render(failure)) => {
            // The statistics are still valid without the chart.
            print_report(&failure.report, config.json)?;
            Err(failure.error).context("report chart was not written")
        }
        Err(e) => {
            error!(scope = ?e.scope(), "run failed");
            Err(e.into())
        }
    }
}

fn print_report(report: &Report, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}
