use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, error};

use crate::chart::{ChartRenderer, Panel};
use crate::error::ReportFailure;
use crate::model::NormalizedRecord;

/// Bars per histogram.
pub const HISTOGRAM_BINS: usize = 10;

/// Summary statistics over the normalized records of one run.
///
/// With no records the averages are `None` (shown as `n/a`, serialized as
/// `null`) and `total_reviews` is 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub average_price: Option<f64>,
    pub average_rating: Option<f64>,
    pub total_reviews: u64,
    pub record_count: usize,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn from_records(records: &[NormalizedRecord]) -> Self {
        Self {
            average_price: mean(records.iter().map(|r| r.price)),
            average_rating: mean(records.iter().map(|r| r.rating)),
            total_reviews: records.iter().map(|r| r.reviews).sum(),
            record_count: records.len(),
            generated_at: Utc::now(),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.average_price {
            Some(v) => writeln!(f, "average_price: {:.2}", v)?,
            None => writeln!(f, "average_price: n/a")?,
        }
        match self.average_rating {
            Some(v) => writeln!(f, "average_rating: {:.2}", v)?,
            None => writeln!(f, "average_rating: n/a")?,
        }
        write!(f, "total_reviews: {}", self.total_reviews)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Equal-width bins over `[min, max]`; the last bin is closed on the right.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub counts: Vec<u32>,
}

impl Histogram {
    pub fn from_values(values: &[f64], bins: usize) -> Self {
        let bins = bins.max(1);
        let (min, max) = match values.iter().copied().fold(None, |acc: Option<(f64, f64)>, v| {
            Some(match acc {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            })
        }) {
            None => (0.0, 1.0),
            Some((lo, hi)) if lo == hi => {
                let pad = (lo.abs() * 1e-3).max(0.5);
                (lo - pad, hi + pad)
            }
            Some(range) => range,
        };

        let mut counts = vec![0u32; bins];
        let width = (max - min) / bins as f64;
        for v in values {
            let slot = ((v - min) / width) as usize;
            counts[slot.min(bins - 1)] += 1;
        }

        Self { min, max, counts }
    }

    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.counts.len() as f64
    }

    /// `(lower edge, upper edge, count)` for each bin.
    pub fn bins(&self) -> impl Iterator<Item = (f64, f64, u32)> + '_ {
        let width = self.bin_width();
        self.counts.iter().enumerate().map(move |(i, &count)| {
            let lo = self.min + width * i as f64;
            (lo, lo + width, count)
        })
    }

    pub fn max_count(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }
}

/// Computes the statistics and draws both distribution charts to `output`.
///
/// A chart failure still hands back the computed report inside the error.
pub fn generate<C: ChartRenderer>(
    records: &[NormalizedRecord],
    chart: &C,
    output: &Path,
) -> Result<Report, ReportFailure> {
    let report = Report::from_records(records);
    debug!(records = report.record_count, "statistics computed");

    let prices: Vec<f64> = records.iter().map(|r| r.price).collect();
    let ratings: Vec<f64> = records.iter().map(|r| r.rating).collect();
    let price_hist = Histogram::from_values(&prices, HISTOGRAM_BINS);
    let rating_hist = Histogram::from_values(&ratings, HISTOGRAM_BINS);
    debug!(
        prices = price_hist.total(),
        ratings = rating_hist.total(),
        "histograms binned"
    );

    let panels = [
        Panel {
            title: "price distribution",
            x_label: "price",
            histogram: &price_hist,
        },
        Panel {
            title: "rating distribution",
            x_label: "rating",
            histogram: &rating_hist,
        },
    ];

    match chart.render(&panels, output) {
        Ok(()) => {
            debug!(path = %output.display(), "charts written");
            Ok(report)
        }
        Err(e) => {
            error!(scope = ?e.scope(), "report chart failed: {}", e);
            Err(ReportFailure { report, error: e })
        }
    }
}

/// Writes the normalized records as pretty JSON.
pub fn write_records_json(path: &Path, records: &[NormalizedRecord]) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)?;
    std::fs::write(path, json).with_context(|| format!("writing records to {}", path.display()))?;
    Ok(())
}
