//! Error taxonomy for a scrape run.
//!
//! Each error knows how much of the run it costs: a lost item, a lost record,
//! a lost page, or a failed stage. Only stage-level failures reach the caller
//! as a run failure; everything finer is recorded in the run diagnostics.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::{Field, ItemOrigin};
use crate::report::Report;

/// How far a failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryScope {
    /// One item container is dropped.
    Item,
    /// One raw record is excluded from the normalized set.
    Record,
    /// One search page contributes no records.
    Page,
    /// A pipeline stage failed; the run cannot produce its full output.
    Stage,
}

#[derive(Debug, Error)]
#[error("page {page} ({url}) failed to load after {attempts} attempt(s): {cause}")]
pub struct NavigationError {
    pub page: u32,
    pub url: String,
    pub attempts: u32,
    pub cause: String,
}

impl NavigationError {
    pub fn scope(&self) -> RecoveryScope {
        RecoveryScope::Page
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{origin}: {field} not found")]
pub struct ExtractionError {
    pub origin: ItemOrigin,
    pub field: Field,
}

impl ExtractionError {
    pub fn scope(&self) -> RecoveryScope {
        RecoveryScope::Item
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot read {field} from {input:?}: {reason}")]
pub struct ParseError {
    pub field: Field,
    pub input: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(field: Field, input: &str, reason: impl Into<String>) -> Self {
        Self {
            field,
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub fn scope(&self) -> RecoveryScope {
        RecoveryScope::Record
    }
}

#[derive(Debug, Error)]
#[error("failed to render chart to {}: {cause}", path.display())]
pub struct RenderError {
    pub path: PathBuf,
    pub cause: String,
}

impl RenderError {
    pub fn new(path: impl Into<PathBuf>, cause: impl ToString) -> Self {
        Self {
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    pub fn scope(&self) -> RecoveryScope {
        RecoveryScope::Stage
    }
}

/// The chart failed but the statistics were computed; both are kept.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ReportFailure {
    pub report: Report,
    #[source]
    pub error: RenderError,
}

/// Run-level failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not open a browser session: {0:#}")]
    Session(anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(
        "no usable records: {pages_failed}/{pages_requested} pages failed, \
         {items_dropped} items dropped, {records_excluded} records excluded"
    )]
    NoRecords {
        pages_requested: u32,
        pages_failed: usize,
        items_dropped: usize,
        records_excluded: usize,
    },

    #[error(transparent)]
    Render(#[from] ReportFailure),
}

impl PipelineError {
    pub fn scope(&self) -> RecoveryScope {
        RecoveryScope::Stage
    }
}
