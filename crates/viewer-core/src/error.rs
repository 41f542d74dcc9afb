use crate::config::ConfigError;
use pageview_engine::{DestinationRef, PdfEngineError};
use pageview_scheduler::SchedulerError;

/// Errors surfaced by the viewer.
///
/// Only `Load` and `Config` are fatal. Annotation and destination failures
/// are contained: they are logged and the affected page or click degrades.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("failed to load {document}: {source}")]
    Load {
        document: String,
        #[source]
        source: PdfEngineError,
    },

    #[error("annotations of page {page} could not be read: {source}")]
    Annotation {
        page: u32,
        #[source]
        source: PdfEngineError,
    },

    #[error("destination {destination} could not be resolved: {source}")]
    Destination {
        destination: DestinationRef,
        #[source]
        source: PdfEngineError,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("background work failed: {0}")]
    Scheduler(#[from] SchedulerError),
}
