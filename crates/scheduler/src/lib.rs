//! Page Viewer Scheduler Library
//!
//! Bounded-concurrency passes over a document's pages.
//!
//! A [`PrerenderScheduler`] rasterizes every page at its fitted scale into
//! the raster cache, `concurrency` pages at a time, publishing progress
//! after each batch. A [`ThumbnailGenerator`] does the same at the fixed
//! thumbnail scale. Both run on a [`WorkerPool`] of named threads fed
//! through a bounded channel.
//!
//! # Example
//!
//! ```no_run
//! use pageview_cache::RasterCache;
//! use pageview_engine::{LopdfEngine, OpenSource, PdfEngine};
//! use pageview_render::{ContainerSize, Rasterizer, ScaleParams};
//! use pageview_scheduler::PrerenderScheduler;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(LopdfEngine::open(OpenSource::from(std::path::Path::new("doc.pdf")))?);
//! let cache = RasterCache::new(engine.page_count());
//! let scheduler = PrerenderScheduler::new(Rasterizer::new(engine), cache).with_concurrency(4);
//!
//! let progress = scheduler.progress().subscribe();
//! let params = ScaleParams::new(ContainerSize::new(1280.0, 720.0), 100, 2.0);
//! let report = scheduler.run(params)?;
//! for percent in progress.try_iter() {
//!     println!("{percent}%");
//! }
//! println!("{} of {} pages rendered", report.rendered, report.pages);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod cancel;
mod prerender;
mod progress;
mod thumbnails;
mod worker;

pub use cancel::{CancellationToken, PassToken};
pub use prerender::{PassReport, PrerenderHandle, PrerenderScheduler, DEFAULT_CONCURRENCY};
pub use progress::{percent, ProgressHub};
pub use thumbnails::{ThumbnailGenerator, ThumbnailReport};
pub use worker::{run_in_batches, WorkerPool, WorkerPoolConfig};

/// Errors from the scheduling machinery itself. Per-page render failures
/// are not errors at this level; they are recorded in the pass report.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("worker panicked while rendering page {page}")]
    WorkerPanicked { page: u32 },

    #[error("worker pool disconnected")]
    Disconnected,
}
