//! Prerender passes
//!
//! A pass rasterizes every page of the document, at most `concurrency`
//! pages at a time. Each page gets its own scale from the pass's
//! [`ScaleParams`] so differently sized pages all fit the same container.
//! Results are written into the shared [`RasterCache`] and progress is
//! published after every batch.
//!
//! Each pass begins a new cache generation. Once a newer pass starts (or
//! the pass is cancelled) the old one stops dispatching, its late results
//! are dropped by the cache, and it publishes no more progress.

use crate::cancel::{CancellationToken, PassToken};
use crate::progress::{percent, ProgressHub};
use crate::worker::{run_in_batches, WorkerPoolConfig};
use crate::SchedulerError;
use pageview_cache::{Generation, RasterCache, Slot};
use pageview_render::{Rasterizer, ScaleParams};
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default number of pages rendered at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Outcome of one prerender pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    pub generation: Generation,
    pub zoom_percent: u16,
    pub pages: u32,
    pub rendered: u32,
    /// One-based pages that failed to render, ascending
    pub failed: Vec<u32>,
    /// True if the pass was superseded or cancelled before finishing
    pub cancelled: bool,
    #[serde(serialize_with = "serialize_millis", rename = "elapsed_ms")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

/// Drives rasterization of every page into the raster cache.
#[derive(Debug, Clone)]
pub struct PrerenderScheduler {
    rasterizer: Rasterizer,
    cache: RasterCache,
    progress: ProgressHub,
    concurrency: usize,
}

impl PrerenderScheduler {
    pub fn new(rasterizer: Rasterizer, cache: RasterCache) -> Self {
        Self {
            rasterizer,
            cache,
            progress: ProgressHub::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressHub) -> Self {
        self.progress = progress;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn cache(&self) -> &RasterCache {
        &self.cache
    }

    pub fn progress(&self) -> &ProgressHub {
        &self.progress
    }

    /// Starts a new generation and runs the pass on the calling thread.
    pub fn run(&self, params: ScaleParams) -> Result<PassReport, SchedulerError> {
        let token = PassToken::begin(&self.cache);
        self.run_pass(&token, params)
    }

    /// Starts a new generation and runs the pass on a background thread.
    /// The generation is live before this returns, so a later call always
    /// supersedes this one.
    pub fn spawn(&self, params: ScaleParams) -> Result<PrerenderHandle, SchedulerError> {
        let token = PassToken::begin(&self.cache);
        let cancel = token.cancellation().clone();
        let generation = token.generation();
        let scheduler = self.clone();

        let thread = thread::Builder::new()
            .name(format!("pageview-prerender-{generation}"))
            .spawn(move || scheduler.run_pass(&token, params))
            .map_err(SchedulerError::Spawn)?;

        Ok(PrerenderHandle {
            generation,
            cancel,
            thread,
        })
    }

    fn run_pass(&self, token: &PassToken, params: ScaleParams) -> Result<PassReport, SchedulerError> {
        let started = Instant::now();
        let pages = self.rasterizer.page_count();
        let generation = token.generation();

        tracing::debug!(
            generation,
            pages,
            zoom = params.zoom_percent,
            concurrency = self.concurrency,
            "prerender pass started"
        );

        let mut rendered = 0;
        let mut failed = Vec::new();

        if pages == 0 {
            self.progress.publish(100);
        }

        let rasterizer = self.rasterizer.clone();
        let config = WorkerPoolConfig::new(self.concurrency).with_thread_name("pageview-render");

        let completed = run_in_batches(
            config,
            pages,
            move |page| {
                let scale = rasterizer.scale_for(page, &params);
                (scale, rasterizer.rasterize(page, scale))
            },
            || token.is_stale(),
            |last, results| {
                let mut slots = Vec::with_capacity(results.len());
                for (page, outcome) in results {
                    match outcome {
                        Some((_, Ok(artifact))) => {
                            rendered += 1;
                            slots.push((page, Slot::Ready(Arc::new(artifact))));
                        }
                        Some((scale, Err(err))) => {
                            failed.push(page);
                            slots.push((
                                page,
                                Slot::Unavailable {
                                    scale,
                                    reason: err.to_string(),
                                },
                            ));
                        }
                        None => {
                            failed.push(page);
                            slots.push((
                                page,
                                Slot::Unavailable {
                                    scale: self.rasterizer.scale_for(page, &params),
                                    reason: "render panicked".to_owned(),
                                },
                            ));
                        }
                    }
                }

                self.cache.commit_batch(generation, slots);

                if token.is_stale() {
                    return false;
                }
                self.progress.publish(percent(last, pages));
                true
            },
        )?;

        failed.sort_unstable();
        let report = PassReport {
            generation,
            zoom_percent: params.zoom_percent,
            pages,
            rendered,
            failed,
            cancelled: !completed,
            elapsed: started.elapsed(),
        };

        if report.cancelled {
            tracing::debug!(generation, rendered = report.rendered, "prerender pass superseded");
        } else {
            tracing::info!(
                generation,
                pages,
                rendered = report.rendered,
                failed = report.failed.len(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "prerender pass finished"
            );
        }

        Ok(report)
    }
}

/// A prerender pass running on a background thread.
#[derive(Debug)]
pub struct PrerenderHandle {
    generation: Generation,
    cancel: CancellationToken,
    thread: JoinHandle<Result<PassReport, SchedulerError>>,
}

impl PrerenderHandle {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Asks the pass to stop before its next batch.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the pass to end.
    pub fn join(self) -> Result<PassReport, SchedulerError> {
        self.thread.join().map_err(|_| SchedulerError::Disconnected)?
    }
}
