//! Thumbnail generation
//!
//! Same batching discipline as the prerender pass, at the fixed thumbnail
//! scale and into its own store. Thumbnails do not depend on zoom or
//! rotation, so there is one run per document and no generations.

use crate::cancel::CancellationToken;
use crate::worker::{num_cpus, run_in_batches, WorkerPoolConfig};
use crate::SchedulerError;
use pageview_cache::ThumbnailCache;
use pageview_render::Rasterizer;
use serde::Serialize;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThumbnailReport {
    pub pages: u32,
    pub rendered: u32,
    pub failed: Vec<u32>,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct ThumbnailGenerator {
    rasterizer: Rasterizer,
    cache: ThumbnailCache,
    concurrency: usize,
    cancel: CancellationToken,
}

impl ThumbnailGenerator {
    /// Uses one worker per logical CPU by default.
    pub fn new(rasterizer: Rasterizer, cache: ThumbnailCache) -> Self {
        Self {
            rasterizer,
            cache,
            concurrency: num_cpus(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn cache(&self) -> &ThumbnailCache {
        &self.cache
    }

    /// Token that stops the run before its next batch.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn run(&self) -> Result<ThumbnailReport, SchedulerError> {
        let pages = self.rasterizer.page_count();
        let rasterizer = self.rasterizer.clone();
        let config = WorkerPoolConfig::new(self.concurrency).with_thread_name("pageview-thumbs");

        let mut rendered = 0;
        let mut failed = Vec::new();

        let completed = run_in_batches(
            config,
            pages,
            move |page| rasterizer.thumbnail(page),
            || self.cancel.is_cancelled(),
            |_, results| {
                for (page, outcome) in results {
                    match outcome {
                        Some(Ok(thumbnail)) => {
                            rendered += 1;
                            self.cache.store(thumbnail);
                        }
                        Some(Err(_)) | None => {
                            failed.push(page);
                            self.cache.mark_unavailable(page);
                        }
                    }
                }
                true
            },
        )?;

        failed.sort_unstable();
        tracing::debug!(pages, rendered, failed = failed.len(), "thumbnails generated");

        Ok(ThumbnailReport {
            pages,
            rendered,
            failed,
            cancelled: !completed,
        })
    }

    /// Runs on a background thread.
    pub fn spawn(&self) -> Result<JoinHandle<Result<ThumbnailReport, SchedulerError>>, SchedulerError> {
        let generator = self.clone();
        thread::Builder::new()
            .name("pageview-thumbnails".to_owned())
            .spawn(move || generator.run())
            .map_err(SchedulerError::Spawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageview_cache::ThumbnailSlot;
    use pageview_engine::testing::ScriptedEngine;
    use std::sync::Arc;

    fn generator(engine: ScriptedEngine) -> ThumbnailGenerator {
        let engine = Arc::new(engine);
        let pages = pageview_engine::PdfEngine::page_count(engine.as_ref());
        ThumbnailGenerator::new(Rasterizer::new(engine), ThumbnailCache::new(pages))
    }

    #[test]
    fn test_all_pages_get_thumbnails() {
        let generator = generator(ScriptedEngine::new(5)).with_concurrency(2);

        let report = generator.run().unwrap();

        assert_eq!(report.rendered, 5);
        assert!(generator.cache().is_complete());
        let thumb = generator.cache().get(3).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (92, 119));
    }

    #[test]
    fn test_failed_thumbnail_is_marked() {
        let generator = generator(ScriptedEngine::new(3).failing_render(0));

        let report = generator.run().unwrap();

        assert_eq!(report.failed, vec![1]);
        assert!(matches!(generator.cache().slot(1), Some(ThumbnailSlot::Unavailable)));
        assert!(generator.cache().get(2).is_some());
    }

    #[test]
    fn test_panicking_thumbnail_is_marked() {
        let generator = generator(ScriptedEngine::new(4).panicking_render(2)).with_concurrency(2);

        let report = generator.run().unwrap();

        assert_eq!(report.failed, vec![3]);
        assert_eq!(report.rendered, 3);
        assert!(matches!(generator.cache().slot(3), Some(ThumbnailSlot::Unavailable)));
        assert!(generator.cache().is_complete());
    }

    #[test]
    fn test_cancelled_before_start() {
        let generator = generator(ScriptedEngine::new(4));
        generator.cancellation().cancel();

        let report = generator.run().unwrap();

        assert!(report.cancelled);
        assert_eq!(report.rendered, 0);
        assert!(!generator.cache().is_complete());
    }

    #[test]
    fn test_spawned_run() {
        let generator = generator(ScriptedEngine::new(2));
        let handle = generator.spawn().unwrap();

        let report = handle.join().unwrap().unwrap();

        assert_eq!(report.rendered, 2);
        assert_eq!(generator.cache().ready_count(), 2);
    }
}
