//! The viewer facade
//!
//! [`Viewer`] owns the viewport and reacts to its transitions: a page change
//! rebuilds the overlay, a zoom or container change retires the running
//! prerender pass and drops the current page's raster, a rotation only
//! re-maps the overlay. Rasters and thumbnails are produced on background
//! threads into shared caches; anything the UI asks for that is not cached
//! yet can be rendered on demand with [`Viewer::render_current`].

use crate::annotations::AnnotationIndex;
use crate::config::ViewerConfig;
use crate::error::ViewerError;
use crate::mapper::{CoordinateMapper, DisplayBox};
use crate::overlay::{Overlay, OverlayRegion};
use crate::viewport::{Rotation, ViewportChange, ViewportState};
use pageview_cache::{Generation, RasterCache, Slot, ThumbnailCache};
use pageview_engine::{default_engine, LinkTarget, OpenSource, PageSize, PdfEngine};
use pageview_render::{RasterArtifact, Rasterizer, RenderError, ScaleParams, Thumbnail};
use pageview_scheduler::{
    CancellationToken, PassReport, PrerenderHandle, PrerenderScheduler, ProgressHub, SchedulerError,
    ThumbnailGenerator, ThumbnailReport,
};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;

/// What activating a link resulted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// The UI should open this URL.
    OpenUrl(String),
    /// The viewer moved to this one-based page.
    Navigated(u32),
    /// Nothing to do: no link there, or its destination did not resolve.
    Ignored,
}

struct ThumbnailRun {
    cancel: CancellationToken,
    thread: JoinHandle<Result<ThumbnailReport, SchedulerError>>,
}

pub struct Viewer {
    config: ViewerConfig,
    engine: Arc<dyn PdfEngine>,
    rasterizer: Rasterizer,
    viewport: ViewportState,
    annotations: AnnotationIndex,
    cache: RasterCache,
    thumbnails: ThumbnailCache,
    progress: ProgressHub,
    pass: Option<PrerenderHandle>,
    thumbnail_run: Option<ThumbnailRun>,
    display_override: Option<DisplayBox>,
    overlay: Overlay,
}

impl Viewer {
    /// Opens a document and starts prerendering and thumbnail generation in
    /// the background.
    pub fn load(source: impl Into<OpenSource>, config: ViewerConfig) -> Result<Self, ViewerError> {
        let mut viewer = Self::open(source, config)?;
        viewer.start_prerender()?;
        viewer.start_thumbnails()?;
        Ok(viewer)
    }

    /// Opens a document without starting any background work.
    pub fn open(source: impl Into<OpenSource>, config: ViewerConfig) -> Result<Self, ViewerError> {
        config.validate()?;

        let source = source.into();
        let document = source.describe();
        let engine = default_engine(source).map_err(|source| {
            tracing::error!(document = %document, error = %source, "failed to load document");
            ViewerError::Load { document, source }
        })?;

        Self::from_engine(engine, config)
    }

    /// Wraps an already open engine. No background work is started.
    pub fn from_engine(engine: Arc<dyn PdfEngine>, config: ViewerConfig) -> Result<Self, ViewerError> {
        config.validate()?;

        let pages = engine.page_count();
        let annotations = AnnotationIndex::extract(engine.as_ref());
        let rasterizer = Rasterizer::new(Arc::clone(&engine))
            .with_max_dimension(config.max_raster_dimension)
            .with_thumbnail_scale(config.thumbnail_scale);

        tracing::info!(pages, links = annotations.total_links(), "document loaded");

        let cache = match config.cache_memory_bytes() {
            Some(limit) => RasterCache::with_memory_limit(pages, limit),
            None => RasterCache::new(pages),
        };

        let mut viewer = Self {
            viewport: ViewportState::new(pages).with_zoom(config.default_zoom_percent),
            cache,
            thumbnails: ThumbnailCache::new(pages),
            progress: ProgressHub::new(),
            pass: None,
            thumbnail_run: None,
            display_override: None,
            overlay: Overlay::default(),
            config,
            engine,
            rasterizer,
            annotations,
        };
        viewer.rebuild_overlay();
        Ok(viewer)
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn page_count(&self) -> u32 {
        self.viewport.page_count
    }

    pub fn viewport(&self) -> ViewportState {
        self.viewport
    }

    pub fn annotations(&self) -> &AnnotationIndex {
        &self.annotations
    }

    pub fn cache(&self) -> &RasterCache {
        &self.cache
    }

    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }

    pub fn rasterizer(&self) -> &Rasterizer {
        &self.rasterizer
    }

    // Navigation

    pub fn goto_page(&mut self, page: u32) -> ViewportChange {
        let change = self.viewport.goto_page(page);
        self.apply(change)
    }

    pub fn next_page(&mut self) -> ViewportChange {
        let change = self.viewport.next_page();
        self.apply(change)
    }

    pub fn previous_page(&mut self) -> ViewportChange {
        let change = self.viewport.previous_page();
        self.apply(change)
    }

    pub fn first_page(&mut self) -> ViewportChange {
        let change = self.viewport.first_page();
        self.apply(change)
    }

    pub fn last_page(&mut self) -> ViewportChange {
        let change = self.viewport.last_page();
        self.apply(change)
    }

    // Zoom and rotation

    pub fn zoom_in(&mut self) -> ViewportChange {
        let change = self.viewport.zoom_in();
        self.apply(change)
    }

    pub fn zoom_out(&mut self) -> ViewportChange {
        let change = self.viewport.zoom_out();
        self.apply(change)
    }

    pub fn set_zoom(&mut self, percent: u16) -> ViewportChange {
        let change = self.viewport.set_zoom(percent);
        self.apply(change)
    }

    /// Back to the configured default zoom.
    pub fn reset_zoom(&mut self) -> ViewportChange {
        self.set_zoom(self.config.default_zoom_percent)
    }

    pub fn rotate(&mut self) -> ViewportChange {
        let change = self.viewport.rotate();
        self.apply(change)
    }

    pub fn set_rotation(&mut self, rotation: Rotation) -> ViewportChange {
        let change = self.viewport.set_rotation(rotation);
        self.apply(change)
    }

    pub fn set_container_size(&mut self, width: f32, height: f32) -> ViewportChange {
        let change = self.viewport.set_container_size(width, height);
        self.apply(change)
    }

    fn apply(&mut self, change: ViewportChange) -> ViewportChange {
        match change {
            ViewportChange::None => return change,
            ViewportChange::Page { from, to } => {
                tracing::debug!(from, to, "page changed");
            }
            ViewportChange::Zoom { .. } | ViewportChange::Container => {
                self.retire_pass();
                self.cache.invalidate(self.viewport.current_page);
                tracing::debug!(
                    page = self.viewport.current_page,
                    zoom = self.viewport.zoom_percent,
                    "scale inputs changed"
                );
            }
            ViewportChange::Rotation { to, .. } => {
                tracing::debug!(degrees = to.degrees(), "rotation changed");
            }
        }

        // The UI lays the page out again after any change and reports the
        // new box through `set_display_box`.
        self.display_override = None;
        self.rebuild_overlay();
        change
    }

    // Scale and rasters

    /// Inputs every page resolves its render scale from.
    pub fn scale_params(&self) -> ScaleParams {
        ScaleParams::new(self.viewport.container, self.viewport.zoom_percent, self.config.supersampling)
    }

    /// Render scale of one-based `page` under the current viewport.
    pub fn scale_for(&self, page: u32) -> f32 {
        self.rasterizer.scale_for(page, &self.scale_params())
    }

    /// Render scale of the current page, `None` for an empty document.
    pub fn current_scale(&self) -> Option<f32> {
        (self.viewport.current_page > 0).then(|| self.scale_for(self.viewport.current_page))
    }

    /// Cached raster of `page`, only if it matches the page's current scale.
    pub fn raster_for(&self, page: u32) -> Option<Arc<RasterArtifact>> {
        self.cache.get_for_scale(page, self.scale_for(page))
    }

    /// Raster of the current page, rendering it now if the cache has
    /// nothing usable. The result is cached; a failure marks the page
    /// unavailable at this scale.
    pub fn render_current(&self) -> Result<Arc<RasterArtifact>, RenderError> {
        let page = self.viewport.current_page;
        if let Some(raster) = self.raster_for(page) {
            return Ok(raster);
        }

        let scale = self.scale_for(page);
        let generation = self.cache.generation();
        match self.rasterizer.rasterize(page, scale) {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                self.cache.commit(generation, page, Slot::Ready(Arc::clone(&artifact)));
                Ok(artifact)
            }
            Err(err) => {
                if !matches!(err, RenderError::InvalidPage { .. }) {
                    let reason = err.to_string();
                    self.cache.commit(generation, page, Slot::Unavailable { scale, reason });
                }
                Err(err)
            }
        }
    }

    pub fn thumbnail(&self, page: u32) -> Option<Arc<Thumbnail>> {
        self.thumbnails.get(page)
    }

    // Background work

    /// Progress of prerender passes, 0 to 100, one value per batch.
    pub fn subscribe_progress(&self) -> Receiver<u8> {
        self.progress.subscribe()
    }

    fn scheduler(&self) -> PrerenderScheduler {
        PrerenderScheduler::new(self.rasterizer.clone(), self.cache.clone())
            .with_concurrency(self.config.concurrency)
            .with_progress(self.progress.clone())
    }

    /// Starts a background pass at the current scale, superseding any
    /// pass still running.
    pub fn start_prerender(&mut self) -> Result<Generation, ViewerError> {
        if let Some(pass) = self.pass.take() {
            pass.cancel();
        }
        let handle = self.scheduler().spawn(self.scale_params())?;
        let generation = handle.generation();
        self.pass = Some(handle);
        Ok(generation)
    }

    /// Runs a pass at the current scale on the calling thread.
    pub fn run_prerender(&mut self) -> Result<PassReport, ViewerError> {
        if let Some(pass) = self.pass.take() {
            pass.cancel();
        }
        Ok(self.scheduler().run(self.scale_params())?)
    }

    /// Waits for the background pass, if one was started.
    pub fn wait_for_prerender(&mut self) -> Option<Result<PassReport, ViewerError>> {
        let pass = self.pass.take()?;
        Some(pass.join().map_err(ViewerError::from))
    }

    pub fn start_thumbnails(&mut self) -> Result<(), ViewerError> {
        if let Some(run) = self.thumbnail_run.take() {
            run.cancel.cancel();
        }
        let generator = ThumbnailGenerator::new(self.rasterizer.clone(), self.thumbnails.clone())
            .with_concurrency(self.config.thumbnail_concurrency);
        let cancel = generator.cancellation().clone();
        let thread = generator.spawn()?;
        self.thumbnail_run = Some(ThumbnailRun { cancel, thread });
        Ok(())
    }

    pub fn wait_for_thumbnails(&mut self) -> Option<Result<ThumbnailReport, ViewerError>> {
        let run = self.thumbnail_run.take()?;
        let result = match run.thread.join() {
            Ok(result) => result.map_err(ViewerError::from),
            Err(_) => Err(ViewerError::Scheduler(SchedulerError::Disconnected)),
        };
        Some(result)
    }

    /// Stops the running pass and makes sure none of its remaining results
    /// land in the cache. The handle is kept so its report stays available.
    fn retire_pass(&mut self) {
        if let Some(pass) = &self.pass {
            pass.cancel();
        }
        self.cache.begin_generation();
    }

    // Overlay

    fn page_size(&self, page: u32) -> Option<PageSize> {
        self.rasterizer.page_size(page).ok()
    }

    /// On-screen box of the current page. Defaults to the page laid out at
    /// the current display scale, rotated; the UI can override it.
    pub fn display_box(&self) -> Option<DisplayBox> {
        if let Some(display) = self.display_override {
            return Some(display);
        }

        let size = self.page_size(self.viewport.current_page)?;
        let scale = self.scale_params().display_scale(size);
        let (width, height) = (size.width_pt * scale, size.height_pt * scale);

        Some(if self.viewport.rotation.is_quarter_turn() {
            DisplayBox::new(height, width)
        } else {
            DisplayBox::new(width, height)
        })
    }

    /// Records the box the UI actually laid the page out in.
    pub fn set_display_box(&mut self, width: f32, height: f32) {
        self.display_override = Some(DisplayBox::new(width, height));
        self.rebuild_overlay();
    }

    pub fn clear_display_box(&mut self) {
        self.display_override = None;
        self.rebuild_overlay();
    }

    pub fn mapper(&self) -> Option<CoordinateMapper> {
        let size = self.page_size(self.viewport.current_page)?;
        CoordinateMapper::new(size, self.display_box()?, self.viewport.rotation)
    }

    fn rebuild_overlay(&mut self) {
        let page = self.viewport.current_page;
        if page == 0 {
            self.overlay.clear();
            return;
        }
        let mapper = self.mapper();
        self.overlay.rebuild(page, self.annotations.links(page), mapper.as_ref());
    }

    pub fn overlay_regions(&self) -> &[OverlayRegion] {
        self.overlay.regions()
    }

    pub fn link_at(&self, x: f32, y: f32) -> Option<&OverlayRegion> {
        self.overlay.link_at(x, y)
    }

    /// Follows a link target. Internal targets navigate; external ones are
    /// handed back for the UI to open.
    pub fn activate(&mut self, target: &LinkTarget) -> LinkAction {
        let destination = match target {
            LinkTarget::External { url } => return LinkAction::OpenUrl(url.clone()),
            LinkTarget::Internal { destination } => destination,
        };

        let page = match self.engine.resolve_destination(destination) {
            Ok(page_index) => page_index + 1,
            Err(source) => {
                let err = ViewerError::Destination {
                    destination: destination.clone(),
                    source,
                };
                tracing::warn!(error = %err, "link ignored");
                return LinkAction::Ignored;
            }
        };

        if page > self.page_count() {
            tracing::warn!(page, destination = %destination, "link points past the last page");
            return LinkAction::Ignored;
        }

        self.goto_page(page);
        LinkAction::Navigated(page)
    }

    /// Activates the topmost link under a screen point.
    pub fn click(&mut self, x: f32, y: f32) -> LinkAction {
        match self.link_at(x, y).map(|region| region.target.clone()) {
            Some(target) => self.activate(&target),
            None => LinkAction::Ignored,
        }
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        if let Some(pass) = self.pass.take() {
            pass.cancel();
        }
        if let Some(run) = self.thumbnail_run.take() {
            run.cancel.cancel();
        }
    }
}
