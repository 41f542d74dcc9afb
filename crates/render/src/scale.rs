//! Render scale resolution
//!
//! Turns an intrinsic page size, the container box, the zoom percentage and
//! a supersampling factor into one absolute render scale.

use pageview_engine::PageSize;

/// Share of the container a page is allowed to fill at 100% zoom.
pub const FIT_MARGIN: f32 = 0.95;

/// Default supersampling factor; rasters are rendered at twice the logical
/// size so they stay crisp on high-density displays.
pub const DEFAULT_SUPERSAMPLING: f32 = 2.0;

/// Size of the box the page is displayed in, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContainerSize {
    pub width: f32,
    pub height: f32,
}

impl ContainerSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True when either side is zero, negative or not finite.
    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0)
    }
}

/// Factor that fits `page` inside `container` with the 5% margin.
///
/// Returns `None` when either size is degenerate.
pub fn fit_factor(page: PageSize, container: ContainerSize) -> Option<f32> {
    if page.is_degenerate() || container.is_degenerate() {
        return None;
    }

    let fit = (container.width / page.width_pt).min(container.height / page.height_pt);
    Some(fit * FIT_MARGIN)
}

/// Resolves the absolute render scale for a page.
///
/// `scale = zoom / 100 * fit * supersampling`. A degenerate container or
/// page falls back to `zoom / 100`, untouched by fit and supersampling.
/// Supersampling below 1 is treated as 1.
pub fn resolve_scale(
    page: PageSize,
    container: ContainerSize,
    zoom_percent: u16,
    supersampling: f32,
) -> f32 {
    let zoom = f32::from(zoom_percent) / 100.0;

    match fit_factor(page, container) {
        Some(fit) => zoom * fit * supersampling.max(1.0),
        None => zoom,
    }
}

/// Logical pixels per point for a page: `zoom / 100 * fit`, or `zoom / 100`
/// when the container or page is degenerate. This is the size the page is
/// laid out at; the raster behind it may be supersampled.
pub fn display_scale(page: PageSize, container: ContainerSize, zoom_percent: u16) -> f32 {
    let zoom = f32::from(zoom_percent) / 100.0;
    fit_factor(page, container).map_or(zoom, |fit| zoom * fit)
}

/// Everything besides the page itself that decides its render scale.
///
/// Each page of a document resolves its own scale from these, so pages of
/// different sizes all fit the same container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleParams {
    pub container: ContainerSize,
    pub zoom_percent: u16,
    pub supersampling: f32,
}

impl ScaleParams {
    pub fn new(container: ContainerSize, zoom_percent: u16, supersampling: f32) -> Self {
        Self {
            container,
            zoom_percent,
            supersampling,
        }
    }

    /// Plain zoom without a container: every page renders at `zoom / 100`.
    pub fn at_zoom(zoom_percent: u16) -> Self {
        Self::new(ContainerSize::default(), zoom_percent, 1.0)
    }

    pub fn render_scale(&self, page: PageSize) -> f32 {
        resolve_scale(page, self.container, self.zoom_percent, self.supersampling)
    }

    pub fn display_scale(&self, page: PageSize) -> f32 {
        display_scale(page, self.container, self.zoom_percent)
    }
}
