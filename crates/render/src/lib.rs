//! Page Viewer Render Library
//!
//! Scale resolution, page rasterization with dimension caps, and the
//! drawing backend abstraction used to present rasters and overlays.

pub mod backend;
pub mod raster;
pub mod scale;

pub use backend::{BackendError, ImageBackend, RegionStyle, RenderBackend, ScreenRect, SurfaceHandle};
pub use raster::{
    raster_dimensions, RasterArtifact, Rasterizer, RenderError, Thumbnail, MAX_RASTER_DIMENSION,
    THUMBNAIL_SCALE,
};
pub use scale::{
    display_scale, fit_factor, resolve_scale, ContainerSize, ScaleParams, DEFAULT_SUPERSAMPLING, FIT_MARGIN,
};
