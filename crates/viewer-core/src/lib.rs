//! Page Viewer Core
//!
//! Single-page document viewing: viewport state, link overlays mapped into
//! screen space, and the [`Viewer`] facade that ties the engine, raster
//! cache, prerender passes and thumbnails together.

pub mod annotations;
pub mod config;
pub mod error;
pub mod mapper;
pub mod overlay;
pub mod viewer;
pub mod viewport;

pub use annotations::AnnotationIndex;
pub use config::{ConfigError, ViewerConfig};
pub use error::ViewerError;
pub use mapper::{CoordinateMapper, DisplayBox};
pub use overlay::{build_overlay, Overlay, OverlayRegion};
pub use viewer::{LinkAction, Viewer};
pub use viewport::{
    clamp_zoom, Rotation, ViewportChange, ViewportState, DEFAULT_ZOOM, MAX_ZOOM, MIN_ZOOM, ZOOM_STEP,
};
