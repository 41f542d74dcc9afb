//! Page rasterization
//!
//! Wraps a [`PdfEngine`] and turns (page, scale) pairs into raster
//! artifacts, enforcing the per-dimension pixel cap before anything is
//! allocated.

use crate::scale::ScaleParams;
use pageview_engine::{PageSize, PdfEngine, PdfEngineError, RenderRequest, RgbaImage};
use std::sync::Arc;

/// Largest width or height, in pixels, a raster may have.
pub const MAX_RASTER_DIMENSION: u32 = 32767;

/// Fixed render scale for sidebar thumbnails.
pub const THUMBNAIL_SCALE: f32 = 0.15;

/// Errors produced while rasterizing a page
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("page {page} is not a valid page number")]
    InvalidPage { page: u32 },

    #[error("page {page}: raster {width}x{height} exceeds the {limit}px limit")]
    ExceedsLimit {
        page: u32,
        width: u32,
        height: u32,
        limit: u32,
    },

    #[error("page {page}: {source}")]
    Engine {
        page: u32,
        #[source]
        source: PdfEngineError,
    },
}

impl RenderError {
    /// One-based page number the error belongs to.
    pub fn page(&self) -> u32 {
        match self {
            Self::InvalidPage { page } | Self::ExceedsLimit { page, .. } | Self::Engine { page, .. } => {
                *page
            }
        }
    }
}

/// A rendered page at one absolute scale.
#[derive(Debug, Clone)]
pub struct RasterArtifact {
    /// One-based page number
    pub page: u32,

    /// Absolute render scale the pixels were produced at
    pub scale: f32,

    /// RGBA pixels
    pub image: RgbaImage,
}

impl RasterArtifact {
    pub fn pixel_width(&self) -> u32 {
        self.image.width()
    }

    pub fn pixel_height(&self) -> u32 {
        self.image.height()
    }

    /// Raw RGBA bytes, 4 per pixel.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn byte_size(&self) -> usize {
        self.image.as_raw().len()
    }

    /// True if this artifact was rendered at `scale`.
    pub fn matches_scale(&self, scale: f32) -> bool {
        (self.scale - scale).abs() <= f32::EPSILON * self.scale.abs().max(1.0)
    }
}

/// Low-resolution page image for the navigation sidebar.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub page: u32,
    pub image: RgbaImage,
}

impl Thumbnail {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Pixel dimensions of `size` rendered at `scale`: each side is rounded up
/// and never below 1. Saturates at `u32::MAX` for absurd scales.
pub fn raster_dimensions(size: PageSize, scale: f32) -> (u32, u32) {
    let side = |points: f32| -> u32 {
        let pixels = (f64::from(points) * f64::from(scale)).ceil();
        if pixels.is_nan() || pixels < 1.0 {
            1
        } else if pixels >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            pixels as u32
        }
    };

    (side(size.width_pt), side(size.height_pt))
}

/// Renders pages of one document.
///
/// Cheap to clone; clones share the engine.
#[derive(Clone)]
pub struct Rasterizer {
    engine: Arc<dyn PdfEngine>,
    max_dimension: u32,
    thumbnail_scale: f32,
}

impl Rasterizer {
    pub fn new(engine: Arc<dyn PdfEngine>) -> Self {
        Self {
            engine,
            max_dimension: MAX_RASTER_DIMENSION,
            thumbnail_scale: THUMBNAIL_SCALE,
        }
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension.max(1);
        self
    }

    /// Non-positive or non-finite scales are ignored.
    pub fn with_thumbnail_scale(mut self, scale: f32) -> Self {
        if scale.is_finite() && scale > 0.0 {
            self.thumbnail_scale = scale;
        }
        self
    }

    pub fn thumbnail_scale(&self) -> f32 {
        self.thumbnail_scale
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    pub fn page_count(&self) -> u32 {
        self.engine.page_count()
    }

    /// Intrinsic size of a one-based page.
    pub fn page_size(&self, page: u32) -> Result<PageSize, RenderError> {
        let index = page_index(page)?;
        self.engine
            .page_size(index)
            .map_err(|source| RenderError::Engine { page, source })
    }

    /// Render scale of one-based `page` under `params`. A page whose size
    /// cannot be read gets the plain zoom scale; rendering it will fail anyway.
    pub fn scale_for(&self, page: u32, params: &ScaleParams) -> f32 {
        match self.page_size(page) {
            Ok(size) => params.render_scale(size),
            Err(_) => f32::from(params.zoom_percent) / 100.0,
        }
    }

    /// Renders one-based `page` at `scale`.
    ///
    /// Failures are logged here and returned; callers decide whether the
    /// page becomes unavailable.
    pub fn rasterize(&self, page: u32, scale: f32) -> Result<RasterArtifact, RenderError> {
        let result = self.render(page, scale);

        match &result {
            Ok(artifact) => tracing::debug!(
                page,
                scale,
                width = artifact.pixel_width(),
                height = artifact.pixel_height(),
                "rasterized page"
            ),
            Err(err) => tracing::warn!(page, scale, error = %err, "failed to rasterize page"),
        }

        result
    }

    /// Renders a sidebar thumbnail at the thumbnail scale
    /// ([`THUMBNAIL_SCALE`] unless overridden).
    pub fn thumbnail(&self, page: u32) -> Result<Thumbnail, RenderError> {
        let artifact = self.render(page, self.thumbnail_scale).inspect_err(|err| {
            tracing::warn!(page, error = %err, "failed to render thumbnail");
        })?;

        Ok(Thumbnail {
            page,
            image: artifact.image,
        })
    }

    fn render(&self, page: u32, scale: f32) -> Result<RasterArtifact, RenderError> {
        let size = self.page_size(page)?;
        let (width, height) = raster_dimensions(size, scale);
        self.check_limit(page, width, height)?;

        let image = self
            .engine
            .render_page(RenderRequest {
                page_index: page - 1,
                scale,
            })
            .map_err(|source| RenderError::Engine { page, source })?;

        // Engines may round differently; the cap applies to what came back.
        self.check_limit(page, image.width(), image.height())?;

        Ok(RasterArtifact { page, scale, image })
    }

    fn check_limit(&self, page: u32, width: u32, height: u32) -> Result<(), RenderError> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(RenderError::ExceedsLimit {
                page,
                width,
                height,
                limit: self.max_dimension,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Rasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rasterizer")
            .field("page_count", &self.engine.page_count())
            .field("max_dimension", &self.max_dimension)
            .field("thumbnail_scale", &self.thumbnail_scale)
            .finish()
    }
}

fn page_index(page: u32) -> Result<u32, RenderError> {
    page.checked_sub(1).ok_or(RenderError::InvalidPage { page })
}
