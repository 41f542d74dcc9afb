//! Document engine for the page viewer.
//!
//! The viewer core only talks to documents through the [`PdfEngine`] trait:
//! page count, intrinsic page sizes, a render-at-scale primitive, link
//! annotations and destination resolution. [`LopdfEngine`] is the default
//! backend; it reads geometry and annotations with `lopdf` and renders
//! placeholder page rasters. With the `pdfium` feature, [`PdfiumEngine`]
//! rasterizes real page content.

mod links;
#[cfg(feature = "pdfium")]
mod pdfium;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use image::{ImageBuffer, Rgba};
use lopdf::{Document, Object, ObjectId};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use links::{DestinationRef, LinkAnnotation, LinkTarget, PdfRect};
#[cfg(feature = "pdfium")]
pub use pdfium::{bind_library, PdfiumEngine};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Largest raster, in pixels, the engine agrees to allocate for one render.
const MAX_RENDER_PIXELS: u64 = 1 << 30;

/// Intrinsic page size in points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    pub const LETTER: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

    pub fn new(width_pt: f32, height_pt: f32) -> Self {
        Self { width_pt, height_pt }
    }

    /// True when either side is zero, negative or not finite.
    pub fn is_degenerate(&self) -> bool {
        !(self.width_pt.is_finite()
            && self.height_pt.is_finite()
            && self.width_pt > 0.0
            && self.height_pt > 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0 }
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl OpenSource {
    /// Reads the whole document into memory.
    pub fn read(self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Path(path) => fs::read(path),
            Self::Bytes(bytes) => Ok(bytes),
        }
    }

    /// Human-readable name for log lines.
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported in the default backend")]
    EncryptedUnsupported,
    #[error("malformed annotations on page {page}: {reason}")]
    MalformedAnnotations { page: u32, reason: String },
    #[error("unresolved destination {0}")]
    UnresolvedDestination(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Capabilities the viewer core consumes from an opened document.
///
/// Page indices are zero-based here; the viewer converts to one-based page
/// numbers at its boundary. Implementations must be shareable across the
/// prerender worker threads.
pub trait PdfEngine: Send + Sync {
    fn page_count(&self) -> u32;

    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError>;

    fn render_page(&self, request: RenderRequest) -> Result<RgbaImage, PdfEngineError>;

    /// Link annotations of one page, in document space.
    fn link_annotations(&self, page_index: u32) -> Result<Vec<LinkAnnotation>, PdfEngineError>;

    /// Resolves an internal link destination to a zero-based page index.
    fn resolve_destination(&self, destination: &DestinationRef) -> Result<u32, PdfEngineError>;
}

/// Default engine backed by `lopdf`.
#[derive(Debug)]
pub struct LopdfEngine {
    document: Document,
    page_ids: Vec<ObjectId>,
    page_sizes: Vec<PageSize>,
}

impl LopdfEngine {
    pub fn open(source: OpenSource) -> Result<Self, PdfEngineError> {
        Self::from_bytes(&source.read()?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let document = Document::load_mem(bytes)?;
        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        let page_sizes = page_ids
            .iter()
            .map(|id| media_box_size(&document, *id))
            .collect::<Vec<_>>();

        tracing::debug!(pages = page_ids.len(), "parsed page tree");

        Ok(Self { document, page_ids, page_sizes })
    }

    fn check_page(&self, page_index: u32) -> Result<usize, PdfEngineError> {
        let index = page_index as usize;
        if index < self.page_ids.len() {
            Ok(index)
        } else {
            Err(PdfEngineError::PageOutOfRange { page: page_index, page_count: self.page_count() })
        }
    }
}

impl PdfEngine for LopdfEngine {
    fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError> {
        let index = self.check_page(page_index)?;
        Ok(self.page_sizes[index])
    }

    fn render_page(&self, request: RenderRequest) -> Result<RgbaImage, PdfEngineError> {
        let (width, height) = raster_size(self.page_size(request.page_index)?, request.scale)?;

        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                image.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                image.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                image.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        Ok(image)
    }

    fn link_annotations(&self, page_index: u32) -> Result<Vec<LinkAnnotation>, PdfEngineError> {
        let index = self.check_page(page_index)?;
        links::extract_links(&self.document, self.page_ids[index], page_index)
    }

    fn resolve_destination(&self, destination: &DestinationRef) -> Result<u32, PdfEngineError> {
        links::resolve_destination(&self.document, &self.page_ids, destination)
    }
}

/// Pixel size of a page rendered at `scale`, each side rounded up. Bad
/// scales render at 1.0.
pub(crate) fn raster_size(page_size: PageSize, scale: f32) -> Result<(u32, u32), PdfEngineError> {
    let scale = if scale <= 0.0 || !scale.is_finite() { 1.0 } else { scale };

    let width = (page_size.width_pt * scale).ceil().max(1.0) as u32;
    let height = (page_size.height_pt * scale).ceil().max(1.0) as u32;

    if u64::from(width) * u64::from(height) > MAX_RENDER_PIXELS {
        return Err(PdfEngineError::Backend(format!(
            "refusing to allocate a {width}x{height} raster"
        )));
    }
    Ok((width, height))
}

/// Reads `/MediaBox`, walking up `/Parent` for inherited boxes. Pages
/// without a usable box fall back to US Letter.
fn media_box_size(document: &Document, page_id: ObjectId) -> PageSize {
    let mut current = Some(page_id);
    let mut depth = 0;

    while let Some(id) = current {
        let Ok(dict) = document.get_dictionary(id) else {
            break;
        };

        if let Some(size) = dict
            .get(b"MediaBox")
            .ok()
            .and_then(|obj| links::deref(document, obj))
            .and_then(|obj| obj.as_array().ok())
            .and_then(|array| links::rect_from_array(document, array))
        {
            return PageSize::new(size.width(), size.height());
        }

        current = match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => Some(*parent),
            _ => None,
        };

        depth += 1;
        if depth > 32 {
            break;
        }
    }

    PageSize::LETTER
}

/// Engine for a freshly opened document: PDFium when the `pdfium` feature
/// is enabled and the library can be bound, `lopdf` otherwise.
pub fn default_engine(source: OpenSource) -> Result<Arc<dyn PdfEngine>, PdfEngineError> {
    #[cfg(feature = "pdfium")]
    match pdfium::bind_library() {
        Ok(library) => return Ok(Arc::new(PdfiumEngine::with_library(library, source)?)),
        Err(err) => tracing::warn!(error = %err, "pdfium unavailable, rendering placeholders"),
    }

    Ok(Arc::new(LopdfEngine::open(source)?))
}
