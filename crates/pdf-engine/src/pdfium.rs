//! PDFium rasterization backend
//!
//! Page geometry, links and destinations still come from `lopdf`; PDFium
//! only produces pixels. The library is bound once per process.

use crate::{
    raster_size, DestinationRef, LinkAnnotation, LopdfEngine, OpenSource, PageSize, PdfEngine,
    PdfEngineError, RenderRequest, RgbaImage,
};
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::OnceLock;

static PDFIUM: OnceLock<Pdfium> = OnceLock::new();

fn backend(err: PdfiumError) -> PdfEngineError {
    PdfEngineError::Backend(err.to_string())
}

/// Places searched for the PDFium shared library, in order, before the
/// system library paths: the executable's directory, then the current one.
fn library_candidates() -> Vec<PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()));

    exe_dir
        .into_iter()
        .chain(std::iter::once(PathBuf::from("./")))
        .map(|dir| PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(&dir)))
        .collect()
}

/// Binds the PDFium library, or returns the process-wide binding made
/// earlier.
pub fn bind_library() -> Result<&'static Pdfium, PdfEngineError> {
    if let Some(pdfium) = PDFIUM.get() {
        return Ok(pdfium);
    }

    let bindings = library_candidates()
        .into_iter()
        .find_map(|path| Pdfium::bind_to_library(path).ok())
        .map_or_else(Pdfium::bind_to_system_library, Ok)
        .map_err(|err| {
            PdfEngineError::Backend(format!("failed to bind pdfium library: {err}"))
        })?;

    tracing::debug!("bound pdfium library");
    Ok(PDFIUM.get_or_init(|| Pdfium::new(bindings)))
}

/// Engine that renders page content with PDFium.
pub struct PdfiumEngine {
    pdfium: &'static Pdfium,
    bytes: Vec<u8>,
    inner: LopdfEngine,
}

impl PdfiumEngine {
    pub fn open(source: OpenSource) -> Result<Self, PdfEngineError> {
        Self::with_library(bind_library()?, source)
    }

    /// Opens `source` with an already bound library. Fails if either
    /// parser rejects the document.
    pub fn with_library(pdfium: &'static Pdfium, source: OpenSource) -> Result<Self, PdfEngineError> {
        let bytes = source.read()?;
        let inner = LopdfEngine::from_bytes(&bytes)?;
        pdfium.load_pdf_from_byte_slice(&bytes, None).map_err(backend)?;

        Ok(Self { pdfium, bytes, inner })
    }
}

impl PdfEngine for PdfiumEngine {
    fn page_count(&self) -> u32 {
        self.inner.page_count()
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError> {
        self.inner.page_size(page_index)
    }

    fn render_page(&self, request: RenderRequest) -> Result<RgbaImage, PdfEngineError> {
        let (width, height) = raster_size(self.page_size(request.page_index)?, request.scale)?;
        let index = u16::try_from(request.page_index).map_err(|_| PdfEngineError::PageOutOfRange {
            page: request.page_index,
            page_count: self.page_count(),
        })?;

        // Documents borrow the byte slice; each render opens its own view so
        // workers never share a page handle.
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(&self.bytes, None)
            .map_err(backend)?;
        let page = document.pages().get(index).map_err(backend)?;

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);
        let bitmap = page.render_with_config(&config).map_err(backend)?;

        let (actual_width, actual_height) = (bitmap.width() as u32, bitmap.height() as u32);
        RgbaImage::from_raw(actual_width, actual_height, bitmap.as_rgba_bytes().to_vec()).ok_or_else(
            || PdfEngineError::Backend(format!("pdfium returned a short {actual_width}x{actual_height} bitmap")),
        )
    }

    fn link_annotations(&self, page_index: u32) -> Result<Vec<LinkAnnotation>, PdfEngineError> {
        self.inner.link_annotations(page_index)
    }

    fn resolve_destination(&self, destination: &DestinationRef) -> Result<u32, PdfEngineError> {
        self.inner.resolve_destination(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixturePdf;

    #[test]
    fn library_is_searched_next_to_the_executable_first() {
        let candidates = library_candidates();

        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates.last(),
            Some(&PathBuf::from(Pdfium::pdfium_platform_library_name_at_path("./")))
        );
    }

    #[test]
    #[ignore = "needs the pdfium shared library"]
    fn renders_page_content_at_scale() {
        let bytes = FixturePdf::new().page(100, 50).to_bytes();
        let engine = PdfiumEngine::open(OpenSource::Bytes(bytes)).unwrap();

        let image = engine.render_page(RenderRequest { page_index: 0, scale: 2.0 }).unwrap();

        assert_eq!(image.dimensions(), (200, 100));
    }
}
