//! Drawing backends
//!
//! The viewer core never draws directly. It hands finished rasters and
//! overlay rectangles to a [`RenderBackend`], which owns the surfaces.
//! [`ImageBackend`] draws into in-memory RGBA buffers and is what the CLI
//! uses to write PNGs.

use image::imageops::{self, FilterType};
use image::Rgba;
use pageview_engine::RgbaImage;
use std::collections::HashMap;

/// Axis-aligned rectangle in display space (origin top-left, y down).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    /// Edges are inclusive.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.right() && y >= self.top && y <= self.bottom()
    }
}

/// Opaque reference to a backend-owned surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// How an overlay region is painted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionStyle {
    pub stroke: [u8; 4],
    pub stroke_width: u32,
    pub fill: Option<[u8; 4]>,
}

impl RegionStyle {
    /// Link hotspot highlight: blue outline over a faint blue wash.
    pub const LINK: RegionStyle = RegionStyle {
        stroke: [0, 102, 204, 255],
        stroke_width: 2,
        fill: Some([0, 102, 204, 48]),
    };
}

impl Default for RegionStyle {
    fn default() -> Self {
        Self::LINK
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("unknown surface {0}")]
    UnknownSurface(u64),
}

/// Presentation backend used by the viewer.
pub trait RenderBackend {
    /// Allocates a surface of the given size in display pixels.
    fn create_surface(&mut self, width: u32, height: u32) -> SurfaceHandle;

    /// Paints a page raster so it fills the whole surface.
    fn draw_raster(&mut self, handle: SurfaceHandle, raster: &RgbaImage) -> Result<(), BackendError>;

    /// Paints one overlay region on top of whatever is already there.
    fn draw_region(
        &mut self,
        handle: SurfaceHandle,
        rect: ScreenRect,
        style: RegionStyle,
    ) -> Result<(), BackendError>;
}

/// Backend that draws into in-memory RGBA images.
#[derive(Debug, Default)]
pub struct ImageBackend {
    surfaces: HashMap<SurfaceHandle, RgbaImage>,
    next_id: u64,
}

impl ImageBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn surface(&self, handle: SurfaceHandle) -> Option<&RgbaImage> {
        self.surfaces.get(&handle)
    }

    /// Removes the surface from the backend and returns its pixels.
    pub fn take_surface(&mut self, handle: SurfaceHandle) -> Option<RgbaImage> {
        self.surfaces.remove(&handle)
    }

    fn surface_mut(&mut self, handle: SurfaceHandle) -> Result<&mut RgbaImage, BackendError> {
        self.surfaces
            .get_mut(&handle)
            .ok_or(BackendError::UnknownSurface(handle.0))
    }
}

impl RenderBackend for ImageBackend {
    fn create_surface(&mut self, width: u32, height: u32) -> SurfaceHandle {
        let handle = SurfaceHandle(self.next_id);
        self.next_id += 1;
        self.surfaces.insert(
            handle,
            RgbaImage::from_pixel(width.max(1), height.max(1), Rgba([255, 255, 255, 255])),
        );
        handle
    }

    fn draw_raster(&mut self, handle: SurfaceHandle, raster: &RgbaImage) -> Result<(), BackendError> {
        let surface = self.surface_mut(handle)?;

        if raster.dimensions() == surface.dimensions() {
            imageops::replace(surface, raster, 0, 0);
        } else {
            let scaled = imageops::resize(raster, surface.width(), surface.height(), FilterType::Triangle);
            imageops::replace(surface, &scaled, 0, 0);
        }
        Ok(())
    }

    fn draw_region(
        &mut self,
        handle: SurfaceHandle,
        rect: ScreenRect,
        style: RegionStyle,
    ) -> Result<(), BackendError> {
        let surface = self.surface_mut(handle)?;
        let (width, height) = surface.dimensions();

        let clamp_x = |v: f32| v.round().clamp(0.0, width as f32) as u32;
        let clamp_y = |v: f32| v.round().clamp(0.0, height as f32) as u32;
        let (x0, x1) = (clamp_x(rect.left), clamp_x(rect.right()));
        let (y0, y1) = (clamp_y(rect.top), clamp_y(rect.bottom()));

        if x0 >= x1 || y0 >= y1 {
            return Ok(());
        }

        let stroke = style.stroke_width;
        for y in y0..y1 {
            for x in x0..x1 {
                let on_edge = x < x0 + stroke || x + stroke >= x1 || y < y0 + stroke || y + stroke >= y1;
                let color = if on_edge { Some(style.stroke) } else { style.fill };
                if let Some(color) = color {
                    blend(surface.get_pixel_mut(x, y), color);
                }
            }
        }
        Ok(())
    }
}

/// Source-over blend of `src` onto `dst`.
fn blend(dst: &mut Rgba<u8>, src: [u8; 4]) {
    let alpha = u32::from(src[3]);
    if alpha == 255 {
        *dst = Rgba(src);
        return;
    }

    for channel in 0..3 {
        let mixed = (u32::from(src[channel]) * alpha + u32::from(dst.0[channel]) * (255 - alpha)) / 255;
        dst.0[channel] = mixed as u8;
    }
    dst.0[3] = (alpha + u32::from(dst.0[3]) * (255 - alpha) / 255).min(255) as u8;
}
