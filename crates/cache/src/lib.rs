//! Page Viewer Cache Library
//!
//! Per-page raster cache with generation guards and LRU memory bounds,
//! plus the sidebar thumbnail store.

pub mod raster;
pub mod thumbnails;

pub use raster::{CacheStats, Generation, RasterCache, Slot};
pub use thumbnails::{ThumbnailCache, ThumbnailSlot};
