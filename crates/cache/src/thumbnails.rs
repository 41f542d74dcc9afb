//! Sidebar thumbnail store
//!
//! Thumbnails are rendered once per document at a fixed scale, so unlike
//! [`RasterCache`](crate::RasterCache) there are no generations here.

use pageview_render::Thumbnail;
use std::sync::{Arc, Mutex};

/// State of one page's thumbnail
#[derive(Debug, Clone)]
pub enum ThumbnailSlot {
    Pending,
    Ready(Arc<Thumbnail>),
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct ThumbnailCache {
    slots: Arc<Mutex<Vec<ThumbnailSlot>>>,
}

impl ThumbnailCache {
    pub fn new(page_count: u32) -> Self {
        Self {
            slots: Arc::new(Mutex::new(vec![ThumbnailSlot::Pending; page_count as usize])),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.slots.lock().unwrap().len() as u32
    }

    /// Stores the thumbnail for its page. Returns `false` for pages outside
    /// the document.
    pub fn store(&self, thumbnail: Thumbnail) -> bool {
        let page = thumbnail.page;
        self.set(page, ThumbnailSlot::Ready(Arc::new(thumbnail)))
    }

    pub fn mark_unavailable(&self, page: u32) -> bool {
        self.set(page, ThumbnailSlot::Unavailable)
    }

    fn set(&self, page: u32, slot: ThumbnailSlot) -> bool {
        let mut slots = self.slots.lock().unwrap();
        match page.checked_sub(1).and_then(|index| slots.get_mut(index as usize)) {
            Some(existing) => {
                *existing = slot;
                true
            }
            None => false,
        }
    }

    pub fn slot(&self, page: u32) -> Option<ThumbnailSlot> {
        let slots = self.slots.lock().unwrap();
        let index = page.checked_sub(1)? as usize;
        slots.get(index).cloned()
    }

    pub fn get(&self, page: u32) -> Option<Arc<Thumbnail>> {
        match self.slot(page)? {
            ThumbnailSlot::Ready(thumbnail) => Some(thumbnail),
            _ => None,
        }
    }

    pub fn ready_count(&self) -> usize {
        let slots = self.slots.lock().unwrap();
        slots
            .iter()
            .filter(|slot| matches!(slot, ThumbnailSlot::Ready(_)))
            .count()
    }

    /// True once no page is pending.
    pub fn is_complete(&self) -> bool {
        let slots = self.slots.lock().unwrap();
        !slots.iter().any(|slot| matches!(slot, ThumbnailSlot::Pending))
    }
}
