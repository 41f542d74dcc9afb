//! Page raster cache
//!
//! Holds at most one slot per page: absent, a ready raster at some scale,
//! or an "unavailable" marker for a page that failed to render. Every
//! write carries the generation of the pass that produced it; writes from
//! a superseded generation are dropped under the same lock that bumps the
//! generation, so a stale pass can never overwrite newer state.
//!
//! Ready rasters may optionally be bounded by a memory limit with LRU
//! eviction. An evicted page simply becomes absent again.

use pageview_render::RasterArtifact;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Pass generation. Starts at 0 and only increases.
pub type Generation = u64;

/// Contents of one page slot
#[derive(Debug, Clone)]
pub enum Slot {
    /// Rendered raster, shared with readers
    Ready(Arc<RasterArtifact>),

    /// The page failed to render at `scale`
    Unavailable { scale: f32, reason: String },
}

impl Slot {
    pub fn scale(&self) -> f32 {
        match self {
            Self::Ready(artifact) => artifact.scale,
            Self::Unavailable { scale, .. } => *scale,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    fn memory_size(&self) -> usize {
        match self {
            Self::Ready(artifact) => artifact.byte_size(),
            Self::Unavailable { .. } => 0,
        }
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Pages holding a ready raster
    pub ready: usize,

    /// Pages marked unavailable
    pub unavailable: usize,

    /// Bytes held by ready rasters
    pub memory_used: usize,

    /// Maximum bytes allowed for ready rasters, if bounded
    pub memory_limit: Option<usize>,

    /// Lookups that returned a raster
    pub hits: u64,

    /// Lookups that found nothing usable
    pub misses: u64,

    /// Rasters dropped under memory pressure
    pub evictions: u64,

    /// Writes dropped because their generation was superseded
    pub stale_writes: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Entry {
    generation: Generation,
    slot: Slot,
}

/// Internal cache state
#[derive(Debug)]
struct CacheState {
    /// Index `page - 1`
    entries: Vec<Option<Entry>>,

    generation: Generation,

    /// LRU order of ready pages (least recent at front)
    lru_queue: VecDeque<u32>,

    memory_used: usize,
    memory_limit: Option<usize>,
    stats: CacheStats,
}

impl CacheState {
    fn entry_index(&self, page: u32) -> Option<usize> {
        let index = page.checked_sub(1)? as usize;
        (index < self.entries.len()).then_some(index)
    }

    fn touch(&mut self, page: u32) {
        self.lru_queue.retain(|&p| p != page);
        self.lru_queue.push_back(page);
    }

    fn take(&mut self, index: usize) -> Option<Entry> {
        let entry = self.entries[index].take()?;
        self.memory_used = self.memory_used.saturating_sub(entry.slot.memory_size());
        if entry.slot.is_ready() {
            let page = index as u32 + 1;
            self.lru_queue.retain(|&p| p != page);
        }
        Some(entry)
    }

    fn put(&mut self, index: usize, entry: Entry) {
        self.take(index);
        let size = entry.slot.memory_size();
        let ready = entry.slot.is_ready();

        if ready {
            self.evict_to_fit(size);
            self.memory_used += size;
        }
        self.entries[index] = Some(entry);
        if ready {
            self.touch(index as u32 + 1);
        }
    }

    fn evict_to_fit(&mut self, required: usize) {
        let Some(limit) = self.memory_limit else {
            return;
        };
        while self.memory_used + required > limit {
            let Some(page) = self.lru_queue.pop_front() else {
                break;
            };
            let index = page as usize - 1;
            if let Some(entry) = self.entries[index].take() {
                self.memory_used = self.memory_used.saturating_sub(entry.slot.memory_size());
                self.stats.evictions += 1;
                tracing::debug!(page, "evicted raster under memory pressure");
            }
        }
    }

    fn refresh_counts(&mut self) {
        let (ready, unavailable) = self.entries.iter().flatten().fold((0, 0), |(r, u), entry| {
            if entry.slot.is_ready() {
                (r + 1, u)
            } else {
                (r, u + 1)
            }
        });
        self.stats.ready = ready;
        self.stats.unavailable = unavailable;
        self.stats.memory_used = self.memory_used;
        self.stats.memory_limit = self.memory_limit;
    }
}

/// Thread-safe per-page raster cache.
///
/// Clones share the same state.
///
/// ```
/// use pageview_cache::{RasterCache, Slot};
///
/// let cache = RasterCache::new(3);
/// let generation = cache.begin_generation();
/// assert!(cache.commit(generation, 1, Slot::Unavailable { scale: 2.0, reason: "boom".into() }));
///
/// // A newer pass supersedes the first one; its writes are dropped.
/// cache.begin_generation();
/// assert!(!cache.commit(generation, 2, Slot::Unavailable { scale: 2.0, reason: "late".into() }));
/// ```
#[derive(Debug, Clone)]
pub struct RasterCache {
    state: Arc<Mutex<CacheState>>,
}

impl RasterCache {
    /// Unbounded cache: every ready raster stays until replaced or
    /// invalidated.
    pub fn new(page_count: u32) -> Self {
        Self::with_limit(page_count, None)
    }

    /// Cache holding at most `memory_limit` bytes of ready rasters. Over
    /// budget the least recently used raster is evicted, including rasters
    /// of a pass that is still running.
    pub fn with_memory_limit(page_count: u32, memory_limit: usize) -> Self {
        Self::with_limit(page_count, Some(memory_limit))
    }

    fn with_limit(page_count: u32, memory_limit: Option<usize>) -> Self {
        let state = CacheState {
            entries: (0..page_count).map(|_| None).collect(),
            generation: 0,
            lru_queue: VecDeque::new(),
            memory_used: 0,
            memory_limit,
            stats: CacheStats {
                memory_limit,
                ..Default::default()
            },
        };

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.state.lock().unwrap().entries.len() as u32
    }

    pub fn generation(&self) -> Generation {
        self.state.lock().unwrap().generation
    }

    /// Starts a new generation and returns it. Every write tagged with an
    /// older generation is dropped from now on.
    pub fn begin_generation(&self) -> Generation {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        state.generation
    }

    /// True if `generation` is still the current one.
    pub fn is_current(&self, generation: Generation) -> bool {
        self.state.lock().unwrap().generation == generation
    }

    /// Writes one page slot if `generation` is still current.
    ///
    /// Returns `false` when the write was dropped.
    pub fn commit(&self, generation: Generation, page: u32, slot: Slot) -> bool {
        self.commit_batch(generation, std::iter::once((page, slot))) == 1
    }

    /// Writes a batch of page slots atomically with respect to generation
    /// changes. Returns how many were written; 0 if the batch is stale.
    pub fn commit_batch(
        &self,
        generation: Generation,
        slots: impl IntoIterator<Item = (u32, Slot)>,
    ) -> usize {
        let mut state = self.state.lock().unwrap();

        if state.generation != generation {
            let dropped = slots.into_iter().count() as u64;
            state.stats.stale_writes += dropped;
            tracing::debug!(
                generation,
                current = state.generation,
                dropped,
                "dropping writes from superseded generation"
            );
            return 0;
        }

        let mut written = 0;
        for (page, slot) in slots {
            let Some(index) = state.entry_index(page) else {
                tracing::warn!(page, "ignoring raster for page outside the document");
                continue;
            };
            state.put(index, Entry { generation, slot });
            written += 1;
        }

        state.refresh_counts();
        written
    }

    /// Ready raster for `page`, whatever its scale.
    pub fn get(&self, page: u32) -> Option<Arc<RasterArtifact>> {
        self.lookup(page, None)
    }

    /// Ready raster for `page` only if it was rendered at `scale`.
    pub fn get_for_scale(&self, page: u32, scale: f32) -> Option<Arc<RasterArtifact>> {
        self.lookup(page, Some(scale))
    }

    fn lookup(&self, page: u32, scale: Option<f32>) -> Option<Arc<RasterArtifact>> {
        let mut state = self.state.lock().unwrap();

        let found = state
            .entry_index(page)
            .and_then(|index| state.entries[index].as_ref())
            .and_then(|entry| match &entry.slot {
                Slot::Ready(artifact) if scale.map_or(true, |s| artifact.matches_scale(s)) => {
                    Some(Arc::clone(artifact))
                }
                _ => None,
            });

        if found.is_some() {
            state.touch(page);
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        found
    }

    /// Current slot of `page` without touching LRU order or statistics.
    pub fn slot(&self, page: u32) -> Option<Slot> {
        let state = self.state.lock().unwrap();
        let index = state.entry_index(page)?;
        state.entries[index].as_ref().map(|entry| entry.slot.clone())
    }

    /// Generation that wrote the slot of `page`.
    pub fn slot_generation(&self, page: u32) -> Option<Generation> {
        let state = self.state.lock().unwrap();
        let index = state.entry_index(page)?;
        state.entries[index].as_ref().map(|entry| entry.generation)
    }

    pub fn is_unavailable(&self, page: u32) -> bool {
        matches!(self.slot(page), Some(Slot::Unavailable { .. }))
    }

    /// Makes `page` absent. Returns the slot it held.
    pub fn invalidate(&self, page: u32) -> Option<Slot> {
        let mut state = self.state.lock().unwrap();
        let index = state.entry_index(page)?;
        let removed = state.take(index).map(|entry| entry.slot);
        state.refresh_counts();
        removed
    }

    pub fn ready_count(&self) -> usize {
        self.state.lock().unwrap().stats.ready
    }

    pub fn unavailable_count(&self) -> usize {
        self.state.lock().unwrap().stats.unavailable
    }

    pub fn memory_used(&self) -> usize {
        self.state.lock().unwrap().memory_used
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().unwrap().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageview_engine::RgbaImage;

    fn artifact(page: u32, scale: f32, side: u32) -> RasterArtifact {
        RasterArtifact {
            page,
            scale,
            image: RgbaImage::new(side, side),
        }
    }

    fn ready(page: u32, scale: f32) -> Slot {
        Slot::Ready(Arc::new(artifact(page, scale, 16)))
    }

    #[test]
    fn test_starts_empty() {
        let cache = RasterCache::new(5);

        assert_eq!(cache.page_count(), 5);
        assert_eq!(cache.generation(), 0);
        assert!(cache.get(1).is_none());
        assert_eq!(cache.ready_count(), 0);
    }

    #[test]
    fn test_commit_and_get() {
        let cache = RasterCache::new(3);
        let generation = cache.begin_generation();

        assert!(cache.commit(generation, 2, ready(2, 2.0)));

        let hit = cache.get(2).expect("page 2 should be cached");
        assert_eq!(hit.page, 2);
        assert_eq!(cache.slot_generation(2), Some(generation));
        assert_eq!(cache.ready_count(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.memory_used, 16 * 16 * 4);
    }

    #[test]
    fn test_get_for_scale_ignores_other_scales() {
        let cache = RasterCache::new(2);
        let generation = cache.begin_generation();
        cache.commit(generation, 1, ready(1, 2.0));

        assert!(cache.get_for_scale(1, 2.0).is_some());
        assert!(cache.get_for_scale(1, 2.2).is_none());
        // The entry is still physically present.
        assert!(cache.get(1).is_some());
    }

    #[test]
    fn test_stale_generation_is_dropped() {
        let cache = RasterCache::new(4);
        let old = cache.begin_generation();
        let new = cache.begin_generation();

        assert!(!cache.is_current(old));
        assert!(cache.is_current(new));
        assert_eq!(cache.commit_batch(old, vec![(1, ready(1, 1.0)), (2, ready(2, 1.0))]), 0);
        assert!(cache.slot(1).is_none());
        assert_eq!(cache.stats().stale_writes, 2);

        assert_eq!(cache.commit_batch(new, vec![(1, ready(1, 1.5))]), 1);
        assert!(cache.get_for_scale(1, 1.5).is_some());
    }

    #[test]
    fn test_unavailable_slots() {
        let cache = RasterCache::new(3);
        let generation = cache.begin_generation();
        cache.commit(
            generation,
            3,
            Slot::Unavailable {
                scale: 2.0,
                reason: "exceeds limit".into(),
            },
        );

        assert!(cache.is_unavailable(3));
        assert!(cache.get(3).is_none());
        assert_eq!(cache.unavailable_count(), 1);
        assert_eq!(cache.ready_count(), 0);
        assert_eq!(cache.slot(3).map(|s| s.scale()), Some(2.0));
    }

    #[test]
    fn test_out_of_range_pages_are_ignored() {
        let cache = RasterCache::new(2);
        let generation = cache.begin_generation();

        assert!(!cache.commit(generation, 0, ready(0, 1.0)));
        assert!(!cache.commit(generation, 3, ready(3, 1.0)));
        assert!(cache.get(0).is_none());
        assert!(cache.invalidate(7).is_none());
    }

    #[test]
    fn test_invalidate_single_page() {
        let cache = RasterCache::new(3);
        let generation = cache.begin_generation();
        cache.commit_batch(generation, (1..=3).map(|p| (p, ready(p, 1.0))));

        let removed = cache.invalidate(2).expect("page 2 was ready");
        assert!(removed.is_ready());
        assert!(cache.slot(2).is_none());
        assert!(cache.slot(1).is_some());
        assert_eq!(cache.ready_count(), 2);
        assert_eq!(cache.memory_used(), 2 * 16 * 16 * 4);
    }

    #[test]
    fn test_unbounded_by_default() {
        let cache = RasterCache::new(40);
        let generation = cache.begin_generation();
        cache.commit_batch(
            generation,
            (1..=40).map(|p| (p, Slot::Ready(Arc::new(artifact(p, 1.0, 512))))),
        );

        let stats = cache.stats();
        assert_eq!(stats.ready, 40);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.memory_limit, None);
        assert_eq!(stats.memory_used, 40 * 512 * 512 * 4);
    }

    #[test]
    fn test_lru_eviction() {
        let size = 16 * 16 * 4;
        let cache = RasterCache::with_memory_limit(3, 2 * size);
        let generation = cache.begin_generation();

        cache.commit(generation, 1, ready(1, 1.0));
        cache.commit(generation, 2, ready(2, 1.0));
        assert!(cache.get(1).is_some());
        cache.commit(generation, 3, ready(3, 1.0));

        // Page 2 was least recently used.
        assert!(cache.slot(2).is_none());
        assert!(cache.slot(1).is_some());
        assert!(cache.slot(3).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_memory_limit_is_reported() {
        let size = 16 * 16 * 4;
        let cache = RasterCache::with_memory_limit(3, size);
        let generation = cache.begin_generation();
        cache.commit_batch(generation, (1..=3).map(|p| (p, ready(p, 1.0))));

        let stats = cache.stats();
        assert_eq!(stats.ready, 1);
        assert!(cache.slot(3).is_some());
        assert_eq!(stats.memory_limit, Some(size));
    }

    #[test]
    fn test_replacing_slot_updates_memory() {
        let cache = RasterCache::new(1);
        let generation = cache.begin_generation();
        cache.commit(generation, 1, Slot::Ready(Arc::new(artifact(1, 1.0, 32))));
        cache.commit(generation, 1, Slot::Ready(Arc::new(artifact(1, 1.0, 8))));

        assert_eq!(cache.memory_used(), 8 * 8 * 4);
        assert_eq!(cache.ready_count(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let cache = RasterCache::new(2);
        let other = cache.clone();
        let generation = other.begin_generation();
        other.commit(generation, 1, ready(1, 1.0));

        assert_eq!(cache.generation(), generation);
        assert!(cache.get(1).is_some());
    }

    #[test]
    fn test_hit_rate() {
        let cache = RasterCache::new(2);
        let generation = cache.begin_generation();
        cache.commit(generation, 1, ready(1, 1.0));

        cache.get(1);
        cache.get(2);

        assert_eq!(cache.stats().hit_rate(), 0.5);
    }
}
