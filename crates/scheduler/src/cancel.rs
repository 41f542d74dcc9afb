//! Pass cancellation
//!
//! A pass stops early for two reasons: someone cancels it explicitly (the
//! document is being closed) or a newer pass started a new cache
//! generation. [`PassToken`] answers both questions with one call.

use pageview_cache::{Generation, RasterCache};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative cancellation
///
/// Multiple tokens can share the same underlying cancellation state via
/// Arc.
///
/// ```
/// use pageview_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token. All clones observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Identity of one prerender pass.
#[derive(Debug, Clone)]
pub struct PassToken {
    generation: Generation,
    cache: RasterCache,
    cancel: CancellationToken,
}

impl PassToken {
    /// Starts a new cache generation and returns its token.
    pub fn begin(cache: &RasterCache) -> Self {
        let generation = cache.begin_generation();
        Self {
            generation,
            cache: cache.clone(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True once the pass was cancelled or superseded by a newer generation.
    pub fn is_stale(&self) -> bool {
        self.cancel.is_cancelled() || !self.cache.is_current(self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_basic() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        token.cancel();
        assert!(token.is_cancelled());

        // Idempotent
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancellation_token_clone() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token2.cancel();
        assert!(token1.is_cancelled());
    }

    #[test]
    fn test_pass_token_superseded_by_new_generation() {
        let cache = RasterCache::new(3);
        let first = PassToken::begin(&cache);
        assert!(!first.is_stale());

        let second = PassToken::begin(&cache);
        assert!(first.is_stale());
        assert!(!second.is_stale());
        assert!(second.generation() > first.generation());
    }

    #[test]
    fn test_pass_token_cancelled_explicitly() {
        let cache = RasterCache::new(1);
        let token = PassToken::begin(&cache);

        token.cancellation().cancel();

        assert!(token.is_stale());
        assert!(cache.is_current(token.generation()));
    }
}
