use std::num::NonZeroUsize;

use lru::LruCache;

use crate::backend::RgbFrame;

/// A cached page raster together with the scale it was rendered at.
/// Frames are immutable once published; readers clone the `Arc`-backed
/// frame and never see partial pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterEntry {
    pub page: usize,
    pub frame: RgbFrame,
    pub render_scale: f32,
}

impl RasterEntry {
    pub fn byte_len(&self) -> usize {
        self.frame.byte_len()
    }

    /// True when the entry was rendered at (or above) the wanted scale,
    /// within the milli-scale rounding the pool uses.
    pub fn satisfies_scale(&self, wanted: f32) -> bool {
        scale_milli(self.render_scale) >= scale_milli(wanted)
    }
}

fn scale_milli(scale: f32) -> u32 {
    (scale.max(0.0) * 1000.0).round() as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub stale_discards: u64,
}

/// Per-document raster cache keyed by page index.
///
/// The cache carries a generation counter that advances on every
/// document replacement. Results queued by workers against an older
/// generation are dropped at `put`, so a stale raster can never land in
/// the new document's cache.
#[derive(Debug)]
pub struct PageRasterCache {
    generation: u64,
    max_entries: usize,
    memory_budget_bytes: usize,
    memory_bytes: usize,
    entries: LruCache<usize, RasterEntry>,
    /// Never evicted by pressure; the page currently on screen.
    pinned_page: Option<usize>,
    counters: CacheCounters,
}

impl PageRasterCache {
    pub fn new(max_entries: usize, memory_budget_bytes: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            generation: 0,
            max_entries,
            memory_budget_bytes: memory_budget_bytes.max(1),
            memory_bytes: 0,
            entries: LruCache::new(
                NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN),
            ),
            pinned_page: None,
            counters: CacheCounters::default(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Advances the generation and drops every entry. Called when the
    /// active document is replaced.
    pub fn begin_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.invalidate_all();
        self.generation
    }

    /// Marks the page that must survive memory pressure.
    pub fn pin(&mut self, page: usize) {
        self.pinned_page = Some(page);
    }

    pub fn get(&mut self, page: usize) -> Option<&RasterEntry> {
        if self.entries.peek(&page).is_some() {
            self.counters.hits += 1;
            return self.entries.get(&page);
        }
        self.counters.misses += 1;
        None
    }

    pub fn get_cloned(&mut self, page: usize) -> Option<RasterEntry> {
        self.get(page).cloned()
    }

    pub fn contains(&self, page: usize) -> bool {
        self.entries.peek(&page).is_some()
    }

    /// Publishes a finished raster by whole-entry replacement. A result
    /// carrying a generation other than the current one is discarded
    /// and the cache is left untouched.
    pub fn put(&mut self, generation: u64, entry: RasterEntry) -> bool {
        if generation != self.generation {
            self.counters.stale_discards += 1;
            return false;
        }

        let page = entry.page;
        if let Some(prev) = self.entries.pop(&page) {
            self.memory_bytes = self.memory_bytes.saturating_sub(prev.byte_len());
        }

        // Victims are picked by hand: inserting at capacity would let
        // `LruCache` evict its LRU entry without consulting the pin.
        while self.entries.len() >= self.max_entries {
            if !self.pop_unpinned_victim() {
                // Only the pinned page fits; the incoming raster is
                // dropped instead.
                return true;
            }
        }

        self.memory_bytes += entry.byte_len();
        self.entries.put(page, entry);
        self.evict_while_needed();
        true
    }

    pub fn invalidate(&mut self, page: usize) {
        if let Some(entry) = self.entries.pop(&page) {
            self.memory_bytes = self.memory_bytes.saturating_sub(entry.byte_len());
            self.counters.evictions += 1;
        }
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
        self.memory_bytes = 0;
        self.pinned_page = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn memory_bytes(&self) -> usize {
        self.memory_bytes
    }

    pub fn counters(&self) -> CacheCounters {
        self.counters
    }

    fn evict_while_needed(&mut self) {
        while self.memory_bytes > self.memory_budget_bytes {
            if !self.pop_unpinned_victim() {
                break;
            }
        }
    }

    /// Drops the least-recently-used entry that is not the pinned page.
    /// Returns false when only the pinned page is left; it stays
    /// resident even over budget.
    fn pop_unpinned_victim(&mut self) -> bool {
        let victim = self
            .entries
            .iter()
            .rev()
            .map(|(page, _)| *page)
            .find(|page| Some(*page) != self.pinned_page);
        let Some(victim) = victim else {
            return false;
        };
        if let Some(entry) = self.entries.pop(&victim) {
            self.memory_bytes = self.memory_bytes.saturating_sub(entry.byte_len());
            self.counters.evictions += 1;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::backend::RgbFrame;

    use super::{PageRasterCache, RasterEntry};

    fn entry(page: usize, width: u32, height: u32) -> RasterEntry {
        let pixels = vec![0xffu8; width as usize * height as usize * 3];
        RasterEntry {
            page,
            frame: RgbFrame {
                width,
                height,
                stride: width as usize * 3,
                pixels: Arc::from(pixels),
            },
            render_scale: 1.0,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let mut cache = PageRasterCache::new(4, 1024 * 1024);
        let generation = cache.generation();
        assert!(cache.put(generation, entry(2, 10, 10)));

        let cached = cache.get_cloned(2).unwrap();
        assert_eq!(cached.page, 2);
        assert_eq!(cache.counters().hits, 1);
    }

    #[test]
    fn stale_generation_put_is_a_no_op() {
        let mut cache = PageRasterCache::new(4, 1024 * 1024);
        let old = cache.generation();
        cache.begin_generation();

        assert!(!cache.put(old, entry(0, 10, 10)));
        assert!(cache.is_empty());
        assert_eq!(cache.counters().stale_discards, 1);
    }

    #[test]
    fn begin_generation_drops_entries_and_pin() {
        let mut cache = PageRasterCache::new(4, 1024 * 1024);
        let generation = cache.generation();
        cache.put(generation, entry(0, 10, 10));
        cache.pin(0);

        let next = cache.begin_generation();
        assert_eq!(next, generation + 1);
        assert!(cache.is_empty());
        assert_eq!(cache.memory_bytes(), 0);
    }

    #[test]
    fn eviction_honors_budget_but_spares_pinned_page() {
        // Each 40x40 frame is 4800 bytes; budget holds one.
        let mut cache = PageRasterCache::new(8, 5000);
        let generation = cache.generation();
        cache.pin(0);
        cache.put(generation, entry(0, 40, 40));
        cache.put(generation, entry(1, 40, 40));
        cache.put(generation, entry(2, 40, 40));

        assert!(cache.contains(0), "pinned page must stay resident");
        assert!(cache.memory_bytes() <= 2 * 4800);
        assert!(cache.counters().evictions > 0);
    }

    #[test]
    fn capacity_pressure_never_evicts_the_pinned_page() {
        // Page 0 is pinned and least recently touched when page 2
        // arrives at capacity; the victim must be page 1.
        let mut cache = PageRasterCache::new(2, 1024 * 1024);
        let generation = cache.generation();
        cache.pin(0);
        cache.put(generation, entry(0, 10, 10));
        cache.put(generation, entry(1, 10, 10));
        cache.put(generation, entry(2, 10, 10));

        assert!(cache.contains(0), "pinned current page was evicted");
        assert!(cache.contains(2));
        assert!(!cache.contains(1));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn incoming_raster_is_dropped_when_only_the_pinned_page_fits() {
        let mut cache = PageRasterCache::new(1, 1024 * 1024);
        let generation = cache.generation();
        cache.pin(0);
        cache.put(generation, entry(0, 10, 10));

        assert!(cache.put(generation, entry(1, 10, 10)));
        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn replacement_does_not_double_count_memory() {
        let mut cache = PageRasterCache::new(4, 1024 * 1024);
        let generation = cache.generation();
        cache.put(generation, entry(1, 8, 8));
        cache.put(generation, entry(1, 10, 10));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_bytes(), entry(1, 10, 10).byte_len());
    }

    #[test]
    fn invalidate_releases_memory() {
        let mut cache = PageRasterCache::new(4, 1024 * 1024);
        let generation = cache.generation();
        cache.put(generation, entry(3, 10, 10));

        cache.invalidate(3);
        assert!(!cache.contains(3));
        assert_eq!(cache.memory_bytes(), 0);
    }

    #[test]
    fn satisfies_scale_uses_milli_rounding() {
        let mut sample = entry(0, 2, 2);
        sample.render_scale = 2.0;
        assert!(sample.satisfies_scale(2.0));
        assert!(sample.satisfies_scale(1.5));
        assert!(sample.satisfies_scale(2.0001));
        assert!(!sample.satisfies_scale(2.01));
    }
}
