//! Free-extent bookkeeping for a single page.
//!
//! Extents are measured in words. Besides the list itself the index keeps a
//! small cache of the shortest and longest extent lengths and how many
//! extents share each, so "can anything here fit N words?" is answered
//! without scanning.

use core::slice;

/// A run of free words: `offset..offset + len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Extent {
    pub offset: usize,
    pub len: usize,
}

impl Extent {
    #[inline]
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    #[inline]
    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    #[inline]
    pub const fn overlaps(&self, other: &Extent) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Cached length statistics. All zero when the index is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtentCache {
    pub min_len: usize,
    pub min_count: usize,
    pub max_len: usize,
    pub max_count: usize,
}

#[derive(Debug, Clone)]
pub struct ExtentIndex {
    extents: Vec<Extent>,
    cache: ExtentCache,
    total: usize,
    /// Sorted by offset with no two extents touching.
    coalesced: bool,
}

impl Default for ExtentIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtentIndex {
    pub fn new() -> Self {
        Self {
            extents: Vec::new(),
            cache: ExtentCache::default(),
            total: 0,
            coalesced: true,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.extents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    /// Sum of all extent lengths.
    #[inline]
    pub fn total_words(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn cache(&self) -> ExtentCache {
        self.cache
    }

    pub fn iter(&self) -> slice::Iter<'_, Extent> {
        self.extents.iter()
    }

    /// O(1): is there an extent of at least `words`?
    #[inline]
    pub fn can_fit(&self, words: usize) -> bool {
        !self.extents.is_empty() && self.cache.max_len >= words
    }

    /// Does any free extent share a word with `extent`?
    ///
    /// Bisects while the index is sorted and merged, scans otherwise.
    pub fn overlaps(&self, extent: &Extent) -> bool {
        if self.coalesced {
            let idx = self.extents.partition_point(|e| e.end() <= extent.offset);
            return self.extents.get(idx).is_some_and(|e| e.overlaps(extent));
        }
        self.extents.iter().any(|e| e.overlaps(extent))
    }

    /// Track a freed run. Empty extents are ignored.
    pub fn insert(&mut self, extent: Extent) {
        if extent.len == 0 {
            return;
        }
        if let Some(last) = self.extents.last() {
            if last.end() >= extent.offset {
                self.coalesced = false;
            }
        }
        self.extents.push(extent);
        self.total += extent.len;
        self.note_added(extent.len);
    }

    /// Carve `words` off the front of the first extent long enough to hold
    /// them. Returns the word offset of the carved run.
    pub fn take_fit(&mut self, words: usize) -> Option<usize> {
        if words == 0 || !self.can_fit(words) {
            return None;
        }
        let idx = if self.cache.min_len >= words {
            0
        } else {
            self.extents.iter().position(|e| e.len >= words)?
        };

        let taken = self.extents[idx];
        let remainder = taken.len - words;
        if remainder == 0 {
            self.extents.swap_remove(idx);
            if idx != self.extents.len() {
                self.coalesced = false;
            }
        } else {
            self.extents[idx] = Extent::new(taken.offset + words, remainder);
        }
        self.total -= words;

        let recomputed = self.note_removed(taken.len);
        if remainder > 0 && !recomputed {
            self.note_added(remainder);
        }
        Some(taken.offset)
    }

    /// Sort by offset and merge touching extents. Returns how many merges
    /// happened. Calling it twice in a row is a no-op the second time.
    pub fn restore(&mut self) -> usize {
        if self.coalesced {
            return 0;
        }
        self.extents.sort_unstable_by_key(|e| e.offset);

        let before = self.extents.len();
        let mut merged: Vec<Extent> = Vec::with_capacity(before);
        for extent in self.extents.drain(..) {
            match merged.last_mut() {
                Some(last) if last.end() == extent.offset => last.len += extent.len,
                _ => merged.push(extent),
            }
        }
        self.extents = merged;
        self.coalesced = true;
        self.recompute();
        before - self.extents.len()
    }

    fn note_added(&mut self, len: usize) {
        let cache = &mut self.cache;
        if cache.max_count == 0 {
            *cache = ExtentCache {
                min_len: len,
                min_count: 1,
                max_len: len,
                max_count: 1,
            };
            return;
        }
        if len < cache.min_len {
            cache.min_len = len;
            cache.min_count = 1;
        } else if len == cache.min_len {
            cache.min_count += 1;
        }
        if len > cache.max_len {
            cache.max_len = len;
            cache.max_count = 1;
        } else if len == cache.max_len {
            cache.max_count += 1;
        }
    }

    /// Returns true when the cache had to be rebuilt from the current list.
    fn note_removed(&mut self, len: usize) -> bool {
        let cache = &mut self.cache;
        let mut stale = false;
        if len == cache.min_len {
            cache.min_count -= 1;
            stale |= cache.min_count == 0;
        }
        if len == cache.max_len {
            cache.max_count -= 1;
            stale |= cache.max_count == 0;
        }
        if stale {
            self.recompute();
        }
        stale
    }

    fn recompute(&mut self) {
        self.cache = Self::scan(&self.extents);
    }

    fn scan(extents: &[Extent]) -> ExtentCache {
        let mut cache = ExtentCache::default();
        for (i, e) in extents.iter().enumerate() {
            if i == 0 || e.len < cache.min_len {
                cache.min_len = e.len;
                cache.min_count = 1;
            } else if e.len == cache.min_len {
                cache.min_count += 1;
            }
            if i == 0 || e.len > cache.max_len {
                cache.max_len = e.len;
                cache.max_count = 1;
            } else if e.len == cache.max_len {
                cache.max_count += 1;
            }
        }
        cache
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.cache, Self::scan(&self.extents), "stale cache");
        assert_eq!(
            self.total,
            self.extents.iter().map(|e| e.len).sum::<usize>(),
            "stale total"
        );
    }
}

impl<'a> IntoIterator for &'a ExtentIndex {
    type Item = &'a Extent;
    type IntoIter = slice::Iter<'a, Extent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
