//! One contiguous word-aligned region.
//!
//! A page hands out word-granular ranges from two sources: freed extents it
//! has tracked, and the never-touched tail past its writable cursor. The
//! cursor only moves forward, so every word below it is either live or free:
//!
//! ```text
//! 0                      writable                   capacity
//! |--- live + free ------|------- untouched ---------|
//! ```

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;

use allocator_api2::alloc::{Allocator, Global};

use crate::config::page_layout;
use crate::error::ShelfError;
use crate::extent::{Extent, ExtentIndex};
use crate::policy::Policy;

pub struct Page<A: Allocator = Global> {
    base: NonNull<u8>,
    layout: Layout,
    word_size: usize,
    words: usize,
    writable: usize,
    extents: ExtentIndex,
    alloc: A,
}

// SAFETY: the page exclusively owns its region; shared access only reads
// bookkeeping and never dereferences the memory.
unsafe impl<A: Allocator + Send> Send for Page<A> {}
unsafe impl<A: Allocator + Sync> Sync for Page<A> {}

impl Page<Global> {
    pub fn new(word_size: usize, words: usize) -> Result<Self, ShelfError> {
        Self::new_in(word_size, words, Global)
    }
}

impl<A: Allocator> Page<A> {
    /// Allocate a page of `words` words of `word_size` bytes, aligned to
    /// `word_size`.
    pub fn new_in(word_size: usize, words: usize, alloc: A) -> Result<Self, ShelfError> {
        if word_size == 0 || !word_size.is_power_of_two() {
            return Err(ShelfError::InvalidConfig(
                "word_size must be a non-zero power of 2",
            ));
        }
        if words == 0 {
            return Err(ShelfError::InvalidConfig("words_per_page must be > 0"));
        }
        let layout = page_layout(word_size, words)?;
        let base = alloc
            .allocate(layout)
            .map_err(|_| ShelfError::AllocFailed {
                bytes: layout.size(),
            })?
            .cast::<u8>();

        Ok(Self {
            base,
            layout,
            word_size,
            words,
            writable: 0,
            extents: ExtentIndex::new(),
            alloc,
        })
    }

    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    #[inline]
    pub fn word_size(&self) -> usize {
        self.word_size
    }

    #[inline]
    pub fn capacity_words(&self) -> usize {
        self.words
    }

    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.layout.size()
    }

    /// Word offset of the writable cursor.
    #[inline]
    pub fn writable_offset(&self) -> usize {
        self.writable
    }

    /// Untouched words past the writable cursor.
    #[inline]
    pub fn writable_words(&self) -> usize {
        self.words - self.writable
    }

    /// Words sitting in tracked free extents.
    #[inline]
    pub fn free_words(&self) -> usize {
        self.extents.total_words()
    }

    /// Words currently handed out.
    #[inline]
    pub fn live_words(&self) -> usize {
        self.writable - self.extents.total_words()
    }

    pub fn extents(&self) -> &ExtentIndex {
        &self.extents
    }

    /// Words needed to hold `bytes`, rounded up.
    #[inline]
    pub fn words_for(&self, bytes: usize) -> usize {
        bytes.div_ceil(self.word_size)
    }

    /// Does `ptr` point inside this page?
    #[inline]
    pub fn owned(&self, ptr: *const u8) -> bool {
        let base = self.base.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= base && addr - base < self.layout.size()
    }

    /// Word offset of `ptr`, if it is inside this page on a word boundary.
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        if !self.owned(ptr) {
            return None;
        }
        let byte_offset = ptr as usize - self.base.as_ptr() as usize;
        (byte_offset % self.word_size == 0).then_some(byte_offset / self.word_size)
    }

    /// Hand out room for `bytes` bytes according to `policy`.
    ///
    /// The returned pointer is aligned to the word size and the range spans
    /// `words_for(bytes)` whole words.
    pub fn request(&mut self, bytes: usize, policy: Policy) -> Result<NonNull<u8>, ShelfError> {
        if bytes == 0 {
            return Err(ShelfError::ZeroSize);
        }
        if bytes > self.layout.size() {
            return Err(ShelfError::TooLarge {
                bytes,
                max: self.layout.size(),
            });
        }
        let words = self.words_for(bytes);

        let offset = match policy {
            Policy::Balanced => self
                .extents
                .take_fit(words)
                .or_else(|| self.take_writable(words)),
            Policy::Rich => self.take_writable(words),
            Policy::Poor => self.extents.take_fit(words),
            Policy::Thrifty => {
                self.extents.restore();
                self.extents.take_fit(words)
            }
        };

        match offset {
            Some(offset) => Ok(self.ptr_at(offset)),
            None => Err(ShelfError::Exhausted { words }),
        }
    }

    /// Give back a range previously returned by [`Page::request`].
    ///
    /// Rejects foreign pointers, pointers off a word boundary, ranges past
    /// the writable cursor and ranges that overlap free memory. A rejected
    /// release leaves the page untouched.
    ///
    /// The double-free check bisects the free list when it is sorted and
    /// merged (after [`Page::restore`] or a run of in-order frees) and scans
    /// it otherwise.
    pub fn release(&mut self, ptr: NonNull<u8>, bytes: usize) -> Result<(), ShelfError> {
        let extent = self.checked_extent(ptr.as_ptr(), bytes)?;
        self.extents.insert(extent);
        Ok(())
    }

    /// Merge touching free extents. Returns the number of merges.
    pub fn restore(&mut self) -> usize {
        self.extents.restore()
    }

    fn checked_extent(&self, ptr: *const u8, bytes: usize) -> Result<Extent, ShelfError> {
        if !self.owned(ptr) {
            return Err(ShelfError::NotOwned);
        }
        if bytes == 0 {
            return Err(ShelfError::ZeroSize);
        }
        let byte_offset = ptr as usize - self.base.as_ptr() as usize;
        if byte_offset % self.word_size != 0 {
            return Err(ShelfError::Misaligned { byte_offset });
        }
        let offset = byte_offset / self.word_size;
        let words = self.words_for(bytes);
        if offset > self.writable || words > self.writable - offset {
            return Err(ShelfError::NeverAllocated { offset, words });
        }
        let extent = Extent::new(offset, words);
        if self.extents.overlaps(&extent) {
            return Err(ShelfError::DoubleFree { offset, words });
        }
        Ok(extent)
    }

    fn take_writable(&mut self, words: usize) -> Option<usize> {
        if words > self.writable_words() {
            return None;
        }
        let offset = self.writable;
        self.writable += words;
        Some(offset)
    }

    #[inline]
    fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset < self.words);
        // SAFETY: offset is a word index inside the allocation.
        unsafe { self.base.add(offset * self.word_size) }
    }
}

impl<A: Allocator> Drop for Page<A> {
    fn drop(&mut self) {
        // SAFETY: base/layout came from this allocator in new_in.
        unsafe { self.alloc.deallocate(self.base, self.layout) };
    }
}

impl<A: Allocator> fmt::Debug for Page<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("base", &self.base)
            .field("word_size", &self.word_size)
            .field("words", &self.words)
            .field("writable", &self.writable)
            .field("free_words", &self.free_words())
            .field("extents", &self.extents.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn offset(page: &Page, ptr: NonNull<u8>) -> usize {
        page.offset_of(ptr.as_ptr()).unwrap()
    }

    #[test]
    fn request_release_reuse() {
        let mut page = Page::new(8, 16).unwrap();

        let a = page.request(40, Policy::Balanced).unwrap();
        assert_eq!(offset(&page, a), 0);
        assert_eq!(page.writable_offset(), 5);

        let b = page.request(16, Policy::Balanced).unwrap();
        assert_eq!(offset(&page, b), 5);
        assert_eq!(page.writable_offset(), 7);

        page.release(a, 40).unwrap();
        assert_eq!(
            page.extents().iter().copied().collect::<Vec<_>>(),
            vec![Extent::new(0, 5)]
        );

        let c = page.request(40, Policy::Poor).unwrap();
        assert_eq!(offset(&page, c), 0);
        assert!(page.extents().is_empty());
        assert_eq!(page.writable_offset(), 7);
    }

    #[test]
    fn poor_request_splits_larger_extent() {
        let mut page = Page::new(8, 16).unwrap();
        let a = page.request(40, Policy::Balanced).unwrap();
        page.request(16, Policy::Balanced).unwrap();
        page.release(a, 40).unwrap();

        let c = page.request(24, Policy::Poor).unwrap();
        assert_eq!(c, a);
        assert_eq!(
            page.extents().iter().copied().collect::<Vec<_>>(),
            vec![Extent::new(3, 2)]
        );
    }

    #[test]
    fn pointers_are_word_aligned() {
        let mut page = Page::new(16, 8).unwrap();
        for bytes in [1, 3, 16, 17] {
            let ptr = page.request(bytes, Policy::Rich).unwrap();
            assert_eq!(ptr.as_ptr() as usize % 16, 0);
        }
        assert_eq!(page.writable_offset(), 1 + 1 + 1 + 2);
    }

    #[test]
    fn rich_never_reuses() {
        let mut page = Page::new(8, 4).unwrap();
        let a = page.request(8, Policy::Rich).unwrap();
        page.release(a, 8).unwrap();
        for _ in 0..3 {
            page.request(8, Policy::Rich).unwrap();
        }
        assert_eq!(
            page.request(8, Policy::Rich),
            Err(ShelfError::Exhausted { words: 1 })
        );
        assert_eq!(page.free_words(), 1);
    }

    #[test]
    fn poor_never_extends() {
        let mut page = Page::new(8, 4).unwrap();
        assert_eq!(
            page.request(8, Policy::Poor),
            Err(ShelfError::Exhausted { words: 1 })
        );
        assert_eq!(page.writable_offset(), 0);
    }

    #[test]
    fn thrifty_merges_before_reusing() {
        let mut page = Page::new(8, 4).unwrap();
        let ptrs: Vec<_> = (0..4)
            .map(|_| page.request(8, Policy::Rich).unwrap())
            .collect();
        page.release(ptrs[1], 8).unwrap();
        page.release(ptrs[0], 8).unwrap();

        assert_eq!(
            page.request(16, Policy::Poor),
            Err(ShelfError::Exhausted { words: 2 })
        );
        let merged = page.request(16, Policy::Thrifty).unwrap();
        assert_eq!(merged, ptrs[0]);
        assert!(page.extents().is_empty());
    }

    #[test]
    fn size_errors() {
        let mut page = Page::new(8, 4).unwrap();
        assert_eq!(page.request(0, Policy::Balanced), Err(ShelfError::ZeroSize));
        assert_eq!(
            page.request(33, Policy::Balanced),
            Err(ShelfError::TooLarge { bytes: 33, max: 32 })
        );
        assert!(page.request(32, Policy::Balanced).is_ok());
    }

    #[test]
    fn release_rejects_bad_ranges() {
        let mut page = Page::new(8, 8).unwrap();
        let a = page.request(16, Policy::Balanced).unwrap();

        let mut foreign = 0u64;
        let foreign = NonNull::from(&mut foreign).cast::<u8>();
        assert_eq!(page.release(foreign, 8), Err(ShelfError::NotOwned));

        let inside = unsafe { a.add(3) };
        assert_eq!(
            page.release(inside, 8),
            Err(ShelfError::Misaligned { byte_offset: 3 })
        );
        assert_eq!(
            page.release(a, 24),
            Err(ShelfError::NeverAllocated {
                offset: 0,
                words: 3
            })
        );

        page.release(a, 16).unwrap();
        assert_eq!(
            page.release(a, 8),
            Err(ShelfError::DoubleFree {
                offset: 0,
                words: 1
            })
        );
        assert_eq!(page.free_words(), 2);
        assert_eq!(page.live_words(), 0);
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(matches!(
            Page::new(6, 4),
            Err(ShelfError::InvalidConfig(_))
        ));
        assert!(matches!(Page::new(8, 0), Err(ShelfError::InvalidConfig(_))));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Request(usize, Policy),
        Release(usize),
        Restore,
    }

    fn policy() -> impl Strategy<Value = Policy> {
        prop_oneof![
            Just(Policy::Balanced),
            Just(Policy::Rich),
            Just(Policy::Poor),
            Just(Policy::Thrifty),
        ]
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (1usize..40, policy()).prop_map(|(bytes, policy)| Op::Request(bytes, policy)),
            2 => any::<usize>().prop_map(Op::Release),
            1 => Just(Op::Restore),
        ]
    }

    proptest! {
        #[test]
        fn release_makes_room_for_poor(prefix in 0usize..=64, bytes in 1usize..=128) {
            let mut page = Page::new(8, 16).unwrap();
            if prefix > 0 {
                page.request(prefix, Policy::Rich).unwrap();
            }
            if let Ok(ptr) = page.request(bytes, Policy::Balanced) {
                page.release(ptr, bytes).unwrap();
                prop_assert!(page.request(bytes, Policy::Poor).is_ok());
            }
        }

        #[test]
        fn words_stay_partitioned(ops in prop::collection::vec(op(), 1..128)) {
            let mut page = Page::new(8, 32).unwrap();
            let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();

            for op in ops {
                match op {
                    Op::Request(bytes, policy) => {
                        if let Ok(ptr) = page.request(bytes, policy) {
                            let words = page.words_for(bytes);
                            let start = page.offset_of(ptr.as_ptr()).unwrap();
                            for &(other, other_bytes) in &live {
                                let o = page.offset_of(other.as_ptr()).unwrap();
                                let ow = page.words_for(other_bytes);
                                prop_assert!(start + words <= o || o + ow <= start);
                            }
                            live.push((ptr, bytes));
                        }
                    }
                    Op::Release(pick) => {
                        if !live.is_empty() {
                            let (ptr, bytes) = live.swap_remove(pick % live.len());
                            page.release(ptr, bytes).unwrap();
                        }
                    }
                    Op::Restore => {
                        page.restore();
                    }
                }

                let live_words: usize = live.iter().map(|&(_, b)| page.words_for(b)).sum();
                prop_assert_eq!(page.live_words(), live_words);
                prop_assert_eq!(
                    page.live_words() + page.free_words() + page.writable_words(),
                    page.capacity_words()
                );
                page.extents().assert_consistent();

                // Every word below the writable cursor is either live or
                // free, exactly once.
                let writable = page.writable_offset();
                let mut cover = vec![0u8; writable];
                for &(ptr, bytes) in &live {
                    let start = page.offset_of(ptr.as_ptr()).unwrap();
                    let end = start + page.words_for(bytes);
                    prop_assert!(end <= writable);
                    for word in &mut cover[start..end] {
                        *word += 1;
                    }
                }
                for extent in page.extents().iter() {
                    prop_assert!(extent.end() <= writable);
                    for word in &mut cover[extent.offset..extent.end()] {
                        *word += 1;
                    }
                }
                prop_assert!(cover.iter().all(|&n| n == 1), "coverage {:?}", cover);
            }
        }
    }
}
