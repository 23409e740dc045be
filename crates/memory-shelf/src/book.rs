//! A fixed set of pages plus an address map for finding which page owns a
//! pointer.

use core::fmt;
use core::ptr::NonNull;

use allocator_api2::alloc::{Allocator, Global};

use crate::config::ShelfConfig;
use crate::error::ShelfError;
use crate::page::Page;
use crate::policy::Policy;

/// Page address ranges sorted by base address.
///
/// `anchor` records page 0's base when the map was built. A map whose anchor
/// no longer matches is stale: `&self` lookups fall back to a linear scan
/// and the next `release` rebuilds it.
#[derive(Debug, Clone)]
struct AddressMap {
    anchor: usize,
    spans: Vec<Span>,
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    page: usize,
}

impl AddressMap {
    fn build<A: Allocator>(pages: &[Page<A>]) -> Self {
        let mut spans: Vec<Span> = pages
            .iter()
            .enumerate()
            .map(|(page, p)| {
                let start = p.base().as_ptr() as usize;
                Span {
                    start,
                    end: start + p.capacity_bytes(),
                    page,
                }
            })
            .collect();
        spans.sort_unstable_by_key(|s| s.start);
        Self {
            anchor: pages.first().map_or(0, |p| p.base().as_ptr() as usize),
            spans,
        }
    }

    fn is_current<A: Allocator>(&self, pages: &[Page<A>]) -> bool {
        self.spans.len() == pages.len()
            && pages
                .first()
                .is_none_or(|p| p.base().as_ptr() as usize == self.anchor)
    }

    /// Lowest and highest address covered by any page.
    fn bounds(&self) -> Option<(usize, usize)> {
        let first = self.spans.first()?;
        let last = self.spans.last()?;
        Some((first.start, last.end))
    }

    fn find(&self, addr: usize) -> Option<usize> {
        let idx = self.spans.partition_point(|s| s.start <= addr);
        let span = self.spans.get(idx.checked_sub(1)?)?;
        (addr < span.end).then_some(span.page)
    }
}

pub struct Book<A: Allocator + Clone = Global> {
    pages: Box<[Page<A>]>,
    map: AddressMap,
}

impl Book<Global> {
    pub fn new(config: &ShelfConfig) -> Result<Self, ShelfError> {
        Self::new_in(config, Global)
    }
}

impl<A: Allocator + Clone> Book<A> {
    pub fn new_in(config: &ShelfConfig, alloc: A) -> Result<Self, ShelfError> {
        config.validate()?;
        let pages = (0..config.pages_per_book)
            .map(|_| Page::new_in(config.word_size, config.words_per_page, alloc.clone()))
            .collect::<Result<Box<[_]>, _>>()?;
        let map = AddressMap::build(&pages);
        Ok(Self { pages, map })
    }

    #[inline]
    pub fn pages(&self) -> &[Page<A>] {
        &self.pages
    }

    pub fn page(&self, page: usize) -> Option<&Page<A>> {
        self.pages.get(page)
    }

    /// Bytes of one page.
    pub fn page_bytes(&self) -> usize {
        self.pages.first().map_or(0, |p| p.capacity_bytes())
    }

    /// First page that can satisfy the request under `policy`, in page
    /// order.
    pub fn request(&mut self, bytes: usize, policy: Policy) -> Result<NonNull<u8>, ShelfError> {
        let mut miss = ShelfError::Exhausted { words: 0 };
        for page in self.pages.iter_mut() {
            match page.request(bytes, policy) {
                Ok(ptr) => return Ok(ptr),
                Err(err @ ShelfError::Exhausted { .. }) => miss = err,
                Err(err) => return Err(err),
            }
        }
        Err(miss)
    }

    /// Request from one specific page.
    pub fn request_in(
        &mut self,
        page: usize,
        bytes: usize,
        policy: Policy,
    ) -> Result<NonNull<u8>, ShelfError> {
        let pages = self.pages.len();
        self.pages
            .get_mut(page)
            .ok_or(ShelfError::PageOutOfRange { page, pages })?
            .request(bytes, policy)
    }

    pub fn release(&mut self, ptr: NonNull<u8>, bytes: usize) -> Result<(), ShelfError> {
        self.refresh_map();
        let page = self.page_of(ptr.as_ptr()).ok_or(ShelfError::NotOwned)?;
        self.pages[page].release(ptr, bytes)
    }

    /// Rebuild the address map if it no longer matches the pages.
    fn refresh_map(&mut self) {
        if !self.map.is_current(&self.pages) {
            self.map = AddressMap::build(&self.pages);
        }
    }

    /// Index of the page containing `ptr`.
    pub fn page_of(&self, ptr: *const u8) -> Option<usize> {
        if self.map.is_current(&self.pages) {
            self.map.find(ptr as usize)
        } else {
            self.pages.iter().position(|p| p.owned(ptr))
        }
    }

    pub fn owned(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        match self.map.bounds() {
            Some((lo, hi)) if self.map.is_current(&self.pages) && (addr < lo || addr >= hi) => {
                false
            }
            _ => self.page_of(ptr).is_some(),
        }
    }

    /// Merge touching free extents on every page.
    pub fn restore(&mut self) -> usize {
        self.pages.iter_mut().map(Page::restore).sum()
    }
}

impl<A: Allocator + Clone> fmt::Debug for Book<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Book")
            .field("pages", &self.pages)
            .finish_non_exhaustive()
    }
}
