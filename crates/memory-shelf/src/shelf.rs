use core::fmt;
use core::ptr::NonNull;

use allocator_api2::alloc::{Allocator, Global};
use tracing::{debug, trace, warn};

use crate::book::Book;
use crate::config::ShelfConfig;
use crate::error::ShelfError;
use crate::policy::Policy;

/// Snapshot of how a shelf's words are split up, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShelfStats {
    pub books: usize,
    pub pages: usize,
    pub capacity_bytes: usize,
    /// Handed out and not yet released.
    pub live_bytes: usize,
    /// Released and tracked for reuse.
    pub free_bytes: usize,
    /// Past every page's writable cursor.
    pub untouched_bytes: usize,
    pub free_extents: usize,
}

/// Top-level allocator: a growable list of books sharing one geometry.
pub struct Shelf<A: Allocator + Clone = Global> {
    config: ShelfConfig,
    books: Vec<Book<A>>,
    alloc: A,
}

impl Shelf<Global> {
    pub fn new(config: ShelfConfig) -> Result<Self, ShelfError> {
        Self::new_in(config, Global)
    }
}

impl<A: Allocator + Clone> Shelf<A> {
    pub fn new_in(config: ShelfConfig, alloc: A) -> Result<Self, ShelfError> {
        config.validate()?;
        let mut shelf = Self {
            config,
            books: Vec::new(),
            alloc,
        };
        shelf.assign(config.books)?;
        Ok(shelf)
    }

    #[inline]
    pub fn config(&self) -> &ShelfConfig {
        &self.config
    }

    #[inline]
    pub fn books(&self) -> &[Book<A>] {
        &self.books
    }

    pub fn book(&self, book: usize) -> Option<&Book<A>> {
        self.books.get(book)
    }

    /// Grow to `books` books. Asking for fewer than the shelf already has
    /// does nothing; books are never dropped while the shelf lives.
    pub fn assign(&mut self, books: usize) -> Result<(), ShelfError> {
        if books <= self.books.len() {
            return Ok(());
        }
        let before = self.books.len();
        self.books.reserve(books - before);
        for _ in before..books {
            self.books.push(Book::new_in(&self.config, self.alloc.clone())?);
        }
        debug!(before, after = books, "shelf grown");
        Ok(())
    }

    /// Allocate with the configured default policy.
    pub fn allocate(&mut self, bytes: usize) -> Result<NonNull<u8>, ShelfError> {
        self.allocate_with(bytes, self.config.policy)
    }

    /// Try every book in order until one satisfies the request.
    pub fn allocate_with(
        &mut self,
        bytes: usize,
        policy: Policy,
    ) -> Result<NonNull<u8>, ShelfError> {
        self.check_size(bytes)?;
        for book in self.books.iter_mut() {
            match book.request(bytes, policy) {
                Ok(ptr) => return Ok(ptr),
                Err(ShelfError::Exhausted { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        let words = bytes.div_ceil(self.config.word_size);
        trace!(bytes, ?policy, books = self.books.len(), "allocation miss");
        Err(ShelfError::Exhausted { words })
    }

    /// Allocate from one page of one book.
    pub fn allocate_at(
        &mut self,
        book: usize,
        page: usize,
        bytes: usize,
        policy: Policy,
    ) -> Result<NonNull<u8>, ShelfError> {
        self.check_size(bytes)?;
        let books = self.books.len();
        let result = self
            .books
            .get_mut(book)
            .ok_or(ShelfError::BookOutOfRange { book, books })?
            .request_in(page, bytes, policy);
        if let Err(ShelfError::Exhausted { .. }) = result {
            trace!(book, page, bytes, ?policy, "allocation miss");
        }
        result
    }

    /// Return `bytes` at `ptr` to whichever book owns it.
    ///
    /// A pointer no book owns is logged and rejected without touching any
    /// book.
    pub fn deallocate(&mut self, ptr: NonNull<u8>, bytes: usize) -> Result<(), ShelfError> {
        let addr = ptr.as_ptr();
        match self.books.iter_mut().find(|book| book.owned(addr)) {
            Some(book) => book.release(ptr, bytes).inspect_err(|err| {
                warn!(?ptr, bytes, %err, "rejected deallocation");
            }),
            None => {
                warn!(?ptr, bytes, "deallocating a pointer no book owns");
                Err(ShelfError::NotOwned)
            }
        }
    }

    pub fn owned(&self, ptr: *const u8) -> bool {
        self.books.iter().any(|book| book.owned(ptr))
    }

    /// Merge touching free extents everywhere. Returns the number of merges.
    pub fn restore(&mut self) -> usize {
        let merged: usize = self.books.iter_mut().map(Book::restore).sum();
        debug!(merged, "shelf restored");
        merged
    }

    pub fn stats(&self) -> ShelfStats {
        let word = self.config.word_size;
        let mut stats = ShelfStats {
            books: self.books.len(),
            ..ShelfStats::default()
        };
        for page in self.books.iter().flat_map(|b| b.pages()) {
            stats.pages += 1;
            stats.capacity_bytes += page.capacity_bytes();
            stats.live_bytes += page.live_words() * word;
            stats.free_bytes += page.free_words() * word;
            stats.untouched_bytes += page.writable_words() * word;
            stats.free_extents += page.extents().len();
        }
        stats
    }

    fn check_size(&self, bytes: usize) -> Result<(), ShelfError> {
        if bytes == 0 {
            return Err(ShelfError::ZeroSize);
        }
        let max = self.config.words_per_page * self.config.word_size;
        if bytes > max {
            return Err(ShelfError::TooLarge { bytes, max });
        }
        Ok(())
    }
}

impl<A: Allocator + Clone> fmt::Debug for Shelf<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shelf")
            .field("config", &self.config)
            .field("books", &self.books.len())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(Shelf: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ShelfConfig {
        ShelfConfig::default()
            .with_words_per_page(4)
            .with_pages_per_book(2)
    }

    #[test]
    fn new_assigns_configured_books() {
        let shelf = Shelf::new(small().with_books(3)).unwrap();
        assert_eq!(shelf.books().len(), 3);
        let stats = shelf.stats();
        assert_eq!(stats.pages, 6);
        assert_eq!(stats.capacity_bytes, 6 * 32);
        assert_eq!(stats.untouched_bytes, stats.capacity_bytes);
    }

    #[test]
    fn assign_only_grows() {
        let mut shelf = Shelf::new(small()).unwrap();
        shelf.assign(4).unwrap();
        assert_eq!(shelf.books().len(), 4);
        shelf.assign(2).unwrap();
        assert_eq!(shelf.books().len(), 4);
    }

    #[test]
    fn empty_shelf_is_exhausted_until_assigned() {
        let mut shelf = Shelf::new(small().with_books(0)).unwrap();
        assert_eq!(
            shelf.allocate(8),
            Err(ShelfError::Exhausted { words: 1 })
        );
        shelf.assign(1).unwrap();
        assert!(shelf.allocate(8).is_ok());
    }

    #[test]
    fn allocate_walks_books_in_order() {
        let mut shelf = Shelf::new(small().with_books(2)).unwrap();
        let ptrs: Vec<_> = (0..4).map(|_| shelf.allocate(32).unwrap()).collect();
        assert!(shelf.books()[0].owned(ptrs[0].as_ptr()));
        assert!(shelf.books()[0].owned(ptrs[1].as_ptr()));
        assert!(shelf.books()[1].owned(ptrs[2].as_ptr()));
        assert!(shelf.books()[1].owned(ptrs[3].as_ptr()));
        assert_eq!(
            shelf.allocate(1),
            Err(ShelfError::Exhausted { words: 1 })
        );
        assert_eq!(shelf.stats().live_bytes, 4 * 32);
    }

    #[test]
    fn allocate_at_checks_hints() {
        let mut shelf = Shelf::new(small()).unwrap();
        assert_eq!(
            shelf.allocate_at(1, 0, 8, Policy::Balanced),
            Err(ShelfError::BookOutOfRange { book: 1, books: 1 })
        );
        assert_eq!(
            shelf.allocate_at(0, 2, 8, Policy::Balanced),
            Err(ShelfError::PageOutOfRange { page: 2, pages: 2 })
        );
        let ptr = shelf.allocate_at(0, 1, 8, Policy::Balanced).unwrap();
        assert_eq!(shelf.books()[0].page_of(ptr.as_ptr()), Some(1));
    }

    #[test]
    fn foreign_deallocation_changes_nothing() {
        let mut shelf = Shelf::new(small()).unwrap();
        let ptr = shelf.allocate(16).unwrap();
        let before = shelf.stats();

        let mut local = [0u64; 2];
        let foreign = NonNull::from(&mut local).cast::<u8>();
        assert_eq!(shelf.deallocate(foreign, 16), Err(ShelfError::NotOwned));
        assert_eq!(shelf.stats(), before);

        shelf.deallocate(ptr, 16).unwrap();
        assert_eq!(
            shelf.deallocate(ptr, 16),
            Err(ShelfError::DoubleFree {
                offset: 0,
                words: 2
            })
        );
        assert_eq!(shelf.stats().free_bytes, 16);
    }

    #[test]
    fn default_policy_comes_from_config() {
        let mut shelf = Shelf::new(small().with_policy(Policy::Poor)).unwrap();
        assert_eq!(
            shelf.allocate(8),
            Err(ShelfError::Exhausted { words: 1 })
        );
        assert!(shelf.allocate_with(8, Policy::Rich).is_ok());
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(matches!(
            Shelf::new(small().with_word_size(3)),
            Err(ShelfError::InvalidConfig(_))
        ));
    }
}
