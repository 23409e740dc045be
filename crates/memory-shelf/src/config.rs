use core::alloc::Layout;

use crate::error::ShelfError;
use crate::policy::Policy;

/// Default word (allocation granule) size in bytes.
pub const DEFAULT_WORD_SIZE: usize = 8;

/// Default number of words per page (4KB pages with 8-byte words).
pub const DEFAULT_WORDS_PER_PAGE: usize = 512;

/// Default number of pages per book.
pub const DEFAULT_PAGES_PER_BOOK: usize = 8;

/// Default number of books a shelf starts with.
pub const DEFAULT_BOOKS: usize = 1;

static_assertions::const_assert!(DEFAULT_WORD_SIZE.is_power_of_two());
static_assertions::const_assert!(DEFAULT_WORDS_PER_PAGE > 0);

/// Geometry and default policy of a [`Shelf`](crate::Shelf).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShelfConfig {
    /// Bytes per word; also the alignment of every returned pointer.
    pub word_size: usize,
    pub words_per_page: usize,
    pub pages_per_book: usize,
    /// Books allocated up front.
    pub books: usize,
    /// Policy used by [`Shelf::allocate`](crate::Shelf::allocate).
    pub policy: Policy,
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            word_size: DEFAULT_WORD_SIZE,
            words_per_page: DEFAULT_WORDS_PER_PAGE,
            pages_per_book: DEFAULT_PAGES_PER_BOOK,
            books: DEFAULT_BOOKS,
            policy: Policy::default(),
        }
    }
}

impl ShelfConfig {
    pub fn with_word_size(mut self, word_size: usize) -> Self {
        self.word_size = word_size;
        self
    }

    pub fn with_words_per_page(mut self, words_per_page: usize) -> Self {
        self.words_per_page = words_per_page;
        self
    }

    pub fn with_pages_per_book(mut self, pages_per_book: usize) -> Self {
        self.pages_per_book = pages_per_book;
        self
    }

    pub fn with_books(mut self, books: usize) -> Self {
        self.books = books;
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Check the geometry before anything is allocated.
    pub fn validate(&self) -> Result<(), ShelfError> {
        if self.word_size == 0 || !self.word_size.is_power_of_two() {
            return Err(ShelfError::InvalidConfig(
                "word_size must be a non-zero power of 2",
            ));
        }
        if self.words_per_page == 0 {
            return Err(ShelfError::InvalidConfig("words_per_page must be > 0"));
        }
        if self.pages_per_book == 0 {
            return Err(ShelfError::InvalidConfig("pages_per_book must be > 0"));
        }
        self.page_layout()?;
        Ok(())
    }

    /// Bytes in one page, if it fits in `usize`.
    pub fn page_bytes(&self) -> Option<usize> {
        self.words_per_page.checked_mul(self.word_size)
    }

    pub(crate) fn page_layout(&self) -> Result<Layout, ShelfError> {
        page_layout(self.word_size, self.words_per_page)
    }
}

pub(crate) fn page_layout(word_size: usize, words: usize) -> Result<Layout, ShelfError> {
    let bytes = words
        .checked_mul(word_size)
        .ok_or(ShelfError::InvalidConfig("page size overflows usize"))?;
    Layout::from_size_align(bytes, word_size)
        .map_err(|_| ShelfError::InvalidConfig("page size exceeds isize::MAX"))
}
