use core::fmt;

/// Everything that can go wrong in the shelf/book/page hierarchy.
///
/// None of these leave the allocator in a broken state: a failed request or
/// release changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelfError {
    /// Configuration rejected by [`ShelfConfig::validate`](crate::ShelfConfig::validate).
    InvalidConfig(&'static str),
    /// Zero-byte requests and releases are not tracked.
    ZeroSize,
    /// Larger than a whole page.
    TooLarge { bytes: usize, max: usize },
    /// No room for `words` words under the chosen policy.
    Exhausted { words: usize },
    /// The backing allocator refused to provide a page.
    AllocFailed { bytes: usize },
    /// Book hint past the end of the shelf.
    BookOutOfRange { book: usize, books: usize },
    /// Page hint past the end of the book.
    PageOutOfRange { page: usize, pages: usize },
    /// Pointer does not belong to this page, book or shelf.
    NotOwned,
    /// Pointer is inside the page but not on a word boundary.
    Misaligned { byte_offset: usize },
    /// Range reaches past the writable cursor, so it was never handed out.
    NeverAllocated { offset: usize, words: usize },
    /// Range overlaps memory that is already free.
    DoubleFree { offset: usize, words: usize },
}

impl fmt::Display for ShelfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(reason) => write!(f, "invalid shelf config: {}", reason),
            Self::ZeroSize => write!(f, "zero-sized request"),
            Self::TooLarge { bytes, max } => {
                write!(f, "request too large: {} bytes, max {}", bytes, max)
            }
            Self::Exhausted { words } => write!(f, "no room for {} words", words),
            Self::AllocFailed { bytes } => write!(f, "failed to allocate a {} byte page", bytes),
            Self::BookOutOfRange { book, books } => {
                write!(f, "book {} out of range ({} books)", book, books)
            }
            Self::PageOutOfRange { page, pages } => {
                write!(f, "page {} out of range ({} pages)", page, pages)
            }
            Self::NotOwned => write!(f, "pointer not owned by this allocator"),
            Self::Misaligned { byte_offset } => {
                write!(f, "pointer at byte offset {} is not word aligned", byte_offset)
            }
            Self::NeverAllocated { offset, words } => write!(
                f,
                "words {}..{} were never allocated",
                offset,
                offset + words
            ),
            Self::DoubleFree { offset, words } => write!(
                f,
                "words {}..{} overlap a free extent",
                offset,
                offset + words
            ),
        }
    }
}

impl std::error::Error for ShelfError {}
