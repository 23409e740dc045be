//! Word-granular manual memory allocator.
//!
//! Memory is organised in three levels:
//!
//! ```text
//! Shelf ─┬─ Book ─┬─ Page  [ live | free | live | ....... untouched ....... ]
//!        │        ├─ Page
//!        │        └─ ...
//!        └─ Book ── ...
//! ```
//!
//! A [`Page`] is one contiguous region split into fixed-size words. It hands
//! out ranges by carving the never-touched tail or by reusing freed extents,
//! depending on the [`Policy`]. A [`Book`] is a fixed set of pages with an
//! address map for pointer-to-page lookup. A [`Shelf`] is a growable list of
//! books and the entry point for allocation and deallocation.
//!
//! The allocator is single-threaded. Share it across threads through the
//! `allocator` feature's [`ShelfAllocator`], which wraps the shelf in a
//! mutex and implements `allocator_api2::alloc::Allocator`:
//!
//! ```toml
//! [dependencies]
//! memory-shelf = { version = "0.5", features = ["allocator"] }
//! ```

#[cfg(any(feature = "allocator", test))]
mod alloc;
mod book;
mod config;
mod error;
mod extent;
mod page;
mod policy;
mod shelf;

#[cfg(any(feature = "allocator", test))]
pub use alloc::ShelfAllocator;
pub use book::Book;
pub use config::{
    DEFAULT_BOOKS, DEFAULT_PAGES_PER_BOOK, DEFAULT_WORD_SIZE, DEFAULT_WORDS_PER_PAGE, ShelfConfig,
};
pub use error::ShelfError;
pub use extent::{Extent, ExtentCache, ExtentIndex};
pub use page::Page;
pub use policy::Policy;
pub use shelf::{Shelf, ShelfStats};

#[cfg(feature = "allocator")]
pub use allocator_api2;

/// Copy `bytes` into a `Vec<u8>` that lives on the shelf.
#[cfg(any(feature = "allocator", test))]
pub fn shelf_vec(
    alloc: &ShelfAllocator,
    bytes: &[u8],
) -> allocator_api2::vec::Vec<u8, ShelfAllocator> {
    let mut vec = allocator_api2::vec::Vec::new_in(alloc.clone());
    vec.extend_from_slice(bytes);
    vec
}

/// Empty `Vec<u8>` on the shelf with room for `capacity` bytes.
#[cfg(any(feature = "allocator", test))]
pub fn shelf_vec_with_capacity(
    alloc: &ShelfAllocator,
    capacity: usize,
) -> allocator_api2::vec::Vec<u8, ShelfAllocator> {
    allocator_api2::vec::Vec::with_capacity_in(capacity, alloc.clone())
}
