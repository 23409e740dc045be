#![cfg(feature = "allocator")]

use std::thread;

use memory_shelf::allocator_api2::boxed::Box;
use memory_shelf::{Shelf, ShelfAllocator, ShelfConfig, shelf_vec};

#[test]
fn threads_share_one_shelf() {
    let config = ShelfConfig::default().with_books(4);
    let alloc = ShelfAllocator::new(Shelf::new(config).unwrap());

    let handles: Vec<_> = (0..4u8)
        .map(|id| {
            let alloc = alloc.clone();
            thread::spawn(move || {
                for round in 0..100u8 {
                    let payload = [id ^ round; 48];
                    let vec = shelf_vec(&alloc, &payload);
                    assert_eq!(&vec[..], &payload[..]);
                    let boxed = Box::new_in(u64::from(round), alloc.clone());
                    assert_eq!(*boxed, u64::from(round));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(alloc.stats().live_bytes, 0);
}
