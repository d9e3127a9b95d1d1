//! Basic usage of the `handle_pool` crate:
//!
//! * Creating a pool.
//! * Creating objects and holding on to their handles.
//! * Destroying objects and observing stale handles.
//! * Positional access to the dense live range.

use handle_pool::{Handle, ObjectPool};

fn main() {
    let mut pool = ObjectPool::<String>::new();

    println!(
        "Each block of {} bytes holds {} objects",
        pool.block_size(),
        pool.objects_per_block()
    );

    pool.connect_object_destruction_handler(|name| println!("Destroying {name}"));

    // Creating an object gives you a handle that you can later use to find the object again.
    let mut alice = pool.create_object("Alice".to_string()).unwrap();
    let bob = pool.create_object("Bob".to_string()).unwrap();
    let charlie = pool.create_object("Charlie".to_string()).unwrap();

    let stale_alice = alice.clone();
    assert!(alice.destroy());

    // Destroying Alice moved Charlie into her slot. The handles do not care.
    println!("Bob via handle: {:?}", bob.with(String::clone));
    println!("Charlie via handle: {:?}", charlie.with(String::clone));
    println!("Alice via stale handle: {:?}", stale_alice.with(String::clone));

    // The live objects are always densely packed, so positional access is straightforward.
    for index in 0..pool.len() {
        let name = pool.at(index).unwrap();
        println!("Object at index {index}: {name}");
    }

    // Given a reference to an object, we can find its handle again.
    let recovered = pool.with_iter(|mut iter| iter.next().and_then(Handle::from_payload));
    println!(
        "Recovered handle of first object matches Charlie: {}",
        recovered.as_ref() == Some(&charlie)
    );

    drop(pool);

    // The handles outlive the pool but can no longer reach anything.
    println!("Bob after pool drop: {:?}", bob.with(String::clone));
}
