//! Lock-free queue primitives for no-std targets.
//!
//! # Highlights
//! - Bounded multi-producer multi-consumer queue with per-slot sequence counters.
//! - No allocation, no locks, no panics on the enqueue/dequeue paths.
//! - Producer counter, consumer counter and slot array live on separate cache lines.
//!
//! # Quick start
//! ```
//! use ph_mpmc::{Empty, Full, MpmcQueue};
//!
//! let queue = MpmcQueue::<u32, 4>::new();
//! for v in 1..=4 {
//!     queue.try_enqueue(v).unwrap();
//! }
//! assert_eq!(queue.try_enqueue(5), Err(Full(5)));
//!
//! assert_eq!(queue.try_dequeue(), Ok(1));
//! assert_eq!(queue.size_approx(), 3);
//! # while queue.try_dequeue().is_ok() {}
//! assert_eq!(queue.try_dequeue(), Err(Empty));
//! ```
//!
//! # Sharing between threads
//! The queue is used through `&self`. Borrow it into scoped threads, wrap it in an
//! `Arc`, or place it in a `static`; it is never cloned and cannot move while borrowed.
//! ```
//! use ph_mpmc::MpmcQueue;
//!
//! let queue = MpmcQueue::<u64, 64>::new();
//! std::thread::scope(|s| {
//!     s.spawn(|| {
//!         for v in 0..100 {
//!             while queue.try_enqueue(v).is_err() {
//!                 std::thread::yield_now();
//!             }
//!         }
//!     });
//!     s.spawn(|| {
//!         let mut next = 0;
//!         while next < 100 {
//!             match queue.try_dequeue() {
//!                 Ok(v) => {
//!                     assert_eq!(v, next);
//!                     next += 1;
//!                 }
//!                 Err(_) => std::thread::yield_now(),
//!             }
//!         }
//!     });
//! });
//! assert!(queue.empty_approx());
//! ```
//!
//! # Capacity
//! `N` must be a non-zero power of two; anything else fails to build.
//! ```compile_fail
//! let queue = ph_mpmc::MpmcQueue::<u32, 3>::new();
//! ```
//!
//! # No-std
//! The crate is `#![no_std]` by default. Tests require `std`.
//!
//! # Semantics
//! - `try_enqueue` hands the value back in [`Full`] when every slot is occupied.
//! - `try_dequeue` returns [`Empty`] when no published item is available.
//! - Blocking, backoff and timeouts are left to the caller.
//! - `size_approx`/`empty_approx` are diagnostics only and may be stale under contention.
//!
//! # Features
//! - `portable-atomic`: take atomics from `portable-atomic` (for targets without native CAS).
//! - `tracing`: emit `tracing` events on construction, rejection and drop.
#![no_std]

pub mod mpmc_queue;
mod sync;
mod trace;

pub use mpmc_queue::{Empty, Full, MpmcQueue};

#[cfg(test)]
extern crate std;
