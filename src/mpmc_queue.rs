//! Lock-free bounded MPMC queue over a ring of sequence-stamped slots.
//!
//! # Overview
//! - Any number of producers and consumers share one `&MpmcQueue`.
//! - Fixed capacity `N` (non-zero power of two), storage is inline: no allocation.
//! - Operations never block: `try_enqueue` fails with [`Full`], `try_dequeue` with [`Empty`].
//! - Ordering is FIFO per slot generation; producers racing each other are ordered by
//!   whichever wins the claim on the shared counter.
//!
//! # Protocol
//! Every slot carries a sequence stamp. Position `pos` is writable when its slot's stamp
//! is `2 * pos` and readable when it is `2 * pos + 1`; slot `i` starts at `2 * i`. A
//! producer that observes the writable stamp claims `pos` by advancing the producer
//! counter, writes the value and publishes the readable stamp. A consumer that observes
//! the readable stamp claims `pos` on the consumer counter, reads the value and stores
//! `2 * (pos + N)`, the writable stamp of the slot's next generation. Writable and
//! readable stamps differ in parity, so the two states never alias, even for `N == 1`.
//!
//! # Memory ordering
//! The counters are advanced with relaxed CAS; all value hand-off goes through the slot
//! sequence: acquire load before touching the value, release store after.

use core::fmt;
use core::mem::MaybeUninit;

use crossbeam_utils::CachePadded;

use crate::sync::{AtomicUsize, Ordering, UnsafeCell};
use crate::trace::{debug, trace};

struct Slot<T> {
    sequence: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new(sequence: usize) -> Self {
        Self {
            sequence: AtomicUsize::new(sequence),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

#[inline(always)]
const fn writable_stamp(pos: usize) -> usize {
    pos.wrapping_mul(2)
}

#[inline(always)]
const fn readable_stamp(pos: usize) -> usize {
    writable_stamp(pos).wrapping_add(1)
}

fn slot_array<T, const N: usize>() -> [Slot<T>; N] {
    core::array::from_fn(|i| Slot::new(writable_stamp(i)))
}

/// Returned by [`MpmcQueue::try_enqueue`] when every slot is occupied.
/// Carries the rejected value back to the caller.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Take back the value that could not be enqueued.
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Full").finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is full")
    }
}

impl<T> core::error::Error for Full<T> {}

/// Returned by [`MpmcQueue::try_dequeue`] when no published item is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Empty;

impl fmt::Display for Empty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue is empty")
    }
}

impl core::error::Error for Empty {}

/// Bounded lock-free multi-producer multi-consumer queue.
///
/// The queue is shared by reference; it is neither `Clone` nor `Copy`, and the
/// borrow checker pins it in place for as long as any thread holds `&self`.
pub struct MpmcQueue<T, const N: usize> {
    enqueue_pos: CachePadded<AtomicUsize>,
    dequeue_pos: CachePadded<AtomicUsize>,
    slots: CachePadded<[Slot<T>; N]>,
}

// Exclusive access to a slot's value is granted by the sequence protocol.
unsafe impl<T: Send, const N: usize> Sync for MpmcQueue<T, N> {}

impl<T, const N: usize> MpmcQueue<T, N> {
    /// Maximum number of items the queue holds.
    pub const CAPACITY: usize = N;

    const MASK: usize = N.wrapping_sub(1);

    const VALID_CAPACITY: () = assert!(
        N > 0 && N.is_power_of_two(),
        "MpmcQueue capacity must be a non-zero power of two"
    );

    /// Create an empty queue.
    ///
    /// A capacity that is zero or not a power of two is rejected when the
    /// program is built.
    pub fn new() -> Self {
        let () = Self::VALID_CAPACITY;
        debug!(capacity = N, "mpmc queue created");
        Self {
            enqueue_pos: CachePadded::new(AtomicUsize::new(0)),
            dequeue_pos: CachePadded::new(AtomicUsize::new(0)),
            slots: CachePadded::new(slot_array::<T, N>()),
        }
    }

    #[inline(always)]
    fn slot(&self, pos: usize) -> &Slot<T> {
        &self.slots[pos & Self::MASK]
    }

    /// Try to move `value` into the queue.
    ///
    /// On a full queue the value is handed back inside [`Full`] and no slot is touched.
    pub fn try_enqueue(&self, value: T) -> Result<(), Full<T>> {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let slot = self.slot(pos);
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(writable_stamp(pos)) as isize;

            if diff == 0 {
                match self.enqueue_pos.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // The CAS made this thread the only writer of `slot` for generation `pos`.
                        slot.value
                            .with_mut(|cell| unsafe { (*cell).as_mut_ptr().write(value) });
                        slot.sequence.store(readable_stamp(pos), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                trace!(pos, "enqueue rejected: queue full");
                return Err(Full(value));
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Enqueue a clone of `value`. Returns `false` if the queue is full.
    ///
    /// The clone is taken before a slot is claimed, so a panicking `Clone`
    /// leaves the queue untouched.
    #[must_use]
    #[inline]
    pub fn try_enqueue_cloned(&self, value: &T) -> bool
    where
        T: Clone,
    {
        self.try_enqueue(value.clone()).is_ok()
    }

    /// Try to take the oldest published item.
    pub fn try_dequeue(&self) -> Result<T, Empty> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let slot = self.slot(pos);
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(readable_stamp(pos)) as isize;

            if diff == 0 {
                match self.dequeue_pos.compare_exchange_weak(
                    pos,
                    pos.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // Published by the producer of generation `pos`; the CAS made us its only reader.
                        let value = slot.value.with(|cell| unsafe { (*cell).assume_init_read() });
                        slot.sequence
                            .store(writable_stamp(pos.wrapping_add(N)), Ordering::Release);
                        return Ok(value);
                    }
                    Err(current) => pos = current,
                }
            } else if diff < 0 {
                trace!(pos, "dequeue rejected: queue empty");
                return Err(Empty);
            } else {
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Dequeue into `out`, dropping its previous value.
    /// Returns `false` (leaving `out` untouched) if the queue is empty.
    #[must_use]
    #[inline]
    pub fn try_dequeue_into(&self, out: &mut T) -> bool {
        match self.try_dequeue() {
            Ok(value) => {
                *out = value;
                true
            }
            Err(Empty) => false,
        }
    }

    /// Fixed capacity `N`.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of queued items as seen by two independent counter reads.
    ///
    /// Only meaningful when no other thread is mutating the queue; under
    /// contention it can be stale. Always within `0..=N`.
    pub fn size_approx(&self) -> usize {
        let head = self.enqueue_pos.load(Ordering::Relaxed);
        let tail = self.dequeue_pos.load(Ordering::Relaxed);
        let diff = head.wrapping_sub(tail) as isize;
        if diff <= 0 { 0 } else { (diff as usize).min(N) }
    }

    /// `size_approx() == 0`; same caveats apply.
    #[inline]
    pub fn empty_approx(&self) -> bool {
        self.size_approx() == 0
    }
}

impl<T, const N: usize> Default for MpmcQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> fmt::Debug for MpmcQueue<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpmcQueue")
            .field("capacity", &N)
            .field("size_approx", &self.size_approx())
            .finish_non_exhaustive()
    }
}

impl<T, const N: usize> Drop for MpmcQueue<T, N> {
    fn drop(&mut self) {
        let head = self.enqueue_pos.load(Ordering::Relaxed);
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        if pos != head {
            debug!(remaining = head.wrapping_sub(pos), "mpmc queue dropped with items queued");
        }
        // `&mut self`: every claimed position in `pos..head` has been published.
        while pos != head {
            let slot = self.slot(pos);
            slot.value.with_mut(|cell| unsafe { (*cell).assume_init_drop() });
            pos = pos.wrapping_add(1);
        }
    }
}
