//! The MPSC ring: a lock-free bounded FIFO in shared memory.
//!
//! Any number of producers, exactly one consumer. Non-blocking operations
//! are lock-free and stay in userspace; the blocking variants park on futex
//! words embedded in the queue itself, so they work across processes.
//!
//! Each slot carries its payload, a validity word that doubles as the
//! consumer's parking spot, and a packed ticket word that serializes blocked
//! writers. See [`MpscQueue`] for the handle API.

mod internal;

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem;
use std::mem::MaybeUninit;
use std::ptr;
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;

use crate::core::MAX_QUEUE_CAPACITY;
use crate::errors::TachyonError;
use crate::futex;
use crate::pool::Pool;

use internal::{int_log2, volatile_copy};

// Validity states. Anything else in the word is a bug.
const EMPTY: u32 = 0;
const PUBLISHED: u32 = 1;
const READER_PARKED: u32 = 2;

const TICKET_MASK: u16 = 0x7FFF;
const TAKEN_PARITY: u32 = 1 << 15;
const WOKEN_PARITY: u32 = 1 << 31;

/// One cell of the ring.
#[repr(C)]
struct Node<T> {
    /// Payload storage. Initialized exactly while `valid` is `PUBLISHED`.
    value: UnsafeCell<MaybeUninit<T>>,
    /// 0 empty, 1 published, 2 empty with the reader parked on this word.
    valid: AtomicU32,
    /// Packed ticketing word for blocked writers. Bits 0..=14 count writers
    /// that have arrived at this slot, bits 16..=30 count releases issued for
    /// it; both wrap at 2^15, flipping their parity bits (15 and 31). The
    /// parity comparison tells a waiter which counter has wrapped more
    /// recently, so ordering survives wraparound as long as no more than 2^15
    /// writers wait on one slot at once.
    write_waiters: AtomicU32,
}

impl<T> Node<T> {
    // The two 16-bit counters are updated through half-word atomics, exactly
    // as laid out in `write_waiters`. The deli-ticket check instead reads the
    // whole word in a single 32-bit load, so both counters and both parity
    // bits always come from one consistent snapshot.

    fn taken_half(&self) -> &AtomicU16 {
        let halves = &self.write_waiters as *const AtomicU32 as *const AtomicU16;
        #[cfg(target_endian = "little")]
        let low_half = 0;
        #[cfg(target_endian = "big")]
        let low_half = 1;
        unsafe { &*halves.add(low_half) }
    }

    fn woken_half(&self) -> &AtomicU16 {
        let halves = &self.write_waiters as *const AtomicU32 as *const AtomicU16;
        #[cfg(target_endian = "little")]
        let high_half = 1;
        #[cfg(target_endian = "big")]
        let high_half = 0;
        unsafe { &*halves.add(high_half) }
    }
}

/// Everything the queue keeps in shared memory. Handles in any process are
/// views onto one of these.
#[repr(C)]
struct RawQueue {
    /// Offset of the slot array within the segment.
    array_offset: u64,
    /// Capacity; always a power of two.
    array_length: u32,
    /// Log base 2 of `array_length`.
    array_length_shifts: u8,
    /// Slots currently reserved or occupied, as seen by writers. Exceeds the
    /// capacity exactly while blocking writers are oversubscribed.
    write_length: AtomicU32,
    /// Monotone write cursor; wrapped into range with the mask.
    head_index: AtomicU32,
    /// Advisory count of writers parked on this queue. Exactly zero when no
    /// writer is parked; otherwise an upper bound.
    blocked_threads: AtomicU32,
}

/// A handle onto an MPSC queue in shared memory.
///
/// Producer operations take `&self`; consumer operations take `&mut self`.
/// The handle is `Send` but deliberately not `Sync`: give each producer
/// thread its own handle (via [`load`](MpscQueue::load)), and let exactly one
/// thread own the handle it consumes from.
///
/// `T` is copied into and out of shared memory as raw bytes, so it must be
/// `Copy` and must not contain pointers or other process-local state. Types
/// whose size is a multiple of 8 take the aligned bulk-copy path.
pub struct MpscQueue<T: Copy> {
    pool: Arc<Pool>,
    queue: NonNull<RawQueue>,
    array: NonNull<Node<T>>,
    /// AND against this to wrap an index; `capacity - 1`.
    wrapping_mask: u32,
    /// The consumer's cursor. Process-local on purpose; producers never see
    /// it.
    tail_index: u32,
    _payload: PhantomData<T>,
}

unsafe impl<T: Copy + Send> Send for MpscQueue<T> {}

impl<T: Copy> MpscQueue<T> {
    /// Creates a brand-new queue in the pool's segment.
    ///
    /// `capacity` must be a power of two no larger than
    /// [`MAX_QUEUE_CAPACITY`](crate::core::MAX_QUEUE_CAPACITY). Fails with
    /// [`TachyonError::OutOfSpace`] if the pool cannot hold the queue; in
    /// that case nothing stays allocated.
    pub fn create(pool: &Arc<Pool>, capacity: u32) -> Result<Self, TachyonError> {
        let shifts = int_log2(capacity).ok_or_else(|| {
            TachyonError::Config(format!(
                "queue capacity must be a power of two, got {}",
                capacity
            ))
        })?;
        if capacity > MAX_QUEUE_CAPACITY {
            return Err(TachyonError::Config(format!(
                "queue capacity {} exceeds the maximum of {}",
                capacity, MAX_QUEUE_CAPACITY
            )));
        }

        let queue = pool.allocate_for_type::<RawQueue>()?;
        let array = match pool.allocate_for_array::<Node<T>>(capacity as usize) {
            Ok(array) => array,
            Err(err) => {
                // No partial state on failure.
                pool.free_type(queue);
                return Err(err);
            }
        };

        unsafe {
            let raw = queue.as_ptr();
            ptr::addr_of_mut!((*raw).array_offset).write(pool.offset_of(array) as u64);
            ptr::addr_of_mut!((*raw).array_length).write(capacity);
            ptr::addr_of_mut!((*raw).array_length_shifts).write(shifts);
            ptr::addr_of_mut!((*raw).write_length).write(AtomicU32::new(0));
            ptr::addr_of_mut!((*raw).head_index).write(AtomicU32::new(0));
            ptr::addr_of_mut!((*raw).blocked_threads).write(AtomicU32::new(0));

            for i in 0..capacity as usize {
                let node = array.as_ptr().add(i);
                ptr::addr_of_mut!((*node).valid).write(AtomicU32::new(EMPTY));
                ptr::addr_of_mut!((*node).write_waiters).write(AtomicU32::new(0));
            }
        }

        Ok(MpscQueue {
            pool: Arc::clone(pool),
            queue,
            array,
            wrapping_mask: wrapping_mask(shifts),
            tail_index: 0,
            _payload: PhantomData,
        })
    }

    /// Loads an existing queue from its segment offset. Writes no shared
    /// state, so any number of processes can do this concurrently.
    pub fn load(pool: &Arc<Pool>, offset: usize) -> Self {
        let queue: NonNull<RawQueue> = pool.at_offset(offset);
        let (array_offset, shifts) = unsafe {
            (
                (*queue.as_ptr()).array_offset,
                (*queue.as_ptr()).array_length_shifts,
            )
        };
        let array = pool.at_offset(array_offset as usize);

        MpscQueue {
            pool: Arc::clone(pool),
            queue,
            array,
            wrapping_mask: wrapping_mask(shifts),
            tail_index: 0,
            _payload: PhantomData,
        }
    }

    fn raw(&self) -> &RawQueue {
        unsafe { self.queue.as_ref() }
    }

    fn node(&self, index: u32) -> &Node<T> {
        unsafe { &*self.array.as_ptr().add(index as usize) }
    }

    /// Reserves a slot that nobody can write over but that cannot be read
    /// yet. After a successful reservation the caller MUST follow up with
    /// [`enqueue_at`](MpscQueue::enqueue_at) or
    /// [`cancel_reservation`](MpscQueue::cancel_reservation) on this handle.
    /// Does not block.
    ///
    /// Returns false if the queue is full.
    pub fn reserve(&self) -> bool {
        // Claim length up front to keep other writers from writing off the
        // end.
        let old_length = self.raw().write_length.fetch_add(1, Ordering::AcqRel);
        fence(Ordering::SeqCst);
        if old_length >= self.raw().array_length {
            self.raw().write_length.fetch_sub(1, Ordering::AcqRel);
            return false;
        }

        true
    }

    /// Enqueues into the slot previously reserved on this handle. Undefined
    /// if no reservation is held.
    pub fn enqueue_at(&self, item: T) {
        self.do_enqueue(item, false);
    }

    /// Gives up a reservation previously made on this handle. Undefined if
    /// no reservation is held; a stray call drops a legitimate element's
    /// slot.
    pub fn cancel_reservation(&self) {
        self.raw().write_length.fetch_sub(1, Ordering::AcqRel);
    }

    /// Adds an element without blocking. Lock-free. Returns false if the
    /// queue was already full.
    pub fn enqueue(&self, item: T) -> bool {
        if !self.reserve() {
            return false;
        }
        self.enqueue_at(item);

        true
    }

    /// Adds an element, parking in the kernel while the queue is full.
    pub fn enqueue_blocking(&self, item: T) {
        // Oversubscribe the length unconditionally; the ticket protocol
        // below sorts out who writes when.
        self.raw().write_length.fetch_add(1, Ordering::AcqRel);
        fence(Ordering::SeqCst);

        self.do_enqueue(item, true);
    }

    fn do_enqueue(&self, item: T, can_block: bool) {
        let raw = self.raw();

        // Take a head ticket so no other writer targets the same slot, then
        // pull the shared cursor back into range. Our own copy is masked
        // locally in case a batch of increments ran before their ANDs.
        let mut old_head = raw.head_index.fetch_add(1, Ordering::AcqRel);
        fence(Ordering::SeqCst);
        raw.head_index.fetch_and(self.wrapping_mask, Ordering::AcqRel);
        old_head &= self.wrapping_mask;

        let node = self.node(old_head);

        // Arrival ticket for this slot. Taken even on the non-blocking path,
        // so the counter stays monotone for any blocking writer that lands
        // on this slot later.
        let my_ticket = node.taken_half().fetch_add(1, Ordering::Relaxed);

        if can_block {
            self.write_blocking(node, my_ticket);
        }

        unsafe {
            volatile_copy(
                (*node.value.get()).as_mut_ptr() as *mut u8,
                &item as *const T as *const u8,
                mem::size_of::<T>(),
            );
        }

        // Only now is it safe to tell the reader there is a new element.
        fence(Ordering::SeqCst);
        let old_valid = node.valid.swap(PUBLISHED, Ordering::AcqRel);
        assert_ne!(
            old_valid, PUBLISHED,
            "enqueue overwrote a live element (slot {})",
            old_head
        );
        if old_valid == READER_PARKED {
            let woke_up = futex::wake(&node.valid, 1);
            debug_assert!(woke_up <= 1, "woke the wrong number of readers");
        }
    }

    /// The deli-ticket wait: park until the slot's woken counter reaches the
    /// ticket we drew on arrival.
    fn write_blocking(&self, node: &Node<T>, my_ticket: u16) {
        let my_ticket = my_ticket & TICKET_MASK;
        self.raw().blocked_threads.fetch_add(1, Ordering::Relaxed);

        let mut waiters = node.write_waiters.load(Ordering::Acquire);
        loop {
            let woken = ((waiters >> 16) & TICKET_MASK as u32) as u16;
            // Differing parity bits mean the two counters sit on opposite
            // sides of a 2^15 wrap, which inverts the comparison. Both bits
            // must come from the same 32-bit read.
            let inverted =
                ((waiters & TAKEN_PARITY) != 0) != ((waiters & WOKEN_PARITY) != 0);
            let released = if inverted {
                woken <= my_ticket
            } else {
                woken >= my_ticket
            };
            if released {
                break;
            }

            futex::wait(&node.write_waiters, waiters);
            waiters = node.write_waiters.load(Ordering::Acquire);
        }

        self.raw().blocked_threads.fetch_sub(1, Ordering::Relaxed);
    }

    /// Removes the next element without blocking. Lock-free. Returns `None`
    /// if the queue was empty.
    pub fn dequeue_next(&mut self) -> Option<T> {
        let node = unsafe { self.node_ptr(self.tail_index).as_ref() };
        if node
            .valid
            .compare_exchange(PUBLISHED, EMPTY, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }

        let item = self.do_dequeue(node);

        // Only now is it safe to tell writers there is one fewer element.
        fence(Ordering::SeqCst);
        self.raw().write_length.fetch_sub(1, Ordering::AcqRel);

        Some(item)
    }

    /// Removes the next element, parking in the kernel while the queue is
    /// empty.
    pub fn dequeue_next_blocking(&mut self) -> T {
        let node = unsafe { self.node_ptr(self.tail_index).as_ref() };
        if node
            .valid
            .compare_exchange(PUBLISHED, EMPTY, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            // Nothing to read yet. Announce that we are parked on this slot
            // by marking it with the sentinel.
            if node
                .valid
                .compare_exchange(EMPTY, READER_PARKED, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                while node.valid.load(Ordering::Acquire) == READER_PARKED {
                    futex::wait(&node.valid, READER_PARKED);
                }
            }
            // We are the only consumer, so whichever way we got here the
            // slot can only be published now. Claim it.
            let old_valid = node.valid.swap(EMPTY, Ordering::AcqRel);
            assert_eq!(
                old_valid, PUBLISHED,
                "blocking dequeue consumed an unpublished slot"
            );
        }

        let item = self.do_dequeue(node);

        fence(Ordering::SeqCst);
        let old_length = self.raw().write_length.fetch_sub(1, Ordering::AcqRel);
        if old_length > self.raw().array_length {
            // Writers are oversubscribed, so some may be parked on this
            // slot. Wake them all; the ticket protocol lets only the
            // rightful one proceed.
            futex::wake(&node.write_waiters, futex::WAKE_ALL);
        }

        item
    }

    fn do_dequeue(&mut self, node: &Node<T>) -> T {
        let item = unsafe { ptr::read_volatile((*node.value.get()).as_ptr()) };

        self.tail_index = (self.tail_index + 1) & self.wrapping_mask;

        // Release this slot to the next ticket holder. Published to writers
        // by the write_length decrement that follows.
        node.woken_half().fetch_add(1, Ordering::Relaxed);

        item
    }

    /// Reads the next element without consuming it. Returns `None` if the
    /// queue is empty. Never touches the parked-reader sentinel.
    pub fn peek_next(&mut self) -> Option<T> {
        let node = self.node(self.tail_index);
        if node.valid.load(Ordering::Acquire) != PUBLISHED {
            return None;
        }

        Some(unsafe { ptr::read_volatile((*node.value.get()).as_ptr()) })
    }

    /// Reads the next element without consuming it, parking while the queue
    /// is empty. The slot stays published; the consumer remains obliged to
    /// dequeue it eventually.
    pub fn peek_next_blocking(&mut self) -> T {
        let node = unsafe { self.node_ptr(self.tail_index).as_ref() };
        loop {
            if node.valid.load(Ordering::Acquire) == PUBLISHED {
                return unsafe { ptr::read_volatile((*node.value.get()).as_ptr()) };
            }

            if node
                .valid
                .compare_exchange(EMPTY, READER_PARKED, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                while node.valid.load(Ordering::Acquire) == READER_PARKED {
                    futex::wait(&node.valid, READER_PARKED);
                }
            }
        }
    }

    /// The queue's stable segment offset, for handing to
    /// [`load`](MpscQueue::load) in another process.
    pub fn get_offset(&self) -> usize {
        self.pool.offset_of(self.queue)
    }

    /// Returns the queue's shared memory to the pool.
    ///
    /// # Safety
    /// The caller warrants that no other handle, thread, or process will
    /// touch this queue again, and that no writer or reader is parked on it.
    /// Dropping a handle without calling this leaks the memory instead,
    /// which is the safe default when other handles may exist.
    pub unsafe fn free_queue(self) {
        let capacity = self.raw().array_length as usize;
        self.pool.free_array(self.array, capacity);
        self.pool.free_type(self.queue);
    }

    fn node_ptr(&self, index: u32) -> NonNull<Node<T>> {
        unsafe { NonNull::new_unchecked(self.array.as_ptr().add(index as usize)) }
    }
}

fn wrapping_mask(shifts: u8) -> u32 {
    // Shifting a u32 by 32 is undefined, so capacity 1 is special-cased.
    if shifts == 0 {
        0
    } else {
        u32::MAX >> (32 - shifts)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::core::SegmentConfig;

    static TEST_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn get_pool() -> (Arc<Pool>, TempDir) {
        let test_id = TEST_ID_COUNTER.fetch_add(1, AtomicOrdering::SeqCst);
        let dir = tempdir().expect("failed to create tempdir");
        let cfg = SegmentConfig::builder()
            .data_dir(
                dir.path()
                    .to_str()
                    .expect("tempdir path is not valid UTF-8")
                    .to_string(),
            )
            .segment_file_name(format!("tachyon-queue-{}-{}", std::process::id(), test_id))
            .build()
            .expect("test config should be valid");
        (
            Arc::new(Pool::create(&cfg).expect("failed to create pool")),
            dir,
        )
    }

    #[test]
    fn enqueue_fills_to_capacity_and_no_further() -> Result<(), TachyonError> {
        let (pool, _dir) = get_pool();
        let mut queue = MpscQueue::<i32>::create(&pool, 4)?;

        for i in 0..4 {
            assert!(queue.enqueue(10 * (i + 1)));
        }
        assert!(!queue.enqueue(50));

        for i in 0..4 {
            assert_eq!(Some(10 * (i + 1)), queue.dequeue_next());
        }
        assert_eq!(None, queue.dequeue_next());

        // One slot freed makes one enqueue possible again.
        assert!(queue.enqueue(60));
        assert_eq!(Some(60), queue.dequeue_next());
        Ok(())
    }

    #[test]
    fn dequeues_in_fifo_order() -> Result<(), TachyonError> {
        let (pool, _dir) = get_pool();
        let mut queue = MpscQueue::<i32>::create(&pool, 64)?;

        for i in 0..10 {
            assert!(queue.enqueue(i));
        }
        for i in 0..10 {
            assert_eq!(Some(i), queue.dequeue_next());
        }
        assert_eq!(None, queue.dequeue_next());
        Ok(())
    }

    #[test]
    fn interleaved_operations_wrap_the_ring() -> Result<(), TachyonError> {
        let (pool, _dir) = get_pool();
        let mut queue = MpscQueue::<i32>::create(&pool, 8)?;

        // Two in, one out, so the cursors lap the array several times.
        let mut dequeue_counter = 0;
        for i in (0..20).step_by(2) {
            assert!(queue.enqueue(i));
            assert!(queue.enqueue(i + 1));

            assert_eq!(Some(dequeue_counter), queue.dequeue_next());
            dequeue_counter += 1;
        }
        for _ in 0..10 {
            assert_eq!(Some(dequeue_counter), queue.dequeue_next());
            dequeue_counter += 1;
        }
        assert_eq!(None, queue.dequeue_next());
        Ok(())
    }

    #[test]
    fn blocking_variants_work_uncontended() -> Result<(), TachyonError> {
        let (pool, _dir) = get_pool();
        let mut queue = MpscQueue::<i32>::create(&pool, 64)?;

        let mut dequeue_counter = 0;
        for i in (0..20).step_by(2) {
            queue.enqueue_blocking(i);
            queue.enqueue_blocking(i + 1);

            assert_eq!(dequeue_counter, queue.dequeue_next_blocking());
            dequeue_counter += 1;
        }
        for _ in 0..10 {
            assert_eq!(dequeue_counter, queue.dequeue_next_blocking());
            dequeue_counter += 1;
        }
        assert_eq!(None, queue.dequeue_next());
        Ok(())
    }

    #[test]
    fn reservations_hold_and_release_slots() -> Result<(), TachyonError> {
        let (pool, _dir) = get_pool();
        let mut consumer = MpscQueue::<i32>::create(&pool, 2)?;
        let offset = consumer.get_offset();

        let first = MpscQueue::<i32>::load(&pool, offset);
        let second = MpscQueue::<i32>::load(&pool, offset);
        let third = MpscQueue::<i32>::load(&pool, offset);

        assert!(first.reserve());
        assert!(second.reserve());
        // Queue of two is fully reserved now.
        assert!(!third.reserve());

        first.enqueue_at(7);
        second.cancel_reservation();

        assert_eq!(Some(7), consumer.dequeue_next());
        assert_eq!(None, consumer.dequeue_next());

        // The cancelled slot is usable again.
        assert!(third.reserve());
        third.cancel_reservation();
        Ok(())
    }

    #[test]
    fn peek_does_not_consume() -> Result<(), TachyonError> {
        let (pool, _dir) = get_pool();
        let mut queue = MpscQueue::<i32>::create(&pool, 4)?;

        assert_eq!(None, queue.peek_next());

        assert!(queue.enqueue(31));
        assert_eq!(Some(31), queue.peek_next());
        assert_eq!(Some(31), queue.peek_next());
        assert_eq!(31, queue.peek_next_blocking());
        assert_eq!(Some(31), queue.dequeue_next());
        assert_eq!(None, queue.peek_next());
        Ok(())
    }

    #[test]
    fn loaded_handles_share_the_queue() -> Result<(), TachyonError> {
        let (pool, _dir) = get_pool();
        let mut consumer = MpscQueue::<u64>::create(&pool, 8)?;

        let producer = MpscQueue::<u64>::load(&pool, consumer.get_offset());
        assert!(producer.enqueue(123));

        assert_eq!(Some(123), consumer.dequeue_next());
        Ok(())
    }

    #[test]
    fn rejects_capacities_that_are_not_powers_of_two() {
        let (pool, _dir) = get_pool();
        assert!(matches!(
            MpscQueue::<i32>::create(&pool, 3),
            Err(TachyonError::Config(_))
        ));
        assert!(matches!(
            MpscQueue::<i32>::create(&pool, 0),
            Err(TachyonError::Config(_))
        ));
        assert!(matches!(
            MpscQueue::<i32>::create(&pool, MAX_QUEUE_CAPACITY * 2),
            Err(TachyonError::Config(_))
        ));
    }

    #[test]
    fn capacity_one_wraps_in_place() -> Result<(), TachyonError> {
        let (pool, _dir) = get_pool();
        let mut queue = MpscQueue::<i32>::create(&pool, 1)?;

        for i in 0..5 {
            assert!(queue.enqueue(i));
            assert!(!queue.enqueue(i));
            assert_eq!(Some(i), queue.dequeue_next());
        }
        assert_eq!(None, queue.dequeue_next());
        Ok(())
    }

    #[test]
    fn creation_failure_leaves_no_partial_state() {
        let (pool, _dir) = get_pool();

        // The header fits but a slot array this large cannot.
        let result = MpscQueue::<[u8; 1024]>::create(&pool, 256);
        assert!(matches!(result, Err(TachyonError::OutOfSpace)));

        // Everything was unwound, so a modest queue still fits at the very
        // start of the pool.
        let queue =
            MpscQueue::<i32>::create(&pool, 4).expect("pool should be empty after the failure");
        assert_eq!(0, queue.get_offset());
    }

    #[test]
    fn freed_queues_release_their_memory() -> Result<(), TachyonError> {
        let (pool, _dir) = get_pool();

        let queue = MpscQueue::<i32>::create(&pool, 4)?;
        let offset = queue.get_offset();
        unsafe { queue.free_queue() };

        let again = MpscQueue::<i32>::create(&pool, 4)?;
        assert_eq!(offset, again.get_offset());
        Ok(())
    }

    #[test]
    fn ticket_counters_survive_wraparound() -> Result<(), TachyonError> {
        let (pool, _dir) = get_pool();
        let mut queue = MpscQueue::<u32>::create(&pool, 1)?;

        // Run the slot's 15-bit taken/woken counters through several parity
        // flips (at 2^15) and a full 16-bit wrap (at 2^16). The occasional
        // blocking enqueue exercises the parity comparison in every epoch;
        // the queue is never full here, so it must always be released
        // immediately.
        for i in 0..100_000u32 {
            if i % 1000 == 0 {
                queue.enqueue_blocking(i);
            } else {
                assert!(queue.enqueue(i));
            }
            assert_eq!(Some(i), queue.dequeue_next());
        }
        assert_eq!(None, queue.dequeue_next());
        Ok(())
    }

    #[test]
    fn payloads_round_trip_byte_for_byte() -> Result<(), TachyonError> {
        // A multiple-of-eight prefix plus a tail exercises both copy paths.
        #[repr(C)]
        #[derive(Clone, Copy, Debug, PartialEq)]
        struct Telemetry {
            timestamp: u64,
            sequence: u64,
            flags: u32,
        }

        let (pool, _dir) = get_pool();
        let mut queue = MpscQueue::<Telemetry>::create(&pool, 4)?;

        let sample = Telemetry {
            timestamp: 0x0123_4567_89ab_cdef,
            sequence: 42,
            flags: 0xdead_beef,
        };
        assert!(queue.enqueue(sample));
        assert_eq!(Some(sample), queue.dequeue_next());
        Ok(())
    }
}
