//! Shared-memory inter-process communication primitives, built around a
//! multi-producer single-consumer (MPSC) bounded queue whose nodes live in a
//! process-independent shared-memory segment.
//!
//! # Overview
//! This crate provides the pieces needed to pass fixed-size messages between
//! processes through a single named shared-memory segment:
//!
//! - [`SegmentConfig`](crate::core::SegmentConfig): Configuration for the
//!   backing segment (directory, file-link name, pool size). Use
//!   [`SegmentConfig::builder()`](crate::core::SegmentConfig::builder) to
//!   construct.
//! - [`Pool`](pool::Pool): A block allocator that owns the segment. Every
//!   allocation has a process-local address and a stable byte offset; the
//!   offset resolves to the same logical object in any process that maps the
//!   segment.
//! - [`MpscQueue`](queue::MpscQueue): The bounded FIFO itself, with blocking
//!   and non-blocking enqueue/dequeue, a reservation protocol for producers,
//!   and peeking for the consumer.
//! - [`Mutex`](mutex::Mutex): A three-state futex mutex that lives in shared
//!   memory. The pool serializes allocations with it.
//! - [`futex`]: Thin wrappers over the kernel wait/wake-on-address calls that
//!   all blocking operations park on.
//! - [`TachyonError`](errors::TachyonError): Crate error type.
//!
//! # Concurrency Model and Safety
//!
//! The queue is lock-free on the common path; only pool allocation takes a
//! lock, and only blocking operations ever enter the kernel.
//!
//! - **Producers:** Any number of threads in any number of processes may hold
//!   producer handles to one queue. All producer operations take `&self`.
//! - **Consumer:** Exactly one thread may consume from a queue. All consumer
//!   operations take `&mut self`, and the handle is `Send` but not `Sync`, so
//!   a single handle cannot be consumed from two threads at once. Nothing
//!   stops you from loading two handles and consuming from both; that is a
//!   contract violation and corrupts the queue.
//! - **Payloads:** The element type is copied into shared memory byte-by-byte
//!   and back out again. It must be `Copy`, and must not contain pointers or
//!   any other process-local state, since it will be read in a different
//!   address space.
//!
//! Cross-process references are segment-relative byte offsets, never raw
//! pointers. Handles translate offsets through the pool at construction time
//! and keep the translated pointers for the life of the handle.
//!
//! **User Responsibilities:**
//! - Every process must map the segment with the same configuration.
//! - Freeing a queue ([`MpscQueue::free_queue`](queue::MpscQueue::free_queue))
//!   while any other handle or process still references it is undefined
//!   behavior; dropping a handle without freeing intentionally leaks the
//!   segment memory, since many handles may share one queue.

pub mod core;
pub mod errors;
pub mod futex;
pub mod mutex;
pub mod pool;
pub mod queue;


pub use crate::core::SegmentConfig;
pub use crate::errors::TachyonError;
pub use crate::mutex::Mutex;
pub use crate::pool::Pool;
pub use crate::queue::MpscQueue;
