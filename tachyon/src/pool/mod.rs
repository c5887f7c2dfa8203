//! Shared-memory pool allocator.
//!
//! The pool owns the segment. Its metadata (a header and a block-allocation
//! bitfield) sits at the start of the mapping; the data region follows,
//! aligned to the block size. Allocation hands out runs of whole blocks and
//! records them in the bitfield, so the returned ranges carry no per-object
//! header. Durable references into the data region are byte offsets, which
//! resolve to the same logical object in every process mapping the segment.

use std::mem;
use std::ptr;
use std::ptr::NonNull;

use shared_memory::Shmem;

use crate::core::{create_segment, open_segment, SegmentConfig, BLOCK_SIZE};
use crate::errors::TachyonError;
use crate::mutex::Mutex;

/// Lives at offset zero of the mapping and tracks everything the allocator
/// needs to share between processes.
#[repr(C)]
struct PoolHeader {
    /// Size of the data region in bytes.
    data_size: u32,
    /// Number of blocks in the data region.
    num_blocks: u32,
    /// Serializes all access to the block-allocation bitfield.
    allocation_lock: Mutex,
}

#[derive(Clone, Copy)]
struct PoolLayout {
    data_size: usize,
    num_blocks: usize,
    block_bytes: usize,
    header_overhead: usize,
}

fn round_up_to_block(bytes: usize) -> usize {
    (bytes + BLOCK_SIZE - 1) / BLOCK_SIZE * BLOCK_SIZE
}

fn layout_for(pool_size: usize) -> PoolLayout {
    let data_size = round_up_to_block(pool_size);
    let num_blocks = data_size / BLOCK_SIZE;
    // One bit per block in the allocation bitfield.
    let block_bytes = (num_blocks + 7) / 8;
    let header_overhead = round_up_to_block(mem::size_of::<PoolHeader>() + block_bytes);
    PoolLayout {
        data_size,
        num_blocks,
        block_bytes,
        header_overhead,
    }
}

/// A handle onto the segment-wide allocator. Many handles (in many
/// processes) may reference one segment; they coordinate exclusively through
/// the shared header.
pub struct Pool {
    header: NonNull<PoolHeader>,
    bitmap: NonNull<u8>,
    data: NonNull<u8>,
    block_bytes: usize,
    // Keeps the mapping alive for as long as the pointers above are in use.
    _shmem: Shmem,
}

// All shared state behind these pointers is either immutable after segment
// creation or guarded by the in-segment allocation lock.
unsafe impl Send for Pool {}
unsafe impl Sync for Pool {}

impl Pool {
    /// Maps the configured segment, creating and initializing it if this is
    /// the first process to arrive. If the segment already exists, this
    /// attaches instead and the existing layout wins.
    pub fn create(cfg: &SegmentConfig) -> Result<Pool, TachyonError> {
        let layout = layout_for(cfg.pool_size);
        let (shmem, created) =
            create_segment(cfg, layout.data_size + layout.header_overhead)?;
        if !created {
            return Ok(unsafe { Pool::attach(shmem) });
        }

        let pool = unsafe { Pool::from_mapping(shmem, &layout) };
        unsafe {
            let header = pool.header.as_ptr();
            (*header).data_size = layout.data_size as u32;
            (*header).num_blocks = layout.num_blocks as u32;
            (*header).allocation_lock.init();
        }
        pool.clear();

        Ok(pool)
    }

    /// Attaches to an existing segment. Never writes shared state.
    pub fn open(cfg: &SegmentConfig) -> Result<Pool, TachyonError> {
        let shmem = open_segment(cfg)?;
        Ok(unsafe { Pool::attach(shmem) })
    }

    /// Builds a handle over an already-initialized mapping, deriving the
    /// layout from the shared header.
    unsafe fn attach(shmem: Shmem) -> Pool {
        let header = shmem.as_ptr() as *const PoolHeader;
        let data_size = (*header).data_size as usize;
        let num_blocks = (*header).num_blocks as usize;
        let block_bytes = (num_blocks + 7) / 8;
        let layout = PoolLayout {
            data_size,
            num_blocks,
            block_bytes,
            header_overhead: round_up_to_block(mem::size_of::<PoolHeader>() + block_bytes),
        };
        Pool::from_mapping(shmem, &layout)
    }

    unsafe fn from_mapping(shmem: Shmem, layout: &PoolLayout) -> Pool {
        let base = shmem.as_ptr();
        Pool {
            header: NonNull::new_unchecked(base as *mut PoolHeader),
            bitmap: NonNull::new_unchecked(base.add(mem::size_of::<PoolHeader>())),
            data: NonNull::new_unchecked(base.add(layout.header_overhead)),
            block_bytes: layout.block_bytes,
            _shmem: shmem,
        }
    }

    fn header(&self) -> &PoolHeader {
        unsafe { self.header.as_ref() }
    }

    /// Size of the data region in bytes.
    pub fn size(&self) -> usize {
        self.header().data_size as usize
    }

    /// Allocation granularity. Requesting less than one block still occupies
    /// a whole block.
    pub const fn block_size() -> usize {
        BLOCK_SIZE
    }

    fn num_blocks(&self) -> usize {
        self.header().num_blocks as usize
    }

    // The bitfield helpers below must only be called with the allocation
    // lock held.

    fn block_in_use(&self, block: usize) -> bool {
        unsafe { *self.bitmap.as_ptr().add(block >> 3) & (1 << (block & 7)) != 0 }
    }

    fn set_blocks(&self, start: usize, count: usize, in_use: bool) {
        for block in start..start + count {
            let byte = unsafe { self.bitmap.as_ptr().add(block >> 3) };
            let mask = 1u8 << (block & 7);
            unsafe {
                if in_use {
                    *byte |= mask;
                } else {
                    *byte &= !mask;
                }
            }
        }
    }

    /// Allocates `size` bytes, rounded up to whole blocks, from the smallest
    /// free run that fits.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, TachyonError> {
        assert!(size > 0, "allocating a zero-length region");
        let blocks_needed = (size + BLOCK_SIZE - 1) / BLOCK_SIZE;
        let num_blocks = self.num_blocks();

        let _guard = self.header().allocation_lock.lock();

        let mut best: Option<(usize, usize)> = None;
        let mut run_start = 0;
        let mut run_length = 0;
        for block in 0..num_blocks {
            if self.block_in_use(block) {
                if run_length >= blocks_needed
                    && best.map_or(true, |(_, length)| run_length < length)
                {
                    best = Some((run_start, run_length));
                }
                run_length = 0;
            } else {
                if run_length == 0 {
                    run_start = block;
                }
                run_length += 1;
            }
        }
        if run_length >= blocks_needed && best.map_or(true, |(_, length)| run_length < length) {
            best = Some((run_start, run_length));
        }

        let (start, _) = best.ok_or(TachyonError::OutOfSpace)?;
        self.set_blocks(start, blocks_needed, true);

        Ok(unsafe { NonNull::new_unchecked(self.data.as_ptr().add(start * BLOCK_SIZE)) })
    }

    /// Claims the blocks covering `[offset, offset + size)`. Used for regions
    /// whose location every process must agree on up front, like the
    /// name-map at offset zero. Fails if any covered block is taken.
    pub fn allocate_at(&self, offset: usize, size: usize) -> Result<NonNull<u8>, TachyonError> {
        assert!(size > 0, "allocating a zero-length region");
        assert!(
            offset + size <= self.size(),
            "cannot allocate a segment this big"
        );
        let start_block = offset / BLOCK_SIZE;
        let end_block = (offset + size - 1) / BLOCK_SIZE;

        let _guard = self.header().allocation_lock.lock();

        for block in start_block..=end_block {
            if self.block_in_use(block) {
                return Err(TachyonError::OutOfSpace);
            }
        }
        self.set_blocks(start_block, end_block - start_block + 1, true);

        Ok(unsafe { NonNull::new_unchecked(self.data.as_ptr().add(offset)) })
    }

    /// Returns a region obtained from [`allocate`](Pool::allocate) (or the
    /// typed helpers) to the pool. `size` must match the allocation.
    pub fn free(&self, region: NonNull<u8>, size: usize) {
        assert!(size > 0, "freeing a zero-length region");
        let offset = self.offset_of(region);
        let start_block = offset / BLOCK_SIZE;
        let end_block = (offset + size - 1) / BLOCK_SIZE;

        let _guard = self.header().allocation_lock.lock();
        self.set_blocks(start_block, end_block - start_block + 1, false);
    }

    /// Allocates enough space to hold a `T`. Block granularity guarantees the
    /// result is aligned for any reasonable `T`.
    pub fn allocate_for_type<T>(&self) -> Result<NonNull<T>, TachyonError> {
        Ok(self.allocate(mem::size_of::<T>())?.cast())
    }

    /// Allocates enough space to hold `length` contiguous `T`s.
    pub fn allocate_for_array<T>(&self, length: usize) -> Result<NonNull<T>, TachyonError> {
        Ok(self.allocate(mem::size_of::<T>() * length)?.cast())
    }

    pub fn free_type<T>(&self, object: NonNull<T>) {
        self.free(object.cast(), mem::size_of::<T>());
    }

    pub fn free_array<T>(&self, array: NonNull<T>, length: usize) {
        self.free(array.cast(), mem::size_of::<T>() * length);
    }

    /// Translates a stable offset into a process-local pointer. Undefined if
    /// `offset` was not produced by this segment's allocator.
    pub fn at_offset<T>(&self, offset: usize) -> NonNull<T> {
        assert!(offset < self.size(), "offset out of bounds");
        unsafe { NonNull::new_unchecked(self.data.as_ptr().add(offset) as *mut T) }
    }

    /// The inverse of [`at_offset`](Pool::at_offset): O(1) pointer
    /// subtraction against the data region's base.
    pub fn offset_of<T>(&self, object: NonNull<T>) -> usize {
        object.as_ptr() as usize - self.data.as_ptr() as usize
    }

    /// Whether the block containing `offset` is currently allocated.
    pub fn is_used(&self, offset: usize) -> bool {
        let _guard = self.header().allocation_lock.lock();
        self.block_in_use(offset / BLOCK_SIZE)
    }

    /// Forcefully marks every block free. Existing allocations become
    /// dangling; only call this when no other user of the segment remains.
    pub fn clear(&self) {
        let _guard = self.header().allocation_lock.lock();
        unsafe { ptr::write_bytes(self.bitmap.as_ptr(), 0, self.block_bytes) };
    }
}
