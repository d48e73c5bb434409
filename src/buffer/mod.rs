//! Owned I/O buffers for in-flight requests.
//!
//! [`IoBuffer`] is the memory a request hands to the asynchronous I/O facility.
//! It never moves while the request is registered, and it records two lengths:
//!
//! - `len`: the bytes the caller asked to transfer
//! - `capacity`: the bytes actually allocated, which under the page-aligned
//!   strategy is `len` rounded up to a whole number of pages
//!
//! Direct I/O requires transfers sized in whole pages, so a direct read submits
//! `capacity` bytes while only the first `len` bytes carry file data.
//!
//! ```rust
//! use safer_aio::buffer::{page_size, AllocationStrategy, IoBuffer};
//!
//! let buffer = IoBuffer::allocate(100, AllocationStrategy::PageAligned).unwrap();
//! assert_eq!(buffer.len(), 100);
//! assert_eq!(buffer.capacity(), page_size());
//! assert!(buffer.is_page_aligned());
//!
//! let buffer = IoBuffer::allocate(100, AllocationStrategy::Heap).unwrap();
//! assert_eq!(buffer.capacity(), 100);
//! ```

/// Page size discovery, rounding and layout helpers.
pub mod allocation;

pub use allocation::{is_aligned, page_size, round_up};

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::error::{AioError, Result};

/// How an [`IoBuffer`] is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStrategy {
    /// Page-aligned address, length rounded up to whole pages.
    PageAligned,
    /// Exactly the requested length from the general heap.
    Heap,
}

impl AllocationStrategy {
    /// Strategy for read buffers: aligned only when direct I/O demands it.
    pub fn for_reads(direct_io: bool) -> Self {
        if direct_io {
            AllocationStrategy::PageAligned
        } else {
            AllocationStrategy::Heap
        }
    }

    /// Strategy for write buffers, which are always alignment-prepared.
    pub fn for_writes() -> Self {
        AllocationStrategy::PageAligned
    }
}

/// A zero-initialized, heap-allocated buffer with a stable address.
///
/// The memory is released exactly once, when the buffer is dropped.
pub struct IoBuffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
    strategy: AllocationStrategy,
}

// SAFETY: IoBuffer uniquely owns its allocation, like Box<[u8]>.
unsafe impl Send for IoBuffer {}
// SAFETY: shared access only hands out `&[u8]`.
unsafe impl Sync for IoBuffer {}

impl IoBuffer {
    /// Allocate a buffer able to hold `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AioError::Allocation`] when `len` is zero, when the rounded
    /// size overflows, or when the allocator returns null.
    pub fn allocate(len: usize, strategy: AllocationStrategy) -> Result<Self> {
        if len == 0 {
            return Err(AioError::Allocation { size: 0 });
        }

        let layout = match strategy {
            AllocationStrategy::PageAligned => allocation::page_layout(len),
            AllocationStrategy::Heap => allocation::heap_layout(len),
        }
        .ok_or(AioError::Allocation { size: len })?;

        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(AioError::Allocation {
            size: layout.size(),
        })?;

        Ok(Self {
            ptr,
            len,
            layout,
            strategy,
        })
    }

    /// Allocate a buffer holding a copy of `data`.
    pub fn copy_from(data: &[u8], strategy: AllocationStrategy) -> Result<Self> {
        let mut buffer = Self::allocate(data.len(), strategy)?;
        buffer.as_mut_slice().copy_from_slice(data);
        Ok(buffer)
    }

    /// Requested length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; zero-length buffers cannot be allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated length in bytes, at least [`len`](Self::len).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// Strategy this buffer was allocated with.
    #[inline]
    pub fn strategy(&self) -> AllocationStrategy {
        self.strategy
    }

    /// Returns true if the start address is page-aligned.
    pub fn is_page_aligned(&self) -> bool {
        is_aligned(self.ptr.as_ptr(), page_size())
    }

    /// Length to hand to the facility.
    ///
    /// Aligned buffers submit their whole capacity so direct I/O sees page
    /// multiples; heap buffers submit exactly the requested length.
    pub fn transfer_len(&self) -> usize {
        match self.strategy {
            AllocationStrategy::PageAligned => self.capacity(),
            AllocationStrategy::Heap => self.len,
        }
    }

    /// The first [`len`](Self::len) bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for capacity() >= len initialized bytes.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The first [`len`](Self::len) bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for capacity() >= len bytes and uniquely borrowed.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// The first `n` bytes, clamped to the capacity.
    ///
    /// Used to view what a completion actually transferred.
    pub fn filled(&self, n: usize) -> &[u8] {
        let n = n.min(self.capacity());
        // SAFETY: n <= capacity and the whole allocation is zero-initialized.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), n) }
    }

    /// Raw pointer for the facility.
    ///
    /// Valid for [`capacity`](Self::capacity) bytes until the buffer is dropped.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for IoBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this exact layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl std::fmt::Debug for IoBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("strategy", &self.strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_buffer_rounds_capacity() {
        let page = page_size();
        let buffer = IoBuffer::allocate(page + 1, AllocationStrategy::PageAligned).unwrap();
        assert_eq!(buffer.len(), page + 1);
        assert_eq!(buffer.capacity(), page * 2);
        assert_eq!(buffer.transfer_len(), page * 2);
        assert!(buffer.is_page_aligned());
    }

    #[test]
    fn aligned_buffer_exact_page_is_not_padded() {
        let page = page_size();
        let buffer = IoBuffer::allocate(page, AllocationStrategy::PageAligned).unwrap();
        assert_eq!(buffer.capacity(), page);
    }

    #[test]
    fn heap_buffer_is_exact() {
        let buffer = IoBuffer::allocate(37, AllocationStrategy::Heap).unwrap();
        assert_eq!(buffer.len(), 37);
        assert_eq!(buffer.capacity(), 37);
        assert_eq!(buffer.transfer_len(), 37);
    }

    #[test]
    fn zero_length_is_an_allocation_error() {
        let result = IoBuffer::allocate(0, AllocationStrategy::Heap);
        assert!(matches!(result, Err(AioError::Allocation { size: 0 })));
    }

    #[test]
    fn buffers_start_zeroed() {
        let buffer = IoBuffer::allocate(4096, AllocationStrategy::PageAligned).unwrap();
        assert!(buffer.filled(buffer.capacity()).iter().all(|&b| b == 0));
    }

    #[test]
    fn copy_from_preserves_payload() {
        let buffer = IoBuffer::copy_from(b"hello aio", AllocationStrategy::for_writes()).unwrap();
        assert_eq!(buffer.as_slice(), b"hello aio");
        assert!(buffer.is_page_aligned());
    }

    #[test]
    fn filled_is_clamped() {
        let mut buffer = IoBuffer::allocate(8, AllocationStrategy::Heap).unwrap();
        buffer.as_mut_slice().copy_from_slice(b"abcdefgh");
        assert_eq!(buffer.filled(3), b"abc");
        assert_eq!(buffer.filled(100), b"abcdefgh");
    }

    #[test]
    fn read_strategy_follows_direct_io() {
        assert_eq!(
            AllocationStrategy::for_reads(true),
            AllocationStrategy::PageAligned
        );
        assert_eq!(AllocationStrategy::for_reads(false), AllocationStrategy::Heap);
    }
}
