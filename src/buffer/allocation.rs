//! Raw allocation helpers: page size discovery, rounding and layouts.

use std::alloc::Layout;
use std::sync::OnceLock;

/// Fallback when `sysconf` cannot report a page size.
const FALLBACK_PAGE_SIZE: usize = 4096;

/// Returns the system page size, queried once per process.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf has no memory-safety preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 && (size as usize).is_power_of_two() {
            size as usize
        } else {
            FALLBACK_PAGE_SIZE
        }
    })
}

/// Rounds `len` up to the next multiple of `align`.
///
/// A length that is already a multiple is returned unchanged. `align` must be
/// a power of two. Returns `None` on overflow.
pub fn round_up(len: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    len.checked_add(align - 1).map(|padded| padded & !(align - 1))
}

/// Layout for a page-aligned buffer that can hold `len` bytes.
///
/// The layout size is `len` rounded up to a whole number of pages.
pub fn page_layout(len: usize) -> Option<Layout> {
    let page = page_size();
    let size = round_up(len, page)?;
    Layout::from_size_align(size, page).ok()
}

/// Layout for an unaligned heap buffer of exactly `len` bytes.
pub fn heap_layout(len: usize) -> Option<Layout> {
    Layout::from_size_align(len, std::mem::align_of::<u8>()).ok()
}

/// Returns true if `ptr` is aligned to `align`.
#[inline]
pub fn is_aligned(ptr: *const u8, align: usize) -> bool {
    (ptr as usize) % align == 0
}
