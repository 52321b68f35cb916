//! The raw system allocator: an opaque collaborator exposing
//! allocate/reallocate/free, as described in §1 (Out of scope).
//!
//! The collector never assumes anything about this allocator beyond the
//! usual Rust allocator contract. All managed blocks share one alignment so
//! that `realloc`/`dealloc` can reconstruct the `Layout` they were
//! allocated with from `size` alone.

use std::alloc::{self, Layout};

/// Alignment used for every managed allocation. `usize`-alignment is
/// sufficient for conservative scanning, which only ever reads whole words.
const ALIGN: usize = std::mem::align_of::<usize>();

fn layout_for(size: usize) -> Layout {
    // SAFETY-adjacent: size.max(1) keeps the layout non-zero-sized, and
    // ALIGN is a compile-time power of two, so construction cannot fail.
    Layout::from_size_align(size.max(1), ALIGN).expect("layout for managed allocation")
}

/// Allocates `size` bytes, uninitialized. Returns `None` on OOM.
pub fn alloc(size: usize) -> Option<*mut u8> {
    // SAFETY: layout is non-zero-sized and well-formed.
    let ptr = unsafe { alloc::alloc(layout_for(size)) };
    if ptr.is_null() { None } else { Some(ptr) }
}

/// Allocates `size` zero-initialized bytes. Returns `None` on OOM.
pub fn alloc_zeroed(size: usize) -> Option<*mut u8> {
    // SAFETY: layout is non-zero-sized and well-formed.
    let ptr = unsafe { alloc::alloc_zeroed(layout_for(size)) };
    if ptr.is_null() { None } else { Some(ptr) }
}

/// Resizes the allocation at `ptr` (originally `old_size` bytes) to
/// `new_size` bytes. May return the same address or a new one, exactly like
/// C's `realloc`. Returns `None` on OOM, in which case `ptr` is left
/// untouched (standard `realloc` failure semantics).
///
/// # Safety
/// `ptr` must have been returned by [`alloc`] or [`alloc_zeroed`] (or a
/// previous `realloc` of such a pointer) with the same `old_size`.
pub unsafe fn realloc(ptr: *mut u8, old_size: usize, new_size: usize) -> Option<*mut u8> {
    // SAFETY: caller guarantees `ptr`/`old_size` describe a live allocation
    // made with `layout_for`; `new_size.max(1)` keeps the request valid.
    let new_ptr = unsafe { alloc::realloc(ptr, layout_for(old_size), new_size.max(1)) };
    if new_ptr.is_null() { None } else { Some(new_ptr) }
}

/// Frees the allocation at `ptr`, which must have been allocated with `size`
/// bytes via [`alloc`]/[`alloc_zeroed`]/[`realloc`].
///
/// # Safety
/// `ptr` must be a live allocation of exactly `size` bytes made through this
/// module; it must not be used again afterward.
pub unsafe fn dealloc(ptr: *mut u8, size: usize) {
    // SAFETY: caller guarantees ptr/size describe a live allocation.
    unsafe { alloc::dealloc(ptr, layout_for(size)) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_zeroed_is_actually_zero() {
        let ptr = alloc_zeroed(64).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(ptr, 64) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { dealloc(ptr, 64) };
    }

    #[test]
    fn realloc_preserves_prefix() {
        let ptr = alloc(8).unwrap();
        unsafe { std::ptr::write(ptr as *mut u64, 0xDEAD_BEEF_u64) };
        let grown = unsafe { realloc(ptr, 8, 4096) }.unwrap();
        let value = unsafe { std::ptr::read(grown as *const u64) };
        assert_eq!(value, 0xDEAD_BEEF_u64);
        unsafe { dealloc(grown, 4096) };
    }
}
