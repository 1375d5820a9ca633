//! Bounds-checked packet pointer access, shared by every processor.
//!
//! `data`/`data_end` are the raw `usize` bounds of the packet buffer as
//! exposed by whichever context type the caller has (`XdpContext`,
//! `TcContext`); keeping this generic over the two addresses rather than
//! over the context type itself avoids pulling a context-specific trait
//! into every header-parsing call site.

use core::mem;

/// Returns a const pointer to `T` at `offset` bytes into the packet, or
/// `None` if the read would run past `data_end`. Pointer arithmetic stays
/// derived from `data` (a `PTR_TO_PACKET` register) so the verifier can
/// track the bounds check across the cast.
#[inline(always)]
pub unsafe fn ptr_at<T>(data: usize, data_end: usize, offset: usize) -> Option<*const T> {
    let start = data.checked_add(offset)?;
    let end = start.checked_add(mem::size_of::<T>())?;
    if end > data_end {
        return None;
    }
    Some(start as *const T)
}

/// Mutable variant of [`ptr_at`], for in-place header rewrites.
#[inline(always)]
pub unsafe fn ptr_at_mut<T>(data: usize, data_end: usize, offset: usize) -> Option<*mut T> {
    ptr_at::<T>(data, data_end, offset).map(|p| p as *mut T)
}
