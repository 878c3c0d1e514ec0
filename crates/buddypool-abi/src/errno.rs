//! Thread-local errno access for the C boundary.

use std::ffi::c_int;

#[cfg(any(target_os = "linux", target_os = "android"))]
#[inline]
fn errno_location() -> *mut c_int {
    // SAFETY: libc returns this thread's errno slot; never null.
    unsafe { libc::__errno_location() }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
#[inline]
fn errno_location() -> *mut c_int {
    // SAFETY: as above.
    unsafe { libc::__error() }
}

#[inline]
pub fn set_errno(val: c_int) {
    // SAFETY: the slot is valid and exclusive to the calling thread.
    unsafe { *errno_location() = val };
}

#[inline]
#[must_use]
pub fn errno() -> c_int {
    // SAFETY: as in `set_errno`.
    unsafe { *errno_location() }
}
