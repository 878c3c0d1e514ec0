//! # buddypool-abi
//!
//! C entry points for the buddy pool allocator.
//!
//! ```text
//! C caller -> buddy_* (this crate) -> BuddyPool (buddypool-core) -> return
//! ```
//!
//! Recoverable failures return NULL and set `errno` (`EINVAL` for a null
//! pool or zero size, `ENOMEM` when no block is large enough). Failing to
//! map or unmap the backing region prints a message and aborts the process.

// Entry points take raw pointers from C callers and check them for null;
// the remaining contract is the usual malloc/free one.
#![allow(clippy::missing_safety_doc)]

pub mod errno;

use std::ffi::c_void;
use std::ptr;

use buddypool_core::{AllocError, BuddyPool, PoolError, order_for};

use crate::errno::set_errno;

/// Pool descriptor as seen from C.
///
/// `kval_m`, `numbytes` and `base` mirror the managed region; `inner` owns
/// the engine and must be treated as opaque.
#[repr(C)]
#[allow(non_camel_case_types)]
#[derive(Debug)]
pub struct buddy_pool {
    pub kval_m: usize,
    pub numbytes: usize,
    pub base: *mut c_void,
    inner: *mut c_void,
}

impl buddy_pool {
    /// An uninitialized descriptor, equivalent to zeroed memory.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            kval_m: 0,
            numbytes: 0,
            base: ptr::null_mut(),
            inner: ptr::null_mut(),
        }
    }
}

impl Default for buddy_pool {
    fn default() -> Self {
        Self::zeroed()
    }
}

fn die(err: &PoolError) -> ! {
    eprintln!("buddypool: {err}");
    std::process::abort()
}

/// Engine behind an initialized descriptor.
unsafe fn engine<'a>(pool: *mut buddy_pool) -> Option<&'a mut BuddyPool> {
    // SAFETY: caller passes null or a live descriptor; `inner` is null or
    // the pointer produced by `buddy_init`.
    let desc = unsafe { pool.as_mut()? };
    unsafe { desc.inner.cast::<BuddyPool>().as_mut() }
}

fn fail(err: AllocError) -> *mut c_void {
    set_errno(err.errno());
    ptr::null_mut()
}

/// Order of the smallest block that spans `bytes` total bytes.
#[unsafe(no_mangle)]
pub extern "C" fn btok(bytes: usize) -> usize {
    order_for(bytes)
}

/// Map a pool of at least `size` bytes (0 selects the default order) and
/// fill in `pool`. A null `pool` is ignored.
///
/// Aborts the process if the region cannot be mapped.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn buddy_init(pool: *mut buddy_pool, size: usize) {
    // SAFETY: caller passes null or a writable descriptor.
    let Some(desc) = (unsafe { pool.as_mut() }) else {
        return;
    };
    let engine = BuddyPool::new(size).unwrap_or_else(|err| die(&err));
    *desc = buddy_pool {
        kval_m: engine.order(),
        numbytes: engine.capacity(),
        base: engine.base_addr() as *mut c_void,
        inner: Box::into_raw(Box::new(engine)).cast(),
    };
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn buddy_malloc(pool: *mut buddy_pool, size: usize) -> *mut c_void {
    // SAFETY: forwarded caller contract.
    let Some(engine) = (unsafe { engine(pool) }) else {
        return fail(AllocError::InvalidArgument);
    };
    match engine.allocate(size) {
        Ok(block) => block.as_ptr().cast(),
        Err(err) => fail(err),
    }
}

/// Return `ptr` to the pool. Null `pool` or `ptr` is a no-op.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn buddy_free(pool: *mut buddy_pool, ptr: *mut c_void) {
    // SAFETY: forwarded caller contract.
    if let Some(engine) = unsafe { engine(pool) } {
        // SAFETY: `ptr` is null or came from `buddy_malloc` on this pool.
        unsafe { engine.release(ptr.cast()) };
    }
}

/// Resize `ptr` to `size` bytes.
///
/// Null `ptr` allocates; `size == 0` frees and returns NULL. On failure the
/// old block is kept and NULL is returned with errno set.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn buddy_realloc(
    pool: *mut buddy_pool,
    ptr: *mut c_void,
    size: usize,
) -> *mut c_void {
    // SAFETY: forwarded caller contract.
    let Some(engine) = (unsafe { engine(pool) }) else {
        return fail(AllocError::InvalidArgument);
    };
    // SAFETY: `ptr` is null or a live block of this pool.
    match unsafe { engine.reallocate(ptr.cast(), size) } {
        Ok(Some(block)) => block.as_ptr().cast(),
        Ok(None) => ptr::null_mut(),
        Err(err) => fail(err),
    }
}

/// Unmap the region and zero the descriptor. A null or uninitialized
/// descriptor is left alone.
///
/// Aborts the process if the region cannot be unmapped.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn buddy_destroy(pool: *mut buddy_pool) {
    // SAFETY: caller passes null or a live descriptor.
    let Some(desc) = (unsafe { pool.as_mut() }) else {
        return;
    };
    let inner = std::mem::replace(&mut desc.inner, ptr::null_mut());
    if inner.is_null() {
        return;
    }
    // SAFETY: `inner` was produced by `Box::into_raw` in `buddy_init` and has
    // just been detached from the descriptor.
    let engine = unsafe { Box::from_raw(inner.cast::<BuddyPool>()) };
    *desc = buddy_pool::zeroed();
    if let Err(err) = engine.destroy() {
        die(&err);
    }
}
