//! Mutex-guarded pool that can be shared between threads.
//!
//! [`LockedPool`] maps its region on first use, so it can live in a
//! `static` and serve as a `#[global_allocator]`. Lazy initialization uses
//! [`PoolConfig::fixed`] and keeps lifecycle logging off, which means the
//! first allocation never re-enters the heap.

#![allow(unsafe_code)]

use std::alloc::{GlobalAlloc, Layout};
use std::ptr::{self, NonNull};

use parking_lot::Mutex;

use crate::config::{MAX_ALIGN, PoolConfig};
use crate::error::{AllocError, PoolError};
use crate::order::request_order;
use crate::pool::BuddyPool;
use crate::stats::PoolStats;

pub struct LockedPool {
    capacity: usize,
    inner: Mutex<Option<BuddyPool>>,
}

impl LockedPool {
    /// A pool of `capacity` bytes, mapped on first use. 0 selects the
    /// default order.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: parking_lot::const_mutex(None),
        }
    }

    /// Share an already-built pool.
    #[must_use]
    pub fn from_pool(pool: BuddyPool) -> Self {
        Self {
            capacity: pool.capacity(),
            inner: Mutex::new(Some(pool)),
        }
    }

    /// Run `f` with exclusive access to the pool, mapping it first if needed.
    pub fn with_pool<R>(&self, f: impl FnOnce(&mut BuddyPool) -> R) -> Result<R, PoolError> {
        let mut guard = self.inner.lock();
        let pool = match guard.take() {
            Some(pool) => pool,
            None => BuddyPool::with_config(PoolConfig::fixed(self.capacity))?,
        };
        Ok(f(guard.insert(pool)))
    }

    /// Allocate from the shared pool. A region that cannot be mapped is
    /// reported as out of memory.
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.with_pool(|pool| pool.allocate(size))
            .unwrap_or(Err(AllocError::OutOfMemory {
                requested_order: request_order(size),
            }))
    }

    /// # Safety
    ///
    /// Same contract as [`BuddyPool::release`].
    pub unsafe fn release(&self, ptr: *mut u8) {
        if let Some(pool) = self.inner.lock().as_mut() {
            // SAFETY: forwarded caller contract.
            unsafe { pool.release(ptr) };
        }
    }

    /// Counters of the shared pool, or `None` before first use.
    #[must_use]
    pub fn stats(&self) -> Option<PoolStats> {
        self.inner.lock().as_ref().map(BuddyPool::stats)
    }

    /// Unmap the region if it was ever mapped.
    pub fn destroy(self) -> Result<(), PoolError> {
        match self.inner.into_inner() {
            Some(pool) => pool.destroy(),
            None => Ok(()),
        }
    }
}

// SAFETY: every entry point takes the lock before touching the pool; blocks
// are aligned to at least MAX_ALIGN and larger alignments are refused.
unsafe impl GlobalAlloc for LockedPool {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > MAX_ALIGN {
            return ptr::null_mut();
        }
        self.allocate(layout.size().max(1))
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // SAFETY: GlobalAlloc requires `ptr` to come from `alloc` on self.
        unsafe { self.release(ptr) };
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > MAX_ALIGN {
            return ptr::null_mut();
        }
        let mut guard = self.inner.lock();
        let Some(pool) = guard.as_mut() else {
            return ptr::null_mut();
        };
        // SAFETY: `ptr` is live per the GlobalAlloc contract and `new_size`
        // is non-zero, so a success always yields a block.
        match unsafe { pool.reallocate(ptr, new_size) } {
            Ok(Some(moved)) => moved.as_ptr(),
            Ok(None) | Err(_) => ptr::null_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_K;

    #[test]
    fn maps_lazily() {
        let pool = LockedPool::new(1 << MIN_K);
        assert_eq!(pool.stats(), None);
        let ptr = pool.allocate(64).unwrap();
        assert_eq!(pool.stats().map(|s| s.reserved_blocks), Some(1));
        unsafe { pool.release(ptr.as_ptr()) };
        assert!(pool.with_pool(|p| p.is_pristine()).unwrap());
        pool.destroy().unwrap();
    }

    #[test]
    fn unmapped_destroy_is_ok() {
        LockedPool::new(0).destroy().unwrap();
    }

    #[test]
    fn global_alloc_refuses_over_aligned_layouts() {
        let pool = LockedPool::new(1 << MIN_K);
        let layout = Layout::from_size_align(64, 4096).unwrap();
        assert!(unsafe { pool.alloc(layout) }.is_null());
        let layout = Layout::from_size_align(0, MAX_ALIGN).unwrap();
        let ptr = unsafe { pool.alloc(layout) };
        assert!(!ptr.is_null());
        assert_eq!(ptr as usize % MAX_ALIGN, 0);
        unsafe { pool.dealloc(ptr, layout) };
    }

    #[test]
    fn global_realloc_preserves_bytes() {
        let pool = LockedPool::new(1 << MIN_K);
        let layout = Layout::from_size_align(16, 8).unwrap();
        unsafe {
            let ptr = pool.alloc(layout);
            ptr.write_bytes(0x5A, 16);
            let grown = pool.realloc(ptr, layout, 4096);
            assert!(!grown.is_null());
            assert!((0..16).all(|i| grown.add(i).read() == 0x5A));
            pool.dealloc(grown, Layout::from_size_align(4096, 8).unwrap());
        }
        assert!(pool.with_pool(|p| p.is_pristine()).unwrap());
    }
}
