//! Resizing built on allocate and release.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use crate::block::BlockTag;
use crate::error::AllocError;
use crate::log::{Event, PoolLogLevel};
use crate::order::request_order;
use crate::pool::BuddyPool;

impl BuddyPool {
    /// Resize the block behind `ptr` to hold `new_size` payload bytes.
    ///
    /// - null `ptr` behaves as [`allocate`](Self::allocate);
    /// - `new_size == 0` releases `ptr` and returns `Ok(None)`;
    /// - a request that still fits the current block keeps `ptr`;
    /// - otherwise a new block is reserved, the payload copied and the old
    ///   block released.
    ///
    /// On error the original block is left untouched and still owned by the
    /// caller.
    ///
    /// # Safety
    ///
    /// Same contract as [`release`](Self::release): `ptr` must be null or a
    /// live pointer from this pool. After a successful move the old pointer
    /// must not be used.
    pub unsafe fn reallocate(
        &mut self,
        ptr: *mut u8,
        new_size: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        if ptr.is_null() {
            let out = self.allocate(new_size);
            let event = Event::new(
                PoolLogLevel::Trace,
                "reallocate",
                "realloc_null_as_alloc",
                outcome(&out),
            );
            self.record_event(event.size(new_size), || "ptr_was_null".to_string());
            return out.map(Some);
        }
        if new_size == 0 {
            // SAFETY: forwarded caller contract.
            unsafe { self.release(ptr) };
            self.record_event(
                Event::new(
                    PoolLogLevel::Trace,
                    "reallocate",
                    "realloc_zero_as_free",
                    "freed",
                ),
                || "new_size_was_zero".to_string(),
            );
            return Ok(None);
        }

        let Some(old) = self
            .block_info(ptr)
            .filter(|info| info.tag == BlockTag::Reserved)
        else {
            let addr = ptr as usize;
            let event = Event::new(
                PoolLogLevel::Error,
                "reallocate",
                "realloc_unknown_pointer",
                "fallback_alloc",
            );
            self.record_event(event.size(new_size), || format!("ptr={addr:#x}"));
            return self.allocate(new_size).map(Some);
        };

        if request_order(new_size) <= old.order {
            self.record_event(
                Event::new(PoolLogLevel::Trace, "reallocate", "realloc_in_place", "success")
                    .offset(old.offset)
                    .size(new_size)
                    .order(old.order),
                String::new,
            );
            // SAFETY: `ptr` is non-null by the check above.
            return Ok(Some(unsafe { NonNull::new_unchecked(ptr) }));
        }

        let dst = self.reserve(new_size)?;
        self.region_mut()
            .copy_payload(old.offset, dst, old.usable_size.min(new_size));
        // SAFETY: `ptr` was checked to be a reserved block of this pool.
        unsafe { self.release(ptr) };
        self.record_event(
            Event::new(PoolLogLevel::Debug, "reallocate", "realloc_move", "success")
                .offset(dst)
                .size(new_size)
                .order(request_order(new_size)),
            || format!("from_offset={:#x} from_order={}", old.offset, old.order),
        );
        Ok(Some(self.region_mut().payload_ptr(dst)))
    }
}

fn outcome<T>(result: &Result<T, AllocError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(AllocError::OutOfMemory { .. }) => "oom",
        Err(AllocError::InvalidArgument) => "invalid",
    }
}
