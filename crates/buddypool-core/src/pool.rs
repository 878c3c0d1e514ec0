//! The buddy pool.
//!
//! A [`BuddyPool`] owns one mapped region of `2^order` bytes. Allocation takes
//! the first free block of a sufficient order and halves it until it matches
//! the request, parking every upper half on its free list. Release marks the
//! block free and merges it with its buddy for as long as the buddy is free
//! and of equal order.
//!
//! The pool does no locking. Wrap it in a [`LockedPool`](crate::LockedPool)
//! or keep one pool per thread.

#![allow(unsafe_code)]

use std::fmt;
use std::ptr::NonNull;

use crate::block::{BlockHeader, BlockInfo, BlockTag};
use crate::buddy::{buddy_of, parent_of};
use crate::config::{MAX_K, PoolConfig, SMALLEST_K};
use crate::error::{AllocError, InvariantViolation, PoolError};
use crate::free_list::{FreeListSnapshot, FreeLists};
use crate::log::{Event, LifecycleLog, PoolLogLevel, PoolLogRecord};
use crate::order::{block_size, request_order, usable_size};
use crate::region::Region;
use crate::stats::PoolStats;

pub struct BuddyPool {
    region: Region,
    lists: FreeLists,
    order: usize,
    stats: PoolStats,
    log: LifecycleLog,
}

impl BuddyPool {
    /// Map a pool able to hold `capacity` bytes (rounded up to a power of
    /// two and clamped to `[MIN_K, MAX_K)`); 0 selects the default order.
    ///
    /// Honors `BUDDYPOOL_DEFAULT_K` and `BUDDYPOOL_LOG`.
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::from_env(capacity))
    }

    /// Map a pool as described by `config`.
    ///
    /// The fresh pool holds a single free block spanning the whole region.
    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        let order = config.pool_order();
        let len = block_size(order);
        let mut region = Region::map(len).map_err(|source| PoolError::Map { len, source })?;
        let mut lists = FreeLists::new(order);
        lists.push(&mut region, order, 0);

        let mut pool = Self {
            region,
            lists,
            order,
            stats: PoolStats::new(order),
            log: LifecycleLog::new(config.log_level),
        };
        let base = pool.base_addr();
        pool.record(
            Event::new(PoolLogLevel::Info, "init", "map", "success").order(order),
            || format!("base={base:#x} len={len}"),
        );
        Ok(pool)
    }

    fn record(&mut self, event: Event, details: impl FnOnce() -> String) {
        self.log.record(
            event,
            details,
            self.stats.reserved_blocks,
            self.stats.free_bytes,
        );
    }

    /// Reserve a block able to hold `size` payload bytes.
    ///
    /// The returned pointer sits right after the block header and is aligned
    /// to [`MAX_ALIGN`](crate::MAX_ALIGN). On error the pool is unchanged.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let offset = self.reserve(size)?;
        Ok(self.region.payload_ptr(offset))
    }

    /// Reserve a block for `size` payload bytes and return its header offset.
    pub(crate) fn reserve(&mut self, size: usize) -> Result<usize, AllocError> {
        if size == 0 {
            self.stats.invalid_requests += 1;
            self.record(
                Event::new(PoolLogLevel::Warn, "allocate", "alloc", "invalid").size(size),
                || "zero_size_request".to_string(),
            );
            return Err(AllocError::InvalidArgument);
        }

        let wanted = request_order(size);
        let Some((offset, found)) = self.lists.take_first_fit(&mut self.region, wanted) else {
            self.stats.out_of_memory += 1;
            let pool_order = self.order;
            self.record(
                Event::new(PoolLogLevel::Warn, "allocate", "alloc", "oom")
                    .size(size)
                    .order(wanted),
                || format!("pool_order={pool_order}"),
            );
            return Err(AllocError::OutOfMemory {
                requested_order: wanted,
            });
        };

        let mut order = found;
        while order > wanted {
            order -= 1;
            let upper = offset + block_size(order);
            self.lists.push(&mut self.region, order, upper);
            self.stats.splits += 1;
            self.record(
                Event::new(PoolLogLevel::Trace, "allocate", "split", "success")
                    .offset(upper)
                    .order(order),
                String::new,
            );
        }

        self.region.write_header(offset, BlockHeader::reserved(wanted));
        self.stats.on_reserve(block_size(wanted));
        self.record(
            Event::new(PoolLogLevel::Debug, "allocate", "alloc", "success")
                .offset(offset)
                .size(size)
                .order(wanted),
            || format!("source_order={found}"),
        );
        Ok(offset)
    }

    /// Return a block to the pool, merging it with free buddies as far as
    /// possible. A null `ptr` is a no-op.
    ///
    /// Pointers that lie outside the region or whose block is not reserved
    /// are ignored and logged at error level.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer obtained from [`allocate`](Self::allocate)
    /// (or [`reallocate`](Self::reallocate)) on this pool that has not been
    /// released since. The caller must not access the payload afterwards.
    pub unsafe fn release(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            self.record(
                Event::new(PoolLogLevel::Trace, "release", "free_null", "noop"),
                String::new,
            );
            return;
        }

        let Some(mut offset) = self.region.header_offset_of(ptr) else {
            let addr = ptr as usize;
            self.record(
                Event::new(PoolLogLevel::Error, "release", "foreign_pointer", "ignored"),
                || format!("ptr={addr:#x}"),
            );
            return;
        };

        let header = self.region.read_header(offset);
        let released = header.order();
        let reserved = header.tag() == Some(BlockTag::Reserved)
            && self.order_in_range(released)
            && offset % block_size(released) == 0;
        if !reserved {
            let tag = header.tag().map_or("unknown", BlockTag::as_str);
            self.record(
                Event::new(PoolLogLevel::Error, "release", "not_reserved", "ignored")
                    .offset(offset)
                    .order(released),
                || format!("tag={tag}"),
            );
            return;
        }

        // Mark the header free before merging: if this block is absorbed by
        // its lower buddy, the header is never rewritten by the push below.
        self.region.write_header(offset, BlockHeader::avail(released));
        let mut order = released;
        while order < self.order {
            let buddy = buddy_of(offset, order);
            if !self.region.read_header(buddy).is_avail_of(order) {
                break;
            }
            self.lists.unlink(&mut self.region, buddy);
            offset = parent_of(offset, order);
            order += 1;
            self.stats.merges += 1;
            self.record(
                Event::new(PoolLogLevel::Trace, "release", "merge", "success")
                    .offset(offset)
                    .order(order),
                String::new,
            );
        }

        self.lists.push(&mut self.region, order, offset);
        self.stats.on_release(block_size(released));
        self.record(
            Event::new(PoolLogLevel::Debug, "release", "free", "success")
                .offset(offset)
                .order(order),
            || format!("released_order={released}"),
        );
    }

    /// Unmap the region. The pool is consumed either way; on error the
    /// mapping is abandoned.
    pub fn destroy(self) -> Result<(), PoolError> {
        let Self { region, .. } = self;
        let base = region.base_addr();
        let len = region.len();
        region
            .unmap()
            .map_err(|source| PoolError::Unmap { base, len, source })
    }

    fn order_in_range(&self, order: usize) -> bool {
        (SMALLEST_K..=self.order).contains(&order)
    }

    /// Pool order (`kval_m`): the region spans `2^order` bytes.
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    /// Size of the region in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Largest payload a single allocation can request.
    #[must_use]
    pub fn max_request(&self) -> usize {
        usable_size(self.order)
    }

    #[must_use]
    pub fn base_addr(&self) -> usize {
        self.region.base_addr()
    }

    /// Describe the block owning payload pointer `ptr`.
    ///
    /// Returns `None` for pointers this pool cannot have handed out.
    #[must_use]
    pub fn block_info(&self, ptr: *const u8) -> Option<BlockInfo> {
        let offset = self.region.header_offset_of(ptr)?;
        let header = self.region.read_header(offset);
        let order = header.order();
        if !self.order_in_range(order) || offset % block_size(order) != 0 {
            return None;
        }
        Some(BlockInfo {
            offset,
            order,
            tag: header.tag()?,
            usable_size: usable_size(order),
        })
    }

    /// Payload capacity of the block behind `ptr`.
    #[must_use]
    pub fn usable_size(&self, ptr: *const u8) -> Option<usize> {
        self.block_info(ptr).map(|info| info.usable_size)
    }

    /// Offset of the buddy of the block behind `ptr`, if the block is below
    /// the pool order.
    #[must_use]
    pub fn buddy_offset_of(&self, ptr: *const u8) -> Option<usize> {
        let info = self.block_info(ptr)?;
        (info.order < self.order).then(|| buddy_of(info.offset, info.order))
    }

    /// Snapshot of the free list for `order`, or `None` above the pool order.
    #[must_use]
    pub fn free_list(&self, order: usize) -> Option<FreeListSnapshot> {
        (order <= self.order).then(|| self.lists.snapshot(&self.region, order))
    }

    /// Number of blocks on the free list for `order`.
    #[must_use]
    pub fn free_list_len(&self, order: usize) -> usize {
        if order > self.order {
            return 0;
        }
        self.lists.len(&self.region, order)
    }

    /// True when the pool is back to its initial state: one free block of
    /// the pool order and every other list empty.
    #[must_use]
    pub fn is_pristine(&self) -> bool {
        (0..self.order).all(|k| self.lists.is_empty(k))
            && self.lists.snapshot(&self.region, self.order).offsets == [0]
            && self.region.read_header(0).is_avail_of(self.order)
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            dropped_log_records: self.log.dropped(),
            ..self.stats
        }
    }

    /// Lifecycle records currently retained, oldest first.
    pub fn lifecycle_logs(&self) -> impl Iterator<Item = &PoolLogRecord> {
        self.log.records()
    }

    /// Take all retained lifecycle records.
    pub fn drain_lifecycle_logs(&mut self) -> Vec<PoolLogRecord> {
        self.log.drain()
    }

    /// Check every structural invariant.
    ///
    /// Walks the region block by block: each block must carry a known tag,
    /// an order within range, sit on its own size boundary, and end inside
    /// the region, and consecutive blocks must tile it exactly. Free buddies
    /// must not be left unmerged. Every free list must hold exactly the free
    /// blocks of its order.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        let len = self.region.len();
        let mut tiled = [0usize; MAX_K];
        let mut offset = 0;
        while offset < len {
            let header = self.region.read_header(offset);
            let order = header.order();
            let tag = header
                .tag()
                .ok_or(InvariantViolation::UnknownTag { offset })?;
            if !self.order_in_range(order) {
                return Err(InvariantViolation::OrderOutOfRange { offset, order });
            }
            if offset % block_size(order) != 0 {
                return Err(InvariantViolation::Misaligned { offset, order });
            }
            if offset + block_size(order) > len {
                return Err(InvariantViolation::Overrun { offset, order });
            }
            match tag {
                BlockTag::Avail => {
                    tiled[order] += 1;
                    let buddy = buddy_of(offset, order);
                    if order < self.order
                        && buddy > offset
                        && self.region.read_header(buddy).is_avail_of(order)
                    {
                        return Err(InvariantViolation::UnmergedBuddies {
                            offset,
                            buddy,
                            order,
                        });
                    }
                }
                BlockTag::Reserved => {}
                BlockTag::Unused => {
                    return Err(InvariantViolation::UnexpectedTag { offset, tag });
                }
            }
            offset += block_size(order);
        }

        for (order, &count) in tiled.iter().enumerate().take(self.order + 1) {
            let listed = self.lists.validate(&self.region, order)?;
            if listed != count {
                return Err(InvariantViolation::ListCountMismatch {
                    order,
                    listed,
                    tiled: count,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn region_mut(&mut self) -> &mut Region {
        &mut self.region
    }

    pub(crate) fn record_event(&mut self, event: Event, details: impl FnOnce() -> String) {
        self.record(event, details);
    }
}

impl fmt::Debug for BuddyPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuddyPool")
            .field("base", &format_args!("{:#x}", self.base_addr()))
            .field("order", &self.order)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
