//! Per-order free lists.
//!
//! Each order has a sentinel held in the pool descriptor. Lists are circular
//! and doubly linked: a block's `next`/`prev` hold offsets of its neighbours,
//! or [`SENTINEL`] where the neighbour is the list head. An empty list is a
//! self-linked sentinel. Only free blocks of exactly the list's order are
//! ever linked in.

use crate::block::{BlockHeader, BlockTag, SENTINEL};
use crate::config::{MAX_K, SMALLEST_K};
use crate::error::InvariantViolation;
use crate::region::Region;

/// List head for one order. Its tag is always [`BlockTag::Unused`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sentinel {
    tag: BlockTag,
    order: usize,
    next: usize,
    prev: usize,
}

impl Sentinel {
    const fn empty(order: usize) -> Self {
        Self {
            tag: BlockTag::Unused,
            order,
            next: SENTINEL,
            prev: SENTINEL,
        }
    }

    const fn is_self_linked(&self) -> bool {
        self.next == SENTINEL && self.prev == SENTINEL
    }
}

/// Point-in-time view of one free list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeListSnapshot {
    pub order: usize,
    /// Tag of the sentinel; always `Unused` for a healthy list.
    pub sentinel_tag: BlockTag,
    /// True when the sentinel links to itself in both directions.
    pub self_linked: bool,
    /// Offsets of the linked blocks, head first.
    pub offsets: Vec<usize>,
}

impl FreeListSnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.self_linked && self.offsets.is_empty()
    }
}

pub(crate) struct FreeLists {
    heads: [Sentinel; MAX_K],
    /// Highest order in use (the pool order).
    top: usize,
}

impl FreeLists {
    pub(crate) fn new(top: usize) -> Self {
        debug_assert!(top < MAX_K);
        Self {
            heads: std::array::from_fn(Sentinel::empty),
            top,
        }
    }

    pub(crate) fn is_empty(&self, order: usize) -> bool {
        self.heads[order].next == SENTINEL
    }

    pub(crate) fn first(&self, order: usize) -> Option<usize> {
        let next = self.heads[order].next;
        (next != SENTINEL).then_some(next)
    }

    /// First non-empty list at `order` or above, up to the pool order.
    pub(crate) fn first_fit(&self, order: usize) -> Option<usize> {
        (order..=self.top).find(|&k| !self.is_empty(k))
    }

    fn set_next(&mut self, region: &mut Region, order: usize, at: usize, next: usize) {
        if at == SENTINEL {
            self.heads[order].next = next;
        } else {
            let header = region.read_header(at);
            region.write_header(at, header.with_links(next, header.prev()));
        }
    }

    fn set_prev(&mut self, region: &mut Region, order: usize, at: usize, prev: usize) {
        if at == SENTINEL {
            self.heads[order].prev = prev;
        } else {
            let header = region.read_header(at);
            region.write_header(at, header.with_links(header.next(), prev));
        }
    }

    /// Mark the block at `offset` free with `order` and link it at the head
    /// of that order's list.
    pub(crate) fn push(&mut self, region: &mut Region, order: usize, offset: usize) {
        let old_first = self.heads[order].next;
        region.write_header(offset, BlockHeader::avail(order).with_links(old_first, SENTINEL));
        self.set_prev(region, order, old_first, offset);
        self.heads[order].next = offset;
    }

    /// Unlink the free block at `offset` from the list of its recorded order.
    pub(crate) fn unlink(&mut self, region: &mut Region, offset: usize) -> BlockHeader {
        let header = region.read_header(offset);
        let order = header.order();
        debug_assert!(header.is_avail_of(order), "unlinking non-free block");
        self.set_next(region, order, header.prev(), header.next());
        self.set_prev(region, order, header.next(), header.prev());
        let detached = header.with_links(SENTINEL, SENTINEL);
        region.write_header(offset, detached);
        detached
    }

    /// Remove and return the head of the list for `order`.
    pub(crate) fn pop(&mut self, region: &mut Region, order: usize) -> Option<usize> {
        let offset = self.first(order)?;
        self.unlink(region, offset);
        Some(offset)
    }

    /// Unlink the head of the first non-empty list at `order` or above.
    /// Returns the block offset and the order of the list it came from.
    pub(crate) fn take_first_fit(
        &mut self,
        region: &mut Region,
        order: usize,
    ) -> Option<(usize, usize)> {
        let found = self.first_fit(order)?;
        let offset = self.pop(region, found)?;
        Some((offset, found))
    }

    /// Follow `next` links from the sentinel. Stops after `limit` blocks so a
    /// corrupted list cannot loop forever.
    fn collect(&self, region: &Region, order: usize, limit: usize) -> Vec<usize> {
        let mut offsets = Vec::new();
        let mut cursor = self.heads[order].next;
        while cursor != SENTINEL && offsets.len() < limit {
            offsets.push(cursor);
            cursor = region.read_header(cursor).next();
        }
        offsets
    }

    fn walk_limit(region: &Region, order: usize) -> usize {
        (region.len() >> order.max(SMALLEST_K)) + 1
    }

    pub(crate) fn snapshot(&self, region: &Region, order: usize) -> FreeListSnapshot {
        let head = &self.heads[order];
        FreeListSnapshot {
            order: head.order,
            sentinel_tag: head.tag,
            self_linked: head.is_self_linked(),
            offsets: self.collect(region, order, Self::walk_limit(region, order)),
        }
    }

    pub(crate) fn len(&self, region: &Region, order: usize) -> usize {
        self.collect(region, order, Self::walk_limit(region, order)).len()
    }

    /// Walk list `order` checking tags, orders, back links and termination.
    /// Returns the number of linked blocks.
    pub(crate) fn validate(
        &self,
        region: &Region,
        order: usize,
    ) -> Result<usize, InvariantViolation> {
        let head = &self.heads[order];
        if head.tag != BlockTag::Unused || head.order != order {
            return Err(InvariantViolation::SentinelCorrupt { order });
        }
        if (head.next == SENTINEL) != (head.prev == SENTINEL) {
            return Err(InvariantViolation::SentinelCorrupt { order });
        }

        let limit = Self::walk_limit(region, order);
        let mut count = 0;
        let mut prev = SENTINEL;
        let mut cursor = head.next;
        while cursor != SENTINEL {
            if count == limit {
                return Err(InvariantViolation::ListCycle { order });
            }
            if cursor >= region.len() || cursor % (1 << SMALLEST_K) != 0 {
                return Err(InvariantViolation::ListLinkOutOfRange { order, link: cursor });
            }
            let header = region.read_header(cursor);
            if !header.is_avail_of(order) {
                return Err(InvariantViolation::ListEntryMismatch {
                    list: order,
                    offset: cursor,
                    tag: header.tag(),
                    order: header.order(),
                });
            }
            if header.prev() != prev {
                return Err(InvariantViolation::BrokenBackLink { order, offset: cursor });
            }
            count += 1;
            prev = cursor;
            cursor = header.next();
        }
        if head.prev != prev {
            return Err(InvariantViolation::BrokenBackLink { order, offset: prev });
        }
        Ok(count)
    }
}
