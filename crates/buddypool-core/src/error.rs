//! Error types.
//!
//! Two tiers: [`AllocError`] is recoverable and leaves the pool untouched;
//! [`PoolError`] reports a failure to obtain or return the backing region,
//! after which the pool can no longer be trusted. The embedding decides
//! whether that is fatal.

use std::io;

use thiserror::Error;

use crate::block::BlockTag;

/// Recoverable allocation failure. The pool is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// No free block of the requested order or larger exists.
    #[error("out of memory: no free block of order {requested_order} or larger")]
    OutOfMemory { requested_order: usize },
    /// Zero-size request (or, at the C boundary, a null pool).
    #[error("invalid argument: allocation size must be non-zero")]
    InvalidArgument,
}

impl AllocError {
    /// The errno value a C caller observes for this error.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::OutOfMemory { .. } => libc::ENOMEM,
            Self::InvalidArgument => libc::EINVAL,
        }
    }
}

/// Unrecoverable failure at the OS boundary.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to map {len}-byte pool region: {source}")]
    Map {
        len: usize,
        #[source]
        source: io::Error,
    },
    #[error("failed to unmap {len}-byte pool region at {base:#x}: {source}")]
    Unmap {
        base: usize,
        len: usize,
        #[source]
        source: io::Error,
    },
}

/// A structural invariant of the pool does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("block at {offset:#x} has an unrecognized tag")]
    UnknownTag { offset: usize },
    #[error("block at {offset:#x} carries tag {tag:?} inside the tiling")]
    UnexpectedTag { offset: usize, tag: BlockTag },
    #[error("block at {offset:#x} has order {order} outside the pool's range")]
    OrderOutOfRange { offset: usize, order: usize },
    #[error("block at {offset:#x} is not aligned to its order {order}")]
    Misaligned { offset: usize, order: usize },
    #[error("block at {offset:#x} of order {order} runs past the end of the pool")]
    Overrun { offset: usize, order: usize },
    #[error("sentinel of list {order} is corrupt")]
    SentinelCorrupt { order: usize },
    #[error("list {order} does not terminate")]
    ListCycle { order: usize },
    #[error("list {order} links to invalid offset {link:#x}")]
    ListLinkOutOfRange { order: usize, link: usize },
    #[error("list {list} holds block at {offset:#x} with tag {tag:?} and order {order}")]
    ListEntryMismatch {
        list: usize,
        offset: usize,
        tag: Option<BlockTag>,
        order: usize,
    },
    #[error("list {order} has a broken back link at {offset:#x}")]
    BrokenBackLink { order: usize, offset: usize },
    #[error("list {order} links {listed} blocks but the pool holds {tiled} free blocks of that order")]
    ListCountMismatch {
        order: usize,
        listed: usize,
        tiled: usize,
    },
    #[error("free buddies at {offset:#x} and {buddy:#x} of order {order} were left unmerged")]
    UnmergedBuddies {
        offset: usize,
        buddy: usize,
        order: usize,
    },
}
