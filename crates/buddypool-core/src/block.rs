//! In-band block metadata.
//!
//! Every block, free or reserved, starts with a [`BlockHeader`]. Free-list
//! links are stored as offsets from the pool base, with [`SENTINEL`] naming
//! the list head of the block's own order.

/// Link value that refers to the sentinel of the list the block is on.
pub const SENTINEL: usize = usize::MAX;

/// Allocation state of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum BlockTag {
    /// List sentinel; never allocatable.
    Unused = 0,
    /// Free and linked into the list of its order.
    Avail = 1,
    /// Owned by a caller; not on any list.
    Reserved = 2,
}

impl BlockTag {
    /// Decode a raw tag. Unknown values yield `None`.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Self::Unused),
            1 => Some(Self::Avail),
            2 => Some(Self::Reserved),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Avail => "avail",
            Self::Reserved => "reserved",
        }
    }
}

/// Header stored at the first byte of every block.
///
/// The tag is kept as a raw `u16` so that reading a header never
/// materializes an invalid enum value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(16))]
pub struct BlockHeader {
    tag: u16,
    order: u16,
    next: usize,
    prev: usize,
}

impl BlockHeader {
    #[must_use]
    pub const fn new(tag: BlockTag, order: usize, next: usize, prev: usize) -> Self {
        Self {
            tag: tag as u16,
            order: order as u16,
            next,
            prev,
        }
    }

    /// Free block of `order`, not yet linked.
    #[must_use]
    pub const fn avail(order: usize) -> Self {
        Self::new(BlockTag::Avail, order, SENTINEL, SENTINEL)
    }

    /// Block of `order` handed to a caller.
    #[must_use]
    pub const fn reserved(order: usize) -> Self {
        Self::new(BlockTag::Reserved, order, SENTINEL, SENTINEL)
    }

    #[must_use]
    pub const fn tag(&self) -> Option<BlockTag> {
        BlockTag::from_raw(self.tag)
    }

    #[must_use]
    pub const fn order(&self) -> usize {
        self.order as usize
    }

    #[must_use]
    pub const fn next(&self) -> usize {
        self.next
    }

    #[must_use]
    pub const fn prev(&self) -> usize {
        self.prev
    }

    /// True if this header describes a free block of exactly `order`.
    #[must_use]
    pub const fn is_avail_of(&self, order: usize) -> bool {
        self.tag == BlockTag::Avail as u16 && self.order() == order
    }

    #[must_use]
    pub const fn with_links(mut self, next: usize, prev: usize) -> Self {
        self.next = next;
        self.prev = prev;
        self
    }
}

/// Caller-facing view of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Offset of the block header from the pool base.
    pub offset: usize,
    /// Block order; the block spans `2^order` bytes.
    pub order: usize,
    pub tag: BlockTag,
    /// Payload bytes behind the header.
    pub usable_size: usize,
}
