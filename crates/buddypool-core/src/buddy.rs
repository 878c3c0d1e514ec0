//! Buddy address calculation.

/// Offset of the buddy of the block at `offset` with the given `order`.
///
/// Offsets are relative to the pool base. Two blocks are buddies iff they
/// share an order and their offsets differ exactly in bit `order`, so the
/// function is its own inverse. The result names a real buddy only while
/// both siblings still have that order; callers re-check the buddy's header
/// before acting on it.
#[must_use]
pub const fn buddy_of(offset: usize, order: usize) -> usize {
    offset ^ (1 << order)
}

/// Offset of the block produced by merging the block at `offset` with its buddy.
#[must_use]
pub const fn parent_of(offset: usize, order: usize) -> usize {
    offset & !(1 << order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flips_exactly_one_bit() {
        assert_eq!(buddy_of(0, 6), 64);
        assert_eq!(buddy_of(64, 6), 0);
        assert_eq!(buddy_of(128, 7), 0);
        assert_eq!(buddy_of(0x30_0000, 20), 0x20_0000);
        assert_eq!((buddy_of(4096, 12) ^ 4096).count_ones(), 1);
    }

    #[test]
    fn symmetric_for_aligned_offsets() {
        for order in 6..24 {
            for slot in 0..16usize {
                let offset = slot << order;
                assert_eq!(buddy_of(buddy_of(offset, order), order), offset);
            }
        }
    }

    #[test]
    fn parent_is_lower_sibling() {
        assert_eq!(parent_of(64, 6), 0);
        assert_eq!(parent_of(0, 6), 0);
        assert_eq!(parent_of(0x1c0, 6), 0x180);
        let a = 0x1000;
        assert_eq!(parent_of(a, 10), parent_of(buddy_of(a, 10), 10));
    }
}
