//! Order sizing.
//!
//! Maps byte counts to block orders. [`order_for`] works on a total byte
//! count that already includes the block header; [`request_order`] is the
//! one place where the header overhead is added to a caller's payload size.

use crate::config::{HEADER_SIZE, SMALLEST_K};

/// Order reported for totals that no block size can represent.
///
/// Always above any pool order, so such requests fail as out-of-memory.
pub const UNREPRESENTABLE_ORDER: usize = usize::BITS as usize;

/// Size in bytes of a block of the given order.
#[must_use]
pub const fn block_size(order: usize) -> usize {
    1 << order
}

/// Payload bytes available in a block of the given order.
#[must_use]
pub const fn usable_size(order: usize) -> usize {
    block_size(order) - HEADER_SIZE
}

/// Smallest order `k >= SMALLEST_K` with `2^k >= total`.
///
/// Exact at powers of two: `order_for(1 << n) == n` for every
/// `n >= SMALLEST_K`.
#[must_use]
pub const fn order_for(total: usize) -> usize {
    if total <= block_size(SMALLEST_K) {
        return SMALLEST_K;
    }
    match total.checked_next_power_of_two() {
        Some(pow) => pow.trailing_zeros() as usize,
        None => UNREPRESENTABLE_ORDER,
    }
}

/// Order of the block needed to serve a payload of `size` bytes.
#[must_use]
pub const fn request_order(size: usize) -> usize {
    match size.checked_add(HEADER_SIZE) {
        Some(total) => order_for(total),
        None => UNREPRESENTABLE_ORDER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn powers_of_two_are_exact() {
        for n in SMALLEST_K..usize::BITS as usize {
            assert_eq!(order_for(1 << n), n, "order_for(2^{n})");
        }
    }

    #[test]
    fn boundaries_around_64() {
        assert_eq!(order_for(63), 6);
        assert_eq!(order_for(64), 6);
        assert_eq!(order_for(65), 7);
    }

    #[test]
    fn small_totals_use_smallest_order() {
        assert_eq!(order_for(0), SMALLEST_K);
        assert_eq!(order_for(1), SMALLEST_K);
        assert_eq!(order_for(HEADER_SIZE + 1), SMALLEST_K);
    }

    #[test]
    fn monotonic_non_decreasing() {
        let mut last = order_for(0);
        for total in 1..70_000usize {
            let k = order_for(total);
            assert!(k >= last, "order_for({total}) = {k} < {last}");
            last = k;
        }
    }

    #[test]
    fn huge_totals_are_unrepresentable() {
        assert_eq!(order_for(usize::MAX), UNREPRESENTABLE_ORDER);
        assert_eq!(order_for((1 << 63) + 1), UNREPRESENTABLE_ORDER);
        assert_eq!(order_for(1 << 63), 63);
    }

    #[test]
    fn request_order_adds_header_once() {
        assert_eq!(request_order(1), SMALLEST_K);
        assert_eq!(request_order(usable_size(SMALLEST_K)), SMALLEST_K);
        assert_eq!(request_order(usable_size(SMALLEST_K) + 1), SMALLEST_K + 1);
        assert_eq!(request_order(8), 6);
        assert_eq!(request_order(64), 7);
        assert_eq!(request_order(usable_size(20)), 20);
        assert_eq!(request_order(usize::MAX), UNREPRESENTABLE_ORDER);
    }

    #[test]
    fn usable_size_excludes_header() {
        assert_eq!(usable_size(SMALLEST_K), 64 - HEADER_SIZE);
        assert_eq!(block_size(10), 1024);
    }
}
