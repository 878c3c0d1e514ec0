//! Pool counters.

/// Counters and gauges maintained by a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Pool order; the region spans `2^order` bytes.
    pub order: usize,
    /// Successful allocations.
    pub allocations: u64,
    /// Releases of non-null pointers.
    pub releases: u64,
    /// Blocks halved while serving allocations.
    pub splits: u64,
    /// Buddy pairs merged while releasing.
    pub merges: u64,
    /// Allocations refused for lack of a large enough block.
    pub out_of_memory: u64,
    /// Allocations refused as invalid (zero size).
    pub invalid_requests: u64,
    /// Blocks currently reserved.
    pub reserved_blocks: usize,
    /// Bytes currently in reserved blocks, headers included.
    pub reserved_bytes: usize,
    /// Bytes currently in free blocks.
    pub free_bytes: usize,
    /// Lifecycle records dropped because the ring was full.
    pub dropped_log_records: u64,
}

impl PoolStats {
    pub(crate) fn new(order: usize) -> Self {
        Self {
            order,
            free_bytes: 1 << order,
            ..Self::default()
        }
    }

    pub(crate) fn on_reserve(&mut self, block_bytes: usize) {
        self.allocations += 1;
        self.reserved_blocks += 1;
        self.reserved_bytes += block_bytes;
        self.free_bytes -= block_bytes;
    }

    pub(crate) fn on_release(&mut self, block_bytes: usize) {
        self.releases += 1;
        self.reserved_blocks -= 1;
        self.reserved_bytes -= block_bytes;
        self.free_bytes += block_bytes;
    }

    /// Share of the region handed out, in permille.
    #[must_use]
    pub fn utilization_permille(&self) -> u16 {
        let total = self.reserved_bytes + self.free_bytes;
        if total == 0 {
            return 0;
        }
        ((self.reserved_bytes as u128 * 1000) / total as u128) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_and_release_balance() {
        let mut stats = PoolStats::new(20);
        assert_eq!(stats.free_bytes, 1 << 20);
        stats.on_reserve(1 << 10);
        assert_eq!(stats.reserved_blocks, 1);
        assert_eq!(stats.free_bytes + stats.reserved_bytes, 1 << 20);
        assert_eq!(stats.utilization_permille(), 0);
        stats.on_reserve(1 << 19);
        assert_eq!(stats.utilization_permille(), 500);
        stats.on_release(1 << 19);
        stats.on_release(1 << 10);
        assert_eq!(stats.reserved_blocks, 0);
        assert_eq!(stats.free_bytes, 1 << 20);
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.releases, 2);
    }
}
