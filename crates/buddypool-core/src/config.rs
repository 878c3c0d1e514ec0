//! Pool sizing constants and runtime configuration.
//!
//! Two environment variables are consulted, each at most once per process:
//! - `BUDDYPOOL_DEFAULT_K`: order used when a pool is requested with capacity 0.
//!   Values outside `[MIN_K, MAX_K)` are clamped.
//! - `BUDDYPOOL_LOG`: lifecycle-log threshold (`off`, `error`, `warn`, `info`,
//!   `debug`, `trace`). Unknown values disable logging.
//!
//! Resolved values are cached in atomics so that pools created later never
//! touch the environment again.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::block::BlockHeader;
use crate::log::PoolLogLevel;
use crate::order::order_for;

/// Smallest block order the pool ever hands out. A block of this order must
/// hold its header plus at least one payload byte.
pub const SMALLEST_K: usize = 6;

/// Smallest pool order accepted at initialization.
pub const MIN_K: usize = 20;

/// Exclusive upper bound on the pool order.
pub const MAX_K: usize = 48;

/// Pool order used when a capacity of 0 is requested.
pub const DEFAULT_K: usize = 30;

/// Bytes of in-band metadata at the start of every block.
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

/// Largest alignment a payload pointer is guaranteed to satisfy.
///
/// Blocks start on their own size boundary (at least `2^SMALLEST_K`) and the
/// payload begins `HEADER_SIZE` bytes in.
pub const MAX_ALIGN: usize = HEADER_SIZE;

const _: () = assert!(HEADER_SIZE.is_power_of_two());
const _: () = assert!(HEADER_SIZE < (1 << SMALLEST_K));
const _: () = assert!(SMALLEST_K < MIN_K && MIN_K <= DEFAULT_K && DEFAULT_K < MAX_K);

/// Clamp a pool order into `[MIN_K, MAX_K)`.
#[must_use]
pub const fn clamp_pool_order(order: usize) -> usize {
    if order < MIN_K {
        MIN_K
    } else if order >= MAX_K {
        MAX_K - 1
    } else {
        order
    }
}

// 0 = unresolved; otherwise the resolved order.
static CACHED_DEFAULT_K: AtomicU8 = AtomicU8::new(0);

// 0 = unresolved, 1 = off, 2.. = PoolLogLevel discriminant + 2.
static CACHED_LOG_LEVEL: AtomicU8 = AtomicU8::new(0);

const LOG_UNRESOLVED: u8 = 0;
const LOG_OFF: u8 = 1;

fn parse_default_order_env(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().map(clamp_pool_order)
}

fn log_level_to_u8(level: Option<PoolLogLevel>) -> u8 {
    match level {
        None => LOG_OFF,
        Some(level) => level as u8 + 2,
    }
}

fn u8_to_log_level(v: u8) -> Option<PoolLogLevel> {
    match v {
        2 => Some(PoolLogLevel::Trace),
        3 => Some(PoolLogLevel::Debug),
        4 => Some(PoolLogLevel::Info),
        5 => Some(PoolLogLevel::Warn),
        6 => Some(PoolLogLevel::Error),
        _ => None,
    }
}

/// Default pool order (reads `BUDDYPOOL_DEFAULT_K` on first call, cached thereafter).
#[must_use]
pub fn default_order() -> usize {
    let cached = CACHED_DEFAULT_K.load(Ordering::Acquire);
    if cached != 0 {
        return usize::from(cached);
    }

    let order = std::env::var("BUDDYPOOL_DEFAULT_K")
        .ok()
        .and_then(|raw| parse_default_order_env(&raw))
        .unwrap_or(DEFAULT_K);
    // Orders are < MAX_K, so they always fit in a u8.
    CACHED_DEFAULT_K.store(order as u8, Ordering::Release);
    order
}

/// Lifecycle-log threshold from `BUDDYPOOL_LOG` (read once, cached thereafter).
///
/// `None` means lifecycle logging is disabled.
#[must_use]
pub fn env_log_level() -> Option<PoolLogLevel> {
    let cached = CACHED_LOG_LEVEL.load(Ordering::Acquire);
    if cached != LOG_UNRESOLVED {
        return u8_to_log_level(cached);
    }

    let level = std::env::var("BUDDYPOOL_LOG")
        .ok()
        .and_then(|raw| PoolLogLevel::from_str_loose(&raw));
    CACHED_LOG_LEVEL.store(log_level_to_u8(level), Ordering::Release);
    level
}

/// Parameters for building a [`BuddyPool`](crate::BuddyPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Requested capacity in bytes; 0 selects `default_order`.
    pub capacity: usize,
    /// Order used when `capacity` is 0.
    pub default_order: usize,
    /// Minimum level of lifecycle records kept by the pool; `None` disables them.
    pub log_level: Option<PoolLogLevel>,
}

impl PoolConfig {
    /// Configuration honoring the process environment.
    #[must_use]
    pub fn from_env(capacity: usize) -> Self {
        Self {
            capacity,
            default_order: default_order(),
            log_level: env_log_level(),
        }
    }

    /// Configuration that ignores the environment and keeps logging off.
    ///
    /// Building a pool from this configuration performs no heap allocation.
    #[must_use]
    pub const fn fixed(capacity: usize) -> Self {
        Self {
            capacity,
            default_order: DEFAULT_K,
            log_level: None,
        }
    }

    #[must_use]
    pub const fn with_log_level(mut self, level: Option<PoolLogLevel>) -> Self {
        self.log_level = level;
        self
    }

    #[must_use]
    pub const fn with_default_order(mut self, order: usize) -> Self {
        self.default_order = order;
        self
    }

    /// Order of the region a pool built from this configuration will map.
    #[must_use]
    pub fn pool_order(&self) -> usize {
        if self.capacity == 0 {
            clamp_pool_order(self.default_order)
        } else {
            clamp_pool_order(order_for(self.capacity))
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::fixed(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fits_in_smallest_block() {
        assert_eq!(HEADER_SIZE, 32);
        assert!(HEADER_SIZE < 1 << SMALLEST_K);
    }

    #[test]
    fn clamp_pool_order_bounds() {
        assert_eq!(clamp_pool_order(0), MIN_K);
        assert_eq!(clamp_pool_order(MIN_K - 1), MIN_K);
        assert_eq!(clamp_pool_order(MIN_K), MIN_K);
        assert_eq!(clamp_pool_order(DEFAULT_K), DEFAULT_K);
        assert_eq!(clamp_pool_order(MAX_K - 1), MAX_K - 1);
        assert_eq!(clamp_pool_order(MAX_K), MAX_K - 1);
        assert_eq!(clamp_pool_order(usize::MAX), MAX_K - 1);
    }

    #[test]
    fn parse_default_order() {
        assert_eq!(parse_default_order_env("24"), Some(24));
        assert_eq!(parse_default_order_env(" 22 "), Some(22));
        assert_eq!(parse_default_order_env("3"), Some(MIN_K));
        assert_eq!(parse_default_order_env("99"), Some(MAX_K - 1));
        assert_eq!(parse_default_order_env("big"), None);
    }

    #[test]
    fn log_level_cache_encoding_roundtrips() {
        for level in [
            None,
            Some(PoolLogLevel::Trace),
            Some(PoolLogLevel::Debug),
            Some(PoolLogLevel::Info),
            Some(PoolLogLevel::Warn),
            Some(PoolLogLevel::Error),
        ] {
            assert_eq!(u8_to_log_level(log_level_to_u8(level)), level);
        }
    }

    #[test]
    fn cached_log_level_is_sticky() {
        let previous =
            CACHED_LOG_LEVEL.swap(log_level_to_u8(Some(PoolLogLevel::Warn)), Ordering::SeqCst);
        assert_eq!(env_log_level(), Some(PoolLogLevel::Warn));
        CACHED_LOG_LEVEL.store(LOG_OFF, Ordering::SeqCst);
        assert_eq!(env_log_level(), None);
        CACHED_LOG_LEVEL.store(previous, Ordering::SeqCst);
    }

    #[test]
    fn pool_order_from_capacity() {
        assert_eq!(PoolConfig::fixed(0).pool_order(), DEFAULT_K);
        assert_eq!(PoolConfig::fixed(1).pool_order(), MIN_K);
        assert_eq!(PoolConfig::fixed(1 << 20).pool_order(), 20);
        assert_eq!(PoolConfig::fixed((1 << 20) + 1).pool_order(), 21);
        assert_eq!(PoolConfig::fixed(usize::MAX).pool_order(), MAX_K - 1);
        assert_eq!(PoolConfig::fixed(0).with_default_order(22).pool_order(), 22);
    }

    #[test]
    fn fixed_config_disables_logging() {
        assert_eq!(PoolConfig::fixed(4096).log_level, None);
        assert_eq!(PoolConfig::default().capacity, 0);
    }
}
