//! # buddypool-core
//!
//! Buddy-system allocator engine. A [`BuddyPool`] maps one region of
//! `2^k` bytes from the operating system and serves variable-size requests
//! by splitting power-of-two blocks on allocation and coalescing buddies on
//! release.
//!
//! Raw memory access is confined to the `region` module. Everything else
//! works on byte offsets from the pool base and on copied block headers.

#![deny(unsafe_code)]

pub mod block;
pub mod buddy;
pub mod config;
pub mod error;
pub mod free_list;
pub mod locked;
pub mod log;
pub mod order;
pub mod pool;
#[allow(unsafe_code)]
mod region;
pub mod resize;
pub mod stats;

pub use block::{BlockHeader, BlockInfo, BlockTag};
pub use buddy::buddy_of;
pub use config::{DEFAULT_K, HEADER_SIZE, MAX_ALIGN, MAX_K, MIN_K, PoolConfig, SMALLEST_K};
pub use error::{AllocError, InvariantViolation, PoolError};
pub use free_list::FreeListSnapshot;
pub use locked::LockedPool;
pub use log::{PoolLogLevel, PoolLogRecord};
pub use order::{block_size, order_for, request_order, usable_size};
pub use pool::BuddyPool;
pub use stats::PoolStats;
