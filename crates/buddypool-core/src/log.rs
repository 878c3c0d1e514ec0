//! Structured lifecycle records.
//!
//! A pool keeps a bounded ring of [`PoolLogRecord`]s describing what each
//! call did. Nothing is printed; consumers drain the ring and render it
//! (the harness writes JSONL).

use std::collections::VecDeque;

/// Maximum records retained; older records are dropped first.
pub const LOG_RECORD_CAP: usize = 4096;

/// Severity of a lifecycle record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PoolLogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl PoolLogLevel {
    /// Parse a threshold (case-insensitive). `off` and unknown values give `None`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "all" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLogRecord {
    /// Monotonic per-pool event id.
    pub decision_id: u64,
    /// Correlation id (`core::buddy::<symbol>::<id>`).
    pub trace_id: String,
    pub level: PoolLogLevel,
    /// Entry point (`init`, `allocate`, `release`, `reallocate`).
    pub symbol: &'static str,
    /// Event kind (`alloc`, `split`, `merge`, `free`, ...).
    pub event: &'static str,
    /// Block offset from the pool base.
    pub offset: Option<usize>,
    /// Requested payload size.
    pub size: Option<usize>,
    pub order: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    pub details: String,
    /// Snapshot: blocks currently reserved.
    pub reserved_blocks: usize,
    /// Snapshot: bytes currently in free blocks.
    pub free_bytes: usize,
}

/// Event fields supplied by the pool; the log fills in ids and snapshots.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Event {
    pub(crate) level: PoolLogLevel,
    pub(crate) symbol: &'static str,
    pub(crate) event: &'static str,
    pub(crate) offset: Option<usize>,
    pub(crate) size: Option<usize>,
    pub(crate) order: Option<usize>,
    pub(crate) outcome: &'static str,
}

impl Event {
    pub(crate) const fn new(
        level: PoolLogLevel,
        symbol: &'static str,
        event: &'static str,
        outcome: &'static str,
    ) -> Self {
        Self {
            level,
            symbol,
            event,
            offset: None,
            size: None,
            order: None,
            outcome,
        }
    }

    pub(crate) const fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub(crate) const fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub(crate) const fn order(mut self, order: usize) -> Self {
        self.order = Some(order);
        self
    }
}

pub(crate) struct LifecycleLog {
    threshold: Option<PoolLogLevel>,
    records: VecDeque<PoolLogRecord>,
    next_decision_id: u64,
    dropped: u64,
}

impl LifecycleLog {
    pub(crate) const fn new(threshold: Option<PoolLogLevel>) -> Self {
        Self {
            threshold,
            records: VecDeque::new(),
            next_decision_id: 1,
            dropped: 0,
        }
    }

    pub(crate) fn enabled(&self, level: PoolLogLevel) -> bool {
        self.threshold.is_some_and(|min| level >= min)
    }

    pub(crate) fn record(
        &mut self,
        event: Event,
        details: impl FnOnce() -> String,
        reserved_blocks: usize,
        free_bytes: usize,
    ) {
        if !self.enabled(event.level) {
            return;
        }
        let decision_id = self.next_decision_id;
        self.next_decision_id = self.next_decision_id.wrapping_add(1);
        if self.records.len() == LOG_RECORD_CAP {
            self.records.pop_front();
            self.dropped += 1;
        }
        self.records.push_back(PoolLogRecord {
            decision_id,
            trace_id: format!("core::buddy::{}::{:016x}", event.symbol, decision_id),
            level: event.level,
            symbol: event.symbol,
            event: event.event,
            offset: event.offset,
            size: event.size,
            order: event.order,
            outcome: event.outcome,
            details: details(),
            reserved_blocks,
            free_bytes,
        });
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &PoolLogRecord> {
        self.records.iter()
    }

    pub(crate) fn drain(&mut self) -> Vec<PoolLogRecord> {
        self.records.drain(..).collect()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }
}
