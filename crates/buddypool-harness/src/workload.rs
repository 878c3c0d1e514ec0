//! Deterministic allocation workloads.
//!
//! Each scenario drives one pool with a seeded xorshift generator, stamps
//! every payload so that overlapping blocks are caught on release, checks
//! the pool's invariants periodically, and finally releases everything and
//! requires the pool to be back to a single free block.

use std::fmt;
use std::io::Write;
use std::ptr::NonNull;
use std::str::FromStr;
use std::time::Instant;

use buddypool_core::{BuddyPool, MIN_K, PoolConfig, PoolLogLevel};
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

/// Stamped payload prefix; larger blocks are only checked up to here.
const STAMP_LEN: usize = 256;

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range(&mut self, low: usize, high_inclusive: usize) -> usize {
        debug_assert!(low <= high_inclusive);
        let span = (high_inclusive - low) as u64 + 1;
        low + (self.next_u64() % span) as usize
    }

    fn coin(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Sawtooth,
    InverseSawtooth,
    RandomChurn,
    Exhaustion,
    MinBlockStorm,
}

impl Scenario {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sawtooth => "sawtooth",
            Self::InverseSawtooth => "inverse_sawtooth",
            Self::RandomChurn => "random_churn",
            Self::Exhaustion => "exhaustion",
            Self::MinBlockStorm => "min_block_storm",
        }
    }

    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::Sawtooth,
            Self::InverseSawtooth,
            Self::RandomChurn,
            Self::Exhaustion,
            Self::MinBlockStorm,
        ]
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Sawtooth => "ramp up a batch of small blocks, release it newest first, repeat",
            Self::InverseSawtooth => "fill the pool, release the oldest three quarters, refill",
            Self::RandomChurn => "interleave random-size allocations with random releases",
            Self::Exhaustion => "allocate large blocks until out of memory, release half, retry",
            Self::MinBlockStorm => "fill the pool with smallest blocks, release them shuffled",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::all()
            .into_iter()
            .find(|scenario| scenario.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = Self::all().iter().map(|s| s.as_str()).collect();
                HarnessError::UnknownScenario(s.to_string(), known.join(", "))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadConfig {
    pub scenario: Scenario,
    /// Pool order; the pool spans `2^pool_order` bytes.
    pub pool_order: usize,
    /// Allocate and release calls to issue.
    pub ops: usize,
    pub seed: u64,
    /// Run `verify()` every this many ops; 0 disables periodic checks.
    pub verify_every: usize,
    /// Lifecycle-log threshold of the pool under test.
    pub pool_log_level: Option<PoolLogLevel>,
}

impl WorkloadConfig {
    #[must_use]
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            pool_order: MIN_K + 2,
            ops: 20_000,
            seed: 0x5EED_B0DD,
            verify_every: 1_000,
            pool_log_level: None,
        }
    }
}

/// Outcome of one workload run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadReport {
    pub scenario: Scenario,
    pub pool_order: usize,
    pub seed: u64,
    pub ops: usize,
    pub allocations: u64,
    pub releases: u64,
    pub out_of_memory: u64,
    pub splits: u64,
    pub merges: u64,
    pub peak_reserved_blocks: usize,
    pub peak_reserved_bytes: usize,
    pub peak_utilization_permille: u16,
    pub verifications: usize,
    pub log_records: usize,
    pub final_pristine: bool,
    pub elapsed_ns: u64,
}

#[derive(Debug, Clone, Copy)]
struct Live {
    ptr: NonNull<u8>,
    size: usize,
    offset: usize,
    stamp: u8,
}

#[allow(unsafe_code)]
fn stamp(live: &Live) {
    // SAFETY: `ptr` is a live payload of at least `size` bytes.
    unsafe { live.ptr.as_ptr().write_bytes(live.stamp, live.size.min(STAMP_LEN)) };
}

#[allow(unsafe_code)]
fn stamp_intact(live: &Live) -> bool {
    // SAFETY: as in `stamp`.
    let bytes = unsafe { std::slice::from_raw_parts(live.ptr.as_ptr(), live.size.min(STAMP_LEN)) };
    bytes.iter().all(|&b| b == live.stamp)
}

struct Runner<'e, W: Write> {
    scenario: Scenario,
    pool: BuddyPool,
    live: Vec<Live>,
    rng: XorShift64,
    ops: usize,
    target: usize,
    verify_every: usize,
    verifications: usize,
    peak_blocks: usize,
    peak_bytes: usize,
    peak_permille: u16,
    log_records: usize,
    emitter: Option<&'e mut LogEmitter<W>>,
}

impl<W: Write> Runner<'_, W> {
    fn done(&self) -> bool {
        self.ops >= self.target
    }

    /// Try one allocation. Returns false when the pool is out of memory.
    fn allocate(&mut self, size: usize) -> Result<bool, HarnessError> {
        self.ops += 1;
        let outcome = self.pool.allocate(size);
        let allocated = if let Ok(ptr) = outcome {
            let offset = self
                .pool
                .block_info(ptr.as_ptr())
                .map_or(usize::MAX, |info| info.offset);
            let live = Live {
                ptr,
                size,
                offset,
                stamp: (self.ops as u8) | 1,
            };
            stamp(&live);
            self.live.push(live);
            self.track_peaks();
            true
        } else {
            false
        };
        self.after_op()?;
        Ok(allocated)
    }

    fn release(&mut self, live: Live) -> Result<(), HarnessError> {
        if !stamp_intact(&live) {
            return Err(HarnessError::PayloadCorrupted {
                scenario: self.scenario.as_str(),
                offset: live.offset,
            });
        }
        self.ops += 1;
        release_block(&mut self.pool, live.ptr);
        self.after_op()
    }

    fn release_random(&mut self) -> Result<(), HarnessError> {
        let index = self.rng.gen_range(0, self.live.len() - 1);
        let live = self.live.swap_remove(index);
        self.release(live)
    }

    fn track_peaks(&mut self) {
        let stats = self.pool.stats();
        self.peak_blocks = self.peak_blocks.max(stats.reserved_blocks);
        self.peak_bytes = self.peak_bytes.max(stats.reserved_bytes);
        self.peak_permille = self.peak_permille.max(stats.utilization_permille());
    }

    fn after_op(&mut self) -> Result<(), HarnessError> {
        if self.verify_every > 0 && self.ops % self.verify_every == 0 {
            self.verify()?;
        }
        self.flush_pool_logs()
    }

    fn verify(&mut self) -> Result<(), HarnessError> {
        self.verifications += 1;
        self.pool.verify().map_err(|source| HarnessError::Invariant {
            scenario: self.scenario.as_str(),
            step: self.ops,
            source,
        })
    }

    fn flush_pool_logs(&mut self) -> Result<(), HarnessError> {
        let Some(emitter) = self.emitter.as_deref_mut() else {
            return Ok(());
        };
        let records = self.pool.drain_lifecycle_logs();
        emitter.emit_pool_records(&records, self.scenario.as_str())?;
        self.log_records += records.len();
        Ok(())
    }

    fn release_all_shuffled(&mut self) -> Result<(), HarnessError> {
        while !self.live.is_empty() {
            self.release_random()?;
        }
        Ok(())
    }

    fn small_size(&mut self) -> usize {
        self.rng.gen_range(1, 2048)
    }

    fn sawtooth(&mut self) -> Result<(), HarnessError> {
        while !self.done() {
            let ramp = self.rng.gen_range(16, 256);
            for _ in 0..ramp {
                let size = self.small_size();
                if self.done() || !self.allocate(size)? {
                    break;
                }
            }
            while let Some(live) = self.live.pop() {
                self.release(live)?;
            }
        }
        Ok(())
    }

    fn inverse_sawtooth(&mut self) -> Result<(), HarnessError> {
        while !self.done() {
            loop {
                let size = self.small_size();
                if self.done() || !self.allocate(size)? {
                    break;
                }
            }
            let keep = self.live.len() / 4;
            let oldest: Vec<Live> = self.live.drain(..self.live.len() - keep).collect();
            for live in oldest {
                self.release(live)?;
            }
        }
        Ok(())
    }

    fn random_churn(&mut self) -> Result<(), HarnessError> {
        while !self.done() {
            if self.live.is_empty() || self.rng.coin() {
                let magnitude = self.rng.gen_range(3, 14);
                let size = self.rng.gen_range(1, 1 << magnitude);
                self.allocate(size)?;
            } else {
                self.release_random()?;
            }
        }
        Ok(())
    }

    fn exhaustion(&mut self) -> Result<(), HarnessError> {
        let largest = (self.pool.max_request() / 8).max(1);
        while !self.done() {
            loop {
                let size = self.rng.gen_range(1, largest);
                if self.done() || !self.allocate(size)? {
                    break;
                }
            }
            for _ in 0..self.live.len().div_ceil(2) {
                self.release_random()?;
            }
        }
        Ok(())
    }

    fn min_block_storm(&mut self) -> Result<(), HarnessError> {
        while !self.done() {
            while !self.done() && self.allocate(1)? {}
            self.release_all_shuffled()?;
        }
        Ok(())
    }

    fn emit(&mut self, entry: LogEntry) -> Result<(), HarnessError> {
        if let Some(emitter) = self.emitter.as_deref_mut() {
            emitter.emit_entry(entry.with_scenario(self.scenario.as_str()))?;
        }
        Ok(())
    }
}

#[allow(unsafe_code)]
fn release_block(pool: &mut BuddyPool, ptr: NonNull<u8>) {
    // SAFETY: `ptr` came from `pool.allocate` and is released exactly once,
    // when its `Live` entry is consumed.
    unsafe { pool.release(ptr.as_ptr()) };
}

/// Run a workload without structured output.
pub fn run_workload(config: &WorkloadConfig) -> Result<WorkloadReport, HarnessError> {
    run_workload_logged::<std::io::Sink>(config, None)
}

/// Run a workload, writing pool lifecycle records and run markers to
/// `emitter` when given.
pub fn run_workload_logged<W: Write>(
    config: &WorkloadConfig,
    emitter: Option<&mut LogEmitter<W>>,
) -> Result<WorkloadReport, HarnessError> {
    let pool_config = PoolConfig::fixed(1 << config.pool_order.min(usize::BITS as usize - 1))
        .with_log_level(config.pool_log_level);
    let pool = BuddyPool::with_config(pool_config)?;
    let started = Instant::now();

    let mut runner = Runner {
        scenario: config.scenario,
        pool,
        live: Vec::new(),
        rng: XorShift64::new(config.seed),
        ops: 0,
        target: config.ops,
        verify_every: config.verify_every,
        verifications: 0,
        peak_blocks: 0,
        peak_bytes: 0,
        peak_permille: 0,
        log_records: 0,
        emitter,
    };
    let pool_order = runner.pool.order();
    runner.emit(
        LogEntry::new(String::new(), LogLevel::Info, "workload_start").with_details(
            serde_json::json!({
                "pool_order": pool_order,
                "ops": config.ops,
                "seed": config.seed,
            }),
        ),
    )?;
    runner.flush_pool_logs()?;

    match config.scenario {
        Scenario::Sawtooth => runner.sawtooth()?,
        Scenario::InverseSawtooth => runner.inverse_sawtooth()?,
        Scenario::RandomChurn => runner.random_churn()?,
        Scenario::Exhaustion => runner.exhaustion()?,
        Scenario::MinBlockStorm => runner.min_block_storm()?,
    }
    runner.release_all_shuffled()?;
    runner.verify()?;
    let final_pristine = runner.pool.is_pristine();

    let stats = runner.pool.stats();
    let elapsed = started.elapsed();
    let report = WorkloadReport {
        scenario: config.scenario,
        pool_order,
        seed: config.seed,
        ops: runner.ops,
        allocations: stats.allocations,
        releases: stats.releases,
        out_of_memory: stats.out_of_memory,
        splits: stats.splits,
        merges: stats.merges,
        peak_reserved_blocks: runner.peak_blocks,
        peak_reserved_bytes: runner.peak_bytes,
        peak_utilization_permille: runner.peak_permille,
        verifications: runner.verifications,
        log_records: runner.log_records,
        final_pristine,
        elapsed_ns: u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
    };

    let outcome = if final_pristine { Outcome::Pass } else { Outcome::Fail };
    runner.emit(
        LogEntry::new(String::new(), LogLevel::Info, "workload_end")
            .with_outcome(outcome)
            .with_duration_ms(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .with_details(serde_json::to_value(&report)?),
    )?;

    let Runner { pool, emitter, .. } = runner;
    if let Some(emitter) = emitter {
        emitter.flush()?;
    }
    pool.destroy()?;

    if !final_pristine {
        return Err(HarnessError::NotPristine {
            scenario: config.scenario.as_str(),
        });
    }
    Ok(report)
}
