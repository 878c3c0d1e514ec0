//! Workload harness for the buddy pool allocator.
//!
//! This crate provides:
//! - Scenario workloads that stress split and coalesce paths and check
//!   pool invariants as they go
//! - JSONL structured logs of pool lifecycle events and run markers
//! - Log schema validation

#![deny(unsafe_code)]

pub mod error;
pub mod structured_log;
pub mod workload;

pub use error::HarnessError;
pub use structured_log::{LogEmitter, LogEntry, LogLevel, validate_log_file, validate_log_line};
pub use workload::{Scenario, WorkloadConfig, WorkloadReport, run_workload, run_workload_logged};
