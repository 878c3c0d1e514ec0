use buddypool_core::{AllocError, MIN_K, PoolLogLevel};
use buddypool_harness::{
    LogEmitter, Scenario, WorkloadConfig, WorkloadReport, run_workload, run_workload_logged,
    validate_log_file, validate_log_line,
};

fn small(scenario: Scenario) -> WorkloadConfig {
    WorkloadConfig {
        pool_order: MIN_K,
        ops: 3_000,
        verify_every: 200,
        ..WorkloadConfig::new(scenario)
    }
}

#[test]
fn every_scenario_returns_to_pristine() {
    for scenario in Scenario::all() {
        let report = run_workload(&small(scenario)).unwrap();
        assert_eq!(report.scenario, scenario);
        assert!(report.final_pristine, "{scenario}");
        assert_eq!(report.allocations, report.releases, "{scenario}");
        assert!(report.ops >= 3_000, "{scenario}");
        assert!(report.splits > 0, "{scenario}");
        assert!(report.verifications > 0, "{scenario}");
        assert_eq!(report.pool_order, MIN_K);
    }
}

#[test]
fn exhausting_scenarios_hit_out_of_memory() {
    for scenario in [Scenario::Exhaustion, Scenario::MinBlockStorm] {
        let config = WorkloadConfig {
            ops: 40_000,
            ..small(scenario)
        };
        let report = run_workload(&config).unwrap();
        assert!(report.out_of_memory > 0, "{scenario}");
        assert!(report.peak_utilization_permille > 500, "{scenario}");
    }
}

#[test]
fn min_block_storm_fills_every_smallest_block() {
    let config = WorkloadConfig {
        ops: 1 << 15,
        ..small(Scenario::MinBlockStorm)
    };
    let report = run_workload(&config).unwrap();
    assert_eq!(report.peak_reserved_blocks, 1 << (MIN_K - 6));
    assert_eq!(report.peak_utilization_permille, 1000);
}

#[test]
fn runs_are_deterministic_for_a_seed() {
    let config = small(Scenario::RandomChurn);
    let first = run_workload(&config).unwrap();
    let second = run_workload(&config).unwrap();
    let strip = |r: WorkloadReport| WorkloadReport { elapsed_ns: 0, ..r };
    assert_eq!(strip(first), strip(second));
}

#[test]
fn logged_run_produces_valid_jsonl() {
    let config = WorkloadConfig {
        ops: 400,
        pool_log_level: Some(PoolLogLevel::Trace),
        ..small(Scenario::Sawtooth)
    };
    let mut emitter = LogEmitter::to_buffer("test-run");
    let report = run_workload_logged(&config, Some(&mut emitter)).unwrap();
    assert!(report.log_records > 0);

    let text = emitter.contents();
    let lines: Vec<&str> = text.lines().collect();
    // Pool records plus the start and end markers.
    assert_eq!(lines.len(), report.log_records + 2);
    let entries: Vec<_> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| validate_log_line(line, i + 1).expect("valid line"))
        .collect();
    assert_eq!(entries.first().unwrap().event, "workload_start");
    assert_eq!(entries.last().unwrap().event, "workload_end");
    assert!(entries.iter().any(|e| e.event == "split"));
    assert!(entries.iter().any(|e| e.event == "merge"));
    assert!(
        entries
            .iter()
            .filter(|e| e.symbol.is_some())
            .all(|e| e.trace_id.starts_with("core::buddy::"))
    );
    assert!(
        entries
            .iter()
            .all(|e| e.scenario.as_deref() == Some("sawtooth"))
    );
}

#[test]
fn log_file_roundtrip_validates() {
    let dir = std::env::temp_dir().join(format!("buddypool-harness-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("workload.jsonl");

    let config = WorkloadConfig {
        ops: 200,
        pool_log_level: Some(PoolLogLevel::Debug),
        ..small(Scenario::InverseSawtooth)
    };
    {
        let mut emitter = LogEmitter::to_file(&path, "file-run").unwrap();
        run_workload_logged(&config, Some(&mut emitter)).unwrap();
    }
    let (lines, errors) = validate_log_file(&path).unwrap();
    assert!(lines > 2);
    assert!(errors.is_empty(), "{errors:?}");

    std::fs::write(&path, "{\"level\":\"info\"}\n\n").unwrap();
    let (lines, errors) = validate_log_file(&path).unwrap();
    assert_eq!(lines, 1);
    assert_eq!(errors.len(), 3);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn logged_exhaustion_reports_enomem() {
    let config = WorkloadConfig {
        ops: 40_000,
        pool_log_level: Some(PoolLogLevel::Warn),
        ..small(Scenario::Exhaustion)
    };
    let mut emitter = LogEmitter::to_buffer("oom-run");
    let report = run_workload_logged(&config, Some(&mut emitter)).unwrap();
    assert!(report.out_of_memory > 0);

    let enomem = AllocError::OutOfMemory { requested_order: 0 }.errno();
    let text = emitter.contents();
    let failures: Vec<_> = text
        .lines()
        .enumerate()
        .map(|(i, line)| validate_log_line(line, i + 1).expect("valid line"))
        .filter(|e| e.pool_outcome.as_deref() == Some("oom"))
        .collect();
    assert!(!failures.is_empty());
    assert!(failures.iter().all(|e| e.errno == Some(enomem)));
}
