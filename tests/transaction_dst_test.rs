//! Transaction deterministic simulation tests.
//!
//! Seed batches over interleaved two-client workloads, verifying the
//! watcher-relation invariants and transaction replies after every
//! operation.

use atomkv::engine::{
    run_transaction_batch, summarize_transaction_batch, TransactionDstConfig,
    TransactionDstHarness,
};

// =============================================================================
// Standard configuration - 100 seeds
// =============================================================================

#[test]
fn test_transaction_dst_100_seeds_standard() {
    let results = run_transaction_batch(0, 100, 200, TransactionDstConfig::new);
    let summary = summarize_transaction_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "all 100 seeds should pass with standard config");
}

#[test]
fn test_transaction_dst_100_seeds_high_conflict() {
    let results = run_transaction_batch(1000, 100, 200, TransactionDstConfig::high_conflict);
    let summary = summarize_transaction_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "all 100 high-conflict seeds should pass");

    let total_conflicts: u64 = results.iter().map(|r| r.watch_conflict).sum();
    assert!(
        total_conflicts > 50,
        "high-conflict config should exercise many conflicts, got {}",
        total_conflicts
    );
}

#[test]
fn test_transaction_dst_100_seeds_error_heavy() {
    let results = run_transaction_batch(2000, 100, 200, TransactionDstConfig::error_heavy);
    let summary = summarize_transaction_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "all 100 error-heavy seeds should pass");

    let total_errors: u64 = results.iter().map(|r| r.error_scenarios).sum();
    assert!(
        total_errors > 100,
        "error-heavy config should exercise many error scenarios, got {}",
        total_errors
    );
}

// =============================================================================
// Stress
// =============================================================================

#[test]
fn test_transaction_dst_stress_1000_ops() {
    let mut harness = TransactionDstHarness::with_seed(42);
    harness.run(1000);
    let result = harness.result();
    println!("stress 1000 ops: {}", result.summary());
    assert!(result.is_success(), "1000 ops should maintain invariants");
}

#[test]
fn test_transaction_dst_stress_2000_ops_high_conflict() {
    let mut harness = TransactionDstHarness::new(TransactionDstConfig::high_conflict(99999));
    harness.run(2000);
    let result = harness.result();
    println!(
        "stress high conflict 2000 ops: {} (conflicts: {}, clean: {})",
        result.summary(),
        result.watch_conflict,
        result.watch_no_conflict
    );
    assert!(result.is_success(), "high-conflict stress should maintain invariants");
}

// =============================================================================
// Edge cases
// =============================================================================

#[test]
fn test_transaction_dst_tiny_keyspace() {
    let config = TransactionDstConfig {
        seed: 77777,
        num_keys: 2, // only two keys: constant collisions
        conflict_prob: 0.5,
        discard_prob: 0.1,
        error_prob: 0.1,
        flush_prob: 0.1,
    };

    let mut harness = TransactionDstHarness::new(config);
    harness.run(500);
    let result = harness.result();
    println!("tiny keyspace (2 keys): {}", result.summary());
    assert!(result.is_success(), "tiny keyspace should maintain invariants");
}

#[test]
fn test_transaction_dst_all_scenarios_exercised() {
    let mut harness = TransactionDstHarness::with_seed(7);
    harness.run(2000);
    let result = harness.result();
    println!("coverage run: {}", result.summary());
    assert!(result.is_success());
    assert!(result.watch_no_conflict > 0);
    assert!(result.watch_conflict > 0);
    assert!(result.simple_exec > 0);
    assert!(result.discards > 0);
    assert!(result.error_scenarios > 0);
    assert!(result.unwatch_scenarios > 0);
    assert!(result.flush_scenarios > 0);
}

#[test]
fn test_transaction_dst_is_deterministic() {
    let mut first = TransactionDstHarness::with_seed(31337);
    first.run(300);
    let mut second = TransactionDstHarness::with_seed(31337);
    second.run(300);

    assert_eq!(first.result().summary(), second.result().summary());
}
