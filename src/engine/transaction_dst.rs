//! Deterministic simulation testing for the transaction engine.
//!
//! Seeded, reproducible interleavings of two clients against one
//! `ServerState`, covering WATCH conflict detection, DISCARD, queue-time
//! errors and flush tainting. After every scenario the harness checks the
//! structural invariants of the watcher relation:
//!
//! - bidirectional consistency: a client sits in a per-key watcher list
//!   iff the pair is in its forward list, with matching multiplicity
//! - no duplicate `(db, key)` pairs within a client's forward list
//! - no key mapped to an empty watcher list (eager pruning)
//! - `queued_flags` equals the OR-fold of flags over the queue
//! - a non-empty queue implies an open MULTI
//!
//! ## Usage
//!
//! ```rust,ignore
//! for seed in 0..100 {
//!     let mut harness = TransactionDstHarness::with_seed(seed);
//!     harness.run(200);
//!     assert!(harness.result().is_success(), "seed {} failed", seed);
//! }
//! ```

use super::command::CommandFlags;
use super::resp::RespValue;
use super::session::ClientId;
use super::state::ServerState;
use bytes::Bytes;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Configuration for a transaction DST run.
#[derive(Debug, Clone)]
pub struct TransactionDstConfig {
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Number of unique keys.
    pub num_keys: usize,
    /// Probability of the WATCH-conflict scenario.
    pub conflict_prob: f64,
    /// Probability of the DISCARD scenario.
    pub discard_prob: f64,
    /// Probability of an error scenario (nested MULTI, queue-time error, ...).
    pub error_prob: f64,
    /// Probability of the flush-while-watching scenario.
    pub flush_prob: f64,
}

impl Default for TransactionDstConfig {
    fn default() -> Self {
        TransactionDstConfig {
            seed: 0,
            num_keys: 20,
            conflict_prob: 0.25,
            discard_prob: 0.15,
            error_prob: 0.1,
            flush_prob: 0.05,
        }
    }
}

impl TransactionDstConfig {
    pub fn new(seed: u64) -> Self {
        TransactionDstConfig {
            seed,
            ..Default::default()
        }
    }

    pub fn high_conflict(seed: u64) -> Self {
        TransactionDstConfig {
            seed,
            num_keys: 5, // small key space = more conflicts
            conflict_prob: 0.5,
            discard_prob: 0.1,
            error_prob: 0.05,
            flush_prob: 0.05,
        }
    }

    pub fn error_heavy(seed: u64) -> Self {
        TransactionDstConfig {
            seed,
            error_prob: 0.3,
            discard_prob: 0.2,
            ..Default::default()
        }
    }
}

/// Result of one DST run.
#[derive(Debug, Clone)]
pub struct TransactionDstResult {
    pub seed: u64,
    pub total_operations: u64,
    pub watch_no_conflict: u64,
    pub watch_conflict: u64,
    pub simple_exec: u64,
    pub discards: u64,
    pub error_scenarios: u64,
    pub unwatch_scenarios: u64,
    pub flush_scenarios: u64,
    pub invariant_violations: Vec<String>,
}

impl TransactionDstResult {
    fn new(seed: u64) -> Self {
        TransactionDstResult {
            seed,
            total_operations: 0,
            watch_no_conflict: 0,
            watch_conflict: 0,
            simple_exec: 0,
            discards: 0,
            error_scenarios: 0,
            unwatch_scenarios: 0,
            flush_scenarios: 0,
            invariant_violations: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops (no_conflict:{}, conflict:{}, exec:{}, discard:{}, error:{}, unwatch:{}, flush:{}), {} violations",
            self.seed,
            self.total_operations,
            self.watch_no_conflict,
            self.watch_conflict,
            self.simple_exec,
            self.discards,
            self.error_scenarios,
            self.unwatch_scenarios,
            self.flush_scenarios,
            self.invariant_violations.len()
        )
    }
}

/// DST harness: two clients interleaved on one server state.
pub struct TransactionDstHarness {
    config: TransactionDstConfig,
    rng: ChaCha8Rng,
    state: ServerState,
    client_a: ClientId,
    client_b: ClientId,
    result: TransactionDstResult,
}

impl TransactionDstHarness {
    pub fn new(config: TransactionDstConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut state = ServerState::new();
        state.enable_replication_backlog();
        let client_a = state.connect_client("dst-a:1");
        let client_b = state.connect_client("dst-b:2");
        TransactionDstHarness {
            result: TransactionDstResult::new(config.seed),
            config,
            rng,
            state,
            client_a,
            client_b,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(TransactionDstConfig::new(seed))
    }

    fn dispatch(&mut self, client: ClientId, parts: &[&str]) -> RespValue {
        let argv: Vec<Bytes> = parts
            .iter()
            .map(|p| Bytes::from(p.to_string()))
            .collect();
        self.state.dispatch(client, argv)
    }

    fn random_key(&mut self) -> String {
        let idx = self.rng.gen_range(0..self.config.num_keys);
        format!("txkey:{}", idx)
    }

    fn random_value(&mut self) -> String {
        format!("txval:{}", self.rng.gen_range(0..100u32))
    }

    // =========================================================================
    // Scenario runners
    // =========================================================================

    fn run_single_op(&mut self) {
        let roll: f64 = self.rng.gen();

        let error_at = self.config.error_prob;
        let discard_at = error_at + self.config.discard_prob;
        let conflict_at = discard_at + self.config.conflict_prob;
        let flush_at = conflict_at + self.config.flush_prob;

        if roll < error_at {
            self.run_error_scenario();
        } else if roll < discard_at {
            self.run_discard_scenario();
        } else if roll < conflict_at {
            self.run_watch_conflict_scenario();
        } else if roll < flush_at {
            self.run_flush_scenario();
        } else if roll < flush_at + 0.15 {
            self.run_unwatch_scenario();
        } else if self.rng.gen() {
            self.run_watch_no_conflict_scenario();
        } else {
            self.run_simple_exec_scenario();
        }

        self.check_structural_invariants();
    }

    /// WATCH + no interleaved mutation -> EXEC runs.
    fn run_watch_no_conflict_scenario(&mut self) {
        self.result.watch_no_conflict += 1;
        let key = self.random_key();
        let value = self.random_value();
        let new_value = self.random_value();
        let a = self.client_a;

        self.dispatch(a, &["SET", &key, &value]);
        let watch = self.dispatch(a, &["WATCH", &key]);
        self.assert_ok(&watch, "WATCH should return OK");

        let multi = self.dispatch(a, &["MULTI"]);
        self.assert_ok(&multi, "MULTI should return OK");
        let queued = self.dispatch(a, &["SET", &key, &new_value]);
        self.assert_queued(&queued, "SET inside MULTI should be QUEUED");

        let exec = self.dispatch(a, &["EXEC"]);
        match &exec {
            RespValue::Array(Some(results)) => {
                if results.len() != 1 {
                    self.violation(&format!("EXEC should return 1 result, got {}", results.len()));
                }
                let get = self.dispatch(a, &["GET", &key]);
                self.assert_bulk_eq(&get, new_value.as_bytes(), "GET after successful EXEC");
            }
            RespValue::Array(None) => {
                self.violation("EXEC returned null array but no conflict occurred");
            }
            other => self.violation(&format!("EXEC returned unexpected: {:?}", other)),
        }
    }

    /// WATCH + mutation by the other client -> EXEC returns null array.
    fn run_watch_conflict_scenario(&mut self) {
        self.result.watch_conflict += 1;
        let key = self.random_key();
        let value = self.random_value();
        let conflict_value = format!("{}-conflict", self.random_value());
        let new_value = self.random_value();
        let (a, b) = (self.client_a, self.client_b);

        self.dispatch(a, &["SET", &key, &value]);
        let watch = self.dispatch(a, &["WATCH", &key]);
        self.assert_ok(&watch, "WATCH should return OK");

        // The other connection mutates between WATCH and EXEC.
        self.dispatch(b, &["SET", &key, &conflict_value]);

        let multi = self.dispatch(a, &["MULTI"]);
        self.assert_ok(&multi, "MULTI should return OK");
        let queued = self.dispatch(a, &["SET", &key, &new_value]);
        self.assert_queued(&queued, "SET inside MULTI should be QUEUED");

        let exec = self.dispatch(a, &["EXEC"]);
        match &exec {
            RespValue::Array(None) => {
                let get = self.dispatch(a, &["GET", &key]);
                self.assert_bulk_eq(
                    &get,
                    conflict_value.as_bytes(),
                    "GET after cancelled EXEC should see the conflicting write",
                );
            }
            RespValue::Array(Some(_)) => {
                self.violation("EXEC ran despite WATCH conflict, expected null array");
            }
            other => self.violation(&format!("EXEC returned unexpected on conflict: {:?}", other)),
        }
    }

    /// Plain MULTI/EXEC without WATCH.
    fn run_simple_exec_scenario(&mut self) {
        self.result.simple_exec += 1;
        let key1 = self.random_key();
        let key2 = self.random_key();
        let val1 = self.random_value();
        let val2 = self.random_value();
        let a = self.client_a;

        let multi = self.dispatch(a, &["MULTI"]);
        self.assert_ok(&multi, "MULTI should return OK");
        let q1 = self.dispatch(a, &["SET", &key1, &val1]);
        self.assert_queued(&q1, "first queued SET");
        let q2 = self.dispatch(a, &["SET", &key2, &val2]);
        self.assert_queued(&q2, "second queued SET");

        let exec = self.dispatch(a, &["EXEC"]);
        match &exec {
            RespValue::Array(Some(results)) => {
                if results.len() != 2 {
                    self.violation(&format!("EXEC should return 2 results, got {}", results.len()));
                }
                if key1 == key2 {
                    let get = self.dispatch(a, &["GET", &key1]);
                    self.assert_bulk_eq(&get, val2.as_bytes(), "duplicate key: last SET wins");
                } else {
                    let get1 = self.dispatch(a, &["GET", &key1]);
                    self.assert_bulk_eq(&get1, val1.as_bytes(), "GET key1 after EXEC");
                    let get2 = self.dispatch(a, &["GET", &key2]);
                    self.assert_bulk_eq(&get2, val2.as_bytes(), "GET key2 after EXEC");
                }
            }
            other => self.violation(&format!("EXEC returned unexpected: {:?}", other)),
        }
    }

    /// MULTI then DISCARD leaves the store untouched.
    fn run_discard_scenario(&mut self) {
        self.result.discards += 1;
        let key = self.random_key();
        let old_value = self.random_value();
        let new_value = self.random_value();
        let a = self.client_a;

        self.dispatch(a, &["SET", &key, &old_value]);
        let multi = self.dispatch(a, &["MULTI"]);
        self.assert_ok(&multi, "MULTI should return OK");
        let queued = self.dispatch(a, &["SET", &key, &new_value]);
        self.assert_queued(&queued, "queued SET before DISCARD");

        let discard = self.dispatch(a, &["DISCARD"]);
        self.assert_ok(&discard, "DISCARD should return OK");

        let get = self.dispatch(a, &["GET", &key]);
        self.assert_bulk_eq(&get, old_value.as_bytes(), "GET after DISCARD sees old value");

        let exec = self.dispatch(a, &["EXEC"]);
        self.assert_error_contains(&exec, "EXEC without MULTI", "EXEC after DISCARD");
    }

    /// Error conditions: nested MULTI, EXEC/DISCARD without MULTI, WATCH
    /// inside MULTI, and queue-time errors aborting the batch.
    fn run_error_scenario(&mut self) {
        self.result.error_scenarios += 1;
        let a = self.client_a;
        match self.rng.gen_range(0..5u32) {
            0 => {
                let m1 = self.dispatch(a, &["MULTI"]);
                self.assert_ok(&m1, "first MULTI should return OK");
                let m2 = self.dispatch(a, &["MULTI"]);
                self.assert_error_contains(&m2, "nested", "nested MULTI");
                self.dispatch(a, &["DISCARD"]);
            }
            1 => {
                let exec = self.dispatch(a, &["EXEC"]);
                self.assert_error_contains(&exec, "EXEC without MULTI", "stray EXEC");
            }
            2 => {
                let discard = self.dispatch(a, &["DISCARD"]);
                self.assert_error_contains(&discard, "DISCARD without MULTI", "stray DISCARD");
            }
            3 => {
                let key = self.random_key();
                let m = self.dispatch(a, &["MULTI"]);
                self.assert_ok(&m, "MULTI should return OK");
                let w = self.dispatch(a, &["WATCH", &key]);
                self.assert_error_contains(&w, "WATCH inside MULTI", "WATCH inside MULTI");
                self.dispatch(a, &["DISCARD"]);
            }
            _ => {
                // Queue-time error: the whole batch must abort, even the
                // well-formed commands queued around the bad one.
                let key = self.random_key();
                let value = self.random_value();
                let prior = self.dispatch(a, &["GET", &key]);
                let m = self.dispatch(a, &["MULTI"]);
                self.assert_ok(&m, "MULTI should return OK");
                let bad = self.dispatch(a, &["NOSUCHCMD"]);
                if !matches!(bad, RespValue::Error(_)) {
                    self.violation("unknown command inside MULTI should reply with an error");
                }
                let queued = self.dispatch(a, &["SET", &key, &value]);
                self.assert_queued(&queued, "SET after queue-time error still queues");
                let exec = self.dispatch(a, &["EXEC"]);
                self.assert_error_contains(&exec, "EXECABORT", "EXEC after queue-time error");
                let after = self.dispatch(a, &["GET", &key]);
                if after != prior {
                    self.violation("aborted EXEC must not apply queued writes");
                }
            }
        }
    }

    /// UNWATCH forgives an interleaved mutation.
    fn run_unwatch_scenario(&mut self) {
        self.result.unwatch_scenarios += 1;
        let key = self.random_key();
        let value = self.random_value();
        let conflict_value = self.random_value();
        let new_value = self.random_value();
        let (a, b) = (self.client_a, self.client_b);

        self.dispatch(a, &["SET", &key, &value]);
        self.dispatch(a, &["WATCH", &key]);
        self.dispatch(b, &["SET", &key, &conflict_value]);

        let unwatch = self.dispatch(a, &["UNWATCH"]);
        self.assert_ok(&unwatch, "UNWATCH should return OK");

        let multi = self.dispatch(a, &["MULTI"]);
        self.assert_ok(&multi, "MULTI after UNWATCH should return OK");
        let queued = self.dispatch(a, &["SET", &key, &new_value]);
        self.assert_queued(&queued, "queued SET after UNWATCH");

        let exec = self.dispatch(a, &["EXEC"]);
        match &exec {
            RespValue::Array(Some(_)) => {
                let get = self.dispatch(a, &["GET", &key]);
                self.assert_bulk_eq(&get, new_value.as_bytes(), "GET after UNWATCH + EXEC");
            }
            RespValue::Array(None) => {
                self.violation("EXEC returned null array after UNWATCH, should have run");
            }
            other => self.violation(&format!("EXEC after UNWATCH returned: {:?}", other)),
        }
    }

    /// FLUSHDB taints watchers of keys that existed; keys that never
    /// existed at flush time cancel nothing.
    fn run_flush_scenario(&mut self) {
        self.result.flush_scenarios += 1;
        let key = self.random_key();
        let value = self.random_value();
        let (a, b) = (self.client_a, self.client_b);

        let existed = self.rng.gen();
        if existed {
            self.dispatch(a, &["SET", &key, &value]);
        } else {
            self.dispatch(a, &["DEL", &key]);
        }
        self.dispatch(a, &["WATCH", &key]);
        self.dispatch(b, &["FLUSHDB"]);

        let multi = self.dispatch(a, &["MULTI"]);
        self.assert_ok(&multi, "MULTI should return OK");
        let queued = self.dispatch(a, &["PING"]);
        self.assert_queued(&queued, "PING inside MULTI should be QUEUED");

        let exec = self.dispatch(a, &["EXEC"]);
        match (existed, &exec) {
            (true, RespValue::Array(None)) => {}
            (true, other) => self.violation(&format!(
                "flush of an existing watched key must cancel EXEC, got {:?}",
                other
            )),
            (false, RespValue::Array(Some(_))) => {}
            (false, other) => self.violation(&format!(
                "flush of an absent watched key must not cancel EXEC, got {:?}",
                other
            )),
        }
    }

    // =========================================================================
    // Structural invariants
    // =========================================================================

    fn check_structural_invariants(&mut self) {
        let mut violations = Vec::new();

        for (id, session) in self.state.sessions.iter() {
            // Duplicate watches within a client.
            for wk in session.watched.iter() {
                let dups = session
                    .watched
                    .iter()
                    .filter(|other| other.db == wk.db && other.key == wk.key)
                    .count();
                if dups != 1 {
                    violations.push(format!(
                        "{}: duplicate watch of ({}, {}) x{}",
                        id, wk.db, wk.key, dups
                    ));
                    break;
                }
            }

            // Forward -> reverse.
            for wk in session.watched.iter() {
                let present = self.state.dbs[wk.db]
                    .watch
                    .watchers(&wk.key)
                    .map_or(false, |w| w.contains(id));
                if !present {
                    violations.push(format!(
                        "{}: watched ({}, {}) missing from index",
                        id, wk.db, wk.key
                    ));
                }
            }

            // Flag aggregation and queue discipline.
            let folded = session
                .queue
                .iter()
                .fold(CommandFlags::empty(), |acc, e| acc | e.cmd.flags());
            if folded != session.queued_flags {
                violations.push(format!(
                    "{}: queued_flags {:?} != OR-fold {:?}",
                    id, session.queued_flags, folded
                ));
            }
            if !session.queue.is_empty() && !session.in_multi {
                violations.push(format!("{}: non-empty queue outside MULTI", id));
            }
        }

        // Reverse -> forward, and eager pruning.
        for (db_id, db) in self.state.dbs.iter().enumerate() {
            for (key, watchers) in db.watch.iter() {
                if watchers.is_empty() {
                    violations.push(format!("db {}: key '{}' has empty watcher list", db_id, key));
                }
                for watcher in watchers {
                    let known = self
                        .state
                        .sessions
                        .get(watcher)
                        .map_or(false, |s| s.is_watching(db_id, key));
                    if !known {
                        violations.push(format!(
                            "db {}: index lists {} for '{}' without forward entry",
                            db_id, watcher, key
                        ));
                    }
                }
            }
        }

        for violation in violations {
            self.violation(&violation);
        }
    }

    // =========================================================================
    // Assertion helpers
    // =========================================================================

    fn violation(&mut self, msg: &str) {
        self.result
            .invariant_violations
            .push(format!("op #{}: {}", self.result.total_operations, msg));
    }

    fn assert_ok(&mut self, resp: &RespValue, context: &str) {
        if !matches!(resp, RespValue::SimpleString(s) if s == "OK") {
            self.violation(&format!("{}: expected OK, got {:?}", context, resp));
        }
    }

    fn assert_queued(&mut self, resp: &RespValue, context: &str) {
        if !matches!(resp, RespValue::SimpleString(s) if s == "QUEUED") {
            self.violation(&format!("{}: expected QUEUED, got {:?}", context, resp));
        }
    }

    fn assert_bulk_eq(&mut self, resp: &RespValue, expected: &[u8], context: &str) {
        match resp {
            RespValue::BulkString(Some(data)) if data == expected => {}
            other => self.violation(&format!(
                "{}: expected BulkString({:?}), got {:?}",
                context,
                String::from_utf8_lossy(expected),
                other
            )),
        }
    }

    fn assert_error_contains(&mut self, resp: &RespValue, needle: &str, context: &str) {
        match resp {
            RespValue::Error(e) if e.contains(needle) => {}
            other => self.violation(&format!(
                "{}: expected error containing '{}', got {:?}",
                context, needle, other
            )),
        }
    }

    // =========================================================================
    // Public API
    // =========================================================================

    /// Run `operations` scenarios, stopping at the first violation.
    pub fn run(&mut self, operations: usize) {
        for _ in 0..operations {
            self.result.total_operations += 1;
            self.run_single_op();
            if !self.result.invariant_violations.is_empty() {
                break;
            }
        }
    }

    pub fn result(&self) -> &TransactionDstResult {
        &self.result
    }
}

/// Run a batch of seeds through one configuration.
pub fn run_transaction_batch(
    start_seed: u64,
    num_seeds: usize,
    ops_per_seed: usize,
    config_fn: fn(u64) -> TransactionDstConfig,
) -> Vec<TransactionDstResult> {
    (0..num_seeds)
        .map(|i| {
            let seed = start_seed + i as u64;
            let mut harness = TransactionDstHarness::new(config_fn(seed));
            harness.run(ops_per_seed);
            harness.result().clone()
        })
        .collect()
}

/// Summarize batch results for test output.
pub fn summarize_transaction_batch(results: &[TransactionDstResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();

    let mut summary = format!(
        "Transaction DST Summary\n\
         =======================\n\
         Seeds: {} total, {} passed, {} failed\n\
         Total operations: {}\n",
        total,
        passed,
        total - passed,
        total_ops
    );

    for result in results.iter().filter(|r| !r.is_success()) {
        summary.push_str(&format!("  {}\n", result.summary()));
        for violation in &result.invariant_violations {
            summary.push_str(&format!("    - {}\n", violation));
        }
    }

    summary
}
