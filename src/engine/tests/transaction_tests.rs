//! Transaction state machine and end-to-end batch semantics.

use super::super::command::CommandFlags;
use super::super::resp::RespValue;
use super::super::session::ClientId;
use super::super::state::ServerState;
use super::argv;

fn setup() -> (ServerState, ClientId, ClientId) {
    let mut state = ServerState::new();
    let a = state.connect_client("test-a:1");
    let b = state.connect_client("test-b:2");
    (state, a, b)
}

fn run(state: &mut ServerState, id: ClientId, parts: &[&str]) -> RespValue {
    state.dispatch(id, argv(parts))
}

// ============================================
// Wire scenarios
// ============================================

#[test]
fn test_successful_batch() {
    let (mut state, a, _) = setup();

    assert_eq!(run(&mut state, a, &["MULTI"]), RespValue::ok());
    assert_eq!(run(&mut state, a, &["SET", "a", "1"]), RespValue::queued());
    assert_eq!(run(&mut state, a, &["INCR", "a"]), RespValue::queued());

    let exec = run(&mut state, a, &["EXEC"]);
    assert_eq!(
        exec,
        RespValue::Array(Some(vec![RespValue::ok(), RespValue::Integer(2)]))
    );
    assert_eq!(run(&mut state, a, &["GET", "a"]), RespValue::bulk(b"2".to_vec()));
}

#[test]
fn test_cas_cancel() {
    let (mut state, a, b) = setup();

    run(&mut state, a, &["SET", "a", "1"]);
    assert_eq!(run(&mut state, a, &["WATCH", "a"]), RespValue::ok());
    // Concurrent write from another connection.
    assert_eq!(run(&mut state, b, &["SET", "a", "9"]), RespValue::ok());

    assert_eq!(run(&mut state, a, &["MULTI"]), RespValue::ok());
    assert_eq!(run(&mut state, a, &["INCR", "a"]), RespValue::queued());
    assert_eq!(run(&mut state, a, &["EXEC"]), RespValue::null_array());

    // The queued INCR never ran.
    assert_eq!(run(&mut state, a, &["GET", "a"]), RespValue::bulk(b"9".to_vec()));
}

#[test]
fn test_queue_time_error_aborts_batch() {
    let (mut state, a, _) = setup();

    assert_eq!(run(&mut state, a, &["MULTI"]), RespValue::ok());

    let bad = run(&mut state, a, &["NOSUCHCMD"]);
    assert!(matches!(&bad, RespValue::Error(e) if e.contains("unknown command")));
    assert!(state.session(a).unwrap().is_dirty_exec());

    // Well-formed commands still queue after the error.
    assert_eq!(run(&mut state, a, &["SET", "a", "1"]), RespValue::queued());

    let exec = run(&mut state, a, &["EXEC"]);
    assert!(matches!(&exec, RespValue::Error(e) if e.starts_with("EXECABORT")));
    assert_eq!(run(&mut state, a, &["GET", "a"]), RespValue::nil());
}

#[test]
fn test_runtime_error_does_not_roll_back() {
    let (mut state, a, _) = setup();

    run(&mut state, a, &["SET", "b", "notanumber"]);

    assert_eq!(run(&mut state, a, &["MULTI"]), RespValue::ok());
    assert_eq!(run(&mut state, a, &["SET", "a", "1"]), RespValue::queued());
    assert_eq!(run(&mut state, a, &["INCR", "b"]), RespValue::queued());
    assert_eq!(run(&mut state, a, &["SET", "c", "3"]), RespValue::queued());

    let exec = run(&mut state, a, &["EXEC"]);
    let RespValue::Array(Some(results)) = exec else {
        panic!("EXEC should return an array, got {:?}", exec);
    };
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], RespValue::ok());
    assert!(matches!(&results[1], RespValue::Error(_)));
    assert_eq!(results[2], RespValue::ok());

    // Commands around the failed slot still applied.
    assert_eq!(run(&mut state, a, &["GET", "a"]), RespValue::bulk(b"1".to_vec()));
    assert_eq!(run(&mut state, a, &["GET", "c"]), RespValue::bulk(b"3".to_vec()));
}

#[test]
fn test_nested_multi_keeps_state() {
    let (mut state, a, _) = setup();

    assert_eq!(run(&mut state, a, &["MULTI"]), RespValue::ok());
    let nested = run(&mut state, a, &["MULTI"]);
    assert!(matches!(&nested, RespValue::Error(e) if e.contains("nested")));

    // Still in MULTI: commands keep queuing.
    assert!(state.session(a).unwrap().in_multi());
    assert_eq!(run(&mut state, a, &["SET", "x", "1"]), RespValue::queued());
    assert_eq!(state.session(a).unwrap().queue_len(), 1);
}

#[test]
fn test_flush_cancels_watch_of_existing_key() {
    let (mut state, a, b) = setup();

    run(&mut state, a, &["SET", "a", "1"]);
    run(&mut state, a, &["WATCH", "a"]);
    run(&mut state, b, &["FLUSHDB"]);

    assert_eq!(run(&mut state, a, &["MULTI"]), RespValue::ok());
    assert_eq!(run(&mut state, a, &["PING"]), RespValue::queued());
    assert_eq!(run(&mut state, a, &["EXEC"]), RespValue::null_array());
}

#[test]
fn test_flush_ignores_watch_of_absent_key() {
    let (mut state, a, b) = setup();

    run(&mut state, a, &["WATCH", "never-existed"]);
    run(&mut state, b, &["FLUSHDB"]);

    assert_eq!(run(&mut state, a, &["MULTI"]), RespValue::ok());
    assert_eq!(run(&mut state, a, &["PING"]), RespValue::queued());
    assert!(matches!(run(&mut state, a, &["EXEC"]), RespValue::Array(Some(_))));
}

// ============================================
// State machine transitions
// ============================================

#[test]
fn test_exec_without_multi() {
    let (mut state, a, _) = setup();
    let exec = run(&mut state, a, &["EXEC"]);
    assert!(matches!(&exec, RespValue::Error(e) if e.contains("EXEC without MULTI")));
}

#[test]
fn test_discard_without_multi() {
    let (mut state, a, _) = setup();
    let discard = run(&mut state, a, &["DISCARD"]);
    assert!(matches!(&discard, RespValue::Error(e) if e.contains("DISCARD without MULTI")));
}

#[test]
fn test_watch_inside_multi_is_rejected() {
    let (mut state, a, _) = setup();
    run(&mut state, a, &["MULTI"]);
    let watch = run(&mut state, a, &["WATCH", "k"]);
    assert!(matches!(&watch, RespValue::Error(e) if e.contains("WATCH inside MULTI")));
    // The rejection is not a queue-time error.
    assert!(!state.session(a).unwrap().is_dirty_exec());
}

#[test]
fn test_unwatch_runs_immediately_inside_multi() {
    let (mut state, a, _) = setup();

    run(&mut state, a, &["WATCH", "k"]);
    run(&mut state, a, &["MULTI"]);
    // UNWATCH is transaction control: it executes now instead of queuing.
    assert_eq!(run(&mut state, a, &["UNWATCH"]), RespValue::ok());
    assert_eq!(state.session(a).unwrap().queue_len(), 0);
    assert!(state.session(a).unwrap().watched_keys().is_empty());
}

#[test]
fn test_discard_resets_everything() {
    let (mut state, a, b) = setup();

    run(&mut state, a, &["WATCH", "k"]);
    run(&mut state, b, &["SET", "k", "1"]); // taints a
    run(&mut state, a, &["MULTI"]);
    run(&mut state, a, &["SET", "x", "1"]);

    assert_eq!(run(&mut state, a, &["DISCARD"]), RespValue::ok());

    let session = state.session(a).unwrap();
    assert!(!session.in_multi());
    assert!(!session.is_dirty_cas());
    assert!(!session.is_dirty_exec());
    assert_eq!(session.queue_len(), 0);
    assert!(session.watched_keys().is_empty());
    assert!(state.db(0).watch_index().is_empty());

    // The queued SET never ran.
    assert_eq!(run(&mut state, a, &["GET", "x"]), RespValue::nil());
}

#[test]
fn test_exec_terminal_state_is_clean() {
    let (mut state, a, _) = setup();

    run(&mut state, a, &["WATCH", "k"]);
    run(&mut state, a, &["MULTI"]);
    run(&mut state, a, &["SET", "k", "1"]);
    run(&mut state, a, &["EXEC"]);

    let session = state.session(a).unwrap();
    assert!(!session.in_multi());
    assert!(!session.is_dirty_cas());
    assert!(!session.is_dirty_exec());
    assert_eq!(session.queue_len(), 0);
    assert!(session.watched_keys().is_empty());
    assert!(state.db(0).watch_index().is_empty());
}

// ============================================
// Dirty-bit semantics
// ============================================

#[test]
fn test_dirty_cas_survives_multi_entry() {
    let (mut state, a, b) = setup();

    run(&mut state, a, &["WATCH", "k"]);
    // Modification lands before MULTI: the transaction is already tainted.
    run(&mut state, b, &["SET", "k", "1"]);
    assert!(state.session(a).unwrap().is_dirty_cas());

    assert_eq!(run(&mut state, a, &["MULTI"]), RespValue::ok());
    assert!(state.session(a).unwrap().is_dirty_cas());
    run(&mut state, a, &["SET", "k", "2"]);
    assert_eq!(run(&mut state, a, &["EXEC"]), RespValue::null_array());
}

#[test]
fn test_dirty_exec_outranks_dirty_cas() {
    let (mut state, a, b) = setup();

    run(&mut state, a, &["WATCH", "k"]);
    run(&mut state, b, &["SET", "k", "1"]); // dirty_cas
    run(&mut state, a, &["MULTI"]);
    run(&mut state, a, &["NOSUCHCMD"]); // dirty_exec

    let exec = run(&mut state, a, &["EXEC"]);
    assert!(matches!(&exec, RespValue::Error(e) if e.starts_with("EXECABORT")));
}

#[test]
fn test_self_write_also_taints() {
    let (mut state, a, _) = setup();

    run(&mut state, a, &["WATCH", "k"]);
    // The watching client's own direct write counts as a touch.
    run(&mut state, a, &["SET", "k", "1"]);
    run(&mut state, a, &["MULTI"]);
    run(&mut state, a, &["SET", "k", "2"]);
    assert_eq!(run(&mut state, a, &["EXEC"]), RespValue::null_array());
}

#[test]
fn test_reads_do_not_taint() {
    let (mut state, a, b) = setup();

    run(&mut state, a, &["SET", "k", "v"]);
    run(&mut state, a, &["WATCH", "k"]);
    assert_eq!(run(&mut state, b, &["GET", "k"]), RespValue::bulk(b"v".to_vec()));

    run(&mut state, a, &["MULTI"]);
    run(&mut state, a, &["SET", "k", "v2"]);
    assert!(matches!(run(&mut state, a, &["EXEC"]), RespValue::Array(Some(_))));
    assert_eq!(run(&mut state, a, &["GET", "k"]), RespValue::bulk(b"v2".to_vec()));
}

// ============================================
// Flag aggregation
// ============================================

#[test]
fn test_queued_flags_fold() {
    let (mut state, a, _) = setup();

    run(&mut state, a, &["MULTI"]);
    assert_eq!(state.session(a).unwrap().queued_flags(), CommandFlags::empty());

    run(&mut state, a, &["GET", "k"]);
    assert_eq!(state.session(a).unwrap().queued_flags(), CommandFlags::READONLY);

    run(&mut state, a, &["SET", "k", "1"]);
    assert_eq!(
        state.session(a).unwrap().queued_flags(),
        CommandFlags::READONLY | CommandFlags::WRITE
    );

    run(&mut state, a, &["DISCARD"]);
    assert_eq!(state.session(a).unwrap().queued_flags(), CommandFlags::empty());
}

// ============================================
// Role gate
// ============================================

#[test]
fn test_readonly_replica_refuses_write_batch() {
    let (mut state, a, b) = setup();

    run(&mut state, a, &["MULTI"]);
    run(&mut state, a, &["SET", "k", "1"]);

    // Demoted while the batch was open.
    assert_eq!(run(&mut state, b, &["REPLICAOF", "10.0.0.1", "6379"]), RespValue::ok());

    let exec = run(&mut state, a, &["EXEC"]);
    assert!(matches!(&exec, RespValue::Error(e) if e.contains("read-only replica")));

    // Terminal transition ran: the batch is gone.
    assert!(!state.session(a).unwrap().in_multi());
    assert_eq!(run(&mut state, a, &["GET", "k"]), RespValue::nil());
}

#[test]
fn test_readonly_replica_allows_pure_read_batch() {
    let (mut state, a, b) = setup();

    run(&mut state, a, &["SET", "k", "v"]);
    run(&mut state, a, &["MULTI"]);
    run(&mut state, a, &["GET", "k"]);
    run(&mut state, b, &["REPLICAOF", "10.0.0.1", "6379"]);

    let exec = run(&mut state, a, &["EXEC"]);
    assert_eq!(
        exec,
        RespValue::Array(Some(vec![RespValue::bulk(b"v".to_vec())]))
    );
}

#[test]
fn test_replica_link_bypasses_role_gate() {
    let (mut state, a, _) = setup();

    run(&mut state, a, &["REPLICAOF", "10.0.0.1", "6379"]);
    state.mark_replica_link(a);

    run(&mut state, a, &["MULTI"]);
    run(&mut state, a, &["SET", "k", "1"]);
    assert!(matches!(run(&mut state, a, &["EXEC"]), RespValue::Array(Some(_))));
    assert_eq!(run(&mut state, a, &["GET", "k"]), RespValue::bulk(b"1".to_vec()));
}

#[test]
fn test_readonly_replica_refuses_direct_write() {
    let (mut state, a, b) = setup();

    run(&mut state, b, &["REPLICAOF", "10.0.0.1", "6379"]);
    let set = run(&mut state, a, &["SET", "k", "1"]);
    assert!(matches!(&set, RespValue::Error(e) if e.starts_with("READONLY")));

    // Promotion restores writes.
    run(&mut state, b, &["REPLICAOF", "NO", "ONE"]);
    assert_eq!(run(&mut state, a, &["SET", "k", "1"]), RespValue::ok());
}

// ============================================
// Disconnect cleanup
// ============================================

#[test]
fn test_disconnect_mid_transaction_cleans_up() {
    let (mut state, a, b) = setup();

    run(&mut state, a, &["WATCH", "shared"]);
    run(&mut state, a, &["MULTI"]);
    run(&mut state, a, &["SET", "shared", "1"]);

    state.disconnect_client(a);

    assert!(state.session(a).is_none());
    assert!(state.db(0).watch_index().is_empty());

    // The other client is unaffected and the key never got written.
    assert_eq!(run(&mut state, b, &["GET", "shared"]), RespValue::nil());
}
