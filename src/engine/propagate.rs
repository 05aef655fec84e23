//! Downstream propagation: write-ahead log and replication stream.
//!
//! Every effective write is delivered here as a `(db, argv, targets)`
//! frame. The sink keeps a structured log per target (what the WAL writer
//! and the replica feed would each consume) and, when replication is
//! active, mirrors replication frames into the backlog byte stream in wire
//! format. The backlog also accepts raw pre-encoded frames: the execution
//! engine uses that to terminate a dangling `MULTI` when the server loses
//! its primary role in the middle of a drain.

use super::resp::encode_command_frame;
use bitflags::bitflags;
use bytes::Bytes;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PropagationTargets: u8 {
        const WAL = 1 << 0;
        const REPLICATION = 1 << 1;
    }
}

/// One propagated command frame.
#[derive(Debug, Clone)]
pub struct PropagatedFrame {
    pub db: usize,
    pub argv: Vec<Bytes>,
    pub targets: PropagationTargets,
}

impl PropagatedFrame {
    /// Command name of the frame, uppercased for easy assertions.
    pub fn name(&self) -> String {
        self.argv
            .first()
            .map(|a| String::from_utf8_lossy(a).to_uppercase())
            .unwrap_or_default()
    }
}

/// Replication backlog: the byte stream a late-joining replica catches up
/// from. Append-only here; trimming is the transport's concern.
#[derive(Default)]
pub struct ReplBacklog {
    buf: Vec<u8>,
}

impl ReplBacklog {
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

pub struct Propagator {
    frames: Vec<PropagatedFrame>,
    backlog: Option<ReplBacklog>,
}

impl Propagator {
    pub fn new() -> Self {
        Propagator {
            frames: Vec::new(),
            backlog: None,
        }
    }

    /// Activate the replication backlog. Idempotent.
    pub fn ensure_backlog(&mut self) {
        if self.backlog.is_none() {
            self.backlog = Some(ReplBacklog::default());
        }
    }

    pub fn has_backlog(&self) -> bool {
        self.backlog.is_some()
    }

    /// Deliver a command frame to the requested targets.
    pub fn propagate(&mut self, db: usize, argv: &[Bytes], targets: PropagationTargets) {
        if targets.is_empty() {
            return;
        }
        if targets.contains(PropagationTargets::REPLICATION) {
            if let Some(backlog) = self.backlog.as_mut() {
                backlog.feed(&encode_command_frame(argv));
            }
        }
        self.frames.push(PropagatedFrame {
            db,
            argv: argv.to_vec(),
            targets,
        });
    }

    /// Append a pre-encoded frame directly to the replication backlog,
    /// bypassing the per-target log. No-op when replication is inactive.
    pub fn feed_backlog_raw(&mut self, frame: &[u8]) {
        if let Some(backlog) = self.backlog.as_mut() {
            backlog.feed(frame);
        }
    }

    pub fn backlog(&self) -> Option<&ReplBacklog> {
        self.backlog.as_ref()
    }

    /// All frames, in propagation order.
    pub fn frames(&self) -> &[PropagatedFrame] {
        &self.frames
    }

    /// Frames delivered to the write-ahead log.
    pub fn wal_frames(&self) -> impl Iterator<Item = &PropagatedFrame> {
        self.frames
            .iter()
            .filter(|f| f.targets.contains(PropagationTargets::WAL))
    }

    /// Frames delivered to the replication stream.
    pub fn replication_frames(&self) -> impl Iterator<Item = &PropagatedFrame> {
        self.frames
            .iter()
            .filter(|f| f.targets.contains(PropagationTargets::REPLICATION))
    }
}

impl Default for Propagator {
    fn default() -> Self {
        Self::new()
    }
}
