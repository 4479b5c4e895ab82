//! Consensus engine seam.
//!
//! The driver talks to consensus only through [`ConsensusEngine`]. The
//! production implementation wraps a `raft::RawNode` over in-memory storage;
//! tests substitute a scripted engine.

use raft::prelude::{Entry, HardState, Message, Snapshot};
use raft::storage::MemStorage;
use raft::{Config, RawNode, Ready};
use slog::o;

use super::{EngineError, EngineStatus};

/// One batch of outputs the engine needs the driver to act on.
///
/// Processing order is fixed: snapshot, entries, hard state, messages,
/// committed entries. The next batch must not be requested until
/// [`ConsensusEngine::advance`] has been called for this one.
#[derive(Debug, Clone, Default)]
pub struct ReadyBatch {
    pub snapshot: Option<Snapshot>,
    pub entries: Vec<Entry>,
    pub hard_state: Option<HardState>,
    pub messages: Vec<Message>,
    pub committed_entries: Vec<Entry>,
}

impl ReadyBatch {
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none()
            && self.entries.is_empty()
            && self.hard_state.is_none()
            && self.messages.is_empty()
            && self.committed_entries.is_empty()
    }
}

pub trait ConsensusEngine: Send {
    /// Advance logical time by one tick.
    fn tick(&mut self);

    /// Submit an application command. Acceptance is not commitment.
    fn propose(&mut self, data: Vec<u8>) -> Result<(), EngineError>;

    /// Feed a message received from a peer.
    fn step(&mut self, msg: Message) -> Result<(), EngineError>;

    fn has_ready(&self) -> bool;

    /// Take the next batch. Fails while a previous batch is unacknowledged.
    fn ready(&mut self) -> Result<ReadyBatch, EngineError>;

    /// Acknowledge the batch returned by the last `ready` call.
    fn advance(&mut self);

    fn status(&self) -> EngineStatus {
        EngineStatus::default()
    }
}

/// `RawNode` behind the [`ConsensusEngine`] seam.
///
/// `RawNode::advance` can itself produce messages, a new commit index and
/// committed entries. Those are carried over and handed out as part of the
/// next batch, so every output still flows through the driver in order.
pub struct RawNodeEngine {
    raw: RawNode<MemStorage>,
    in_flight: Option<InFlight>,
    carried: ReadyBatch,
    applying: Option<u64>,
}

enum InFlight {
    Raw(Box<Ready>),
    Carried,
}

impl RawNodeEngine {
    pub fn new(config: &Config, storage: MemStorage) -> Result<Self, EngineError> {
        let logger = slog::Logger::root(slog::Discard, o!());
        let raw = RawNode::new(config, storage, &logger)?;
        Ok(Self {
            raw,
            in_flight: None,
            carried: ReadyBatch::default(),
            applying: None,
        })
    }

    /// Begin an election immediately instead of waiting for the timeout.
    pub fn campaign(&mut self) -> Result<(), EngineError> {
        self.raw.campaign()?;
        Ok(())
    }
}

impl ConsensusEngine for RawNodeEngine {
    fn tick(&mut self) {
        self.raw.tick();
    }

    fn propose(&mut self, data: Vec<u8>) -> Result<(), EngineError> {
        self.raw.propose(vec![], data)?;
        Ok(())
    }

    fn step(&mut self, msg: Message) -> Result<(), EngineError> {
        self.raw.step(msg)?;
        Ok(())
    }

    fn has_ready(&self) -> bool {
        self.in_flight.is_none() && (!self.carried.is_empty() || self.raw.has_ready())
    }

    fn ready(&mut self) -> Result<ReadyBatch, EngineError> {
        if self.in_flight.is_some() {
            return Err(EngineError::ReadyInFlight);
        }

        let mut batch = std::mem::take(&mut self.carried);

        if !self.raw.has_ready() {
            self.applying = batch.committed_entries.last().map(|e| e.index);
            self.in_flight = Some(InFlight::Carried);
            return Ok(batch);
        }

        let mut rd = self.raw.ready();

        if !rd.snapshot().is_empty() {
            batch.snapshot = Some(rd.snapshot().clone());
        }
        batch.entries = rd.entries().to_vec();
        if let Some(hs) = rd.hs() {
            batch.hard_state = Some(hs.clone());
        }
        batch.messages.extend(rd.take_messages());
        batch.messages.extend(rd.take_persisted_messages());
        batch.committed_entries.extend(rd.take_committed_entries());

        self.applying = batch.committed_entries.last().map(|e| e.index);
        self.in_flight = Some(InFlight::Raw(Box::new(rd)));
        Ok(batch)
    }

    fn advance(&mut self) {
        match self.in_flight.take() {
            Some(InFlight::Raw(rd)) => {
                let mut light = self.raw.advance(*rd);
                if light.commit_index().is_some() {
                    self.carried.hard_state = Some(self.raw.raft.hard_state());
                }
                self.carried.messages.extend(light.take_messages());
                self.carried
                    .committed_entries
                    .extend(light.take_committed_entries());
            }
            Some(InFlight::Carried) => {}
            None => return,
        }

        if let Some(index) = self.applying.take() {
            self.raw.advance_apply_to(index);
        }
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            role: self.raw.raft.state.into(),
            term: self.raw.raft.term,
            leader_id: self.raw.raft.leader_id,
            commit_index: self.raw.raft.raft_log.committed,
        }
    }
}
