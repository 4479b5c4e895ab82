//! Scripted collaborators for driver tests.
//!
//! The engine, log store and sender share one journal so tests can assert
//! the relative order of their side effects.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use raft::prelude::{Entry, EntryType, HardState, Message, MessageType, Snapshot};

use super::{ConsensusEngine, EngineError, EngineStatus, LogStore, ReadyBatch, StorageError};
use crate::network::{MessageSender, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Tick,
    Step(u64),
    Propose(Vec<u8>),
    Ready,
    Advance,
    ApplySnapshot(u64),
    Append(Vec<u64>),
    SetHardState(u64),
    Send(u64),
}

pub(crate) type Journal = Arc<Mutex<Vec<Event>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn entry(index: u64, data: Vec<u8>) -> Entry {
    let mut entry = Entry {
        index,
        term: 1,
        data: data.into(),
        ..Default::default()
    };
    entry.set_entry_type(EntryType::EntryNormal);
    entry
}

pub(crate) fn message(to: u64) -> Message {
    let mut msg = Message {
        to,
        from: 1,
        term: 1,
        ..Default::default()
    };
    msg.set_msg_type(MessageType::MsgHeartbeat);
    msg
}

#[derive(Default)]
struct Script {
    batches: VecDeque<ReadyBatch>,
    in_flight: bool,
    violations: usize,
    reject_steps: bool,
    reject_proposals: bool,
    status: EngineStatus,
}

/// Hands out pre-loaded batches and counts any `ready` call made while a
/// batch is still unacknowledged.
#[derive(Clone, Default)]
pub(crate) struct FakeEngine {
    script: Arc<Mutex<Script>>,
    journal: Journal,
}

impl FakeEngine {
    pub(crate) fn journal(&self) -> Journal {
        Arc::clone(&self.journal)
    }

    pub(crate) fn push_batch(&self, batch: ReadyBatch) {
        lock(&self.script).batches.push_back(batch);
    }

    pub(crate) fn reject_steps(&self, reject: bool) {
        lock(&self.script).reject_steps = reject;
    }

    pub(crate) fn reject_proposals(&self, reject: bool) {
        lock(&self.script).reject_proposals = reject;
    }

    pub(crate) fn violations(&self) -> usize {
        lock(&self.script).violations
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        lock(&self.journal).clone()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        lock(&self.journal).iter().filter(|e| predicate(e)).count()
    }

    fn record(&self, event: Event) {
        lock(&self.journal).push(event);
    }
}

impl ConsensusEngine for FakeEngine {
    fn tick(&mut self) {
        self.record(Event::Tick);
    }

    fn propose(&mut self, data: Vec<u8>) -> Result<(), EngineError> {
        if lock(&self.script).reject_proposals {
            return Err(EngineError::Rejected("engine stopped".to_string()));
        }
        self.record(Event::Propose(data));
        Ok(())
    }

    fn step(&mut self, msg: Message) -> Result<(), EngineError> {
        self.record(Event::Step(msg.from));
        if lock(&self.script).reject_steps {
            return Err(EngineError::Rejected(format!("stale message from {}", msg.from)));
        }
        Ok(())
    }

    fn has_ready(&self) -> bool {
        let script = lock(&self.script);
        !script.in_flight && !script.batches.is_empty()
    }

    fn ready(&mut self) -> Result<ReadyBatch, EngineError> {
        let batch = {
            let mut script = lock(&self.script);
            if script.in_flight {
                script.violations += 1;
                return Err(EngineError::ReadyInFlight);
            }
            script.in_flight = true;
            script.batches.pop_front().unwrap_or_default()
        };
        self.record(Event::Ready);
        Ok(batch)
    }

    fn advance(&mut self) {
        lock(&self.script).in_flight = false;
        self.record(Event::Advance);
    }

    fn status(&self) -> EngineStatus {
        lock(&self.script).status.clone()
    }
}

/// Records writes into the journal; can be told to fail.
#[derive(Clone)]
pub(crate) struct FakeLogStore {
    journal: Journal,
    failing: Arc<AtomicBool>,
    fail_remaining: Arc<AtomicUsize>,
}

impl FakeLogStore {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            journal,
            failing: Arc::new(AtomicBool::new(false)),
            fail_remaining: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail the next `n` writes, then recover.
    pub(crate) fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    fn write(&self, event: Event) -> Result<(), StorageError> {
        let one_off = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if one_off || self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("injected failure on {event:?}")));
        }
        lock(&self.journal).push(event);
        Ok(())
    }
}

impl LogStore for FakeLogStore {
    fn apply_snapshot(&self, snapshot: Snapshot) -> Result<(), StorageError> {
        self.write(Event::ApplySnapshot(snapshot.get_metadata().index))
    }

    fn append(&self, entries: &[Entry]) -> Result<(), StorageError> {
        self.write(Event::Append(entries.iter().map(|e| e.index).collect()))
    }

    fn set_hard_state(&self, hard_state: HardState) -> Result<(), StorageError> {
        self.write(Event::SetHardState(hard_state.commit))
    }
}

/// Collects sent messages. Sends to peers marked with `hang_for` never
/// complete.
#[derive(Clone)]
pub(crate) struct RecordingSender {
    journal: Journal,
    delivered: Arc<Mutex<Vec<Message>>>,
    hanging: Arc<Mutex<HashSet<u64>>>,
}

impl RecordingSender {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            journal,
            delivered: Arc::default(),
            hanging: Arc::default(),
        }
    }

    pub(crate) fn hang_for(&self, peer: u64) {
        lock(&self.hanging).insert(peer);
    }

    pub(crate) fn delivered(&self) -> Vec<Message> {
        lock(&self.delivered).clone()
    }

    pub(crate) async fn wait_for_deliveries(&self, n: usize) {
        while lock(&self.delivered).len() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[tonic::async_trait]
impl MessageSender for RecordingSender {
    async fn send_message(&self, msg: Message) -> Result<(), TransportError> {
        lock(&self.journal).push(Event::Send(msg.to));
        let hangs = lock(&self.hanging).contains(&msg.to);
        if hangs {
            std::future::pending::<()>().await;
        }
        lock(&self.delivered).push(msg);
        Ok(())
    }
}
