//! The consensus driver.
//!
//! A single task owns the engine and reacts to one event per iteration:
//! a tick, an inbound peer message, a client proposal, or a pending Ready
//! batch. Ready batches are always handled before waiting again.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use raft::prelude::{Entry, EntryType, Message};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, MissedTickBehavior};

use super::{
    ConsensusEngine, DriverError, EngineError, LogStore, NodeRole, NodeStatus,
    ReadyBatch, StorageError, WriteRecord,
};
use crate::network::{metrics, MessageSender};
use crate::storage::KvStore;

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub node_id: u64,
    pub tick_interval: Duration,
    pub proposal_capacity: usize,
    /// Consecutive failing batches before the driver stops. 0 disables.
    pub max_persistence_failures: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            tick_interval: Duration::from_millis(100),
            proposal_capacity: 256,
            max_persistence_failures: 3,
        }
    }
}

struct Proposal {
    data: Vec<u8>,
    respond_to: oneshot::Sender<Result<(), EngineError>>,
}

pub struct Driver<E, S> {
    config: DriverConfig,
    engine: E,
    storage: S,
    sender: Arc<dyn MessageSender>,
    state_machine: Arc<KvStore>,
    inbound: mpsc::Receiver<Message>,
    proposals_tx: mpsc::Sender<Proposal>,
    proposals_rx: mpsc::Receiver<Proposal>,
    status_tx: watch::Sender<NodeStatus>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    applied_index: u64,
    persistence_failures: u32,
    last_role: NodeRole,
}

impl<E: ConsensusEngine, S: LogStore> Driver<E, S> {
    pub fn new(
        engine: E,
        storage: S,
        sender: Arc<dyn MessageSender>,
        state_machine: Arc<KvStore>,
        inbound: mpsc::Receiver<Message>,
        config: DriverConfig,
    ) -> Self {
        let (proposals_tx, proposals_rx) = mpsc::channel(config.proposal_capacity.max(1));
        let (status_tx, _) = watch::channel(NodeStatus {
            node_id: config.node_id,
            ..Default::default()
        });
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            engine,
            storage,
            sender,
            state_machine,
            inbound,
            proposals_tx,
            proposals_rx,
            status_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            applied_index: 0,
            persistence_failures: 0,
            last_role: NodeRole::Follower,
        }
    }

    pub fn handle(&self) -> DriverHandle {
        DriverHandle {
            proposals: self.proposals_tx.clone(),
            state_machine: Arc::clone(&self.state_machine),
            status: self.status_tx.subscribe(),
            shutdown: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Run until shutdown is requested or persistence keeps failing.
    pub async fn run(mut self) -> Result<(), DriverError> {
        let mut ticker = time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = self.shutdown_tx.subscribe();

        info!("Driver for node {} started", self.config.node_id);

        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.engine.has_ready() {
                self.handle_ready()?;
                self.publish_status();
                continue;
            }

            tokio::select! {
                _ = ticker.tick() => self.engine.tick(),
                Some(msg) = self.inbound.recv() => self.step(msg),
                Some(proposal) = self.proposals_rx.recv() => self.propose(proposal),
                _ = shutdown.wait_for(|stop| *stop) => break,
            }

            self.publish_status();
        }

        info!(
            "Driver for node {} stopped at applied index {}",
            self.config.node_id, self.applied_index
        );
        Ok(())
    }

    fn step(&mut self, msg: Message) {
        let (from, kind) = (msg.from, msg.msg_type());
        if let Err(e) = self.engine.step(msg) {
            warn!("Failed to step {:?} from node {}: {}", kind, from, e);
        }
    }

    fn propose(&mut self, proposal: Proposal) {
        let result = self.engine.propose(proposal.data);
        metrics::record_proposal(result.is_ok());
        if let Err(e) = &result {
            warn!("Proposal rejected by engine: {}", e);
        }
        // The caller may have given up waiting.
        let _ = proposal.respond_to.send(result);
    }

    fn handle_ready(&mut self) -> Result<(), DriverError> {
        let ReadyBatch {
            snapshot,
            entries,
            hard_state,
            messages,
            committed_entries,
        } = self.engine.ready()?;

        let mut failure: Option<StorageError> = None;

        if let Some(snapshot) = snapshot {
            let index = snapshot.get_metadata().index;
            match self.storage.apply_snapshot(snapshot) {
                Ok(()) => info!("Applied snapshot at index {}", index),
                Err(e) => {
                    error!("Failed to apply snapshot at index {}: {}", index, e);
                    failure = Some(e);
                }
            }
        }

        if !entries.is_empty() {
            if let Err(e) = self.storage.append(&entries) {
                error!("Failed to append {} entries: {}", entries.len(), e);
                failure = Some(e);
            }
        }

        if let Some(hard_state) = hard_state {
            if let Err(e) = self.storage.set_hard_state(hard_state) {
                error!("Failed to persist hard state: {}", e);
                failure = Some(e);
            }
        }

        match failure {
            None => {
                self.persistence_failures = 0;
                self.dispatch(messages);
            }
            Some(e) => {
                metrics::record_persistence_failure();
                self.persistence_failures += 1;
                if !messages.is_empty() {
                    warn!(
                        "Withholding {} outbound messages after persistence failure",
                        messages.len()
                    );
                }
                let limit = self.config.max_persistence_failures;
                if limit > 0 && self.persistence_failures >= limit {
                    error!(
                        "Stopping driver after {} consecutive persistence failures",
                        self.persistence_failures
                    );
                    return Err(DriverError::Persistence {
                        failures: self.persistence_failures,
                        source: e,
                    });
                }
            }
        }

        self.apply_committed(committed_entries);
        self.engine.advance();
        Ok(())
    }

    /// One task per message so an unreachable peer never stalls the loop.
    fn dispatch(&self, messages: Vec<Message>) {
        for msg in messages {
            let sender = Arc::clone(&self.sender);
            tokio::spawn(async move {
                let (to, kind) = (msg.to, msg.msg_type());
                match sender.send_message(msg).await {
                    Ok(()) => metrics::record_send(true),
                    Err(e) => {
                        metrics::record_send(false);
                        debug!("Failed to send {:?} to node {}: {}", kind, to, e);
                    }
                }
            });
        }
    }

    fn apply_committed(&mut self, entries: Vec<Entry>) {
        for entry in entries {
            if entry.index <= self.applied_index {
                warn!(
                    "Skipping entry {} already covered by applied index {}",
                    entry.index, self.applied_index
                );
                continue;
            }
            self.applied_index = entry.index;

            if entry.entry_type() != EntryType::EntryNormal || entry.data.is_empty() {
                continue;
            }

            match WriteRecord::decode(&entry.data) {
                Ok(record) => {
                    debug!("Applying entry {}: {}", entry.index, record.key);
                    self.state_machine.put(record.key, record.value);
                    metrics::record_apply(true);
                }
                Err(e) => {
                    error!("Skipping entry {} (term {}): {}", entry.index, entry.term, e);
                    metrics::record_apply(false);
                }
            }
        }
    }

    fn publish_status(&mut self) {
        let engine = self.engine.status();
        let status = NodeStatus {
            node_id: self.config.node_id,
            role: engine.role,
            term: engine.term,
            leader_id: engine.leader_id,
            commit_index: engine.commit_index,
            applied_index: self.applied_index,
        };

        if status.role != self.last_role {
            info!(
                "Node {} became {} at term {} (leader {})",
                status.node_id,
                status.role.as_str(),
                status.term,
                status.leader_id
            );
            self.last_role = status.role;
        }

        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Client-side handle to a running driver.
#[derive(Clone)]
pub struct DriverHandle {
    proposals: mpsc::Sender<Proposal>,
    state_machine: Arc<KvStore>,
    status: watch::Receiver<NodeStatus>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl DriverHandle {
    /// Submit a write. `Ok` means accepted for replication, not committed.
    pub async fn propose(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), DriverError> {
        let data = WriteRecord::new(key, value).encode()?;
        let (respond_to, response) = oneshot::channel();

        self.proposals
            .send(Proposal { data, respond_to })
            .await
            .map_err(|_| DriverError::Stopped)?;

        let outcome = response.await.map_err(|_| DriverError::Stopped)?;
        outcome.map_err(DriverError::from)
    }

    /// Local read. May not reflect writes that are accepted but not applied.
    pub fn get(&self, key: &str) -> Option<String> {
        self.state_machine.get(key)
    }

    pub fn status(&self) -> NodeStatus {
        self.status.borrow().clone()
    }

    /// Wait until the published status satisfies `predicate`.
    pub async fn wait_for_status<F>(&self, mut predicate: F) -> Result<NodeStatus, DriverError>
    where
        F: FnMut(&NodeStatus) -> bool,
    {
        let mut status = self.status.clone();
        let current = status
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| DriverError::Stopped)?;
        Ok(current.clone())
    }

    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}
