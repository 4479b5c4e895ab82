//! Consensus glue between the raft engine, log storage, the transport and
//! the key-value state machine.

mod command;
mod driver;
mod engine;
mod error;
mod state;
mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use self::command::WriteRecord;
pub use self::driver::{Driver, DriverConfig, DriverHandle};
pub use self::engine::{ConsensusEngine, RawNodeEngine, ReadyBatch};
pub use self::error::{CommandError, DriverError, EngineError, StorageError};
pub use self::state::{EngineStatus, NodeRole, NodeStatus};
pub use self::storage::{bootstrap_storage, LogStore};
