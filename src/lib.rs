pub mod config;
pub mod network;
pub mod node;
pub mod raft;
pub mod storage;

pub use self::config::{ConfigError, NodeConfig};
pub use self::node::{Node, NodeError};
pub use self::raft::{Driver, DriverHandle, NodeStatus};
pub use self::storage::KvStore;
