use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::{PeerRegistry, TransportConfig};
use crate::raft::DriverConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid peer: {0}")]
    InvalidPeer(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid raft configuration: {0}")]
    Raft(#[from] raft::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node_id: u64,
    /// gRPC transport address.
    pub listen_addr: String,
    /// Client API address. No HTTP server when unset.
    pub http_addr: Option<String>,
    /// Every other voter. Must not contain this node.
    pub peers: PeerRegistry,
    pub tick_interval_ms: u64,
    pub election_tick: usize,
    pub heartbeat_tick: usize,
    pub max_size_per_msg: u64,
    pub max_inflight_msgs: usize,
    pub inbound_capacity: usize,
    pub proposal_capacity: usize,
    pub send_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_persistence_failures: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            listen_addr: "127.0.0.1:9001".to_string(),
            http_addr: None,
            peers: PeerRegistry::new(),
            tick_interval_ms: 100,
            election_tick: 10,
            heartbeat_tick: 1,
            max_size_per_msg: 1024 * 1024,
            max_inflight_msgs: 256,
            inbound_capacity: 100,
            proposal_capacity: 256,
            send_timeout_ms: 5000,
            connect_timeout_ms: 5000,
            max_persistence_failures: 3,
        }
    }
}

impl NodeConfig {
    pub fn new(node_id: u64, listen_addr: impl Into<String>) -> Self {
        Self {
            node_id,
            listen_addr: listen_addr.into(),
            ..Default::default()
        }
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id == 0 {
            return Err(ConfigError::Invalid("node_id must be non-zero".into()));
        }
        if self.peers.contains(0) {
            return Err(ConfigError::InvalidPeer("peer id must be non-zero".into()));
        }
        if self.peers.contains(self.node_id) {
            return Err(ConfigError::InvalidPeer(format!(
                "peer list contains this node ({})",
                self.node_id
            )));
        }

        let nonzero = [
            ("tick_interval_ms", self.tick_interval_ms == 0),
            ("inbound_capacity", self.inbound_capacity == 0),
            ("proposal_capacity", self.proposal_capacity == 0),
            ("send_timeout_ms", self.send_timeout_ms == 0),
            ("connect_timeout_ms", self.connect_timeout_ms == 0),
        ];
        if let Some((field, _)) = nonzero.iter().find(|(_, zero)| *zero) {
            return Err(ConfigError::Invalid(format!("{field} must be non-zero")));
        }

        self.raft_config().validate()?;
        Ok(())
    }

    pub fn raft_config(&self) -> raft::Config {
        raft::Config {
            id: self.node_id,
            election_tick: self.election_tick,
            heartbeat_tick: self.heartbeat_tick,
            max_size_per_msg: self.max_size_per_msg,
            max_inflight_msgs: self.max_inflight_msgs,
            ..Default::default()
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            inbound_capacity: self.inbound_capacity,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            node_id: self.node_id,
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            proposal_capacity: self.proposal_capacity,
            max_persistence_failures: self.max_persistence_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn defaults_follow_reference_timing() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.tick_interval_ms, 100);
        assert_eq!(cfg.election_tick, 10);
        assert_eq!(cfg.heartbeat_tick, 1);
        assert_eq!(cfg.max_size_per_msg, 1024 * 1024);
        assert_eq!(cfg.max_inflight_msgs, 256);
        assert_eq!(cfg.inbound_capacity, 100);
        assert_eq!(cfg.send_timeout_ms, 5000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_identities() {
        let mut cfg = NodeConfig::new(0, "127.0.0.1:0");
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        cfg.node_id = 2;
        cfg.peers = PeerRegistry::parse("2=127.0.0.1:9002").expect("peers");
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPeer(_))));

        cfg.peers = PeerRegistry::parse("0=127.0.0.1:9000").expect("peers");
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPeer(_))));
    }

    #[test]
    fn validate_rejects_zero_capacity_and_bad_ticks() {
        let cfg = NodeConfig {
            inbound_capacity: 0,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("inbound_capacity"));

        let cfg = NodeConfig {
            election_tick: 1,
            heartbeat_tick: 1,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Raft(_))));
    }

    #[test]
    fn loads_partial_json_with_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("node.json");
        {
            let mut file = std::fs::File::create(&path).expect("create");
            write!(
                file,
                r#"{{"node_id": 3, "listen_addr": "0.0.0.0:9003", "peers": {{"1": "n1:9001", "2": "n2:9002"}}}}"#
            )
            .expect("write");
        }

        let cfg = NodeConfig::from_file(&path).expect("load");

        assert_eq!(cfg.node_id, 3);
        assert_eq!(cfg.peers.voters(cfg.node_id), vec![1, 2, 3]);
        assert_eq!(cfg.tick_interval_ms, 100);
        assert_eq!(cfg.http_addr, None);
        assert_eq!(cfg.driver_config().tick_interval, Duration::from_millis(100));
    }
}
