use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Static mapping from peer id to transport address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerRegistry {
    peers: BTreeMap<u64, String>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `2=host:port,3=host:port`. An empty string yields no peers.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (id, addr) = item
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidPeer(format!("expected id=address, got '{item}'")))?;
            let id: u64 = id
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPeer(format!("bad peer id in '{item}'")))?;
            let addr = addr.trim();
            if addr.is_empty() {
                return Err(ConfigError::InvalidPeer(format!("empty address for peer {id}")));
            }
            if registry.peers.insert(id, addr.to_string()).is_some() {
                return Err(ConfigError::InvalidPeer(format!("peer {id} listed twice")));
            }
        }
        Ok(registry)
    }

    pub fn insert(&mut self, id: u64, addr: impl Into<String>) {
        self.peers.insert(id, addr.into());
    }

    pub fn address(&self, id: u64) -> Option<&str> {
        self.peers.get(&id).map(String::as_str)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.peers.contains_key(&id)
    }

    /// Peer ids in ascending order.
    pub fn ids(&self) -> Vec<u64> {
        self.peers.keys().copied().collect()
    }

    /// The full voter set: every peer plus this node.
    pub fn voters(&self, self_id: u64) -> Vec<u64> {
        let mut voters = self.ids();
        if !self.contains(self_id) {
            voters.push(self_id);
            voters.sort_unstable();
        }
        voters
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl FromIterator<(u64, String)> for PeerRegistry {
    fn from_iter<I: IntoIterator<Item = (u64, String)>>(iter: I) -> Self {
        Self {
            peers: iter.into_iter().collect(),
        }
    }
}
