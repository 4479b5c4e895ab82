use raft::StateRole;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    #[default]
    Follower,
    PreCandidate,
    Candidate,
    Leader,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Follower => "Follower",
            NodeRole::PreCandidate => "PreCandidate",
            NodeRole::Candidate => "Candidate",
            NodeRole::Leader => "Leader",
        }
    }

    /// Numeric encoding used by the metrics endpoint.
    pub fn gauge(&self) -> u8 {
        match self {
            NodeRole::Follower => 0,
            NodeRole::PreCandidate => 1,
            NodeRole::Candidate => 2,
            NodeRole::Leader => 3,
        }
    }
}

impl From<StateRole> for NodeRole {
    fn from(role: StateRole) -> Self {
        match role {
            StateRole::Follower => NodeRole::Follower,
            StateRole::PreCandidate => NodeRole::PreCandidate,
            StateRole::Candidate => NodeRole::Candidate,
            StateRole::Leader => NodeRole::Leader,
        }
    }
}

/// What the engine reports about itself between Ready batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub role: NodeRole,
    pub term: u64,
    /// 0 when no leader is known.
    pub leader_id: u64,
    pub commit_index: u64,
}

/// Published by the driver after every loop iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub node_id: u64,
    pub role: NodeRole,
    pub term: u64,
    pub leader_id: u64,
    pub commit_index: u64,
    pub applied_index: u64,
}

impl NodeStatus {
    pub fn is_leader(&self) -> bool {
        self.role == NodeRole::Leader
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_roles_map_onto_node_roles() {
        assert_eq!(NodeRole::from(StateRole::Leader), NodeRole::Leader);
        assert_eq!(NodeRole::from(StateRole::PreCandidate), NodeRole::PreCandidate);
        assert_eq!(NodeRole::default(), NodeRole::Follower);
        assert_eq!(NodeRole::Leader.gauge(), 3);
    }
}
