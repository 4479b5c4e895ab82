use std::sync::atomic::{AtomicU64, Ordering};

use crate::raft::NodeStatus;

pub static PROPOSALS_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static PROPOSAL_FAILURES_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static ENTRIES_APPLIED_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static ENTRIES_SKIPPED_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static MESSAGES_SENT_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static SEND_FAILURES_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static INBOUND_DROPPED_TOTAL: AtomicU64 = AtomicU64::new(0);
pub static PERSISTENCE_FAILURES_TOTAL: AtomicU64 = AtomicU64::new(0);

pub fn record_proposal(accepted: bool) {
    if accepted {
        PROPOSALS_TOTAL.fetch_add(1, Ordering::Relaxed);
    } else {
        PROPOSAL_FAILURES_TOTAL.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_apply(applied: bool) {
    if applied {
        ENTRIES_APPLIED_TOTAL.fetch_add(1, Ordering::Relaxed);
    } else {
        ENTRIES_SKIPPED_TOTAL.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_send(delivered: bool) {
    if delivered {
        MESSAGES_SENT_TOTAL.fetch_add(1, Ordering::Relaxed);
    } else {
        SEND_FAILURES_TOTAL.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_inbound_dropped() {
    INBOUND_DROPPED_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn record_persistence_failure() {
    PERSISTENCE_FAILURES_TOTAL.fetch_add(1, Ordering::Relaxed);
}

/// Prometheus text exposition of the counters plus the node's gauges.
pub fn render(status: &NodeStatus) -> String {
    let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

    format!(
        concat!(
            "# TYPE replikv_proposals_total counter\n",
            "replikv_proposals_total{{result=\"accepted\"}} {}\n",
            "replikv_proposals_total{{result=\"rejected\"}} {}\n",
            "# TYPE replikv_entries_total counter\n",
            "replikv_entries_total{{result=\"applied\"}} {}\n",
            "replikv_entries_total{{result=\"skipped\"}} {}\n",
            "# TYPE replikv_messages_total counter\n",
            "replikv_messages_total{{result=\"sent\"}} {}\n",
            "replikv_messages_total{{result=\"failed\"}} {}\n",
            "replikv_messages_total{{result=\"dropped_inbound\"}} {}\n",
            "# TYPE replikv_persistence_failures_total counter\n",
            "replikv_persistence_failures_total {}\n",
            "# TYPE replikv_raft_term gauge\n",
            "replikv_raft_term {}\n",
            "# TYPE replikv_raft_role gauge\n",
            "replikv_raft_role {}\n",
            "# TYPE replikv_raft_commit_index gauge\n",
            "replikv_raft_commit_index {}\n",
            "# TYPE replikv_raft_applied_index gauge\n",
            "replikv_raft_applied_index {}\n",
        ),
        load(&PROPOSALS_TOTAL),
        load(&PROPOSAL_FAILURES_TOTAL),
        load(&ENTRIES_APPLIED_TOTAL),
        load(&ENTRIES_SKIPPED_TOTAL),
        load(&MESSAGES_SENT_TOTAL),
        load(&SEND_FAILURES_TOTAL),
        load(&INBOUND_DROPPED_TOTAL),
        load(&PERSISTENCE_FAILURES_TOTAL),
        status.term,
        status.role.gauge(),
        status.commit_index,
        status.applied_index,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raft::NodeRole;

    #[test]
    fn render_includes_counters_and_gauges() {
        record_proposal(true);
        record_inbound_dropped();

        let status = NodeStatus {
            node_id: 1,
            role: NodeRole::Leader,
            term: 7,
            commit_index: 12,
            applied_index: 11,
            ..Default::default()
        };
        let body = render(&status);

        // Counters are process-wide, so only the keys are checked for them.
        assert!(body.contains("replikv_proposals_total{result=\"accepted\"}"));
        assert!(body.contains("replikv_messages_total{result=\"dropped_inbound\"}"));
        assert!(body.contains("replikv_persistence_failures_total"));
        assert!(body.contains("replikv_raft_term 7\n"));
        assert!(body.contains("replikv_raft_role 3\n"));
        assert!(body.contains("replikv_raft_applied_index 11\n"));
    }
}
