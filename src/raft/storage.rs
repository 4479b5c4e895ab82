use raft::prelude::{ConfState, Entry, HardState, Snapshot};
use raft::storage::MemStorage;

use super::StorageError;

/// Write side of the replicated log. The engine reads from the same store.
pub trait LogStore: Send {
    fn apply_snapshot(&self, snapshot: Snapshot) -> Result<(), StorageError>;

    fn append(&self, entries: &[Entry]) -> Result<(), StorageError>;

    fn set_hard_state(&self, hard_state: HardState) -> Result<(), StorageError>;
}

impl LogStore for MemStorage {
    fn apply_snapshot(&self, snapshot: Snapshot) -> Result<(), StorageError> {
        self.wl().apply_snapshot(snapshot)?;
        Ok(())
    }

    fn append(&self, entries: &[Entry]) -> Result<(), StorageError> {
        self.wl().append(entries)?;
        Ok(())
    }

    fn set_hard_state(&self, hard_state: HardState) -> Result<(), StorageError> {
        self.wl().set_hardstate(hard_state);
        Ok(())
    }
}

/// In-memory log storage seeded with the full, static voter set.
pub fn bootstrap_storage(voters: &[u64]) -> MemStorage {
    MemStorage::new_with_conf_state(ConfState::from((voters.to_vec(), vec![])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use raft::Storage;

    fn entry(index: u64, term: u64) -> Entry {
        Entry {
            index,
            term,
            ..Default::default()
        }
    }

    #[test]
    fn bootstrap_storage_carries_voters() {
        let storage = bootstrap_storage(&[1, 2, 3]);
        let state = storage.initial_state().expect("initial state");
        assert_eq!(state.conf_state.voters, vec![1, 2, 3]);
    }

    #[test]
    fn appended_entries_and_hard_state_are_visible_to_readers() {
        let storage = bootstrap_storage(&[1]);
        LogStore::append(&storage, &[entry(1, 1), entry(2, 1)]).expect("append");
        storage
            .set_hard_state(HardState {
                term: 1,
                vote: 1,
                commit: 2,
                ..Default::default()
            })
            .expect("hard state");

        assert_eq!(storage.last_index().expect("last index"), 2);
        let state = storage.initial_state().expect("initial state");
        assert_eq!(state.hard_state.commit, 2);
        assert_eq!(state.hard_state.vote, 1);
    }
}
