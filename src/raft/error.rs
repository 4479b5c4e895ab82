use thiserror::Error;

/// Failures reported by the consensus engine itself.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Raft error: {0}")]
    Raft(#[from] raft::Error),

    #[error("Ready batch requested before the previous one was advanced")]
    ReadyInFlight,

    #[error("Engine rejected input: {0}")]
    Rejected(String),
}

/// Failures writing log state (snapshot, entries, hard state).
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Raft storage error: {0}")]
    Raft(#[from] raft::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Driver is stopped")]
    Stopped,

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Persistence failed in {failures} consecutive batches: {source}")]
    Persistence {
        failures: u32,
        #[source]
        source: StorageError,
    },
}
