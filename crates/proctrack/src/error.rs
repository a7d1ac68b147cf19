use crate::forest::{ExecId, NodeId};
use std::io;

/// Internal invariant violation while applying events to the forest
///
/// Unmatched or irrelevant events are not errors, they are discarded.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("no root is registered to attach process {pid} to")]
    NoActiveRoot { pid: u32 },
    #[error("tracked process {0} is not in the forest")]
    DanglingProcess(NodeId),
    #[error("exec record {0} is not in the forest")]
    DanglingExec(ExecId),
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("no command to launch")]
    EmptyCommand,
    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Failure before tracking could start
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("failed to start the event watcher")]
    Watcher(#[source] io::Error),
}
