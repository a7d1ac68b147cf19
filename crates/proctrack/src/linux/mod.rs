//! Collaborators backed by the Linux kernel: the process connector for events and
//! procfs for metadata

mod metadata;
mod source;

pub use metadata::ProcfsMetadata;
pub use source::{ConnectorSource, to_process_event};
