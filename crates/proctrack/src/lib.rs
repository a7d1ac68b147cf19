//! Process tree duration tracking
//!
//! Correlates asynchronous process lifecycle events (fork, exec, exit, rename) with the
//! tree of processes spawned by one launched command, and reports how long each node
//! took once its whole subtree has terminated.
//!
//! The pieces, leaves first:
//! - [`watcher`] pulls event batches from a [`ProcessEventSource`] into a bounded queue
//! - [`Tracker`] owns the [`Forest`] and applies correlation rules from a [`Classifier`]
//! - [`completion`] decides when every tracked subtree is done
//! - [`Report`] walks the forest and renders per-process and per-exec durations
//! - [`launch()`] drives all of the above for one command

pub mod classifier;
pub mod completion;
pub mod error;
pub mod event;
pub mod forest;
pub mod interfaces;
pub mod launch;
pub mod report;
pub mod spawner;
pub mod tracker;
pub mod watcher;

#[cfg(target_os = "linux")]
pub mod linux;

pub use classifier::{Classification, Classifier, RuntimeClassifier, RuntimeProfile, Subject};
pub use error::{IngestError, LaunchError, SpawnError};
pub use event::{EventBatch, ProcessEvent};
pub use forest::{Exec, ExecId, Forest, NodeId, TrackedProcess};
pub use interfaces::{ProcessEventSource, ProcessMetadataLookup};
pub use launch::{LaunchOptions, Launched, launch};
pub use report::{Report, ReportLine};
pub use spawner::{CommandSpawner, OutputRouting, ProcessSpawner, SpawnedProcess};
pub use tracker::{RootProcess, Termination, Tracker, run_event_loop};
pub use watcher::{RetryPolicy, WatcherHandle, spawn_watcher};
