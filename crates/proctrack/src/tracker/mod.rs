//! The state machine applying process events to the forest
//!
//! Only the main loop owns a [`Tracker`], so the forest is mutated from a single place and
//! needs no locking.

mod event_loop;

pub use event_loop::{Termination, run_event_loop};

use crate::classifier::{Classification, Classifier, Subject};
use crate::completion::forest_complete;
use crate::error::IngestError;
use crate::event::ProcessEvent;
use crate::forest::{Forest, NodeId};
use crate::interfaces::ProcessMetadataLookup;
use log::{debug, info, trace};
use std::time::Instant;

/// Name given to a forked process whose name could not be resolved
pub const UNKNOWN_NAME: &str = "unknown";

/// A process tracked independently of any other, typically the launched command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootProcess {
    pub pid: u32,
    pub name: String,
    pub args: Option<String>,
    pub start: Instant,
}

pub struct Tracker<M, C> {
    forest: Forest,
    metadata: M,
    classifier: C,
}

impl<M, C> Tracker<M, C>
where
    M: ProcessMetadataLookup,
    C: Classifier,
{
    pub fn new(metadata: M, classifier: C) -> Self {
        Self {
            forest: Forest::new(),
            metadata,
            classifier,
        }
    }

    pub fn register_root(&mut self, root: RootProcess) -> NodeId {
        let id = self
            .forest
            .register_root(root.pid, root.name, root.args, root.start);
        info!("Tracking {} ({})", self.display_name(id), root.pid);
        id
    }

    /// Apply a batch of events in arrival order, then report whether every tracked
    /// subtree has terminated
    ///
    /// Events that match nothing are discarded. An error means the forest is
    /// inconsistent and the run should stop with what was gathered so far.
    pub fn ingest(&mut self, batch: &[ProcessEvent]) -> Result<bool, IngestError> {
        for event in batch {
            trace!("{event}");
            if event.is_thread_creation() {
                continue;
            }
            let now = Instant::now();
            match event {
                ProcessEvent::Fork {
                    pid, parent_pid, ..
                } => self.on_fork(*pid, *parent_pid, now)?,
                ProcessEvent::Exec { pid, process_pid } => {
                    self.on_exec(*pid, *process_pid, now)?
                }
                ProcessEvent::Exit { pid } => self.on_exit(*pid, now)?,
                ProcessEvent::Comm { pid, name } => self.on_comm(*pid, name)?,
            }
        }

        Ok(self.is_complete())
    }

    /// False until a root is registered
    pub fn is_complete(&self) -> bool {
        !self.forest.is_empty() && forest_complete(&self.forest)
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn into_forest(self) -> Forest {
        self.forest
    }

    fn on_fork(&mut self, pid: u32, parent_pid: u32, now: Instant) -> Result<(), IngestError> {
        if self.forest.find_live_process(pid).is_some() {
            debug!("Ignoring duplicate fork of {pid}");
            return Ok(());
        }

        let parent_name = self.metadata.name_of(parent_pid);
        let subject = Subject::named(parent_pid, parent_name.as_deref());
        let parent = match self.classifier.classify(&subject) {
            Classification::Ignore => {
                debug!("Ignoring fork of {pid} by {parent_pid}");
                return Ok(());
            }
            Classification::NewRoot => self
                .forest
                .active_root()
                .ok_or(IngestError::NoActiveRoot { pid })?,
            Classification::Attach | Classification::Shim => {
                match self.forest.find_live_process(parent_pid) {
                    Some(parent) => parent,
                    None => return Ok(()),
                }
            }
        };

        let name = self
            .metadata
            .name_of(pid)
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());
        let args = self.metadata.args_of(pid);
        let child = self.forest.add_child(parent, pid, name, args, now)?;
        debug!(
            "{} ({pid}) forked by {} ({parent_pid}), attached to {}",
            self.display_name(child),
            parent_name.as_deref().unwrap_or(UNKNOWN_NAME),
            parent
        );
        Ok(())
    }

    fn on_exec(&mut self, pid: u32, process_pid: u32, now: Instant) -> Result<(), IngestError> {
        let args = self.metadata.args_of(pid);

        if self.is_shim(pid, args.as_deref()) {
            if let Some(id) = self.forest.find_live_process(pid) {
                debug!("{id} became an init shim");
                self.forest.process_mut(id)?.args = args;
            }
            return Ok(());
        }

        let Some(owner) = self.forest.find_live_process(process_pid) else {
            return Ok(());
        };
        let owner_args = self
            .forest
            .process(owner)
            .ok_or(IngestError::DanglingProcess(owner))?
            .args
            .as_deref();

        if self.is_shim(process_pid, owner_args) {
            self.record_exec(owner, pid, args, now)?;
        } else if let Some(name) = self.metadata.name_of(process_pid) {
            self.forest.process_mut(owner)?.name = name;
        }
        Ok(())
    }

    fn record_exec(
        &mut self,
        owner: NodeId,
        pid: u32,
        args: Option<String>,
        now: Instant,
    ) -> Result<(), IngestError> {
        let duplicate = self
            .forest
            .live_execs(pid)
            .into_iter()
            .filter_map(|id| self.forest.exec(id))
            .any(|exec| exec.args == args);
        if duplicate {
            debug!("Ignoring duplicate exec of {pid}");
            return Ok(());
        }

        let id = self.forest.add_exec(owner, pid, args, now)?;
        debug!("Recorded {id} under {owner}");
        Ok(())
    }

    fn on_exit(&mut self, pid: u32, now: Instant) -> Result<(), IngestError> {
        if let Some(id) = self.forest.find_live_process(pid) {
            self.forest.mark_process_done(id, now)?;
            debug!("{id} exited");
        }
        for exec in self.forest.live_execs(pid) {
            self.forest.mark_exec_done(exec, now)?;
        }
        Ok(())
    }

    fn on_comm(&mut self, pid: u32, name: &str) -> Result<(), IngestError> {
        if let Some(id) = self.forest.find_live_process(pid) {
            self.forest.process_mut(id)?.name = name.to_string();
        }
        Ok(())
    }

    fn is_shim(&self, pid: u32, args: Option<&str>) -> bool {
        self.classifier.classify(&Subject::with_args(pid, args)) == Classification::Shim
    }

    fn display_name(&self, id: NodeId) -> &str {
        self.forest
            .process(id)
            .map(|process| process.name.as_str())
            .unwrap_or(UNKNOWN_NAME)
    }
}
