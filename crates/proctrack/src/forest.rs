//! Arena holding every tracked process and exec record of a run
//!
//! Nodes are never removed. Each node is addressed by its PID plus the arena slot it was
//! allocated in, so a PID reused by the kernel never aliases a node created earlier.
//! Children and exec records are owned through id lists, parents are plain ids.

use crate::error::IngestError;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub pid: u32,
    instance: usize,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.pid, self.instance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecId {
    pub pid: u32,
    instance: usize,
}

impl fmt::Display for ExecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exec {}#{}", self.pid, self.instance)
    }
}

/// One OS process followed for its lifetime
#[derive(Debug, Clone)]
pub struct TrackedProcess {
    pub id: NodeId,
    pub name: String,
    pub args: Option<String>,
    pub start: Instant,
    /// Set once, by the matching exit
    pub end: Option<Instant>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub execs: Vec<ExecId>,
}

impl TrackedProcess {
    pub fn pid(&self) -> u32 {
        self.id.pid
    }

    pub fn is_done(&self) -> bool {
        self.end.is_some()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end.saturating_duration_since(self.start))
    }
}

/// A command run by a process the runtime spawned generically (an init shim)
#[derive(Debug, Clone)]
pub struct Exec {
    pub id: ExecId,
    pub args: Option<String>,
    pub start: Instant,
    pub end: Option<Instant>,
    pub owner: NodeId,
}

impl Exec {
    pub fn pid(&self) -> u32 {
        self.id.pid
    }

    pub fn is_done(&self) -> bool {
        self.end.is_some()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end.saturating_duration_since(self.start))
    }
}

/// The independently tracked process trees of one run
#[derive(Debug, Clone, Default)]
pub struct Forest {
    processes: Vec<TrackedProcess>,
    execs: Vec<Exec>,
    roots: Vec<NodeId>,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new independent tree
    pub fn register_root(
        &mut self,
        pid: u32,
        name: impl Into<String>,
        args: Option<String>,
        start: Instant,
    ) -> NodeId {
        let id = self.allocate_process(pid, name.into(), args, start, None);
        self.roots.push(id);
        id
    }

    /// Append a new process under `parent`
    pub fn add_child(
        &mut self,
        parent: NodeId,
        pid: u32,
        name: impl Into<String>,
        args: Option<String>,
        start: Instant,
    ) -> Result<NodeId, IngestError> {
        if self.process(parent).is_none() {
            return Err(IngestError::DanglingProcess(parent));
        }
        let id = self.allocate_process(pid, name.into(), args, start, Some(parent));
        self.process_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Append a new exec record to `owner`
    pub fn add_exec(
        &mut self,
        owner: NodeId,
        pid: u32,
        args: Option<String>,
        start: Instant,
    ) -> Result<ExecId, IngestError> {
        let id = ExecId {
            pid,
            instance: self.execs.len(),
        };
        self.process_mut(owner)?.execs.push(id);
        self.execs.push(Exec {
            id,
            args,
            start,
            end: None,
            owner,
        });
        Ok(id)
    }

    pub fn process(&self, id: NodeId) -> Option<&TrackedProcess> {
        self.processes
            .get(id.instance)
            .filter(|process| process.id == id)
    }

    pub(crate) fn process_mut(&mut self, id: NodeId) -> Result<&mut TrackedProcess, IngestError> {
        self.processes
            .get_mut(id.instance)
            .filter(|process| process.id == id)
            .ok_or(IngestError::DanglingProcess(id))
    }

    pub fn exec(&self, id: ExecId) -> Option<&Exec> {
        self.execs.get(id.instance).filter(|exec| exec.id == id)
    }

    pub(crate) fn exec_mut(&mut self, id: ExecId) -> Result<&mut Exec, IngestError> {
        self.execs
            .get_mut(id.instance)
            .filter(|exec| exec.id == id)
            .ok_or(IngestError::DanglingExec(id))
    }

    /// Roots in registration order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// The most recently registered root
    pub fn active_root(&self) -> Option<NodeId> {
        self.roots.last().copied()
    }

    /// Number of tracked processes
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Number of exec records
    pub fn exec_len(&self) -> usize {
        self.execs.len()
    }

    /// Depth-first, pre-order walk over every tree, roots in registration order
    pub fn walk(&self) -> PreOrder<'_> {
        PreOrder {
            forest: self,
            stack: self.roots.iter().rev().copied().collect(),
        }
    }

    /// First process with `pid` in pre-order
    pub fn find_process(&self, pid: u32) -> Option<&TrackedProcess> {
        self.walk().find(|process| process.pid() == pid)
    }

    /// First exec record with `pid` in pre-order; a process's records come right after it
    pub fn find_exec(&self, pid: u32) -> Option<&Exec> {
        self.walk()
            .flat_map(|process| process.execs.iter().filter_map(|id| self.exec(*id)))
            .find(|exec| exec.pid() == pid)
    }

    /// Same walk as [`Forest::find_process`], skipping processes that already exited
    pub fn find_live_process(&self, pid: u32) -> Option<NodeId> {
        self.walk()
            .find(|process| process.pid() == pid && !process.is_done())
            .map(|process| process.id)
    }

    /// Every exec record with `pid` that has not ended, in pre-order
    pub fn live_execs(&self, pid: u32) -> Vec<ExecId> {
        self.walk()
            .flat_map(|process| process.execs.iter().filter_map(|id| self.exec(*id)))
            .filter(|exec| exec.pid() == pid && !exec.is_done())
            .map(|exec| exec.id)
            .collect()
    }

    /// Stamp the end of a process. Returns false if it had already ended.
    pub(crate) fn mark_process_done(
        &mut self,
        id: NodeId,
        at: Instant,
    ) -> Result<bool, IngestError> {
        let process = self.process_mut(id)?;
        if process.end.is_some() {
            return Ok(false);
        }
        process.end = Some(at);
        Ok(true)
    }

    /// Stamp the end of an exec record. Returns false if it had already ended.
    pub(crate) fn mark_exec_done(&mut self, id: ExecId, at: Instant) -> Result<bool, IngestError> {
        let exec = self.exec_mut(id)?;
        if exec.end.is_some() {
            return Ok(false);
        }
        exec.end = Some(at);
        Ok(true)
    }

    /// The chain from the root down to `id`, both included
    pub fn lineage(&self, id: NodeId) -> Vec<&TrackedProcess> {
        let mut chain = Vec::new();
        let mut current = self.process(id);
        while let Some(process) = current {
            chain.push(process);
            current = process.parent.and_then(|parent| self.process(parent));
        }
        chain.reverse();
        chain
    }

    fn allocate_process(
        &mut self,
        pid: u32,
        name: String,
        args: Option<String>,
        start: Instant,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId {
            pid,
            instance: self.processes.len(),
        };
        self.processes.push(TrackedProcess {
            id,
            name,
            args,
            start,
            end: None,
            children: Vec::new(),
            parent,
            execs: Vec::new(),
        });
        id
    }
}

/// Iterator returned by [`Forest::walk`]
pub struct PreOrder<'a> {
    forest: &'a Forest,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a TrackedProcess;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if let Some(process) = self.forest.process(id) {
                self.stack.extend(process.children.iter().rev().copied());
                return Some(process);
            }
        }
        None
    }
}
