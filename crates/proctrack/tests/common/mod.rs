#![allow(dead_code)]

use proctrack::{
    EventBatch, ProcessEvent, ProcessEventSource, ProcessMetadataLookup, ProcessSpawner,
    SpawnError, SpawnedProcess,
};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

/// Metadata lookup answering from a table that tests update as processes exec
#[derive(Clone, Default)]
pub struct FakeMetadata {
    entries: Arc<Mutex<HashMap<u32, (String, String)>>>,
}

impl FakeMetadata {
    pub fn new(entries: &[(u32, &str, &str)]) -> Self {
        let metadata = Self::default();
        for (pid, name, args) in entries {
            metadata.set(*pid, name, args);
        }
        metadata
    }

    pub fn set(&self, pid: u32, name: &str, args: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(pid, (name.to_string(), args.to_string()));
    }
}

impl ProcessMetadataLookup for FakeMetadata {
    fn name_of(&self, pid: u32) -> Option<String> {
        let entries = self.entries.lock().unwrap();
        entries.get(&pid).map(|(name, _)| name.clone())
    }

    fn args_of(&self, pid: u32) -> Option<String> {
        let entries = self.entries.lock().unwrap();
        entries.get(&pid).map(|(_, args)| args.clone())
    }
}

/// Event source replaying what the test feeds it
///
/// Once the feeding side is dropped, reads return empty batches.
pub struct ScriptedSource {
    batches: mpsc::Receiver<io::Result<EventBatch>>,
}

impl ScriptedSource {
    pub fn new() -> (Self, mpsc::Sender<io::Result<EventBatch>>) {
        let (sender, batches) = mpsc::channel();
        (Self { batches }, sender)
    }

    pub fn from_batches(batches: Vec<EventBatch>) -> Self {
        let (source, sender) = Self::new();
        for batch in batches {
            sender.send(Ok(batch)).unwrap();
        }
        source
    }
}

impl ProcessEventSource for ScriptedSource {
    fn read_batch(&mut self) -> io::Result<EventBatch> {
        match self.batches.recv() {
            Ok(result) => result,
            Err(_) => {
                std::thread::sleep(Duration::from_millis(10));
                Ok(Vec::new())
            }
        }
    }
}

/// Spawner handing out a fixed PID without starting anything
pub struct FakeSpawner {
    pub pid: u32,
    pub fail: bool,
}

impl FakeSpawner {
    pub fn with_pid(pid: u32) -> Self {
        Self { pid, fail: false }
    }

    pub fn failing() -> Self {
        Self { pid: 0, fail: true }
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(&self, command: &str, args: &[String]) -> Result<SpawnedProcess, SpawnError> {
        if self.fail {
            return Err(SpawnError::Spawn {
                command: command.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            });
        }
        Ok(SpawnedProcess {
            pid: self.pid,
            name: command.to_string(),
            args: std::iter::once(command.to_string())
                .chain(args.iter().cloned())
                .collect::<Vec<_>>()
                .join(" "),
            child: None,
        })
    }
}

pub fn fork(pid: u32, parent_pid: u32) -> ProcessEvent {
    ProcessEvent::Fork {
        pid,
        parent_pid,
        tgid: pid,
    }
}

pub fn exec(pid: u32, process_pid: u32) -> ProcessEvent {
    ProcessEvent::Exec { pid, process_pid }
}

pub fn exit(pid: u32) -> ProcessEvent {
    ProcessEvent::Exit { pid }
}
