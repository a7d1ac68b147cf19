use crate::event::{EventBatch, ProcessEvent};
use crate::interfaces::ProcessEventSource;
use proc_connector::{ProcConnector, ProcEvent};
use std::io;

/// Process events of the whole host, read from the kernel process connector
pub struct ConnectorSource {
    connector: ProcConnector,
}

impl ConnectorSource {
    pub fn open() -> Result<Self, proc_connector::ConnectorError> {
        Ok(Self {
            connector: ProcConnector::open()?,
        })
    }
}

impl ProcessEventSource for ConnectorSource {
    fn read_batch(&mut self) -> io::Result<EventBatch> {
        let events = self.connector.recv().map_err(io::Error::other)?;
        Ok(events.into_iter().filter_map(to_process_event).collect())
    }
}

/// Keep the events the tracker correlates on
///
/// Forks are attributed to the thread group of the forking thread. Exits of threads
/// other than the group leader do not end the process and are dropped.
pub fn to_process_event(event: ProcEvent) -> Option<ProcessEvent> {
    match event {
        ProcEvent::Fork {
            parent_tgid,
            child_pid,
            child_tgid,
            ..
        } => Some(ProcessEvent::Fork {
            pid: child_pid,
            parent_pid: parent_tgid,
            tgid: child_tgid,
        }),
        ProcEvent::Exec {
            process_pid,
            process_tgid,
        } => Some(ProcessEvent::Exec {
            pid: process_pid,
            process_pid: process_tgid,
        }),
        ProcEvent::Exit {
            process_pid,
            process_tgid,
            ..
        } if process_pid == process_tgid => Some(ProcessEvent::Exit { pid: process_pid }),
        ProcEvent::Comm {
            process_pid, comm, ..
        } => Some(ProcessEvent::Comm {
            pid: process_pid,
            name: comm,
        }),
        ProcEvent::Exit { .. } | ProcEvent::Ack { .. } | ProcEvent::Other { .. } => None,
    }
}
