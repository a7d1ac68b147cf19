use std::fmt;

/// A process lifecycle event, as delivered by an event source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// `pid` was created by `parent_pid`. `pid != tgid` means a thread was created.
    Fork { pid: u32, parent_pid: u32, tgid: u32 },
    /// `pid` replaced its image; `process_pid` is the process it belongs to
    Exec { pid: u32, process_pid: u32 },
    Exit { pid: u32 },
    /// `pid` was renamed
    Comm { pid: u32, name: String },
}

pub type EventBatch = Vec<ProcessEvent>;

impl ProcessEvent {
    pub fn is_thread_creation(&self) -> bool {
        matches!(self, ProcessEvent::Fork { pid, tgid, .. } if pid != tgid)
    }
}

impl fmt::Display for ProcessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessEvent::Fork {
                pid,
                parent_pid,
                tgid,
            } => write!(f, "Fork; PID: {pid}; ParentPID: {parent_pid}; TGID: {tgid}"),
            ProcessEvent::Exec { pid, process_pid } => {
                write!(f, "Exec; PID: {pid}; ProcessPID: {process_pid}")
            }
            ProcessEvent::Exit { pid } => write!(f, "Exit; PID: {pid}"),
            ProcessEvent::Comm { pid, name } => write!(f, "Comm; PID: {pid}; Command: {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_creation() {
        let thread = ProcessEvent::Fork {
            pid: 201,
            parent_pid: 200,
            tgid: 200,
        };
        let process = ProcessEvent::Fork {
            pid: 201,
            parent_pid: 200,
            tgid: 201,
        };
        assert!(thread.is_thread_creation());
        assert!(!process.is_thread_creation());
        assert!(!ProcessEvent::Exit { pid: 201 }.is_thread_creation());
    }

    #[test]
    fn test_display() {
        let event = ProcessEvent::Fork {
            pid: 200,
            parent_pid: 100,
            tgid: 200,
        };
        assert_eq!(event.to_string(), "Fork; PID: 200; ParentPID: 100; TGID: 200");
    }
}
