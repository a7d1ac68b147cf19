use crate::event::EventBatch;
use std::io;

/// Supplies batches of process lifecycle events
///
/// `read_batch` blocks until events are available and may be called indefinitely.
/// Errors are treated as transient and the call is retried.
pub trait ProcessEventSource {
    fn read_batch(&mut self) -> io::Result<EventBatch>;
}

/// Best-effort PID lookups. A process may be gone by the time it is looked up, which
/// is reported as `None` and never retried.
pub trait ProcessMetadataLookup {
    /// Executable name of `pid`
    fn name_of(&self, pid: u32) -> Option<String>;

    /// Current command line of `pid`, arguments separated by spaces
    fn args_of(&self, pid: u32) -> Option<String>;
}

impl<M: ProcessMetadataLookup + ?Sized> ProcessMetadataLookup for &M {
    fn name_of(&self, pid: u32) -> Option<String> {
        (**self).name_of(pid)
    }

    fn args_of(&self, pid: u32) -> Option<String> {
        (**self).args_of(pid)
    }
}

impl<S: ProcessEventSource + ?Sized> ProcessEventSource for Box<S> {
    fn read_batch(&mut self) -> io::Result<EventBatch> {
        (**self).read_batch()
    }
}
