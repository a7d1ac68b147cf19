use crate::interfaces::ProcessMetadataLookup;
use log::trace;
use procfs::process::Process;

/// PID lookups through `/proc`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcfsMetadata;

impl ProcfsMetadata {
    fn process(pid: u32) -> Option<Process> {
        let pid = i32::try_from(pid).ok()?;
        Process::new(pid)
            .inspect_err(|err| trace!("No process {pid}: {err}"))
            .ok()
    }
}

impl ProcessMetadataLookup for ProcfsMetadata {
    fn name_of(&self, pid: u32) -> Option<String> {
        let stat = Self::process(pid)?.stat().ok()?;
        Some(stat.comm)
    }

    fn args_of(&self, pid: u32) -> Option<String> {
        let cmdline = Self::process(pid)?.cmdline().ok()?;
        Some(cmdline.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process() {
        let pid = std::process::id();
        let name = ProcfsMetadata.name_of(pid).unwrap();
        assert!(!name.is_empty());
        assert!(name.len() <= 15);
        assert!(ProcfsMetadata.args_of(pid).is_some());
    }

    #[test]
    fn test_missing_process() {
        assert_eq!(ProcfsMetadata.name_of(u32::MAX), None);
        assert_eq!(ProcfsMetadata.args_of(u32::MAX), None);
    }
}
