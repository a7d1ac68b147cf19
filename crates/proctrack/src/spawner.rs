use crate::error::SpawnError;
use log::{info, warn};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;

/// Log target of the launched command's output
pub const CHILD_OUTPUT_TARGET: &str = "proctrack::child";

/// Where the launched command's stdout and stderr go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputRouting {
    /// Shared with the current process
    #[default]
    Inherit,
    /// Both streams written to the stderr of the current process
    Stderr,
    /// Discarded
    Null,
    /// Forwarded line by line to the log, stderr lines prefixed with `[stderr]`
    Log,
}

/// A started command
#[derive(Debug)]
pub struct SpawnedProcess {
    pub pid: u32,
    /// Immediate name, before any lookup
    pub name: String,
    /// Command line, arguments separated by spaces
    pub args: String,
    /// Handle to reap the process, if the spawner owns one
    pub child: Option<Child>,
}

impl SpawnedProcess {
    /// Wait for the process to exit
    pub fn wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => child.wait().map(Some),
            None => Ok(None),
        }
    }

    /// The exit status if the process already exited, without blocking
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => child.try_wait(),
            None => Ok(None),
        }
    }
}

pub trait ProcessSpawner {
    fn spawn(&self, command: &str, args: &[String]) -> Result<SpawnedProcess, SpawnError>;
}

impl<P: ProcessSpawner + ?Sized> ProcessSpawner for &P {
    fn spawn(&self, command: &str, args: &[String]) -> Result<SpawnedProcess, SpawnError> {
        (**self).spawn(command, args)
    }
}

/// Spawns commands with [`std::process::Command`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandSpawner {
    pub output: OutputRouting,
}

impl CommandSpawner {
    pub fn new(output: OutputRouting) -> Self {
        Self { output }
    }
}

impl ProcessSpawner for CommandSpawner {
    fn spawn(&self, command: &str, args: &[String]) -> Result<SpawnedProcess, SpawnError> {
        if command.is_empty() {
            return Err(SpawnError::EmptyCommand);
        }

        let mut cmd = Command::new(command);
        cmd.args(args);
        match self.output {
            OutputRouting::Inherit => {}
            OutputRouting::Stderr => {
                cmd.stdout(std::io::stderr());
            }
            OutputRouting::Null => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
            OutputRouting::Log => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let mut child = cmd.spawn().map_err(|source| SpawnError::Spawn {
            command: command.to_string(),
            source,
        })?;

        if let Some(stdout) = child.stdout.take() {
            log_lines("proctrack-stdout", stdout, "");
        }
        if let Some(stderr) = child.stderr.take() {
            log_lines("proctrack-stderr", stderr, "[stderr] ");
        }

        Ok(SpawnedProcess {
            pid: child.id(),
            name: command_name(command),
            args: std::iter::once(command)
                .chain(args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" "),
            child: Some(child),
        })
    }
}

/// File name of a command given as a path
pub fn command_name(command: &str) -> String {
    Path::new(command)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| command.to_string())
}

fn log_lines<R: Read + Send + 'static>(thread_name: &str, reader: R, prefix: &'static str) {
    let spawned = thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || {
            let mut reader = BufReader::new(reader);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&line);
                        info!(target: CHILD_OUTPUT_TARGET, "{prefix}{}", text.trim_end());
                    }
                    Err(err) => {
                        warn!("Failed to read the command output: {err}");
                        break;
                    }
                }
            }
        });
    if let Err(err) = spawned {
        warn!("Failed to forward the command output to the log: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::bare("docker", "docker")]
    #[case::absolute("/usr/bin/docker", "docker")]
    #[case::relative("./build.sh", "build.sh")]
    fn test_command_name(#[case] command: &str, #[case] expected: &str) {
        assert_eq!(command_name(command), expected);
    }

    #[test]
    fn test_empty_command() {
        let err = CommandSpawner::default().spawn("", &[]).unwrap_err();
        assert!(matches!(err, SpawnError::EmptyCommand));
    }

    #[test]
    fn test_missing_executable() {
        let err = CommandSpawner::new(OutputRouting::Null)
            .spawn("/nonexistent/proctrack-test-binary", &[])
            .unwrap_err();
        assert!(matches!(err, SpawnError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_and_wait() {
        let mut process = CommandSpawner::new(OutputRouting::Log)
            .spawn("sh", &["-c".to_string(), "echo hello; exit 3".to_string()])
            .unwrap();

        assert_eq!(process.name, "sh");
        assert_eq!(process.args, "sh -c echo hello; exit 3");
        let status = process.wait().unwrap().unwrap();
        assert_eq!(status.code(), Some(3));
    }
}
