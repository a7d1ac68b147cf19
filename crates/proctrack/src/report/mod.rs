//! Per-process and per-exec durations of a tracked forest

mod format_duration;

pub use format_duration::format_duration;

use crate::forest::{Forest, TrackedProcess};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Process,
    Exec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainLink {
    pub name: String,
    pub pid: u32,
}

/// One tracked process or exec record, with its ancestry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportLine {
    pub kind: LineKind,
    /// From the root down to the process itself, or down to the owner of an exec record
    pub chain: Vec<ChainLink>,
    pub pid: u32,
    /// Command run by an exec record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// None when the node never exited
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub lines: Vec<ReportLine>,
}

impl Report {
    /// Lines in pre-order, each process followed by its exec records
    pub fn from_forest(forest: &Forest) -> Self {
        let mut lines = Vec::with_capacity(forest.len() + forest.exec_len());

        for process in forest.walk() {
            let chain: Vec<ChainLink> = forest
                .lineage(process.id)
                .into_iter()
                .map(link)
                .collect();
            let execs: Vec<ReportLine> = process
                .execs
                .iter()
                .filter_map(|id| forest.exec(*id))
                .map(|exec| ReportLine {
                    kind: LineKind::Exec,
                    chain: chain.clone(),
                    pid: exec.pid(),
                    command: exec.args.clone(),
                    duration: exec.duration(),
                })
                .collect();

            lines.push(ReportLine {
                kind: LineKind::Process,
                chain,
                pid: process.pid(),
                command: None,
                duration: process.duration(),
            });
            lines.extend(execs);
        }

        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn link(process: &TrackedProcess) -> ChainLink {
    ChainLink {
        name: process.name.clone(),
        pid: process.pid(),
    }
}

fn serialize_secs<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match duration {
        Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain = self
            .chain
            .iter()
            .map(|link| format!("{} ({})", link.name, link.pid))
            .collect::<Vec<_>>()
            .join("->");
        write!(f, "{chain}")?;

        if self.kind == LineKind::Exec {
            write!(f, "->exec ({})", self.pid)?;
            if let Some(command) = &self.command {
                write!(f, " `{command}`")?;
            }
        }

        match self.duration {
            Some(duration) => write!(f, "; Total Time: {}", format_duration(duration, None)),
            None => write!(f, "; still running"),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
