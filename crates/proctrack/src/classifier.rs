//! Correlation heuristics for container runtimes
//!
//! A container runtime hides the real ancestry of the commands doing the work: they are
//! forked by a runtime daemon, not by the launched command, and often start as a generic
//! "init shim" that execs the real command later. The tracker asks a [`Classifier`] what
//! a process is instead of comparing names itself, so other runtimes plug in as data.

use serde::{Deserialize, Serialize};

/// Kernel `comm` names are truncated to 15 bytes
const COMM_MAX_LEN: usize = 15;

/// What is known about a process when it is classified
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subject<'a> {
    pub pid: u32,
    pub name: Option<&'a str>,
    pub args: Option<&'a str>,
}

impl<'a> Subject<'a> {
    pub fn named(pid: u32, name: Option<&'a str>) -> Self {
        Self {
            pid,
            name,
            args: None,
        }
    }

    pub fn with_args(pid: u32, args: Option<&'a str>) -> Self {
        Self {
            pid,
            name: None,
            args,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// A runtime executable: what it forks belongs under the active root
    NewRoot,
    /// An ordinary process: its forks attach under its own node, if tracked
    Attach,
    /// A runtime bootstrap process: the commands it execs are recorded
    Shim,
    /// Never correlated
    Ignore,
}

pub trait Classifier {
    fn classify(&self, subject: &Subject<'_>) -> Classification;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn classify(&self, subject: &Subject<'_>) -> Classification {
        (**self).classify(subject)
    }
}

impl<C: Classifier + ?Sized> Classifier for &C {
    fn classify(&self, subject: &Subject<'_>) -> Classification {
        (**self).classify(subject)
    }
}

/// Signatures of one container runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeProfile {
    pub name: String,
    /// Executables forking the processes that do the real work
    #[serde(default)]
    pub executables: Vec<String>,
    /// Command lines of the runtime's init shim, compared on alphanumeric characters only
    #[serde(default)]
    pub init_markers: Vec<String>,
    /// Executables whose forks are never tracked
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl RuntimeProfile {
    /// Docker and BuildKit on top of containerd and runc
    pub fn docker() -> Self {
        Self {
            name: "docker".to_string(),
            executables: vec![
                "containerd-shim".to_string(),
                "containerd-shim-runc-v2".to_string(),
            ],
            init_markers: vec!["runc init".to_string()],
            ignore: Vec::new(),
        }
    }
}

/// Table driven [`Classifier`] over a list of runtime profiles
#[derive(Debug, Clone)]
pub struct RuntimeClassifier {
    profiles: Vec<RuntimeProfile>,
    markers: Vec<String>,
}

impl RuntimeClassifier {
    pub fn new(profiles: Vec<RuntimeProfile>) -> Self {
        let markers = profiles
            .iter()
            .flat_map(|profile| profile.init_markers.iter())
            .map(|marker| normalize_args(marker))
            .filter(|marker| !marker.is_empty())
            .collect();
        Self { profiles, markers }
    }

    pub fn with_profile(mut self, profile: RuntimeProfile) -> Self {
        self.profiles.push(profile);
        Self::new(self.profiles)
    }

    pub fn profiles(&self) -> &[RuntimeProfile] {
        &self.profiles
    }

    fn is_init_marker(&self, args: &str) -> bool {
        let args = normalize_args(args);
        !args.is_empty() && self.markers.iter().any(|marker| *marker == args)
    }

    fn matches_any<'p>(
        &'p self,
        name: &str,
        pick: impl Fn(&'p RuntimeProfile) -> &'p [String],
    ) -> bool {
        self.profiles
            .iter()
            .flat_map(|profile| pick(profile).iter())
            .any(|signature| name_matches(name, signature))
    }
}

impl Default for RuntimeClassifier {
    fn default() -> Self {
        Self::new(vec![RuntimeProfile::docker()])
    }
}

impl Classifier for RuntimeClassifier {
    fn classify(&self, subject: &Subject<'_>) -> Classification {
        if let Some(args) = subject.args {
            if self.is_init_marker(args) {
                return Classification::Shim;
            }
        }

        if let Some(name) = subject.name {
            if self.matches_any(name, |profile| profile.ignore.as_slice()) {
                return Classification::Ignore;
            }
            if self.matches_any(name, |profile| profile.executables.as_slice()) {
                return Classification::NewRoot;
            }
        }

        Classification::Attach
    }
}

/// Keep only ASCII alphanumeric characters, so `runc\0init\0`, `runc init` and
/// `runcinit` compare equal
pub fn normalize_args(args: &str) -> String {
    args.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn name_matches(observed: &str, signature: &str) -> bool {
    observed == signature || (observed.len() == COMM_MAX_LEN && signature.starts_with(observed))
}
