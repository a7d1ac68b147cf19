use crate::classifier::Classifier;
use crate::error::LaunchError;
use crate::forest::Forest;
use crate::interfaces::{ProcessEventSource, ProcessMetadataLookup};
use crate::spawner::{ProcessSpawner, SpawnedProcess};
use crate::tracker::{RootProcess, Termination, Tracker, run_event_loop};
use crate::watcher::{DEFAULT_QUEUE_CAPACITY, RetryPolicy, spawn_watcher};
use log::{debug, info, warn};
use std::process::ExitStatus;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Event batches buffered between the watcher and the main loop
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    /// Stops tracking early; the partial forest is still returned
    pub cancel: CancellationToken,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Outcome of a launch
#[derive(Debug)]
pub struct Launched {
    pub forest: Forest,
    pub termination: Termination,
    /// Exit status of the launched command, when it could be reaped
    pub exit_status: Option<ExitStatus>,
}

/// Run `command` and track its process tree until every tracked process is done
///
/// The watcher starts before the command so none of its events are missed. Tracking
/// failures end the run with a partial forest; only failing to start is an error.
pub async fn launch<S, P, M, C>(
    source: S,
    spawner: &P,
    metadata: M,
    classifier: C,
    options: LaunchOptions,
    command: &str,
    args: &[String],
) -> Result<Launched, LaunchError>
where
    S: ProcessEventSource + Send + 'static,
    P: ProcessSpawner + ?Sized,
    M: ProcessMetadataLookup,
    C: Classifier,
{
    let (mut events, watcher) = spawn_watcher(
        source,
        options.queue_capacity,
        options.retry,
        options.cancel.clone(),
    )
    .map_err(LaunchError::Watcher)?;

    let start = Instant::now();
    let process = spawner.spawn(command, args)?;
    let root = RootProcess {
        pid: process.pid,
        name: metadata
            .name_of(process.pid)
            .unwrap_or_else(|| process.name.clone()),
        args: Some(process.args.clone()),
        start,
    };
    info!("Launched {} ({})", root.name, root.pid);

    let (roots_tx, mut roots) = mpsc::channel(1);
    // The receiver is alive until the end of this function
    let _ = roots_tx.send(root).await;

    let mut tracker = Tracker::new(metadata, classifier);
    let termination = run_event_loop(&mut tracker, &mut events, &mut roots, &options.cancel).await;

    watcher.shutdown();
    drop(events);

    let exit_status = reap(process, &termination).await;
    Ok(Launched {
        forest: tracker.into_forest(),
        termination,
        exit_status,
    })
}

async fn reap(mut process: SpawnedProcess, termination: &Termination) -> Option<ExitStatus> {
    let pid = process.pid;
    let reaped = match termination {
        // Its exit was observed, the wait is short but still blocking
        Termination::Complete => tokio::task::spawn_blocking(move || process.wait())
            .await
            .unwrap_or_else(|err| Err(std::io::Error::other(err))),
        _ => process.try_wait(),
    };

    match reaped {
        Ok(None) => {
            debug!("Process {pid} is still running");
            None
        }
        Ok(status) => status,
        Err(err) => {
            warn!("Failed to reap process {pid}: {err}");
            None
        }
    }
}
