mod common;

use common::{FakeMetadata, FakeSpawner, ScriptedSource, exec, exit, fork};
use proctrack::{
    CommandSpawner, LaunchError, LaunchOptions, OutputRouting, ProcessSpawner, Report,
    RetryPolicy, RuntimeClassifier, SpawnError, SpawnedProcess, Termination, launch,
};
use std::io;
use std::sync::mpsc;
use std::time::{Duration, Instant};

fn fast_retry() -> LaunchOptions {
    LaunchOptions {
        retry: RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
        ..LaunchOptions::default()
    }
}

#[test_log::test(tokio::test)]
async fn test_launch_tracks_until_complete() -> anyhow::Result<()> {
    let metadata = FakeMetadata::new(&[
        (100, "docker", "docker build ."),
        (999, "containerd-shim", ""),
        (300, "runc", "runc init"),
    ]);
    let (source, feed) = ScriptedSource::new();
    feed.send(Ok(vec![fork(300, 999)]))?;

    let feeder = {
        let metadata = metadata.clone();
        std::thread::spawn(move || {
            // Give the tracker time to see the fork before the command line changes
            std::thread::sleep(Duration::from_millis(50));
            metadata.set(300, "sh", "/bin/sh -c make");
            feed.send(Ok(vec![exec(300, 300)])).unwrap();
            feed.send(Err(io::Error::other("transient"))).unwrap();
            feed.send(Ok(vec![exit(300), exit(100)])).unwrap();
        })
    };

    let launched = launch(
        source,
        &FakeSpawner::with_pid(100),
        metadata,
        RuntimeClassifier::default(),
        fast_retry(),
        "docker",
        &["build".to_string(), ".".to_string()],
    )
    .await?;
    feeder.join().unwrap();

    assert_eq!(launched.termination, Termination::Complete);
    assert_eq!(launched.exit_status, None);

    let report = Report::from_forest(&launched.forest);
    let rendered: Vec<String> = report
        .lines
        .iter()
        .map(|line| {
            let text = line.to_string();
            text[..text.find("; Total Time").unwrap_or(text.len())].to_string()
        })
        .collect();
    assert_eq!(
        rendered,
        vec![
            "docker (100)",
            "docker (100)->runc (300)",
            "docker (100)->runc (300)->exec (300) `/bin/sh -c make`",
        ]
    );
    assert!(report.lines.iter().all(|line| line.duration.is_some()));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_root_name_falls_back_to_command_name() -> anyhow::Result<()> {
    let source = ScriptedSource::from_batches(vec![vec![exit(100)]]);

    let launched = launch(
        source,
        &FakeSpawner::with_pid(100),
        FakeMetadata::default(),
        RuntimeClassifier::default(),
        fast_retry(),
        "make",
        &[],
    )
    .await?;

    assert_eq!(launched.termination, Termination::Complete);
    let root = launched.forest.find_process(100).unwrap();
    assert_eq!(root.name, "make");
    assert_eq!(root.args.as_deref(), Some("make"));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_cancellation_returns_partial_forest() -> anyhow::Result<()> {
    let (source, feed) = ScriptedSource::new();
    feed.send(Ok(vec![fork(200, 100)]))?;
    let options = fast_retry();
    let cancel = options.cancel.clone();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let launched = launch(
        source,
        &FakeSpawner::with_pid(100),
        FakeMetadata::default(),
        RuntimeClassifier::default(),
        options,
        "make",
        &[],
    )
    .await?;
    canceller.await?;
    drop(feed);

    assert_eq!(launched.termination, Termination::Cancelled);
    assert_eq!(launched.forest.len(), 2);
    let report = Report::from_forest(&launched.forest);
    assert!(report.to_string().contains("make (100)->unknown (200); still running"));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_spawn_failure_aborts_before_tracking() {
    let (source, _feed) = ScriptedSource::new();

    let err = launch(
        source,
        &FakeSpawner::failing(),
        FakeMetadata::default(),
        RuntimeClassifier::default(),
        fast_retry(),
        "missing",
        &[],
    )
    .await
    .unwrap_err();

    assert!(matches!(err, LaunchError::Spawn(SpawnError::Spawn { .. })));
}

/// Starts real commands and hands their PID to the test
#[cfg(unix)]
struct AnnouncingSpawner {
    inner: CommandSpawner,
    pids: mpsc::Sender<u32>,
}

#[cfg(unix)]
impl ProcessSpawner for AnnouncingSpawner {
    fn spawn(&self, command: &str, args: &[String]) -> Result<SpawnedProcess, SpawnError> {
        let process = self.inner.spawn(command, args)?;
        let _ = self.pids.send(process.pid);
        Ok(process)
    }
}

#[cfg(unix)]
#[test_log::test(tokio::test)]
async fn test_reaping_does_not_block_the_runtime() -> anyhow::Result<()> {
    let (source, feed) = ScriptedSource::new();
    let (pids_tx, pids) = mpsc::channel();
    let spawner = AnnouncingSpawner {
        inner: CommandSpawner::new(OutputRouting::Null),
        pids: pids_tx,
    };

    // The exit is reported before the command is actually done
    let feeder = std::thread::spawn(move || {
        let pid = pids.recv().unwrap();
        feed.send(Ok(vec![exit(pid)])).unwrap();
    });

    let args = ["-c".to_string(), "sleep 0.5; exit 3".to_string()];
    let started = Instant::now();
    let (launched, ticked_after) = tokio::join!(
        launch(
            source,
            &spawner,
            FakeMetadata::default(),
            RuntimeClassifier::default(),
            fast_retry(),
            "sh",
            &args,
        ),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            started.elapsed()
        }
    );
    let launched = launched?;
    feeder.join().unwrap();

    assert_eq!(launched.termination, Termination::Complete);
    assert_eq!(launched.exit_status.and_then(|status| status.code()), Some(3));
    assert!(ticked_after < Duration::from_millis(400), "{ticked_after:?}");
    Ok(())
}
