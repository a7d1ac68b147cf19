//! Background reader moving event batches from a blocking source into a bounded queue
//!
//! The queue is the only state shared with the main loop. When it is full the watcher
//! blocks, which in turn stops reading from the source: a slow consumer applies
//! backpressure instead of losing events.

use crate::event::EventBatch;
use crate::interfaces::ProcessEventSource;
use log::{debug, warn};
use std::io;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Queue capacity, in batches, when none is configured
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// How long to wait before reading again after consecutive source errors
///
/// The first retry is immediate. Later ones back off exponentially from
/// `initial_backoff` up to `max_backoff`, until a read succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32
            .checked_shl(consecutive_failures - 2)
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Handle on the watcher thread
///
/// Dropping it only requests the watcher to stop: a read already in progress is not
/// interrupted, the thread exits after it returns.
pub struct WatcherHandle {
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Stop the watcher and wait for its current read to return
    pub fn join(mut self) {
        self.shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("The event watcher panicked");
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start reading `source` on a dedicated thread
///
/// Batches are delivered in read order; empty ones are skipped. The watcher stops once
/// `cancel` (or [`WatcherHandle::shutdown`]) is triggered, or once the receiver is dropped.
pub fn spawn_watcher<S>(
    source: S,
    capacity: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
) -> io::Result<(mpsc::Receiver<EventBatch>, WatcherHandle)>
where
    S: ProcessEventSource + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let token = cancel.child_token();
    let thread_token = token.clone();

    let thread = std::thread::Builder::new()
        .name("proctrack-watcher".to_string())
        .spawn(move || watch(source, sender, retry, thread_token))?;

    Ok((
        receiver,
        WatcherHandle {
            cancel: token,
            thread: Some(thread),
        },
    ))
}

fn watch<S: ProcessEventSource>(
    mut source: S,
    sender: mpsc::Sender<EventBatch>,
    retry: RetryPolicy,
    cancel: CancellationToken,
) {
    let mut failures = 0u32;

    while !cancel.is_cancelled() {
        match source.read_batch() {
            Ok(batch) => {
                failures = 0;
                if batch.is_empty() {
                    continue;
                }
                if sender.blocking_send(batch).is_err() {
                    debug!("Event queue closed, stopping the watcher");
                    return;
                }
            }
            Err(err) => {
                failures = failures.saturating_add(1);
                warn!("Failed to read process events: {err}");
                let delay = retry.delay_for(failures);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
        }
    }
    debug!("Event watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ProcessEvent;
    use rstest::rstest;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    struct Script(VecDeque<io::Result<EventBatch>>);

    impl ProcessEventSource for Script {
        fn read_batch(&mut self) -> io::Result<EventBatch> {
            match self.0.pop_front() {
                Some(result) => result,
                None => {
                    std::thread::sleep(Duration::from_millis(5));
                    Ok(Vec::new())
                }
            }
        }
    }

    fn exit(pid: u32) -> EventBatch {
        vec![ProcessEvent::Exit { pid }]
    }

    #[rstest]
    #[case::first_failure(1, Duration::ZERO)]
    #[case::second_failure(2, Duration::from_millis(10))]
    #[case::third_failure(3, Duration::from_millis(20))]
    #[case::capped(9, Duration::from_secs(1))]
    #[case::huge(u32::MAX, Duration::from_secs(1))]
    fn test_retry_delay(#[case] failures: u32, #[case] expected: Duration) {
        assert_eq!(RetryPolicy::default().delay_for(failures), expected);
    }

    #[test]
    fn test_errors_and_empty_batches_are_not_forwarded() {
        let script = Script(VecDeque::from([
            Err(io::Error::other("transient")),
            Err(io::Error::other("transient")),
            Ok(exit(1)),
            Ok(Vec::new()),
            Ok(exit(2)),
        ]));
        let retry = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        };

        let (mut receiver, handle) =
            spawn_watcher(script, 4, retry, CancellationToken::new()).unwrap();

        assert_eq!(receiver.blocking_recv(), Some(exit(1)));
        assert_eq!(receiver.blocking_recv(), Some(exit(2)));
        handle.join();
        assert_eq!(receiver.blocking_recv(), None);
    }

    #[test]
    fn test_cancellation_stops_the_watcher() {
        let cancel = CancellationToken::new();
        let (mut receiver, handle) = spawn_watcher(
            Script(VecDeque::new()),
            1,
            RetryPolicy::default(),
            cancel.clone(),
        )
        .unwrap();

        cancel.cancel();
        assert_eq!(receiver.blocking_recv(), None);
        handle.join();
    }

    /// Endless source numbering its batches
    struct Counting(Arc<AtomicU32>);

    impl ProcessEventSource for Counting {
        fn read_batch(&mut self) -> io::Result<EventBatch> {
            Ok(exit(self.0.fetch_add(1, Ordering::SeqCst)))
        }
    }

    #[test]
    fn test_full_queue_blocks_reads() {
        let reads = Arc::new(AtomicU32::new(0));
        let (mut receiver, handle) = spawn_watcher(
            Counting(reads.clone()),
            2,
            RetryPolicy::default(),
            CancellationToken::new(),
        )
        .unwrap();

        // Two batches queued, the third one waits for room
        let deadline = Instant::now() + Duration::from_secs(5);
        while reads.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(reads.load(Ordering::SeqCst), 3);
        assert_eq!(receiver.len(), 2);

        assert_eq!(receiver.try_recv(), Ok(exit(0)));
        assert_eq!(receiver.blocking_recv(), Some(exit(1)));
        assert_eq!(receiver.blocking_recv(), Some(exit(2)));

        drop(receiver);
        handle.join();
    }

    struct Panicking;

    impl ProcessEventSource for Panicking {
        fn read_batch(&mut self) -> io::Result<EventBatch> {
            panic!("source failure");
        }
    }

    #[test]
    fn test_source_panic_closes_the_queue() {
        let (mut receiver, handle) =
            spawn_watcher(Panicking, 1, RetryPolicy::default(), CancellationToken::new())
                .unwrap();

        assert_eq!(receiver.blocking_recv(), None);
        handle.join();
    }
}
