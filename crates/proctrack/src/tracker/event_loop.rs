use super::{RootProcess, Tracker};
use crate::classifier::Classifier;
use crate::error::IngestError;
use crate::event::EventBatch;
use crate::interfaces::ProcessMetadataLookup;
use log::{error, info, warn};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Batches kept while waiting for the first root
const MAX_PENDING_BATCHES: usize = 256;

/// Why the main loop stopped
#[derive(Debug, PartialEq, Eq)]
pub enum Termination {
    /// Every tracked subtree terminated
    Complete,
    Cancelled,
    /// The event queue closed before completion
    SourceClosed,
    /// The forest became inconsistent; it holds what was gathered until then
    Failed(IngestError),
}

/// Consume root registrations and event batches until the forest completes
///
/// Cancellation wins over pending work, and roots are registered before any batch queued
/// at the same time is applied. Batches received before the first root are held back and
/// replayed once it is registered.
pub async fn run_event_loop<M, C>(
    tracker: &mut Tracker<M, C>,
    events: &mut mpsc::Receiver<EventBatch>,
    roots: &mut mpsc::Receiver<RootProcess>,
    cancel: &CancellationToken,
) -> Termination
where
    M: ProcessMetadataLookup,
    C: Classifier,
{
    let mut pending: VecDeque<EventBatch> = VecDeque::new();
    let mut accepting_roots = true;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Tracking cancelled");
                return Termination::Cancelled;
            }

            root = roots.recv(), if accepting_roots => {
                let Some(root) = root else {
                    accepting_roots = false;
                    continue;
                };
                tracker.register_root(root);
                while let Some(batch) = pending.pop_front() {
                    if let Some(termination) = apply(tracker, &batch) {
                        return termination;
                    }
                }
            }

            batch = events.recv() => {
                let Some(batch) = batch else {
                    warn!("Event source closed before every process finished");
                    return Termination::SourceClosed;
                };
                if tracker.forest().roots().is_empty() {
                    if pending.len() == MAX_PENDING_BATCHES {
                        warn!("No process to track yet, dropping the oldest queued events");
                        pending.pop_front();
                    }
                    pending.push_back(batch);
                    continue;
                }
                if let Some(termination) = apply(tracker, &batch) {
                    return termination;
                }
            }
        }
    }
}

fn apply<M, C>(tracker: &mut Tracker<M, C>, batch: &EventBatch) -> Option<Termination>
where
    M: ProcessMetadataLookup,
    C: Classifier,
{
    match tracker.ingest(batch) {
        Ok(true) => {
            info!("Every tracked process finished");
            Some(Termination::Complete)
        }
        Ok(false) => None,
        Err(err) => {
            error!("Stopped tracking: {err}");
            Some(Termination::Failed(err))
        }
    }
}
