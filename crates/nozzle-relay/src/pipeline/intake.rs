//! Intake stage: pull upstream events, filter, enqueue survivors.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use nozzle_core::{Event, FilterMode, RelayCounters, decide};

/// Why the intake stage stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeExit {
    /// The stage's stop signal fired.
    Stopped,
    /// The upstream event source ended.
    SourceClosed,
    /// The drain side dropped the queue.
    QueueClosed,
}

/// Run the intake stage until stopped or the source ends.
///
/// Blocks on enqueue while the queue is full; nothing that passed the filter
/// is dropped here. Returning drops `queue`, which closes it for the drain
/// stage once the remaining events are consumed.
pub async fn run_intake(
    mut events: mpsc::Receiver<Event>,
    queue: mpsc::Sender<Event>,
    mode: FilterMode,
    counters: Arc<RelayCounters>,
    token: CancellationToken,
) -> IntakeExit {
    let exit = loop {
        let event = tokio::select! {
            biased;
            () = token.cancelled() => break IntakeExit::Stopped,
            next = events.recv() => match next {
                Some(event) => event,
                None => break IntakeExit::SourceClosed,
            },
        };

        if !decide(&event, mode).is_keep() {
            trace!(kind = %event.kind(), origin = event.origin(), "Event discarded");
            counters.record_discarded();
            continue;
        }

        tokio::select! {
            biased;
            () = token.cancelled() => break IntakeExit::Stopped,
            sent = queue.send(event) => {
                if sent.is_err() {
                    break IntakeExit::QueueClosed;
                }
                counters.record_kept();
            }
        }
    };
    debug!(?exit, "Intake stage finished");
    exit
}
