//! Drain stage: write queued events to the downstream sink in order.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use nozzle_core::Event;

use super::{EventSink, SinkError};

#[derive(Debug)]
pub enum DrainExit {
    /// The stage's stop signal fired.
    Stopped,
    /// The intake side closed the queue and every queued event was written.
    QueueClosed,
    /// A downstream write failed. The event is not redelivered.
    WriteFailed(SinkError),
}

#[derive(Debug)]
pub struct DrainReport {
    pub exit: DrainExit,
    /// Events successfully written downstream.
    pub forwarded: u64,
}

/// Run the drain stage until stopped, the queue closes, or a write fails.
///
/// One write is in flight at a time. The stop signal is observed between
/// writes, never in the middle of one.
pub async fn run_drain<S: EventSink>(
    queue: &mut mpsc::Receiver<Event>,
    sink: &mut S,
    token: &CancellationToken,
) -> DrainReport {
    let mut forwarded = 0u64;
    let exit = loop {
        let event = tokio::select! {
            biased;
            () = token.cancelled() => break DrainExit::Stopped,
            next = queue.recv() => match next {
                Some(event) => event,
                None => break DrainExit::QueueClosed,
            },
        };

        if let Err(e) = sink.send(event.into_wire_bytes()).await {
            warn!(error = %e, forwarded, "Write downstream failed, closing connection");
            break DrainExit::WriteFailed(e);
        }
        forwarded += 1;
    };
    debug!(?exit, forwarded, "Drain stage finished");
    DrainReport { exit, forwarded }
}
