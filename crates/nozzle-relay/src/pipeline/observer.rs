//! Error observer: report upstream transport errors without acting on them.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::upstream::UpstreamError;

/// Log every upstream error until stopped or the error source ends.
///
/// Returns the number of errors observed.
pub async fn run_error_observer(
    mut errors: mpsc::Receiver<UpstreamError>,
    token: CancellationToken,
) -> u64 {
    let mut observed = 0u64;
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            next = errors.recv() => match next {
                Some(err) => {
                    observed += 1;
                    warn!(error = %err, "Firehose consumer error");
                }
                None => break,
            },
        }
    }
    debug!(observed, "Error observer finished");
    observed
}
