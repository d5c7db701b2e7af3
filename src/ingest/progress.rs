use crossbeam_channel::Receiver;

use crate::cancel::Cancellation;
use crate::errors::ImportError;

/// Per-batch report from a worker or decoder.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub successes: u64,
    pub failures: u64,
    /// Present only when the emitter decided the run must abort.
    pub error: Option<ImportError>,
}

/// Final counts for one import run. `error` is set exactly when a fatal
/// error aborted the ingest or stop-on-error triggered.
#[derive(Debug, Default)]
pub struct ImportResult {
    pub successes: u64,
    pub failures: u64,
    pub error: Option<ImportError>,
}

const PROGRESS_EVERY: u64 = 10_000;

/// Single-writer fan-in for all stage outcomes: accumulates counters,
/// records the first abort error, and trips the cancellation flag.
/// Returns once every outcome sender has hung up.
pub fn aggregate(outcomes: &Receiver<BatchOutcome>, cancel: &Cancellation) -> ImportResult {
    let mut result = ImportResult::default();
    let mut next_progress = PROGRESS_EVERY;
    for outcome in outcomes {
        result.successes += outcome.successes;
        result.failures += outcome.failures;
        if let Some(error) = outcome.error {
            if result.error.is_none() {
                result.error = Some(error);
            } else {
                log::error!("error after abort: {error}");
            }
            cancel.cancel();
        }
        if result.successes >= next_progress {
            log::info!("imported {} documents", result.successes);
            next_progress = result.successes + PROGRESS_EVERY;
        }
    }
    result
}
