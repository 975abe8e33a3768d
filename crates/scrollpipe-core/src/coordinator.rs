//! Pipeline orchestration: run fetcher and aggregator as sibling tasks

use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::aggregator::{Aggregator, RecordProcessor};
use crate::channel::handoff;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::fetcher::{FetchStats, PageFetcher};
use crate::progress::fmt_num;
use crate::source::PageSource;

/// Lifecycle of a single pipeline run.
///
/// `Idle → Running → Succeeded | Failed`. Terminal states are final.
#[derive(Debug)]
pub enum PipelineState {
    Idle,
    Running,
    Succeeded,
    Failed(PipelineError),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running) | (Self::Running, Self::Succeeded | Self::Failed(_))
        )
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "failed: {e}"),
            other => f.write_str(other.name()),
        }
    }
}

/// Counters from a finished run, populated on success and failure alike
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub pages: u64,
    /// Records enqueued by the fetcher
    pub pushed: u64,
    /// Records taken off the channel by the aggregator
    pub consumed: u64,
    /// Records left in the channel when the aggregator stopped early
    pub dropped: u64,
    /// Records the processor skipped under a lenient policy
    pub skipped: u64,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn log(&self) {
        log::info!("=== Pipeline Summary ===");
        log::info!(
            "Records: {} consumed of {} fetched across {} pages",
            fmt_num(self.consumed),
            fmt_num(self.pushed),
            fmt_num(self.pages)
        );
        if self.dropped > 0 {
            log::warn!("Dropped {} buffered records on early stop", fmt_num(self.dropped));
        }
        if self.skipped > 0 {
            log::warn!("Skipped {} records with missing fields", fmt_num(self.skipped));
        }
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        if self.consumed > 0 && !self.elapsed.is_zero() {
            let per_sec = self.consumed as f64 / self.elapsed.as_secs_f64();
            log::info!("Throughput: {:.0} records/sec", per_sec);
        }
    }
}

/// Terminal state, counters and (on success only) the processor output.
#[derive(Debug)]
pub struct PipelineReport<O> {
    pub state: PipelineState,
    pub stats: RunStats,
    output: Option<O>,
}

impl<O> PipelineReport<O> {
    pub fn is_success(&self) -> bool {
        matches!(self.state, PipelineState::Succeeded)
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match &self.state {
            PipelineState::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Aggregated output; `None` for failed runs (no partial output)
    pub fn output(&self) -> Option<&O> {
        self.output.as_ref()
    }

    pub fn into_result(self) -> Result<(O, RunStats), PipelineError> {
        match (self.state, self.output) {
            (PipelineState::Succeeded, Some(output)) => Ok((output, self.stats)),
            (PipelineState::Failed(e), _) => Err(e),
            (state, _) => unreachable!("report in non-terminal state {state}"),
        }
    }
}

/// Owns one run: creates the channel and child token, spawns both stages, and
/// reduces their results to a single [`PipelineReport`]. Single-use.
pub struct PipelineCoordinator {
    config: PipelineConfig,
    state: PipelineState,
    progress: ProgressBar,
}

impl PipelineCoordinator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            state: PipelineState::Idle,
            progress: ProgressBar::hidden(),
        }
    }

    /// Show consumed-record progress on `pb`
    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.progress = pb;
        self
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    fn transition(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal transition {} -> {}",
            self.state.name(),
            next.name()
        );
        log::debug!("pipeline {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    /// Stream `source` through `processor` until exhaustion, failure or cancellation.
    ///
    /// The run observes a child of `parent`; cancelling `parent` fails the run
    /// with [`PipelineError::Cancelled`]. An aggregator failure or panic cancels
    /// the fetcher immediately; a fetcher failure or panic closes the channel so
    /// records already handed off are still counted. When both fail, the
    /// fetcher's error is reported unless it is just the cancellation echo of an
    /// aggregator failure.
    pub async fn execute<S, P>(
        mut self,
        parent: &CancellationToken,
        source: S,
        processor: P,
    ) -> PipelineReport<P::Output>
    where
        S: PageSource + 'static,
        P: RecordProcessor + 'static,
        P::Output: 'static,
    {
        let started = Instant::now();
        let cancel = parent.child_token();
        let (tx, rx) = handoff(self.config.channel_capacity);
        let monitor = tx.monitor();
        self.transition(PipelineState::Running);

        let fetcher = PageFetcher::new(source, cancel.clone());
        let aggregator = Aggregator::new(processor, cancel.clone())
            .with_progress(self.progress.clone(), self.config.progress_interval);

        let mut producer = tokio::spawn(fetcher.run(tx));
        let mut consumer = tokio::spawn(aggregator.run(rx));

        // A producer exit closes the channel, so the consumer drains and stops
        // on its own. A failed consumer must stop the producer right away.
        let (produced, consumed) = tokio::select! {
            produced = &mut producer => {
                let consumed = consumer.await;
                (produced, consumed)
            }
            consumed = &mut consumer => {
                if !matches!(consumed, Ok((_, Ok(())))) {
                    cancel.cancel();
                }
                let produced = producer.await;
                (produced, consumed)
            }
        };
        self.progress.finish_and_clear();

        let channel = monitor.snapshot();
        let (fetch_stats, fetch_result) = produced
            .unwrap_or_else(|e| (FetchStats::default(), Err(panicked("producer", e))));
        let (report, agg_result) = match consumed {
            Ok((report, result)) => (Some(report), result),
            Err(e) => (None, Err(panicked("consumer", e))),
        };

        let consumed = report.as_ref().map_or(channel.delivered, |r| r.consumed);
        let stats = RunStats {
            pages: fetch_stats.pages,
            pushed: channel.pushed,
            consumed,
            dropped: channel.pushed.saturating_sub(consumed),
            skipped: report.as_ref().map_or(0, |r| r.skipped),
            elapsed: started.elapsed(),
        };

        let (next, output) = match select_error(fetch_result, agg_result) {
            Some(e) => (PipelineState::Failed(e), None),
            None => (PipelineState::Succeeded, report.map(|r| r.output)),
        };
        self.transition(next);

        PipelineReport {
            state: self.state,
            stats,
            output,
        }
    }
}

fn panicked(task: &str, e: JoinError) -> PipelineError {
    log::error!("{task} task failed: {e}");
    PipelineError::TaskPanicked(task.to_string())
}

/// Pick the single error to report. Fetcher errors take precedence; a fetcher
/// `Cancelled` caused by the aggregator's own failure does not.
fn select_error(
    fetch: Result<(), PipelineError>,
    aggregate: Result<(), PipelineError>,
) -> Option<PipelineError> {
    match (fetch, aggregate) {
        (Ok(()), Ok(())) => None,
        (Err(f), Err(a)) if f.is_cancelled() && !a.is_cancelled() => Some(a),
        (Err(f), _) => Some(f),
        (Ok(()), Err(a)) => Some(a),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, SourceError};

    fn source_err() -> PipelineError {
        PipelineError::Source(SourceError::connection("connection reset"))
    }

    fn decode_err() -> PipelineError {
        PipelineError::Decode(DecodeError::MissingField {
            field: "a".into(),
            record_no: 1,
        })
    }

    #[test]
    fn legal_transitions() {
        assert!(PipelineState::Idle.can_transition_to(&PipelineState::Running));
        assert!(PipelineState::Running.can_transition_to(&PipelineState::Succeeded));
        assert!(PipelineState::Running.can_transition_to(&PipelineState::Failed(
            PipelineError::Cancelled
        )));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!PipelineState::Idle.can_transition_to(&PipelineState::Succeeded));
        assert!(!PipelineState::Succeeded.can_transition_to(&PipelineState::Running));
        assert!(
            !PipelineState::Failed(PipelineError::Cancelled)
                .can_transition_to(&PipelineState::Succeeded)
        );
    }

    #[test]
    fn terminal_states() {
        assert!(!PipelineState::Idle.is_terminal());
        assert!(!PipelineState::Running.is_terminal());
        assert!(PipelineState::Succeeded.is_terminal());
        assert!(PipelineState::Failed(PipelineError::Cancelled).is_terminal());
    }

    #[test]
    fn select_error_none_on_success() {
        assert!(select_error(Ok(()), Ok(())).is_none());
    }

    #[test]
    fn select_error_prefers_fetcher() {
        let e = select_error(Err(source_err()), Err(decode_err())).unwrap();
        assert!(matches!(e, PipelineError::Source(_)));
    }

    #[test]
    fn select_error_fetcher_over_consumer_cancel() {
        let e = select_error(Err(source_err()), Err(PipelineError::Cancelled)).unwrap();
        assert!(matches!(e, PipelineError::Source(_)));
    }

    #[test]
    fn select_error_skips_cancellation_echo() {
        let e = select_error(Err(PipelineError::Cancelled), Err(decode_err())).unwrap();
        assert!(matches!(e, PipelineError::Decode(_)));
    }

    #[test]
    fn select_error_both_cancelled() {
        let e = select_error(Err(PipelineError::Cancelled), Err(PipelineError::Cancelled));
        assert!(e.unwrap().is_cancelled());
    }

    #[test]
    fn select_error_consumer_only() {
        let e = select_error(Ok(()), Err(decode_err())).unwrap();
        assert!(matches!(e, PipelineError::Decode(_)));
    }

    #[test]
    fn report_into_result_failed() {
        let report: PipelineReport<Vec<u8>> = PipelineReport {
            state: PipelineState::Failed(PipelineError::Cancelled),
            stats: RunStats::default(),
            output: None,
        };
        assert!(!report.is_success());
        assert!(report.output().is_none());
        assert!(report.into_result().unwrap_err().is_cancelled());
    }

    #[test]
    fn run_stats_log_does_not_panic() {
        let stats = RunStats {
            pages: 3,
            pushed: 1200,
            consumed: 1000,
            dropped: 200,
            skipped: 5,
            elapsed: Duration::from_secs(2),
        };
        stats.log();
        RunStats::default().log();
    }

    #[test]
    fn new_coordinator_is_idle() {
        let coordinator = PipelineCoordinator::new(PipelineConfig::default());
        assert!(matches!(coordinator.state(), PipelineState::Idle));
    }
}
