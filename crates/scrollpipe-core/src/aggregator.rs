//! Consumer side: drain the handoff channel through a [`RecordProcessor`]

use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;

use crate::channel::{Received, RecordReceiver};
use crate::error::{DecodeError, PipelineError};
use crate::progress::fmt_num;
use crate::record::Record;

/// Default progress update interval (every N records)
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 10_000;

/// What to do with a record after it leaves the channel.
pub trait RecordProcessor: Send {
    type Output: Send;

    /// Consume one record. `record_no` is 1-based, in arrival order.
    fn process(&mut self, record_no: u64, record: Record) -> Result<(), DecodeError>;

    /// Records the processor chose to skip under a lenient policy
    fn skipped(&self) -> u64 {
        0
    }

    /// Hand over whatever has been accumulated so far
    fn finish(self) -> Self::Output;
}

/// Policy for a selected field that a record lacks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingField {
    /// Fail the run with [`DecodeError::MissingField`]
    #[default]
    Fail,
    /// Drop the record and count it
    Skip,
}

/// One projected output row, values in field-selection order
pub type Row = Vec<String>;

/// Projects an ordered field selection out of every record.
#[derive(Debug, Clone)]
pub struct FieldProjector {
    fields: Vec<String>,
    on_missing: MissingField,
    rows: Vec<Row>,
    skipped: u64,
}

impl FieldProjector {
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            on_missing: MissingField::default(),
            rows: Vec::new(),
            skipped: 0,
        }
    }

    pub fn on_missing(mut self, policy: MissingField) -> Self {
        self.on_missing = policy;
        self
    }
}

impl RecordProcessor for FieldProjector {
    type Output = Vec<Row>;

    fn process(&mut self, record_no: u64, record: Record) -> Result<(), DecodeError> {
        let mut row = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match record.field_text(field) {
                Some(value) => row.push(value),
                None if self.on_missing == MissingField::Skip => {
                    log::debug!("record #{record_no}: missing '{field}', skipped");
                    self.skipped += 1;
                    return Ok(());
                }
                None => {
                    return Err(DecodeError::MissingField {
                        field: field.clone(),
                        record_no,
                    });
                }
            }
        }
        self.rows.push(row);
        Ok(())
    }

    fn skipped(&self) -> u64 {
        self.skipped
    }

    fn finish(self) -> Vec<Row> {
        self.rows
    }
}

/// State handed back by the aggregator regardless of how the run ended
#[derive(Debug)]
pub struct AggregateReport<O> {
    /// Records taken off the channel (the shared counter)
    pub consumed: u64,
    pub skipped: u64,
    pub output: O,
}

/// Drains a [`RecordReceiver`], counting and processing each record.
pub struct Aggregator<P> {
    processor: P,
    cancel: CancellationToken,
    consumed: u64,
    progress: ProgressBar,
    progress_interval: u64,
}

impl<P: RecordProcessor> Aggregator<P> {
    pub fn new(processor: P, cancel: CancellationToken) -> Self {
        Self {
            processor,
            cancel,
            consumed: 0,
            progress: ProgressBar::hidden(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Attach a progress bar refreshed every `interval` records
    pub fn with_progress(mut self, pb: ProgressBar, interval: u64) -> Self {
        self.progress = pb;
        self.progress_interval = interval.max(1);
        self
    }

    /// Receive until the channel is closed and drained.
    ///
    /// Checks the token at the top of every iteration, so buffered records are
    /// abandoned as soon as the run is cancelled. The partial report is returned
    /// alongside any error.
    pub async fn run(
        mut self,
        mut input: RecordReceiver,
    ) -> (AggregateReport<P::Output>, Result<(), PipelineError>) {
        let result = self.drain(&mut input).await;
        drop(input);

        self.progress.set_message(format!("{} records", fmt_num(self.consumed)));
        match &result {
            Ok(()) => log::debug!("aggregator done: {} records", self.consumed),
            Err(e) => log::debug!("aggregator stopped after {} records: {e}", self.consumed),
        }

        let report = AggregateReport {
            consumed: self.consumed,
            skipped: self.processor.skipped(),
            output: self.processor.finish(),
        };
        (report, result)
    }

    async fn drain(&mut self, input: &mut RecordReceiver) -> Result<(), PipelineError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let record = match input.recv(&self.cancel).await {
                Received::Record(record) => record,
                Received::Closed => return Ok(()),
                Received::Cancelled => return Err(PipelineError::Cancelled),
            };

            self.consumed += 1;
            if self.consumed.is_multiple_of(self.progress_interval) {
                self.progress
                    .set_message(format!("{} records", fmt_num(self.consumed)));
            }
            self.processor.process(self.consumed, record)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::handoff;
    use serde_json::{Value, json};
    use std::num::NonZeroUsize;

    fn rec(v: Value) -> Record {
        Record::from_value(v).unwrap()
    }

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn projector_orders_by_selection() {
        let mut p = FieldProjector::new(fields(&["b", "a"]));
        p.process(1, rec(json!({"a": "1", "b": "x"}))).unwrap();
        assert_eq!(p.finish(), vec![vec!["x".to_string(), "1".to_string()]]);
    }

    #[test]
    fn projector_missing_field_fails_by_default() {
        let mut p = FieldProjector::new(fields(&["a", "b"]));
        let err = p.process(4, rec(json!({"a": "1"}))).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MissingField {
                field: "b".into(),
                record_no: 4
            }
        );
    }

    #[test]
    fn projector_skip_policy_counts() {
        let mut p = FieldProjector::new(fields(&["a", "b"])).on_missing(MissingField::Skip);
        p.process(1, rec(json!({"a": "1"}))).unwrap();
        p.process(2, rec(json!({"a": "2", "b": "y"}))).unwrap();
        assert_eq!(p.skipped(), 1);
        assert_eq!(p.finish().len(), 1);
    }

    async fn feed(values: Vec<Value>, capacity: usize) -> RecordReceiver {
        let (tx, rx) = handoff(NonZeroUsize::new(capacity).unwrap());
        let token = CancellationToken::new();
        for v in values {
            tx.push(rec(v), &token).await.unwrap();
        }
        tx.close();
        rx
    }

    #[tokio::test]
    async fn drains_until_closed() {
        let rx = feed(
            vec![json!({"a": "1", "b": "x"}), json!({"a": "2", "b": "y"})],
            4,
        )
        .await;
        let projector = FieldProjector::new(fields(&["a", "b"]));
        let (report, result) = Aggregator::new(projector, CancellationToken::new())
            .run(rx)
            .await;
        result.unwrap();
        assert_eq!(report.consumed, 2);
        assert_eq!(report.output[1], vec!["2".to_string(), "y".to_string()]);
    }

    #[tokio::test]
    async fn cancelled_before_start_leaves_records_buffered() {
        let rx = feed(vec![json!({"a": "1"}), json!({"a": "2"})], 4).await;
        let token = CancellationToken::new();
        token.cancel();
        let (report, result) = Aggregator::new(FieldProjector::new(fields(&["a"])), token)
            .run(rx)
            .await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(report.consumed, 0);
        assert!(report.output.is_empty());
    }

    #[tokio::test]
    async fn decode_failure_keeps_partial_count() {
        let rx = feed(vec![json!({"a": "1"}), json!({"z": 0}), json!({"a": "3"})], 4).await;
        let (report, result) =
            Aggregator::new(FieldProjector::new(fields(&["a"])), CancellationToken::new())
                .run(rx)
                .await;
        assert!(matches!(
            result,
            Err(PipelineError::Decode(DecodeError::MissingField { record_no: 2, .. }))
        ));
        assert_eq!(report.consumed, 2);
        assert_eq!(report.output.len(), 1);
    }
}
