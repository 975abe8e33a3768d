//! One scroll run: source → pipeline → rows on stdout

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use scrollpipe_core::{
    CancellationToken, FieldProjector, MissingField, PageSource, PipelineCoordinator,
    PipelineReport, Row, SharedProgress,
};

use crate::config::Config;
use crate::report;

/// Exit status for a run stopped by Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

/// Stream every document of `source` through the configured field projection
pub async fn scroll<S>(
    config: &Config,
    source: S,
    cancel: &CancellationToken,
    progress: &SharedProgress,
) -> Result<PipelineReport<Vec<Row>>>
where
    S: PageSource + 'static,
{
    let policy = if config.pipeline.lenient_fields {
        MissingField::Skip
    } else {
        MissingField::Fail
    };
    let projector = FieldProjector::new(config.elastic.fields.clone()).on_missing(policy);

    let coordinator = PipelineCoordinator::new(config.pipeline_config()?)
        .with_progress(progress.record_spinner(&config.elastic.index));
    Ok(coordinator.execute(cancel, source, projector).await)
}

/// Print the outcome of a run and map it to the process exit status.
///
/// Rows go to `out`; the total line and any failure go to `err`, independent
/// of the log level.
pub fn finish<W: Write, E: Write>(
    report: PipelineReport<Vec<Row>>,
    out: &mut W,
    err: &mut E,
) -> Result<ExitCode> {
    report.stats.log();
    let consumed = report.stats.consumed;

    match report.into_result() {
        Ok((rows, _)) => {
            report::write_rows(out, &rows).context("Failed to write output")?;
            writeln!(err, "{}", report::total_line(consumed))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_cancelled() => {
            log::warn!("Interrupted after {consumed} documents");
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
        Err(e) => {
            writeln!(err, "Error: {e}")?;
            writeln!(err, "{}", report::total_line(consumed))?;
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use scrollpipe_core::{Cursor, Page, ProgressContext, Record, SourceError};
    use serde_json::json;

    struct Pages(Mutex<Vec<Result<Page, SourceError>>>);

    impl Pages {
        fn new(mut pages: Vec<Result<Page, SourceError>>) -> Self {
            pages.reverse();
            Self(Mutex::new(pages))
        }
    }

    impl PageSource for Pages {
        async fn next(&self, _cursor: &Cursor) -> Result<Page, SourceError> {
            self.0.lock().unwrap().pop().unwrap_or(Err(SourceError::Exhausted))
        }
    }

    fn page(docs: Vec<serde_json::Value>, cursor: &str) -> Result<Page, SourceError> {
        let records = docs
            .into_iter()
            .map(|d| Record::from_value(d).unwrap())
            .collect();
        Ok(Page::new(records, Cursor::new(cursor)))
    }

    fn config(lenient: bool) -> Config {
        let mut config = Config::default();
        config.elastic.index = "products".into();
        config.elastic.fields = vec!["a".into(), "b".into()];
        config.pipeline.lenient_fields = lenient;
        config.pipeline.channel_capacity = 1;
        config
    }

    fn progress() -> SharedProgress {
        Arc::new(ProgressContext::new())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rows_written_in_order() {
        let source = Pages::new(vec![
            page(vec![json!({"a": "1", "b": "x"})], "c1"),
            page(vec![json!({"a": "2", "b": "y"})], "c2"),
        ]);
        let progress = progress();
        let report = scroll(&config(false), source, &CancellationToken::new(), &progress)
            .await
            .unwrap();

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = finish(report, &mut out, &mut err).unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        assert_eq!(String::from_utf8(out).unwrap(), "1,x\n2,y\n");
        assert_eq!(
            String::from_utf8(err).unwrap(),
            "Scrolled through a total of 2 documents\n"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_field_fails_unless_lenient() {
        let docs = || {
            Pages::new(vec![page(
                vec![json!({"a": "1", "b": "x"}), json!({"a": "2"})],
                "c1",
            )])
        };
        let progress = progress();

        let strict = scroll(&config(false), docs(), &CancellationToken::new(), &progress)
            .await
            .unwrap();
        let (mut out, mut err) = (Vec::new(), Vec::new());
        assert_eq!(finish(strict, &mut out, &mut err).unwrap(), ExitCode::FAILURE);
        assert!(out.is_empty());
        let err = String::from_utf8(err).unwrap();
        assert!(err.starts_with("Error: decode failure: record #2: missing field 'b'\n"));
        assert!(err.ends_with("Scrolled through a total of 2 documents\n"));

        let lenient = scroll(&config(true), docs(), &CancellationToken::new(), &progress)
            .await
            .unwrap();
        assert_eq!(lenient.stats.skipped, 1);
        let (mut out, mut err) = (Vec::new(), Vec::new());
        assert_eq!(finish(lenient, &mut out, &mut err).unwrap(), ExitCode::SUCCESS);
        assert_eq!(String::from_utf8(out).unwrap(), "1,x\n");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_run_exits_130() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let progress = progress();
        let source = Pages::new(vec![page(vec![json!({"a": "1", "b": "x"})], "c1")]);
        let report = scroll(&config(false), source, &cancel, &progress)
            .await
            .unwrap();

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = finish(report, &mut out, &mut err).unwrap();
        assert_eq!(code, ExitCode::from(EXIT_INTERRUPTED));
        assert!(out.is_empty());
        assert!(err.is_empty());
    }
}
