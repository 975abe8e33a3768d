//! Producer side: drive a [`PageSource`] and feed records into the handoff channel

use tokio_util::sync::CancellationToken;

use crate::channel::{PushError, RecordSender};
use crate::error::PipelineError;
use crate::record::Cursor;
use crate::source::PageSource;

/// Statistics from a completed fetch loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub pages: u64,
    pub records: u64,
}

/// Pages through a source until exhaustion, pushing every record downstream.
pub struct PageFetcher<S> {
    source: S,
    cancel: CancellationToken,
}

impl<S: PageSource> PageFetcher<S> {
    pub fn new(source: S, cancel: CancellationToken) -> Self {
        Self { source, cancel }
    }

    /// Run the fetch loop to completion.
    ///
    /// `out` is closed exactly once on every exit path. Exhaustion is a clean
    /// stop; any other source error, a cancelled token, or a vanished consumer
    /// ends the loop with an error. The cursor is released unless cancelled.
    /// Stats cover whatever was fetched before the loop ended.
    pub async fn run(self, out: RecordSender) -> (FetchStats, Result<(), PipelineError>) {
        let mut cursor = Cursor::initial();
        let mut stats = FetchStats::default();

        let result = self.pump(&out, &mut cursor, &mut stats).await;
        out.close();

        match &result {
            Ok(()) => log::debug!(
                "fetcher done: {} records from {} pages",
                stats.records,
                stats.pages
            ),
            Err(e) => log::debug!("fetcher stopped after {} pages: {e}", stats.pages),
        }

        if !cursor.is_initial() && !matches!(result, Err(PipelineError::Cancelled)) {
            self.source.release(&cursor).await;
        }

        (stats, result)
    }

    async fn pump(
        &self,
        out: &RecordSender,
        cursor: &mut Cursor,
        stats: &mut FetchStats,
    ) -> Result<(), PipelineError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                fetched = self.source.next(cursor) => fetched,
            };

            let page = match fetched {
                Ok(page) => page,
                Err(e) if e.is_exhausted() => return Ok(()),
                Err(e) => return Err(PipelineError::Source(e)),
            };

            stats.pages += 1;
            let exhausted = page.exhausted;
            *cursor = page.cursor;
            if page.records.is_empty() && !exhausted {
                log::trace!("page {} empty, re-querying", stats.pages);
            }

            for record in page.records {
                match out.push(record, &self.cancel).await {
                    Ok(()) => stats.records += 1,
                    Err(PushError::Cancelled | PushError::Closed) => {
                        return Err(PipelineError::Cancelled);
                    }
                }
            }

            if exhausted {
                return Ok(());
            }
        }
    }
}
