//! Page source collaborator trait

use std::future::Future;
use std::sync::Arc;

use crate::error::SourceError;
use crate::record::{Cursor, Page};

/// Backend that serves a cursor-paginated result set.
///
/// The fetcher calls [`next`](PageSource::next) with [`Cursor::initial`] first and
/// then with whatever cursor the previous page carried, unchanged. End of results
/// is signalled by [`SourceError::Exhausted`] (or a page flagged `exhausted`).
///
/// Retry policy, if any, belongs to the implementation; the pipeline never retries.
/// The returned future may be dropped at any await point when the run is cancelled.
pub trait PageSource: Send + Sync {
    fn next(&self, cursor: &Cursor) -> impl Future<Output = Result<Page, SourceError>> + Send;

    /// Free server-side cursor state once the fetcher is done with it.
    ///
    /// Called at most once per run, never after cancellation. Best effort: errors
    /// are the implementation's to log.
    fn release(&self, _cursor: &Cursor) -> impl Future<Output = ()> + Send {
        async {}
    }
}

impl<S: PageSource> PageSource for Arc<S> {
    fn next(&self, cursor: &Cursor) -> impl Future<Output = Result<Page, SourceError>> + Send {
        (**self).next(cursor)
    }

    fn release(&self, cursor: &Cursor) -> impl Future<Output = ()> + Send {
        (**self).release(cursor)
    }
}
