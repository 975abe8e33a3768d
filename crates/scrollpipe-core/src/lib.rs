//! Scrollpipe Core - bounded, cancellable streaming of paginated result sets
//!
//! A [`PageFetcher`] pages through a [`PageSource`] and pushes records into a
//! bounded handoff channel; an [`Aggregator`] drains it through a
//! [`RecordProcessor`]. The [`PipelineCoordinator`] runs both as sibling tasks
//! sharing one cancellation token and reports a single outcome.

pub mod aggregator;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod progress;
pub mod record;
pub mod retry;
pub mod shutdown;
pub mod source;

// Re-exports for convenience
pub use aggregator::{
    AggregateReport, Aggregator, FieldProjector, MissingField, RecordProcessor, Row,
};
pub use channel::{ChannelStats, RecordReceiver, RecordSender, handoff};
pub use config::PipelineConfig;
pub use coordinator::{PipelineCoordinator, PipelineReport, PipelineState, RunStats};
pub use error::{DecodeError, PipelineError, SourceError};
pub use fetcher::{FetchStats, PageFetcher};
pub use logging::{IndicatifLogger, Verbosity, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use record::{Cursor, Page, Record};
pub use retry::{RetryPolicy, retry_when, retry_with_backoff};
pub use shutdown::cancel_on_ctrl_c;
pub use source::PageSource;
pub use tokio_util::sync::CancellationToken;
