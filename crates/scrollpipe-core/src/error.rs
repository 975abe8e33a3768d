//! Error types shared by the fetcher, aggregator and coordinator

/// Outcome of a [`PageSource::next`](crate::PageSource::next) call that produced no page.
///
/// [`SourceError::Exhausted`] is the clean end-of-results sentinel, not a failure.
/// Every other variant is fatal to the pipeline once the source gives up retrying.
#[derive(Debug)]
pub enum SourceError {
    /// No more pages
    Exhausted,
    /// Connection could not be established; the request never reached the backend
    Connect(String),
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Transport-level I/O error
    Io(std::io::Error),
    /// Backend answered but the payload could not be interpreted
    Decode(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted => f.write_str("source exhausted"),
            Self::Connect(msg) => write!(f, "connection failed: {msg}"),
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Decode(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl SourceError {
    /// Connection failure without a status line (reset, refused, DNS, ...)
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Http {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    /// Whether the failed request is known not to have reached the backend.
    ///
    /// Only such requests are safe to resend when the backend advances state on
    /// every call it sees.
    pub fn is_unsent(&self) -> bool {
        matches!(self, Self::Connect(_))
    }

    /// Whether a source-side retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Exhausted | Self::Decode(_) => false,
            Self::Connect(_) => true,
            // No status = connection-level failure; 408/429/5xx are transient
            Self::Http { status, .. } => {
                matches!(status, None | Some(408) | Some(429) | Some(500..=599))
            }
            Self::Io(e) => e.kind() != std::io::ErrorKind::StorageFull,
        }
    }
}

/// A record the processor could not interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Selected output field absent from the record
    MissingField { field: String, record_no: u64 },
    /// Custom processor rejected the record
    Invalid { record_no: u64, message: String },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField { field, record_no } => {
                write!(f, "record #{record_no}: missing field '{field}'")
            }
            Self::Invalid { record_no, message } => write!(f, "record #{record_no}: {message}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Single error surfaced by the coordinator for a failed run.
#[derive(Debug)]
pub enum PipelineError {
    /// Page source failed (anything but exhaustion)
    Source(SourceError),
    /// Aggregator could not process a record
    Decode(DecodeError),
    /// Shared cancellation token fired (caller, Ctrl-C, or sibling failure)
    Cancelled,
    /// Producer or consumer task panicked
    TaskPanicked(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(e) => write!(f, "source failure: {e}"),
            Self::Decode(e) => write!(f, "decode failure: {e}"),
            Self::Cancelled => f.write_str("pipeline cancelled"),
            Self::TaskPanicked(task) => write!(f, "{task} task panicked"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Source(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SourceError> for PipelineError {
    fn from(e: SourceError) -> Self {
        Self::Source(e)
    }
}

impl From<DecodeError> for PipelineError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    fn http_err(status: u16) -> SourceError {
        SourceError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn exhausted_is_not_retryable() {
        assert!(SourceError::Exhausted.is_exhausted());
        assert!(!SourceError::Exhausted.is_retryable());
    }

    #[test]
    fn http_404_not_retryable() {
        assert!(!http_err(404).is_retryable());
    }

    #[test]
    fn http_400_not_retryable() {
        assert!(!http_err(400).is_retryable());
    }

    #[test]
    fn http_429_retryable() {
        assert!(http_err(429).is_retryable());
    }

    #[test]
    fn http_503_retryable() {
        assert!(http_err(503).is_retryable());
    }

    #[test]
    fn connection_error_retryable() {
        assert!(SourceError::connection("connection reset").is_retryable());
    }

    #[test]
    fn connect_failure_is_unsent_and_retryable() {
        let err = SourceError::Connect("connection refused".into());
        assert!(err.is_unsent());
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "connection failed: connection refused");
        // A reset may happen after the backend acted on the request
        assert!(!SourceError::connection("connection reset").is_unsent());
    }

    #[test]
    fn decode_not_retryable() {
        assert!(!SourceError::Decode("bad json".into()).is_retryable());
    }

    #[test]
    fn io_storage_full_not_retryable() {
        let err = SourceError::Io(std::io::Error::new(ErrorKind::StorageFull, "disk full"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn io_timeout_retryable() {
        let err = SourceError::Io(std::io::Error::new(ErrorKind::TimedOut, "timeout"));
        assert!(err.is_retryable());
    }

    #[test]
    fn display_source_failure_carries_message() {
        let err = PipelineError::from(SourceError::connection("connection reset"));
        assert_eq!(
            format!("{err}"),
            "source failure: HTTP error: connection reset"
        );
    }

    #[test]
    fn display_http_with_status() {
        assert_eq!(format!("{}", http_err(404)), "HTTP 404: test");
    }

    #[test]
    fn display_missing_field() {
        let err = DecodeError::MissingField {
            field: "b".into(),
            record_no: 3,
        };
        assert_eq!(format!("{err}"), "record #3: missing field 'b'");
    }

    #[test]
    fn cancelled_is_distinct() {
        assert!(PipelineError::Cancelled.is_cancelled());
        assert!(!PipelineError::Source(SourceError::Exhausted).is_cancelled());
        assert!(!PipelineError::TaskPanicked("producer".into()).is_cancelled());
    }
}
