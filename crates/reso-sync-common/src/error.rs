use thiserror::Error;

/// Error kinds produced while talking to the upstream OData feed. These are
/// the error kinds spec.md §7 classifies as transport-level; store and
/// checkpoint errors are represented separately since they propagate with
/// different policies (store errors abort a slice, checkpoint errors are
/// logged and swallowed).
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure, timeout, or 5xx/429 response. Retried by the
    /// page fetcher up to its retry budget before being surfaced here.
    #[error("transient transport failure after retries: {0}")]
    Transient(String),

    /// Non-2xx response other than 429, not retried.
    #[error("HTTP {status}: {body}")]
    Permanent { status: u16, body: String },

    /// The upstream's well-known marker for exceeding the 100,000-record
    /// paging cap. Normal control flow, never an abort signal by itself.
    #[error("upstream reports the result set exceeds the paging cap")]
    CapExceeded,

    /// The response body could not be parsed as the expected JSON shape.
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_cap_exceeded(&self) -> bool {
        matches!(self, FetchError::CapExceeded)
    }
}

/// Substring the upstream uses to signal that a query's total result count
/// exceeds the paging cap, regardless of HTTP status.
pub const CAP_EXCEEDED_MARKER: &str = "total exceeds 100000";
