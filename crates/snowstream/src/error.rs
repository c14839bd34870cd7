//! The error taxonomy shared by the tokenizer, classifier and response gate.

use http::StatusCode;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Everything that can go wrong while interpreting one response.
///
/// None of these are retried or swallowed internally; each surfaces to the
/// caller of the accessor that triggered the pull. [`Error::NoResults`] is the
/// only variant the `*_or_none` accessors convert into an absent value.
#[derive(Debug, Error)]
pub enum Error {
    /// The response body is not valid JSON. Fatal; no partial records are
    /// surfaced past this point.
    #[error("malformed JSON stream: {message} at {line}:{column}")]
    MalformedStream {
        message: String,
        line: usize,
        column: usize,
    },

    /// A structured `error` object was present at the document root.
    #[error("error in response: {message} ({detail})")]
    Response { message: String, detail: String },

    /// The root matched `result` but yielded zero records, and empty result
    /// sets are configured to be exceptional.
    #[error("query yielded no results")]
    NoResults,

    /// The root matched neither `result` nor `error`.
    #[error("the expected `result` key was missing in the response")]
    MissingResult,

    /// `one()` / `one_or_none()` found more than one record.
    #[error("expected single-record result, got multiple")]
    MultipleResults,

    /// Non-2xx, non-404 status from the gate. Carries the status and as much
    /// of the body as was captured for diagnostics.
    #[error("unexpected HTTP status {status}")]
    Http { status: StatusCode, body: String },

    /// The underlying byte stream failed mid-read.
    #[error("failed to read response stream")]
    Read(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for the empty-result-set error.
    #[must_use]
    pub fn is_no_results(&self) -> bool {
        matches!(self, Self::NoResults)
    }
}
