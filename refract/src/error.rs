//! Request-scoped error taxonomy.
//!
//! No variant is fatal to the process; each is scoped to one request.
//! Storage *read* failures never appear here (the pipeline treats them as
//! cache misses), and storage *write* failures are logged inside
//! [`crate::storage::submit_write`], never surfaced to the caller.

use thiserror::Error;

use crate::codec::CodecError;
use crate::directive::ParseError;
use crate::fetch::FetchError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed filters or disallowed format/crop: client error, no retry.
    #[error("bad request: {0}")]
    BadRequest(#[from] ParseError),

    /// No origin key could be derived from the source reference.
    #[error("cannot derive origin from source url: {0}")]
    DomainParse(String),

    /// Origin 404, or an upload that was never stored.
    #[error("source not found: {0}")]
    NotFound(String),

    /// Origin fetch failed or returned an error status. No automatic retry.
    #[error("upstream fetch failed: {0}")]
    Upstream(FetchError),

    /// Source bytes loaded but dimensions could not be extracted.
    #[error("cannot extract source dimensions: {0}")]
    ExtractInfo(CodecError),

    /// Codec failure while transforming.
    #[error("cannot process image: {0}")]
    Processing(CodecError),
}
