//! Error taxonomy for the resolver core and the administrative
//! mutation APIs it exposes to collaborators.

use std::fmt;

/// An error raised by the resolver core or by a Local Store mutation.
///
/// Variants map directly onto the error kinds a caller needs to
/// distinguish: `InvalidArgs` and `NotFound` are caller mistakes that
/// leave state untouched; `UpstreamTimeout` and `UpstreamError` are
/// per-task failures that the race logs and discards; `NoAnswer` is a
/// terminal-but-successful outcome, not a bug; `CacheConvertFailure`
/// and `BlocklistLoadFailure` are collaborator failures the core
/// degrades gracefully around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A record or server mutation received a malformed name, type,
    /// value, or TTL.
    InvalidArgs(String),
    /// A remove/update targeted a record or server that does not
    /// exist.
    NotFound(String),
    /// An upstream task exceeded the shared deadline.
    UpstreamTimeout { endpoint: String },
    /// A transport or protocol error talking to an upstream.
    UpstreamError { endpoint: String, message: String },
    /// Every path was exhausted without a usable answer.
    NoAnswer,
    /// A stored record could not be rehydrated into wire form.
    CacheConvertFailure(String),
    /// A blocklist (re)load failed; the previous blocklist is kept.
    BlocklistLoadFailure(String),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::InvalidArgs(msg) => write!(f, "invalid arguments: {msg}"),
            ResolveError::NotFound(msg) => write!(f, "not found: {msg}"),
            ResolveError::UpstreamTimeout { endpoint } => {
                write!(f, "upstream {endpoint} timed out")
            }
            ResolveError::UpstreamError { endpoint, message } => {
                write!(f, "upstream {endpoint} error: {message}")
            }
            ResolveError::NoAnswer => write!(f, "no answer"),
            ResolveError::CacheConvertFailure(msg) => {
                write!(f, "could not convert cached record to wire form: {msg}")
            }
            ResolveError::BlocklistLoadFailure(msg) => {
                write!(f, "failed to load blocklist: {msg}")
            }
        }
    }
}

impl std::error::Error for ResolveError {}
