//! Error types.

use core::fmt;

/// Alias for [`core::result::Result`] with the `cmp-client` [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;

/// Stage of the enrollment flow in which an error was raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Building the certificate request.
    Build,
    /// Protecting the request message.
    Protect,
    /// Exchanging the message with the responder.
    Send,
    /// Formatting the response for output.
    Format,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Build => "build",
            Phase::Protect => "protect",
            Phase::Send => "send",
            Phase::Format => "format",
        })
    }
}

/// Broad category of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad caller input: distinguished names, key algorithms, key sizes.
    Configuration,
    /// MAC setup, computation or verification failed.
    Protection,
    /// Connection, status or body failures while talking to the responder.
    Transport,
    /// DER or PEM encoding failed.
    Encoding,
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A distinguished name could not be parsed.
    #[error("malformed distinguished name {name:?}: {reason}")]
    MalformedName {
        /// Name as supplied by the caller.
        name: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// The requested key algorithm is not known to the key generator.
    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The key generator refused the requested parameters.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// The MAC calculator could not be configured.
    #[error("protection setup failed: {0}")]
    ProtectionSetup(String),

    /// Protection value did not match the protected part.
    #[error("protection verification failed")]
    VerificationFailed,

    /// DER or PEM encoding failed.
    #[error("{phase} encoding error: {reason}")]
    Encoding {
        /// Stage that was encoding.
        phase: Phase,
        /// Encoder diagnostic.
        reason: String,
    },

    /// The responder could not be reached.
    #[error("connection to {url} failed: {reason}")]
    Connection {
        /// Target URL.
        url: String,
        /// Transport diagnostic.
        reason: String,
    },

    /// The responder answered with a status other than `200 OK`.
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// The response body ended before the advertised `Content-Length`.
    #[error("response body truncated: expected {expected} bytes, received {received}")]
    ContentLengthMismatch {
        /// Advertised length.
        expected: u64,
        /// Bytes actually read before end of stream.
        received: u64,
    },

    /// The response body could not be read.
    #[error("reading response body failed: {0}")]
    ResponseBody(String),
}

impl Error {
    /// Broad category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedName { .. }
            | Error::UnsupportedAlgorithm(_)
            | Error::KeyGeneration(_) => ErrorKind::Configuration,
            Error::ProtectionSetup(_) | Error::VerificationFailed => ErrorKind::Protection,
            Error::Encoding {
                phase: Phase::Protect,
                ..
            } => ErrorKind::Protection,
            Error::Encoding { .. } => ErrorKind::Encoding,
            Error::Connection { .. }
            | Error::UnexpectedStatus(_)
            | Error::ContentLengthMismatch { .. }
            | Error::ResponseBody(_) => ErrorKind::Transport,
        }
    }

    /// Stage of the flow that raised this error.
    pub fn phase(&self) -> Phase {
        match self {
            Error::MalformedName { .. }
            | Error::UnsupportedAlgorithm(_)
            | Error::KeyGeneration(_) => Phase::Build,
            Error::ProtectionSetup(_) | Error::VerificationFailed => Phase::Protect,
            Error::Encoding { phase, .. } => *phase,
            Error::Connection { .. }
            | Error::UnexpectedStatus(_)
            | Error::ContentLengthMismatch { .. }
            | Error::ResponseBody(_) => Phase::Send,
        }
    }

    pub(crate) fn encoding(phase: Phase, err: impl fmt::Display) -> Self {
        Error::Encoding {
            phase,
            reason: err.to_string(),
        }
    }
}
