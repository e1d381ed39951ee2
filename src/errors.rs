//! Error types shared across the method.

use std::fmt::{Display, Formatter};

/// Shared method result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Method error enumeration covering framing, configuration and transport failures.
#[derive(Debug)]
pub enum AppError {
    /// Header line is empty, has no space separator, or a non-integer code.
    MalformedHeader(String),
    /// A second header was parsed into a message that already has one.
    DoubleHeader,
    /// Field line has no colon, arrives before a header, or has an empty
    /// name or value.
    MalformedField(String),
    /// A blank line arrived while no message was being assembled.
    EmptyMessage,
    /// Line framing failure on the inbound stream (e.g. line too long).
    Codec(String),
    /// The read was abandoned because the cancellation token fired.
    Cancelled,
    /// Method configuration could not be applied.
    Config(String),
    /// No credential source could be resolved, or a token could not be minted.
    Credentials(String),
    /// The HTTP exchange with the registry failed.
    Http(String),
    /// Persisting the response body to disk failed.
    Download(String),
    /// File-system or stream I/O failure.
    Io(String),
    /// Process setup (runtime, logging) failed before the method started.
    Startup(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedHeader(msg) => write!(f, "malformed header: {msg}"),
            Self::DoubleHeader => write!(f, "double header: message already has a header"),
            Self::MalformedField(msg) => write!(f, "malformed field: {msg}"),
            Self::EmptyMessage => write!(f, "empty message: blank line with no pending message"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Credentials(msg) => write!(f, "credentials: {msg}"),
            Self::Http(msg) => write!(f, "http: {msg}"),
            Self::Download(msg) => write!(f, "download: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Startup(msg) => write!(f, "startup: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Whether this error comes from message framing on the inbound stream.
    #[must_use]
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::MalformedHeader(_)
                | Self::DoubleHeader
                | Self::MalformedField(_)
                | Self::EmptyMessage
                | Self::Codec(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<gcp_auth::Error> for AppError {
    fn from(err: gcp_auth::Error) -> Self {
        Self::Credentials(err.to_string())
    }
}
