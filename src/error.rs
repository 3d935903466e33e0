use std::fmt;

use crate::ResponseSnapshot;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The exchange completed with a non-success status and was not retried
    /// further.
    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        /// Parsed body, status and headers of the failing response.
        response: Box<ResponseSnapshot>,
    },
    /// The per-attempt deadline fired on the last available attempt.
    #[error("request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    /// Connection, reset or other transport-level fault.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Response body could not be decoded according to its content type.
    #[error("decode error (status {status}): {message}")]
    Decode {
        status: u16,
        message: String,
        /// Present when the raw body was readable but not convertible to the
        /// requested type.
        response: Option<Box<ResponseSnapshot>>,
    },
    /// Base URL and path did not form a valid absolute URL.
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    /// A header name or value could not be represented on the wire.
    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
    /// The JSON request body could not be serialized.
    #[error("could not serialize request body: {0}")]
    Serialize(String),
    /// The attempt loop ended without a terminal outcome.
    #[error("request failed after {attempts} attempts")]
    AttemptsExhausted { attempts: usize },
}

impl ClientError {
    /// HTTP status of the exchange that produced this error, if one completed.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Decode { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Snapshot of the response that produced this error, if one completed.
    pub fn response(&self) -> Option<&ResponseSnapshot> {
        match self {
            Self::Http { response, .. } => Some(response.as_ref()),
            Self::Decode { response, .. } => response.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` for a per-attempt deadline or a transport-reported timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport(err) => err.kind() == TransportErrorKind::Timeout,
            _ => false,
        }
    }
}

/// Classification of a transport fault for retry decisions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportErrorKind {
    /// The transport gave up waiting on its own.
    Timeout,
    /// Connection refused, reset, or broken while sending or reading.
    Network,
    /// Anything else: request building, redirects, protocol errors.
    Other,
}

impl TransportErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::Network)
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Fault reported by a [`Transport`](crate::Transport) before a response was
/// fully received.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() {
            TransportErrorKind::Network
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string()).with_source(err)
    }
}

/// Error returned while loading a [`ClientConfig`](crate::ClientConfig) from
/// the environment.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing {0} environment variable")]
    Missing(String),
    #[error("{0} is set but empty")]
    Empty(String),
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: String,
        value: String,
        expected: &'static str,
    },
}
