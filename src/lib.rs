//! `resilient-http` is an async HTTP client bound to a single base service.
//!
//! [`ResilientClient`] resolves paths against the configured base URL, merges
//! default and per-call headers, and runs every call through a bounded
//! attempt loop:
//! - each attempt races the exchange against its own timeout
//! - configured statuses and transient transport faults are retried after a
//!   randomized exponential backoff
//! - the final outcome is a typed [`Response`] or a [`ClientError`]
//!
//! Transport, timer, jitter, and request-id generation are injectable for
//! testing.

mod backoff;
mod client;
mod config;
mod decode;
mod error;
mod request;
mod transport;
mod types;

pub use backoff::{
    backoff_ceiling_ms, backoff_delay, JitterSource, RequestIdSource, ThreadRngJitter, Timer,
    TokioTimer, UuidRequestIds, BACKOFF_BASE_MS, BACKOFF_CAP_MS,
};
pub use client::{ResilientClient, REQUEST_ID_HEADER};
pub use config::{ClientConfig, DEFAULT_RETRIES, DEFAULT_RETRY_STATUSES, DEFAULT_TIMEOUT_MS};
pub use error::{ClientError, ConfigError, TransportError, TransportErrorKind};
pub use request::{CacheMode, RequestOptions};
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
pub use types::{Body, Response, ResponseSnapshot};

pub use async_trait::async_trait;
pub use reqwest::{header, Method, StatusCode};

pub type Result<T> = std::result::Result<T, ClientError>;
