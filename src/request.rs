use std::fmt::{self, Display};

use serde::Serialize;

use crate::ClientError;

/// Cache directive forwarded to the transport with every attempt.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CacheMode {
    /// Let the transport decide; nothing is added to the request.
    #[default]
    Default,
    NoStore,
    Reload,
    NoCache,
    ForceCache,
    OnlyIfCached,
}

impl CacheMode {
    /// `Cache-Control` request directive matching this mode, if any.
    pub fn cache_control(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::NoStore => Some("no-store"),
            Self::Reload | Self::NoCache => Some("no-cache"),
            Self::ForceCache => Some("max-stale"),
            Self::OnlyIfCached => Some("only-if-cached"),
        }
    }
}

/// Per-call request options.
///
/// Built fluently and passed to [`ResilientClient::request`](crate::ResilientClient::request)
/// or one of the verb shorthands. `()` converts to empty options.
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) query: Vec<(String, Option<String>)>,
    pub(crate) json: Option<Result<Vec<u8>, String>>,
    pub(crate) timeout_ms: Option<u64>,
    pub(crate) auth_token: Option<String>,
    pub(crate) cache: Option<CacheMode>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("json", &self.json.as_ref().map(|body| body.as_ref().map(Vec::len)))
            .field("timeout_ms", &self.timeout_ms)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("cache", &self.cache)
            .finish()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header that overrides a default header of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Appends a query parameter serialized with its `Display` form.
    pub fn query(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.query.push((key.into(), Some(value.to_string())));
        self
    }

    /// Appends a query parameter that is omitted when `value` is `None`.
    pub fn query_opt<V: Display>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        self.query
            .push((key.into(), value.map(|value| value.to_string())));
        self
    }

    /// Sets a JSON request body.
    ///
    /// Serialization happens here; a failure is reported when the request
    /// is sent.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        self.json = Some(serde_json::to_vec(body).map_err(|err| err.to_string()));
        self
    }

    /// Overrides the client's default per-attempt timeout.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Sends `Authorization: Bearer <token>` with this call.
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn cache(mut self, cache: CacheMode) -> Self {
        self.cache = Some(cache);
        self
    }

    pub(crate) fn has_json(&self) -> bool {
        self.json.is_some()
    }

    pub(crate) fn body(&self) -> Result<Option<Vec<u8>>, ClientError> {
        match &self.json {
            None => Ok(None),
            Some(Ok(bytes)) => Ok(Some(bytes.clone())),
            Some(Err(message)) => Err(ClientError::Serialize(message.clone())),
        }
    }
}

impl From<()> for RequestOptions {
    fn from(_: ()) -> Self {
        Self::default()
    }
}
