use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method,
};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    backoff::{
        backoff_delay, JitterSource, RequestIdSource, ThreadRngJitter, Timer, TokioTimer,
        UuidRequestIds,
    },
    decode::{decode_data, parse_body},
    transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse},
    ClientConfig, ClientError, RequestOptions, Response, ResponseSnapshot, Result,
    TransportError,
};

/// Header carrying the per-call request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const JSON_MEDIA_TYPE: &str = "application/json";

/// How a single attempt ended.
enum AttemptOutcome {
    Completed(TransportResponse),
    Failed(TransportError),
    TimedOut,
}

#[derive(Clone)]
/// HTTP client for one base service with per-attempt timeouts and jittered
/// retries.
///
/// The client holds no per-request state; clones share the transport and can
/// be used from any number of tasks at once.
pub struct ResilientClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    timer: Arc<dyn Timer>,
    jitter: Arc<dyn JitterSource>,
    request_ids: Arc<dyn RequestIdSource>,
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResilientClient {
    /// Creates a client backed by `reqwest`, tokio timers, and random jitter.
    ///
    /// Trailing slashes are stripped from `config.base_url`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use resilient_http::{ClientConfig, ResilientClient};
    ///
    /// let users = ResilientClient::new(ClientConfig::new("https://users.example.com/"));
    /// ```
    pub fn new(mut config: ClientConfig) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_owned();
        Self {
            config,
            transport: Arc::new(ReqwestTransport::default()),
            timer: Arc::new(TokioTimer),
            jitter: Arc::new(ThreadRngJitter),
            request_ids: Arc::new(UuidRequestIds),
        }
    }

    /// Uses a preconfigured `reqwest::Client` for the exchange.
    pub fn with_http_client(self, http: reqwest::Client) -> Self {
        self.with_transport(ReqwestTransport::new(http))
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    pub fn with_timer(mut self, timer: impl Timer + 'static) -> Self {
        self.timer = Arc::new(timer);
        self
    }

    pub fn with_jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    pub fn with_request_ids(mut self, request_ids: impl RequestIdSource + 'static) -> Self {
        self.request_ids = Arc::new(request_ids);
        self
    }

    /// Returns the configuration with the normalized base URL.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: impl Into<RequestOptions>,
    ) -> Result<Response<T>> {
        self.request(Method::GET, path, options).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        options: impl Into<RequestOptions>,
    ) -> Result<Response<T>> {
        self.request(Method::POST, path, options).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        options: impl Into<RequestOptions>,
    ) -> Result<Response<T>> {
        self.request(Method::PUT, path, options).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        options: impl Into<RequestOptions>,
    ) -> Result<Response<T>> {
        self.request(Method::PATCH, path, options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: impl Into<RequestOptions>,
    ) -> Result<Response<T>> {
        self.request(Method::DELETE, path, options).await
    }

    /// Sends a request, retrying retryable statuses and transient faults.
    ///
    /// At most `retries + 1` attempts are made. A status in `retry_statuses`
    /// is retried while attempts remain, even when it is a success status;
    /// on the last attempt it is treated like any other response.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: impl Into<RequestOptions>,
    ) -> Result<Response<T>> {
        let options = options.into();
        let url = self.build_url(
            path,
            options
                .query
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_deref())),
        )?;
        let headers = self.build_headers(&options)?;
        let body = options.body()?;
        let timeout_ms = options.timeout_ms.unwrap_or(self.config.default_timeout_ms);
        let max_attempts = self.config.max_attempts();

        for attempt in 0..max_attempts {
            let is_last = attempt + 1 == max_attempts;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                %method,
                %url,
                attempt,
                request_id = ?headers.get(REQUEST_ID_HEADER),
                "sending request"
            );

            let request = TransportRequest {
                method: method.clone(),
                url: url.clone(),
                headers: headers.clone(),
                body: body.clone(),
                cache: options.cache,
            };

            match self.run_attempt(request, Duration::from_millis(timeout_ms)).await {
                AttemptOutcome::Completed(response) => {
                    if !is_last && self.should_retry_status(&response) {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(status = %response.status, attempt, "retryable status");

                        self.wait_before_retry(attempt).await;
                        continue;
                    }
                    return self.finish(&method, &url, response);
                }
                AttemptOutcome::TimedOut => {
                    if !is_last {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(timeout_ms, attempt, "attempt timed out");

                        self.wait_before_retry(attempt).await;
                        continue;
                    }

                    #[cfg(feature = "tracing")]
                    tracing::warn!(%method, %url, timeout_ms, "request timed out");

                    return Err(ClientError::Timeout { timeout_ms });
                }
                AttemptOutcome::Failed(err) => {
                    if !is_last && err.kind().is_transient() {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(error = %err, attempt, "transient transport error");

                        self.wait_before_retry(attempt).await;
                        continue;
                    }

                    #[cfg(feature = "tracing")]
                    tracing::warn!(%method, %url, error = %err, "request failed");

                    return Err(ClientError::Transport(err));
                }
            }
        }

        Err(ClientError::AttemptsExhausted {
            attempts: max_attempts,
        })
    }

    /// Resolves `path` against the base URL and appends the defined query
    /// values.
    ///
    /// Exactly one `/` separates base and path. Pairs whose value is `None`
    /// are omitted.
    pub fn build_url<I, K, V>(&self, path: &str, query: I) -> Result<Url>
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<str>,
        V: fmt::Display,
    {
        let raw = if path.starts_with('/') {
            format!("{}{path}", self.config.base_url)
        } else {
            format!("{}/{path}", self.config.base_url)
        };
        let mut url = Url::parse(&raw).map_err(|err| ClientError::InvalidUrl {
            url: raw.clone(),
            reason: err.to_string(),
        })?;

        let defined: Vec<(K, String)> = query
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key, value.to_string())))
            .collect();
        if !defined.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &defined {
                pairs.append_pair(key.as_ref(), value);
            }
        }

        Ok(url)
    }

    /// Builds the header set for one call.
    ///
    /// Per-call headers override defaults. A request id is generated unless
    /// one was supplied, an auth token always sets `Authorization`, and a
    /// JSON body gets `Content-Type: application/json` unless one was set.
    pub fn build_headers(&self, options: &RequestOptions) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let overrides = options.headers.iter().map(|(name, value)| (name, value));
        for (name, value) in self.config.default_headers.iter().chain(overrides) {
            headers.insert(parse_header_name(name)?, parse_header_value(name, value)?);
        }

        if !headers.contains_key(REQUEST_ID_HEADER) {
            let request_id = self.request_ids.next_id();
            headers.insert(
                HeaderName::from_static(REQUEST_ID_HEADER),
                parse_header_value(REQUEST_ID_HEADER, &request_id)?,
            );
        }

        if let Some(token) = &options.auth_token {
            let mut value = parse_header_value(
                header::AUTHORIZATION.as_str(),
                &normalize_bearer_authorization(token),
            )?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        if options.has_json() && !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_MEDIA_TYPE));
        }

        Ok(headers)
    }

    /// Races the exchange against the per-attempt deadline.
    ///
    /// Both futures are dropped when the race resolves, which cancels the
    /// losing exchange and disarms the deadline timer.
    async fn run_attempt(&self, request: TransportRequest, timeout: Duration) -> AttemptOutcome {
        let exchange = self.transport.send(request);
        let deadline = self.timer.sleep(timeout);

        tokio::select! {
            biased;
            result = exchange => match result {
                Ok(response) => AttemptOutcome::Completed(response),
                Err(err) => AttemptOutcome::Failed(err),
            },
            () = deadline => AttemptOutcome::TimedOut,
        }
    }

    fn should_retry_status(&self, response: &TransportResponse) -> bool {
        self.config
            .retry_statuses
            .contains(&response.status.as_u16())
    }

    fn finish<T: DeserializeOwned>(
        &self,
        method: &Method,
        url: &Url,
        response: TransportResponse,
    ) -> Result<Response<T>> {
        let TransportResponse {
            status,
            headers,
            body,
        } = response;
        let body = parse_body(status, &headers, &body)?;

        if !status.is_success() {
            #[cfg(feature = "tracing")]
            tracing::warn!(%method, %url, %status, "request failed with error status");

            return Err(ClientError::Http {
                status: status.as_u16(),
                message: format!("{method} {url} failed with status {status}"),
                response: Box::new(ResponseSnapshot {
                    body,
                    status: status.as_u16(),
                    headers,
                }),
            });
        }

        match decode_data(&body) {
            Ok(data) => Ok(Response {
                data,
                status: status.as_u16(),
                headers,
            }),
            Err(err) => Err(ClientError::Decode {
                status: status.as_u16(),
                message: format!("could not decode response of {method} {url}: {err}"),
                response: Some(Box::new(ResponseSnapshot {
                    body,
                    status: status.as_u16(),
                    headers,
                })),
            }),
        }
    }

    /// Waits a random delay in `[0, min(4000, 300 * 2^attempt)]` ms.
    async fn wait_before_retry(&self, attempt: usize) {
        let delay = backoff_delay(attempt, self.jitter.as_ref());

        #[cfg(feature = "tracing")]
        tracing::debug!("retrying request after {} ms", delay.as_millis());

        self.timer.sleep(delay).await;
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|err| ClientError::InvalidHeader {
        name: name.to_owned(),
        reason: err.to_string(),
    })
}

fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|err| ClientError::InvalidHeader {
        name: name.to_owned(),
        reason: err.to_string(),
    })
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header;

    use super::{normalize_bearer_authorization, ResilientClient, REQUEST_ID_HEADER};
    use crate::{backoff::RequestIdSource, ClientConfig, ClientError, RequestOptions};

    struct FixedId;

    impl RequestIdSource for FixedId {
        fn next_id(&self) -> String {
            "req-1".to_owned()
        }
    }

    fn client(base_url: &str) -> ResilientClient {
        ResilientClient::new(ClientConfig::new(base_url)).with_request_ids(FixedId)
    }

    #[test]
    fn build_url_strips_trailing_slash_and_omits_absent_query_values() {
        let url = client("https://x.test/")
            .build_url("/foo", [("a", Some(1)), ("b", None)])
            .expect("url must build");
        assert_eq!(url.as_str(), "https://x.test/foo?a=1");
    }

    #[test]
    fn build_url_inserts_single_separator_for_relative_paths() {
        let client = client("https://x.test/api//");
        let none: [(&str, Option<&str>); 0] = [];
        assert_eq!(
            client.build_url("users/7", none).expect("url").as_str(),
            "https://x.test/api/users/7"
        );
        assert_eq!(
            client.build_url("/users/7", none).expect("url").as_str(),
            "https://x.test/api/users/7"
        );
    }

    #[test]
    fn build_url_encodes_query_values() {
        let url = client("https://x.test")
            .build_url("/search", [("q", Some("a b&c"))])
            .expect("url must build");
        assert_eq!(url.as_str(), "https://x.test/search?q=a+b%26c");
    }

    #[test]
    fn build_url_rejects_malformed_base() {
        let err = client("not a url")
            .build_url("/foo", [("a", Some(1))])
            .expect_err("relative base must fail");
        assert!(matches!(err, ClientError::InvalidUrl { .. }));
    }

    #[test]
    fn per_call_headers_override_defaults() {
        let client = ResilientClient::new(
            ClientConfig::new("https://x.test")
                .with_header("Accept", "text/plain")
                .with_header("X-Service", "users"),
        );
        let headers = client
            .build_headers(&RequestOptions::new().header("accept", "application/json"))
            .expect("headers must build");
        assert_eq!(headers[header::ACCEPT], "application/json");
        assert_eq!(headers["x-service"], "users");
        assert_eq!(headers.get_all(header::ACCEPT).iter().count(), 1);
    }

    #[test]
    fn request_id_is_generated_unless_supplied() {
        let client = client("https://x.test");
        let generated = client
            .build_headers(&RequestOptions::new())
            .expect("headers must build");
        assert_eq!(generated[REQUEST_ID_HEADER], "req-1");

        let supplied = client
            .build_headers(&RequestOptions::new().header("X-Request-Id", "caller-id"))
            .expect("headers must build");
        assert_eq!(supplied[REQUEST_ID_HEADER], "caller-id");
    }

    #[test]
    fn auth_token_overrides_any_authorization_header() {
        let client = ResilientClient::new(
            ClientConfig::new("https://x.test").with_header("Authorization", "Basic default"),
        );
        let headers = client
            .build_headers(
                &RequestOptions::new()
                    .header("Authorization", "Basic explicit")
                    .auth_token("abc123"),
            )
            .expect("headers must build");
        assert_eq!(headers[header::AUTHORIZATION], "Bearer abc123");
        assert!(headers[header::AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn json_body_sets_content_type_only_when_missing() {
        let client = client("https://x.test");
        let implicit = client
            .build_headers(&RequestOptions::new().json(&serde_json::json!({"a": 1})))
            .expect("headers must build");
        assert_eq!(implicit[header::CONTENT_TYPE], "application/json");

        let explicit = client
            .build_headers(
                &RequestOptions::new()
                    .header("Content-Type", "application/vnd.api+json")
                    .json(&serde_json::json!({"a": 1})),
            )
            .expect("headers must build");
        assert_eq!(explicit[header::CONTENT_TYPE], "application/vnd.api+json");

        let no_body = client
            .build_headers(&RequestOptions::new())
            .expect("headers must build");
        assert!(!no_body.contains_key(header::CONTENT_TYPE));
    }

    #[test]
    fn invalid_header_value_is_rejected() {
        let err = client("https://x.test")
            .build_headers(&RequestOptions::new().header("X-Bad", "line\nbreak"))
            .expect_err("newline must be rejected");
        assert!(matches!(err, ClientError::InvalidHeader { .. }));
    }

    #[test]
    fn normalize_bearer_adds_prefix_when_missing() {
        assert_eq!(
            normalize_bearer_authorization("abc123"),
            "Bearer abc123".to_owned()
        );
    }

    #[test]
    fn normalize_bearer_keeps_existing_prefix() {
        assert_eq!(
            normalize_bearer_authorization("bEaReR abc123"),
            "bEaReR abc123".to_owned()
        );
    }

    #[test]
    fn debug_redacts_authorization_value() {
        let client = ResilientClient::new(
            ClientConfig::new("https://x.test").with_header("Authorization", "secret-token"),
        );
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn new_strips_trailing_slashes_from_base_url() {
        assert_eq!(client("https://x.test///").config().base_url, "https://x.test");
    }
}
