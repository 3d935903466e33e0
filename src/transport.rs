use async_trait::async_trait;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Method, StatusCode,
};
use url::Url;

use crate::{CacheMode, TransportError};

/// One fully-built attempt handed to a [`Transport`].
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub cache: Option<CacheMode>,
}

/// Buffered response returned by a [`Transport`].
#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Performs a single HTTP exchange.
///
/// Implementations must read the whole body before returning, so that the
/// caller's per-attempt deadline covers the complete exchange. The returned
/// future may be dropped at any suspension point when the deadline fires.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let TransportRequest {
            method,
            url,
            mut headers,
            body,
            cache,
        } = request;

        if let Some(directive) = cache.and_then(CacheMode::cache_control) {
            if !headers.contains_key(header::CACHE_CONTROL) {
                headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(directive));
            }
        }

        let mut builder = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
