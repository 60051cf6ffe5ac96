/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;

use crate::error::{self, BoxError, Error, ErrorKind};

/// A shared, type erased [`HttpClient`].
pub type SharedHttpClient = Arc<dyn HttpClient>;

/// The transport used to reach the remote service and the presigned part URLs.
///
/// Implementations send exactly one request per call. Retries and authentication repair are
/// layered on top by this crate.
#[async_trait]
pub trait HttpClient: Send + Sync + fmt::Debug {
    /// Send a request and buffer the response body.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error>;
}

/// Request body
pub enum Body {
    /// No body
    Empty,
    /// A buffered body
    Bytes(Bytes),
    /// A streamed body of known length
    Stream {
        /// The body chunks
        stream: BoxStream<'static, Result<Bytes, BoxError>>,
        /// The exact number of bytes `stream` yields
        content_length: u64,
    },
}

impl Body {
    /// The number of bytes in this body, if known
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Body::Empty => Some(0),
            Body::Bytes(bytes) => Some(bytes.len() as u64),
            Body::Stream { content_length, .. } => Some(*content_length),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Bytes(bytes) => f.debug_tuple("Body::Bytes").field(&bytes.len()).finish(),
            Body::Stream { content_length, .. } => f
                .debug_struct("Body::Stream")
                .field("content_length", content_length)
                .finish(),
        }
    }
}

/// A single outgoing request
#[derive(Debug)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Body,
}

impl HttpRequest {
    /// Create a new request without headers or body
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// Set a header, replacing any previous value
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body
    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Serialize `value` as the JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, Error> {
        let data = serde_json::to_vec(value).map_err(error::invalid_input)?;
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=UTF-8"),
        );
        self.body = Body::Bytes(data.into());
        Ok(self)
    }
}

/// A buffered response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Response status
    pub status: StatusCode,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Create a new response
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Fail with [`ErrorKind::RequestFailed`] unless the status is 2xx
    pub fn error_for_status(self) -> Result<Self, Error> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(Error::new(
                ErrorKind::RequestFailed,
                format!("bad status code {}", self.status),
            ))
        }
    }
}

/// [`HttpClient`] backed by `reqwest`
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    inner: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Wrap an existing `reqwest` client
    pub fn new(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;
        let mut req = self.inner.request(method, url).headers(headers);
        req = match body {
            Body::Empty => req,
            Body::Bytes(bytes) => req.body(bytes),
            Body::Stream {
                stream,
                content_length,
            } => req
                .header(CONTENT_LENGTH, content_length)
                .body(reqwest::Body::wrap_stream(stream)),
        };

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        Ok(HttpResponse { status, body })
    }
}

/// The default HTTP client used when not explicitly configured.
pub(crate) fn default_client() -> SharedHttpClient {
    Arc::new(ReqwestHttpClient::new(reqwest::Client::new()))
}
