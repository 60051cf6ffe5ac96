/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::Instrument;

use crate::auth::Authority;
use crate::error::{self, Error};
use crate::http::{HttpRequest, SharedHttpClient};
use crate::types::RemoteErrorCode;

/// Repairs attempted for a single logical request before its error is surfaced
const MAX_REPAIR_CYCLES: usize = 2;

/// Sends signed JSON requests and repairs expired credentials or device sessions in place.
///
/// A structured `{"code": "...", "message": "..."}` error body triggers at most
/// two repair cycles per request:
///
/// * `AccessTokenInvalid` refreshes the access credential
/// * `DeviceSessionSignatureInvalid` re-signs and re-creates the device session
///
/// after which the request is re-issued. Any other code is returned verbatim as
/// [`ErrorKind::RemoteError`](crate::error::ErrorKind::RemoteError).
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    authority: Arc<dyn Authority>,
    http: SharedHttpClient,
}

impl AuthenticatedClient {
    /// Create a client signing requests with `authority`
    pub fn new(authority: Arc<dyn Authority>, http: SharedHttpClient) -> Self {
        Self { authority, http }
    }

    /// The authority signing requests
    pub fn authority(&self) -> &Arc<dyn Authority> {
        &self.authority
    }

    /// Send `body` as JSON and deserialize the response.
    pub async fn send_json<Req, Res>(
        &self,
        method: Method,
        url: &str,
        body: &Req,
    ) -> Result<Res, Error>
    where
        Req: Serialize + ?Sized + Sync,
        Res: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(error::invalid_input)?;
        let response = self.send(method, url, payload.into()).await?;
        Ok(serde_json::from_slice(&response)?)
    }

    /// Send a JSON `payload` and return the raw response body.
    pub async fn send(&self, method: Method, url: &str, payload: Bytes) -> Result<Bytes, Error> {
        let span = tracing::debug_span!("signed-request", %method, url);
        self.send_inner(method, url, payload).instrument(span).await
    }

    async fn send_inner(&self, method: Method, url: &str, payload: Bytes) -> Result<Bytes, Error> {
        let mut repairs = 0;
        loop {
            let mut request = HttpRequest::new(method.clone(), url)
                .header(
                    http::header::CONTENT_TYPE,
                    http::HeaderValue::from_static("application/json; charset=UTF-8"),
                )
                .body(crate::http::Body::Bytes(payload.clone()));
            let ticket = self.authority.sign_request(&mut request).await?;
            let response = self.http.send(request).await?;

            let Some((code, message)) = remote_error(&response.body) else {
                return response.error_for_status().map(|resp| resp.body);
            };
            match code {
                RemoteErrorCode::AccessTokenInvalid if repairs < MAX_REPAIR_CYCLES => {
                    repairs += 1;
                    tracing::warn!("access credential rejected, refreshing");
                    self.authority.refresh_credential(ticket).await?;
                }
                RemoteErrorCode::DeviceSessionSignatureInvalid if repairs < MAX_REPAIR_CYCLES => {
                    repairs += 1;
                    tracing::warn!("device session rejected, re-creating");
                    self.authority.recreate_session(ticket).await?;
                }
                code => return Err(error::remote(code, message)),
            }
        }
    }
}

/// The structured error carried by a response body, if any.
///
/// Only a non-empty string `code` counts, numeric status codes are left to the caller.
pub(crate) fn remote_error(body: &[u8]) -> Option<(RemoteErrorCode, String)> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let code = value.get("code")?.as_str().filter(|code| !code.is_empty())?;
    let message = value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .unwrap_or(code)
        .to_owned();
    Some((RemoteErrorCode::from_code(code), message))
}
