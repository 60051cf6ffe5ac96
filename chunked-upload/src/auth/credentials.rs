/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{self, BoxError, Error};
use crate::http::{HttpClient, HttpRequest};
use crate::types::RemoteErrorCode;

/// An access and refresh credential pair.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Tokens {
    /// Sent with every request
    #[serde(default)]
    pub access_token: String,
    /// Exchanged for a new pair when the access credential expires
    #[serde(default)]
    pub refresh_token: String,
}

impl Tokens {
    /// Create a new pair
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokens")
            .field("access_token", &"** redacted **")
            .field("refresh_token", &"** redacted **")
            .finish()
    }
}

/// Persists refreshed credentials so they survive a restart.
pub trait CredentialStore: Send + Sync + fmt::Debug {
    /// Called after every successful refresh
    fn persist(&self, user_id: &str, tokens: &Tokens) -> Result<(), BoxError>;
}

/// [`CredentialStore`] that keeps refreshed credentials in memory only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCredentialStore;

impl CredentialStore for NoopCredentialStore {
    fn persist(&self, _user_id: &str, _tokens: &Tokens) -> Result<(), BoxError> {
        Ok(())
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
    grant_type: &'static str,
}

#[derive(Deserialize)]
struct RefreshError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug)]
struct State {
    tokens: Tokens,
    generation: u64,
}

/// The credential pair of one identity together with its refresh generation.
#[derive(Debug)]
pub(crate) struct Credentials {
    state: RwLock<State>,
}

impl Credentials {
    pub(crate) fn new(tokens: Tokens) -> Self {
        Self {
            state: RwLock::new(State {
                tokens,
                generation: 0,
            }),
        }
    }

    /// `(tokens, generation)` at this instant
    pub(crate) async fn snapshot(&self) -> (Tokens, u64) {
        let state = self.state.read().await;
        (state.tokens.clone(), state.generation)
    }

    /// Exchange the refresh credential for a new pair.
    ///
    /// Concurrent callers that observed the same `generation` are serialized, only the first
    /// one talks to the remote service.
    pub(crate) async fn refresh(
        &self,
        generation: u64,
        http: &dyn HttpClient,
        url: &str,
        user_id: &str,
        store: &dyn CredentialStore,
    ) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if state.generation != generation {
            tracing::debug!("credential for {user_id} already refreshed");
            return Ok(());
        }

        let request = HttpRequest::new(http::Method::POST, url).json(&RefreshRequest {
            refresh_token: &state.tokens.refresh_token,
            grant_type: "refresh_token",
        })?;
        let response = http.send(request).await?;

        if let Ok(err) = serde_json::from_slice::<RefreshError>(&response.body) {
            if !err.code.is_empty() {
                return Err(error::remote(
                    RemoteErrorCode::from_code(&err.code),
                    format!("failed to refresh token: {}", err.message),
                ));
            }
        }
        let response = response.error_for_status()?;
        let tokens: Tokens = serde_json::from_slice(&response.body)?;
        if tokens.refresh_token.is_empty() {
            return Err(error::malformed_response(
                "failed to refresh token: refresh token is empty",
            ));
        }

        store
            .persist(user_id, &tokens)
            .map_err(error::from_kind(error::ErrorKind::IOError))?;
        state.tokens = tokens;
        state.generation += 1;
        tracing::info!("refreshed access credential for {user_id}");
        Ok(())
    }
}
