/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};
use http::HeaderMap;
use serde_json::json;

use crate::auth::client::remote_error;
use crate::auth::credentials::Credentials;
use crate::auth::{
    Authority, CredentialStore, NoopCredentialStore, RequestTicket, SigningContext,
    SigningRegistry, Tokens,
};
use crate::error::{self, Error, ErrorKind};
use crate::http::{HttpRequest, SharedHttpClient};

/// Consecutive session re-creations allowed before giving up
const MAX_SESSION_ATTEMPTS: u32 = 3;

/// Where credentials are refreshed and device sessions are created.
#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    /// Credential refresh endpoint
    pub refresh_url: String,
    /// Device session creation endpoint
    pub session_url: String,
}

/// How this device presents itself to the remote service.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    /// Reported device name
    pub device_name: String,
    /// Reported model name
    pub model_name: String,
    /// `User-Agent` header, if any
    pub user_agent: Option<String>,
    /// `x-canary` header, if any
    pub canary: Option<String>,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            device_name: "samsung".to_owned(),
            model_name: "SM-G9810".to_owned(),
            user_agent: None,
            canary: None,
        }
    }
}

/// An identity that owns its credentials and device session.
#[derive(Debug)]
pub struct Identity {
    signing: Arc<SigningContext>,
    credentials: Credentials,
    endpoints: AuthEndpoints,
    profile: DeviceProfile,
    http: SharedHttpClient,
    store: Arc<dyn CredentialStore>,
}

impl Identity {
    /// Create a new [`IdentityBuilder`]
    pub fn builder() -> IdentityBuilder {
        IdentityBuilder::default()
    }

    /// The signing state shared by every request of this identity
    pub fn signing_context(&self) -> &Arc<SigningContext> {
        &self.signing
    }

    /// The current credential pair
    pub async fn tokens(&self) -> Tokens {
        self.credentials.snapshot().await.0
    }

    fn apply_headers(
        &self,
        headers: &mut HeaderMap,
        access_token: &str,
        device_id: &str,
        signature: &str,
    ) -> Result<(), Error> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        headers.insert(AUTHORIZATION, header_value(access_token)?);
        insert(headers, "x-signature", signature)?;
        insert(headers, "x-device-id", device_id)?;
        insert(headers, "x-request-id", &uuid::Uuid::new_v4().to_string())?;
        insert(headers, "x-nonce", &uuid::Uuid::new_v4().to_string())?;
        insert(headers, "x-timestamp", &timestamp.to_string())?;
        if let Some(canary) = &self.profile.canary {
            insert(headers, "x-canary", canary)?;
        }
        if let Some(user_agent) = &self.profile.user_agent {
            headers.insert(USER_AGENT, header_value(user_agent)?);
        }
        Ok(())
    }
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(error::invalid_input)
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), Error> {
    headers.insert(HeaderName::from_static(name), header_value(value)?);
    Ok(())
}

#[async_trait]
impl Authority for Identity {
    fn user_id(&self) -> &str {
        self.signing.user_id()
    }

    async fn access_token(&self) -> String {
        self.credentials.snapshot().await.0.access_token
    }

    async fn sign_request(&self, request: &mut HttpRequest) -> Result<RequestTicket, Error> {
        // each snapshot releases its lock before the next one is taken
        let (tokens, credential_generation) = self.credentials.snapshot().await;
        let (device_id, signature, session_generation) = self.signing.snapshot().await;
        self.apply_headers(
            &mut request.headers,
            &tokens.access_token,
            &device_id,
            &signature,
        )?;
        Ok(RequestTicket {
            credential_generation,
            session_generation,
        })
    }

    async fn refresh_credential(&self, ticket: RequestTicket) -> Result<(), Error> {
        self.credentials
            .refresh(
                ticket.credential_generation,
                self.http.as_ref(),
                &self.endpoints.refresh_url,
                self.user_id(),
                self.store.as_ref(),
            )
            .await
    }

    async fn recreate_session(&self, ticket: RequestTicket) -> Result<(), Error> {
        let mut state = self.signing.lock().await;
        if state.generation() != ticket.session_generation {
            tracing::debug!("device session for {} already re-created", self.user_id());
            return Ok(());
        }

        state.sign(self.signing.app_id(), self.signing.user_id())?;
        if !state.begin_repair(MAX_SESSION_ATTEMPTS) {
            return Err(Error::new(
                ErrorKind::AuthRepairExhausted,
                format!(
                    "device session re-creation failed after {MAX_SESSION_ATTEMPTS} attempts"
                ),
            ));
        }

        let (tokens, _) = self.credentials.snapshot().await;
        let body = json!({
            "deviceName": self.profile.device_name,
            "modelName": self.profile.model_name,
            "nonce": 0,
            "pubKey": state.public_key(),
            "refreshToken": tokens.refresh_token,
        });
        let mut request = HttpRequest::new(http::Method::POST, &self.endpoints.session_url)
            .json(&body)?;
        self.apply_headers(
            &mut request.headers,
            &tokens.access_token,
            state.device_id(),
            state.signature(),
        )?;

        let response = self.http.send(request).await?;
        if let Some((code, message)) = remote_error(&response.body) {
            return Err(error::remote(code, message));
        }
        response.error_for_status()?;

        state.repaired();
        tracing::info!("re-created device session for {}", self.user_id());
        Ok(())
    }
}

/// An identity that borrows credentials and session state from a primary identity.
///
/// Every request and repair is forwarded to the primary, so both share one refresh and one
/// device session.
#[derive(Debug, Clone)]
pub struct DelegatedIdentity {
    primary: Arc<dyn Authority>,
}

impl DelegatedIdentity {
    /// Delegate to `primary`
    pub fn new(primary: Arc<dyn Authority>) -> Self {
        Self { primary }
    }

    /// The identity owning the credentials
    pub fn primary(&self) -> &Arc<dyn Authority> {
        &self.primary
    }
}

#[async_trait]
impl Authority for DelegatedIdentity {
    fn user_id(&self) -> &str {
        self.primary.user_id()
    }

    async fn access_token(&self) -> String {
        self.primary.access_token().await
    }

    async fn sign_request(&self, request: &mut HttpRequest) -> Result<RequestTicket, Error> {
        self.primary.sign_request(request).await
    }

    async fn refresh_credential(&self, ticket: RequestTicket) -> Result<(), Error> {
        self.primary.refresh_credential(ticket).await
    }

    async fn recreate_session(&self, ticket: RequestTicket) -> Result<(), Error> {
        self.primary.recreate_session(ticket).await
    }
}

/// Builder for [`Identity`]
#[derive(Debug, Default)]
pub struct IdentityBuilder {
    user_id: Option<String>,
    app_id: Option<String>,
    tokens: Option<Tokens>,
    endpoints: Option<AuthEndpoints>,
    profile: DeviceProfile,
    http: Option<SharedHttpClient>,
    store: Option<Arc<dyn CredentialStore>>,
    registry: Option<Arc<SigningRegistry>>,
    signing: Option<Arc<SigningContext>>,
}

impl IdentityBuilder {
    /// The user the requests are made for (required)
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Application identifier mixed into the session signature (required unless an explicit
    /// signing context is given)
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// The initial credential pair (required)
    pub fn tokens(mut self, tokens: Tokens) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Refresh and session endpoints (required)
    pub fn endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Device presentation, defaults to [`DeviceProfile::default`]
    pub fn profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Transport for requests to the remote service
    pub fn http_client(mut self, http: SharedHttpClient) -> Self {
        self.http = Some(http);
        self
    }

    /// Where refreshed credentials are persisted
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share signing state with other identities through `registry`
    pub fn registry(mut self, registry: Arc<SigningRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use an explicit signing context
    pub fn signing_context(mut self, signing: Arc<SigningContext>) -> Self {
        self.signing = Some(signing);
        self
    }

    /// Consumes the builder and constructs an [`Identity`]
    pub fn build(self) -> Result<Identity, Error> {
        let user_id = self
            .user_id
            .ok_or_else(|| error::invalid_input("user id is required"))?;
        let tokens = self
            .tokens
            .ok_or_else(|| error::invalid_input("credentials are required"))?;
        let endpoints = self
            .endpoints
            .ok_or_else(|| error::invalid_input("auth endpoints are required"))?;

        let signing = match self.signing {
            Some(signing) => signing,
            None => {
                let app_id = self
                    .app_id
                    .ok_or_else(|| error::invalid_input("app id is required"))?;
                match &self.registry {
                    Some(registry) => registry.get_or_init(&user_id, &app_id)?,
                    None => Arc::new(SigningContext::secp256k1(user_id.as_str(), app_id)?),
                }
            }
        };
        if signing.user_id() != user_id {
            return Err(error::invalid_input(format!(
                "signing context belongs to {}, not {user_id}",
                signing.user_id()
            )));
        }

        Ok(Identity {
            signing,
            credentials: Credentials::new(tokens),
            endpoints,
            profile: self.profile,
            http: self.http.unwrap_or_else(crate::http::default_client),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(NoopCredentialStore)),
        })
    }
}
