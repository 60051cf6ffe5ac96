/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;

use async_trait::async_trait;

use crate::error::Error;
use crate::http::HttpRequest;

mod client;
mod credentials;
mod identity;
mod signing;

pub use self::client::AuthenticatedClient;
pub use self::credentials::{CredentialStore, NoopCredentialStore, Tokens};
pub use self::identity::{AuthEndpoints, DelegatedIdentity, DeviceProfile, Identity, IdentityBuilder};
pub use self::signing::{
    DeviceSigner, Secp256k1Signer, SigningContext, SigningRegistry, SigningState,
};

/// The credential and signature generations a request was signed with.
///
/// Repairs only run when the generation they were triggered by is still current. A worker that
/// lost the race to another worker's repair simply re-issues its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    /// Generation of the access credential used
    pub credential_generation: u64,
    /// Generation of the device session used
    pub session_generation: u64,
}

/// Something that can sign requests for one identity and repair its own authentication state.
#[async_trait]
pub trait Authority: Send + Sync + fmt::Debug {
    /// The identity the requests are made on behalf of
    fn user_id(&self) -> &str;

    /// The current access credential
    async fn access_token(&self) -> String;

    /// Add authentication headers to `request`.
    async fn sign_request(&self, request: &mut HttpRequest) -> Result<RequestTicket, Error>;

    /// Refresh the access credential, unless it already changed since `ticket` was issued.
    async fn refresh_credential(&self, ticket: RequestTicket) -> Result<(), Error>;

    /// Re-create the device session, unless it already changed since `ticket` was issued.
    async fn recreate_session(&self, ticket: RequestTicket) -> Result<(), Error>;
}
