/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use k256::ecdsa::SigningKey;
use sha2::{Digest, Sha256};
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::error::{self, Error};

/// Produces the per-device session signature.
pub trait DeviceSigner: Send + Sync + fmt::Debug {
    /// Hex encoded public key registered with the remote service
    fn public_key(&self) -> String;

    /// Sign a SHA-256 digest, returning the raw signature bytes
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>, Error>;
}

/// secp256k1 signer producing recoverable `r || s || v` signatures.
#[derive(Clone)]
pub struct Secp256k1Signer {
    key: SigningKey,
}

impl Secp256k1Signer {
    /// Use the hex decoded device identifier as the private key.
    pub fn from_device_id(device_id: &str) -> Result<Self, Error> {
        let secret = hex::decode(device_id).map_err(error::invalid_input)?;
        let key = SigningKey::from_slice(&secret).map_err(error::invalid_input)?;
        Ok(Self { key })
    }
}

impl fmt::Debug for Secp256k1Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secp256k1Signer")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl DeviceSigner for Secp256k1Signer {
    fn public_key(&self) -> String {
        hex::encode(self.key.verifying_key().to_encoded_point(false).as_bytes())
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>, Error> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(error::invalid_input)?;
        let mut out = signature.to_bytes().to_vec();
        out.push(recovery_id.to_byte());
        Ok(out)
    }
}

/// Device identifier derived from the user identifier
pub(crate) fn device_id_for(user_id: &str) -> String {
    hex::encode(Sha256::digest(user_id.as_bytes()))
}

/// Per-identity device session state.
#[derive(Debug)]
pub struct SigningState {
    device_id: String,
    signer: Arc<dyn DeviceSigner>,
    signature: String,
    retry_count: u32,
    generation: u64,
}

impl SigningState {
    /// The device identifier sent with every request
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The current session signature, hex encoded. Empty until the first signing.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Consecutive failed session re-creations
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Incremented every time the session is successfully re-created
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn public_key(&self) -> String {
        self.signer.public_key()
    }

    pub(crate) fn sign(&mut self, app_id: &str, user_id: &str) -> Result<(), Error> {
        let payload = format!("{app_id}:{}:{user_id}:0", self.device_id);
        let digest: [u8; 32] = Sha256::digest(payload.as_bytes()).into();
        self.signature = hex::encode(self.signer.sign_digest(&digest)?);
        Ok(())
    }

    /// Count a session re-creation attempt. Returns false once the attempts are exhausted, in
    /// which case the counter starts over.
    pub(crate) fn begin_repair(&mut self, max_attempts: u32) -> bool {
        self.retry_count += 1;
        if self.retry_count > max_attempts {
            self.retry_count = 0;
            return false;
        }
        true
    }

    pub(crate) fn repaired(&mut self) {
        self.retry_count = 0;
        self.generation += 1;
    }
}

/// Signing state of one identity, shared by every request made on its behalf.
#[derive(Debug)]
pub struct SigningContext {
    user_id: String,
    app_id: String,
    state: RwLock<SigningState>,
}

impl SigningContext {
    /// Create and sign a new context for `user_id`.
    pub fn new(
        user_id: impl Into<String>,
        app_id: impl Into<String>,
        device_id: impl Into<String>,
        signer: Arc<dyn DeviceSigner>,
    ) -> Result<Self, Error> {
        let user_id = user_id.into();
        let app_id = app_id.into();
        let mut state = SigningState {
            device_id: device_id.into(),
            signer,
            signature: String::new(),
            retry_count: 0,
            generation: 0,
        };
        state.sign(&app_id, &user_id)?;
        Ok(Self {
            user_id,
            app_id,
            state: RwLock::new(state),
        })
    }

    /// Create a context using a [`Secp256k1Signer`] keyed by the derived device identifier.
    pub fn secp256k1(user_id: impl Into<String>, app_id: impl Into<String>) -> Result<Self, Error> {
        let user_id = user_id.into();
        let device_id = device_id_for(&user_id);
        let signer = Arc::new(Secp256k1Signer::from_device_id(&device_id)?);
        Self::new(user_id, app_id, device_id, signer)
    }

    /// The identity this context belongs to
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub(crate) fn app_id(&self) -> &str {
        &self.app_id
    }

    /// `(device id, signature, generation)` at this instant
    pub async fn snapshot(&self) -> (String, String, u64) {
        let state = self.state.read().await;
        (
            state.device_id.clone(),
            state.signature.clone(),
            state.generation,
        )
    }

    /// Consecutive failed session re-creations
    pub async fn retry_count(&self) -> u32 {
        self.state.read().await.retry_count
    }

    /// Exclusive access for session repair. Requests wait for the repair to finish.
    pub(crate) async fn lock(&self) -> RwLockWriteGuard<'_, SigningState> {
        self.state.write().await
    }
}

/// Process wide map from identity to its [`SigningContext`].
#[derive(Debug, Default)]
pub struct SigningRegistry {
    contexts: Mutex<HashMap<String, Arc<SigningContext>>>,
}

impl SigningRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The context for `user_id`, created with [`SigningContext::secp256k1`] on first use.
    pub fn get_or_init(&self, user_id: &str, app_id: &str) -> Result<Arc<SigningContext>, Error> {
        self.get_or_insert_with(user_id, || SigningContext::secp256k1(user_id, app_id))
    }

    /// The context for `user_id`, created with `init` on first use.
    pub fn get_or_insert_with<F>(&self, user_id: &str, init: F) -> Result<Arc<SigningContext>, Error>
    where
        F: FnOnce() -> Result<SigningContext, Error>,
    {
        let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ctx) = contexts.get(user_id) {
            return Ok(ctx.clone());
        }
        tracing::debug!("initializing signing state for user {user_id}");
        let ctx = Arc::new(init()?);
        contexts.insert(user_id.to_owned(), ctx.clone());
        Ok(ctx)
    }

    /// The context for `user_id`, if one exists
    pub fn get(&self, user_id: &str) -> Option<Arc<SigningContext>> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    /// Drop the context for `user_id`, e.g. when the identity is removed.
    pub fn evict(&self, user_id: &str) -> Option<Arc<SigningContext>> {
        self.contexts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id)
    }
}
