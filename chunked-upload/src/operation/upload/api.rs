/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;

use async_trait::async_trait;
use http::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedClient;
use crate::error::{self, Error};
use crate::operation::upload::session::{
    CompleteOutput, ContentHash, CreateSessionOutput, CreateSessionRequest, UploadSession,
};
use crate::types::RemoteErrorCode;

/// The remote service operations an upload is driven through.
///
/// Vendor specific request and response mapping lives behind this trait, the upload engine
/// only sees sessions, part URLs and completion status.
#[async_trait]
pub trait UploadApi: Send + Sync + fmt::Debug {
    /// Open a session. A [`RemoteErrorCode::PreHashMatched`] error reports that the pre-hash
    /// matches stored content and a full hash should be submitted.
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreateSessionOutput, Error>;

    /// A short-lived URL to `PUT` part `part_number` (1-indexed) to.
    async fn part_url(&self, session: &UploadSession, part_number: u64) -> Result<String, Error>;

    /// Finalize the session once every part has been transferred.
    async fn complete(&self, session: &UploadSession) -> Result<CompleteOutput, Error>;

    /// Poll an asynchronously finalizing session, true once finished.
    async fn poll_completion(&self, session: &UploadSession) -> Result<bool, Error>;

    /// Secret the rapid-upload proof offset is derived from, usually the access credential.
    async fn proof_secret(&self) -> Option<String> {
        None
    }
}

/// Endpoints used by [`JsonUploadApi`]
#[derive(Debug, Clone)]
pub struct UploadEndpoints {
    /// Opens a session
    pub create: String,
    /// Returns a part URL
    pub part_url: String,
    /// Finalizes a session
    pub complete: String,
    /// Reports asynchronous finalization status
    pub poll: String,
}

/// [`UploadApi`] speaking a JSON envelope protocol over an [`AuthenticatedClient`].
///
/// Every response is `{"code": 0, "message": "...", "data": {...}}`, a non-zero numeric code is
/// reported as [`ErrorKind::RemoteError`](crate::error::ErrorKind::RemoteError).
#[derive(Debug, Clone)]
pub struct JsonUploadApi {
    client: AuthenticatedClient,
    endpoints: UploadEndpoints,
}

impl JsonUploadApi {
    /// Create a new API over `client`
    pub fn new(client: AuthenticatedClient, endpoints: UploadEndpoints) -> Self {
        Self { client, endpoints }
    }

    async fn call<Req, Res>(&self, url: &str, body: &Req) -> Result<Res, Error>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let envelope: Envelope<Res> = self.client.send_json(Method::POST, url, body).await?;
        if envelope.code != 0 {
            return Err(error::remote(
                RemoteErrorCode::Other(envelope.code.to_string()),
                envelope.message,
            ));
        }
        envelope
            .data
            .ok_or_else(|| error::malformed_response(format!("{url}: response has no data")))
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a> {
    parent_file_id: &'a str,
    filename: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<&'a str>,
    size: u64,
    duplicate: u8,
    contain_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pre_hash: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_hash: Option<&'a str>,
    content_hash_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    proof_code: Option<&'a str>,
    proof_version: &'static str,
}

impl<'a> From<&'a CreateSessionRequest> for CreateBody<'a> {
    fn from(req: &'a CreateSessionRequest) -> Self {
        let (pre_hash, content_hash, proof_code) = match &req.content_hash {
            ContentHash::None => (None, None, None),
            ContentHash::PreHash(pre) => (Some(pre.as_str()), None, None),
            ContentHash::Full { sha1, proof_code } => {
                (None, Some(sha1.as_str()), Some(proof_code.as_str()))
            }
        };
        CreateBody {
            parent_file_id: &req.parent_id,
            filename: &req.name,
            etag: req.etag.as_deref(),
            size: req.size,
            duplicate: req.duplicate.as_code(),
            contain_dir: false,
            mime_type: req.mime_type.as_deref(),
            pre_hash,
            content_hash,
            content_hash_name: if content_hash.is_some() { "sha1" } else { "none" },
            proof_code,
            proof_version: "v1",
        }
    }
}

#[derive(Deserialize)]
struct CreateData {
    #[serde(rename = "preuploadID", default)]
    preupload_id: String,
    #[serde(rename = "fileID", default)]
    file_id: Option<serde_json::Value>,
    #[serde(default)]
    reuse: bool,
    #[serde(rename = "sliceSize", default)]
    slice_size: Option<u64>,
}

#[derive(Serialize)]
struct SessionBody<'a> {
    #[serde(rename = "preuploadID")]
    preupload_id: &'a str,
}

#[derive(Serialize)]
struct PartUrlBody<'a> {
    #[serde(rename = "preuploadID")]
    preupload_id: &'a str,
    #[serde(rename = "sliceNo")]
    slice_no: u64,
}

#[derive(Deserialize)]
struct PartUrlData {
    #[serde(rename = "presignedURL")]
    presigned_url: String,
}

#[derive(Deserialize)]
struct CompleteData {
    #[serde(default)]
    completed: bool,
    #[serde(rename = "async", default)]
    async_completion: bool,
    #[serde(rename = "fileID", default)]
    file_id: Option<serde_json::Value>,
}

/// Object identifiers come back as either numbers or strings
fn id_string(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) if n.as_u64() != Some(0) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl UploadApi for JsonUploadApi {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreateSessionOutput, Error> {
        let data: CreateData = self
            .call(&self.endpoints.create, &CreateBody::from(request))
            .await?;
        let file_id = id_string(data.file_id);
        if data.reuse {
            return Ok(CreateSessionOutput {
                file_id,
                already_exists: true,
                ..Default::default()
            });
        }
        if data.preupload_id.is_empty() {
            return Err(error::malformed_response("session id is missing"));
        }
        Ok(CreateSessionOutput {
            session_id: data.preupload_id,
            file_id,
            part_size: data.slice_size.filter(|size| *size > 0),
            already_exists: false,
        })
    }

    async fn part_url(&self, session: &UploadSession, part_number: u64) -> Result<String, Error> {
        let data: PartUrlData = self
            .call(
                &self.endpoints.part_url,
                &PartUrlBody {
                    preupload_id: session.session_id(),
                    slice_no: part_number,
                },
            )
            .await?;
        Ok(data.presigned_url)
    }

    async fn complete(&self, session: &UploadSession) -> Result<CompleteOutput, Error> {
        let data: CompleteData = self
            .call(
                &self.endpoints.complete,
                &SessionBody {
                    preupload_id: session.session_id(),
                },
            )
            .await?;
        Ok(CompleteOutput {
            completed: data.completed,
            async_completion: data.async_completion,
            file_id: id_string(data.file_id),
        })
    }

    async fn poll_completion(&self, session: &UploadSession) -> Result<bool, Error> {
        let data: CompleteData = self
            .call(
                &self.endpoints.poll,
                &SessionBody {
                    preupload_id: session.session_id(),
                },
            )
            .await?;
        Ok(data.completed)
    }

    async fn proof_secret(&self) -> Option<String> {
        Some(self.client.authority().access_token().await)
    }
}
