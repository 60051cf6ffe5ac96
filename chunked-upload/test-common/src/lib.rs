/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Test doubles for the remote service and the HTTP transport.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chunked_upload::error::{Error, ErrorKind};
use chunked_upload::http::{Body, HttpClient, HttpRequest, HttpResponse};
use chunked_upload::operation::upload::{
    CompleteOutput, ContentHash, CreateSessionOutput, CreateSessionRequest, UploadApi,
    UploadSession,
};
use chunked_upload::types::RemoteErrorCode;
use futures_util::StreamExt;
use http::{HeaderMap, Method, StatusCode};
use sha1::{Digest, Sha1};

/// Base URL of the part URLs handed out by [`MockUploadApi`]
pub const PART_BASE_URL: &str = "https://parts.test";

/// Install a `tracing` subscriber honoring `RUST_LOG`, once per test binary
pub fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic, non-repeating test content
pub fn pattern(size: usize) -> Bytes {
    (0..size)
        .map(|i| (i % 251) as u8)
        .collect::<Vec<_>>()
        .into()
}

/// Lowercase hex MD5 of `content`, the etag sent when opening a session
pub fn etag(content: &[u8]) -> String {
    format!("{:x}", md5::compute(content))
}

/// A request seen by [`MockHttpClient`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    /// `(session id, part number)` for a part URL
    pub fn part(&self) -> Option<(String, u64)> {
        let path = self.url.strip_prefix(PART_BASE_URL)?.trim_start_matches('/');
        let (session, part) = path.split_once('/')?;
        Some((session.to_owned(), part.parse().ok()?))
    }

    /// The body parsed as JSON
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<String, VecDeque<HttpResponse>>,
    always: HashMap<String, HttpResponse>,
}

/// [`HttpClient`] double recording every request and answering from a per-URL script.
///
/// Unscripted URLs answer `200` with an empty body.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    script: Mutex<Script>,
    requests: Mutex<Vec<RecordedRequest>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request takes `delay` (on the tokio clock) before it is answered
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer the next request to `url` with `status` and `body`
    pub fn respond(&self, url: &str, status: u16, body: &str) -> &Self {
        self.respond_times(url, 1, status, body)
    }

    /// Answer the next `times` requests to `url` with `status` and `body`
    pub fn respond_times(&self, url: &str, times: usize, status: u16, body: &str) -> &Self {
        let mut script = self.script.lock().unwrap();
        let queue = script.queued.entry(url.to_owned()).or_default();
        for _ in 0..times {
            queue.push_back(response(status, body));
        }
        self
    }

    /// Answer every unqueued request to `url` with `status` and `body`
    pub fn respond_always(&self, url: &str, status: u16, body: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .always
            .insert(url.to_owned(), response(status, body));
        self
    }

    /// Every request seen so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests to exactly `url`
    pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|req| req.url == url)
            .collect()
    }

    /// `PUT` requests to part URLs
    pub fn part_puts(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|req| req.method == Method::PUT && req.part().is_some())
            .collect()
    }

    /// Highest number of concurrent requests observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn answer(&self, url: &str) -> HttpResponse {
        let mut script = self.script.lock().unwrap();
        if let Some(resp) = script.queued.get_mut(url).and_then(VecDeque::pop_front) {
            return resp;
        }
        script
            .always
            .get(url)
            .cloned()
            .unwrap_or_else(|| response(200, ""))
    }
}

fn response(status: u16, body: &str) -> HttpResponse {
    HttpResponse::new(
        StatusCode::from_u16(status).unwrap(),
        Bytes::copy_from_slice(body.as_bytes()),
    )
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn collect(body: Body) -> Result<Bytes, Error> {
    match body {
        Body::Empty => Ok(Bytes::new()),
        Body::Bytes(bytes) => Ok(bytes),
        Body::Stream {
            mut stream,
            content_length,
        } => {
            let mut buf = BytesMut::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|err| Error::new(ErrorKind::RequestFailed, err))?;
                buf.extend_from_slice(&chunk);
            }
            assert_eq!(content_length, buf.len() as u64, "body length mismatch");
            Ok(buf.freeze())
        }
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;
        let body = collect(body).await?;
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            url: url.clone(),
            headers,
            body,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.answer(&url))
    }
}

/// [`UploadApi`] double with content-addressed storage for rapid uploads.
#[derive(Debug, Default)]
pub struct MockUploadApi {
    part_size: Option<u64>,
    proof_secret: Option<String>,
    complete_async: bool,
    polls: Mutex<VecDeque<bool>>,
    stored: Mutex<HashMap<String, String>>,
    stored_pre_hashes: Mutex<HashSet<String>>,
    created: Mutex<Vec<CreateSessionRequest>>,
    part_url_calls: AtomicUsize,
    complete_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    sessions: AtomicUsize,
}

impl MockUploadApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Negotiate `part_size` for every session
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = Some(part_size);
        self
    }

    /// Hand out `secret` for rapid-upload proofs
    pub fn with_proof_secret(mut self, secret: &str) -> Self {
        self.proof_secret = Some(secret.to_owned());
        self
    }

    /// Finalize asynchronously, answering polls from `polls` (then `true`)
    pub fn with_async_completion(mut self, polls: impl IntoIterator<Item = bool>) -> Self {
        self.complete_async = true;
        self.polls = Mutex::new(polls.into_iter().collect());
        self
    }

    /// Pretend `content` is already stored as `file_id`
    pub fn store(&self, content: &[u8], file_id: &str) {
        let head = &content[..content.len().min(1024)];
        self.stored_pre_hashes
            .lock()
            .unwrap()
            .insert(hex::encode(Sha1::digest(head)));
        self.stored
            .lock()
            .unwrap()
            .insert(hex::encode(Sha1::digest(content)), file_id.to_owned());
    }

    /// Every session request received
    pub fn created(&self) -> Vec<CreateSessionRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn part_url_calls(&self) -> usize {
        self.part_url_calls.load(Ordering::SeqCst)
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UploadApi for MockUploadApi {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreateSessionOutput, Error> {
        self.created.lock().unwrap().push(request.clone());
        match &request.content_hash {
            ContentHash::PreHash(pre) if self.stored_pre_hashes.lock().unwrap().contains(pre) => {
                return Err(Error::new(
                    ErrorKind::RemoteError(RemoteErrorCode::PreHashMatched),
                    "pre hash matched",
                ));
            }
            ContentHash::Full { sha1, .. } => {
                if let Some(file_id) = self.stored.lock().unwrap().get(sha1) {
                    return Ok(CreateSessionOutput::existing(file_id.clone()));
                }
            }
            _ => {}
        }
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreateSessionOutput::session(format!("session-{n}"), self.part_size)
            .with_file_id(format!("file-{n}")))
    }

    async fn part_url(&self, session: &UploadSession, part_number: u64) -> Result<String, Error> {
        self.part_url_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "{PART_BASE_URL}/{}/{part_number}",
            session.session_id()
        ))
    }

    async fn complete(&self, _session: &UploadSession) -> Result<CompleteOutput, Error> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if self.complete_async {
            Ok(CompleteOutput::pending())
        } else {
            Ok(CompleteOutput::done())
        }
    }

    async fn poll_completion(&self, _session: &UploadSession) -> Result<bool, Error> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.polls.lock().unwrap().pop_front().unwrap_or(true))
    }

    async fn proof_secret(&self) -> Option<String> {
        self.proof_secret.clone()
    }
}
