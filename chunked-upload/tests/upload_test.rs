/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chunked_upload::auth::{AuthEndpoints, AuthenticatedClient, Identity, Tokens};
use chunked_upload::error::ErrorKind;
use chunked_upload::io::ContentStream;
use chunked_upload::metrics::Throughput;
use chunked_upload::operation::upload::{
    ContentHash, JsonUploadApi, UploadEndpoints, UploadSession,
};
use chunked_upload::types::{ConcurrencySetting, RemoteErrorCode};
use chunked_upload::{Client, Config};
use tempfile::NamedTempFile;
use test_common::{etag, init_logs, pattern, MockHttpClient, MockUploadApi, PART_BASE_URL};

const MIB: usize = 1024 * 1024;

fn client_with(http: &Arc<MockHttpClient>, concurrency: usize) -> Client {
    Client::new(
        Config::builder()
            .http_client(http.clone())
            .concurrency(ConcurrencySetting::Explicit(concurrency))
            .build(),
    )
}

type Seen = Arc<Mutex<Vec<f64>>>;

fn progress_sink() -> (Seen, impl Fn(f64) + Send + Sync + 'static) {
    let seen = Seen::default();
    let sink = seen.clone();
    (seen, move |pct| sink.lock().unwrap().push(pct))
}

fn reassemble(http: &MockHttpClient) -> Bytes {
    let mut puts = http.part_puts();
    puts.sort_by_key(|req| req.part().unwrap().1);
    let mut buf = BytesMut::new();
    for put in puts {
        buf.extend_from_slice(&put.body);
    }
    buf.freeze()
}

#[tokio::test(start_paused = true)]
async fn test_upload_splits_content_into_parts() {
    init_logs();
    let http = Arc::new(MockHttpClient::new().with_delay(Duration::from_millis(50)));
    let api = Arc::new(MockUploadApi::new().with_part_size(10 * MIB as u64));
    let content = pattern(25 * MIB);
    let (seen, sink) = progress_sink();

    let handle = client_with(&http, 2)
        .upload()
        .api(api.clone())
        .parent_id("root")
        .name("big.bin")
        .body(ContentStream::from(content.clone()))
        .progress(sink)
        .initiate()
        .unwrap();
    let output = handle.join().await.unwrap();

    assert_eq!(3, output.parts_uploaded);
    assert_eq!(25 * MIB as u64, output.size);
    assert_eq!(Some("session-1"), output.session_id());
    assert_eq!(Some("file-1"), output.file_id());
    assert!(!output.rapid_upload);

    let sizes: Vec<usize> = {
        let mut puts = http.part_puts();
        puts.sort_by_key(|req| req.part().unwrap().1);
        puts.iter().map(|req| req.body.len()).collect()
    };
    assert_eq!(vec![10 * MIB, 10 * MIB, 5 * MIB], sizes);
    assert_eq!(content, reassemble(&http));
    assert_eq!(2, http.max_in_flight());
    assert_eq!(1, api.complete_calls());
    assert_eq!(Some(etag(&content)), api.created()[0].etag);

    let seen = seen.lock().unwrap();
    assert_eq!(5, seen.len(), "{seen:?}");
    assert_eq!(10.0, seen[0]);
    assert_eq!(95.0, seen[3]);
    assert_eq!(100.0, seen[4]);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_failed_part_is_retried() {
    let http = Arc::new(MockHttpClient::new());
    http.respond_times(&format!("{PART_BASE_URL}/session-1/2"), 2, 500, "");
    let api = Arc::new(MockUploadApi::new().with_part_size(1024));
    let content = pattern(3000);
    let (seen, sink) = progress_sink();

    let output = client_with(&http, 3)
        .upload()
        .api(api.clone())
        .parent_id("root")
        .name("flaky.bin")
        .body(ContentStream::from(content.clone()))
        .progress(sink)
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(3, output.parts_uploaded);
    let part_two = http
        .part_puts()
        .into_iter()
        .filter(|req| req.part().unwrap().1 == 2)
        .count();
    assert_eq!(3, part_two);
    // a fresh part URL is requested for every attempt
    assert_eq!(5, api.part_url_calls());

    // the retried part is only counted once
    let seen = seen.lock().unwrap();
    assert_eq!(5, seen.len(), "{seen:?}");
    assert_eq!(Some(&100.0), seen.last());
}

#[tokio::test(start_paused = true)]
async fn test_part_failure_after_retries_fails_upload() {
    let http = Arc::new(MockHttpClient::new());
    http.respond_times(&format!("{PART_BASE_URL}/session-1/2"), 3, 503, "");
    let api = Arc::new(MockUploadApi::new().with_part_size(1024));

    let err = client_with(&http, 1)
        .upload()
        .api(api.clone())
        .parent_id("root")
        .name("broken.bin")
        .body(ContentStream::from(pattern(3000)))
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap_err();

    match err.kind() {
        ErrorKind::ChunkFailed(failed) => assert_eq!(2, failed.part_number()),
        other => panic!("unexpected error kind {other:?}"),
    }
    // part 3 is never dispatched once part 2 failed permanently
    assert_eq!(4, http.part_puts().len());
    assert_eq!(0, api.complete_calls());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_dispatching_parts() {
    let http = Arc::new(MockHttpClient::new().with_delay(Duration::from_secs(1)));
    let api = Arc::new(MockUploadApi::new().with_part_size(1024));

    let handle = client_with(&http, 1)
        .upload()
        .api(api.clone())
        .parent_id("root")
        .name("cancelled.bin")
        .body(ContentStream::from(pattern(5 * 1024)))
        .initiate()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    handle.cancel();
    let err = handle.join().await.unwrap_err();

    assert!(err.is_cancelled(), "{err:?}");
    assert!(http.part_puts().len() <= 2);
    assert_eq!(0, api.complete_calls());
}

#[tokio::test(start_paused = true)]
async fn test_abort_waits_for_parts() {
    let http = Arc::new(MockHttpClient::new().with_delay(Duration::from_secs(1)));
    let api = Arc::new(MockUploadApi::new().with_part_size(1024));

    let handle = client_with(&http, 2)
        .upload()
        .api(api.clone())
        .parent_id("root")
        .name("aborted.bin")
        .body(ContentStream::from(pattern(10 * 1024)))
        .initiate()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    let err = handle.abort().await.unwrap_err();
    assert!(err.is_cancelled(), "{err:?}");
    assert!(http.max_in_flight() <= 2);
    assert!(http.part_puts().len() <= 2);
    assert_eq!(0, api.complete_calls());
}

#[tokio::test(start_paused = true)]
async fn test_async_completion_is_polled() {
    let http = Arc::new(MockHttpClient::new());
    let api = Arc::new(
        MockUploadApi::new()
            .with_part_size(1024)
            .with_async_completion([false, false, true]),
    );
    let start = tokio::time::Instant::now();

    let output = client_with(&http, 2)
        .upload()
        .api(api.clone())
        .parent_id("root")
        .name("assembled.bin")
        .body(ContentStream::from(pattern(2048)))
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(2, output.parts_uploaded);
    assert_eq!(3, api.poll_calls());
    assert!(start.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_async_completion_gives_up() {
    let http = Arc::new(MockHttpClient::new());
    let api = Arc::new(
        MockUploadApi::new()
            .with_part_size(1024)
            .with_async_completion(std::iter::repeat(false).take(100)),
    );
    let client = Client::new(
        Config::builder()
            .http_client(http.clone())
            .poll_interval(Duration::from_secs(1))
            .max_poll_wait(Duration::from_secs(3))
            .build(),
    );

    let err = client
        .upload()
        .api(api.clone())
        .parent_id("root")
        .name("stuck.bin")
        .body(ContentStream::from(pattern(100)))
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap_err();

    assert_eq!(&ErrorKind::CompletionFailed, err.kind());
    assert_eq!(4, api.poll_calls());
}

#[tokio::test]
async fn test_rapid_upload_skips_transfer() {
    let http = Arc::new(MockHttpClient::new());
    let api = Arc::new(MockUploadApi::new().with_proof_secret("access-0"));
    let content = pattern(3000);
    api.store(&content, "file-stored");
    let (seen, sink) = progress_sink();

    let output = client_with(&http, 2)
        .upload()
        .api(api.clone())
        .parent_id("root")
        .name("dup.bin")
        .body(ContentStream::from(content))
        .rapid_upload(true)
        .progress(sink)
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();

    assert!(output.rapid_upload);
    assert_eq!(Some("file-stored"), output.file_id());
    assert_eq!(None, output.session_id());
    assert_eq!(0, output.parts_uploaded);
    assert!(http.part_puts().is_empty());
    assert_eq!(0, api.complete_calls());
    assert_eq!(vec![100.0], *seen.lock().unwrap());

    let created = api.created();
    assert_eq!(2, created.len());
    assert!(matches!(created[0].content_hash, ContentHash::PreHash(_)));
    assert!(matches!(created[1].content_hash, ContentHash::Full { .. }));
}

#[tokio::test]
async fn test_rapid_upload_miss_transfers_content() {
    let http = Arc::new(MockHttpClient::new());
    let api = Arc::new(MockUploadApi::new().with_part_size(1024));
    let content = pattern(3000);

    let output = client_with(&http, 2)
        .upload()
        .api(api.clone())
        .parent_id("root")
        .name("new.bin")
        .body(ContentStream::from(content.clone()))
        .rapid_upload(true)
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();

    assert!(!output.rapid_upload);
    assert_eq!(3, output.parts_uploaded);
    assert_eq!(content, reassemble(&http));
    let created = api.created();
    assert_eq!(1, created.len());
    assert!(matches!(created[0].content_hash, ContentHash::PreHash(_)));
}

#[tokio::test]
async fn test_resume_with_existing_session() {
    let http = Arc::new(MockHttpClient::new());
    let api = Arc::new(MockUploadApi::new());
    let content = pattern(3000);
    let session = UploadSession::new("resumed", 3000, 1024).unwrap();

    let output = client_with(&http, 2)
        .upload()
        .api(api.clone())
        .session(session)
        .body(ContentStream::from(content.clone()))
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(Some("resumed"), output.session_id());
    assert!(api.created().is_empty());
    assert!(http
        .part_puts()
        .iter()
        .all(|req| req.part().unwrap().0 == "resumed"));
    assert_eq!(content, reassemble(&http));
}

#[tokio::test]
async fn test_empty_content() {
    let http = Arc::new(MockHttpClient::new());
    let api = Arc::new(MockUploadApi::new());
    let (seen, sink) = progress_sink();

    let output = client_with(&http, 2)
        .upload()
        .api(api.clone())
        .parent_id("root")
        .name("empty.txt")
        .body(ContentStream::default())
        .progress(sink)
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(0, output.parts_uploaded);
    assert!(http.part_puts().is_empty());
    assert_eq!(1, api.complete_calls());
    assert_eq!(Some(&100.0), seen.lock().unwrap().last());
}

#[tokio::test(start_paused = true)]
async fn test_bandwidth_is_shared_across_parts() {
    let http = Arc::new(MockHttpClient::new());
    let api = Arc::new(MockUploadApi::new().with_part_size(64 * 1024));
    let client = Client::new(
        Config::builder()
            .http_client(http.clone())
            .concurrency(ConcurrencySetting::Explicit(4))
            .max_upload_rate(Throughput::new_bytes_per_sec(64 * 1024))
            .build(),
    );
    let start = tokio::time::Instant::now();

    client
        .upload()
        .api(api)
        .parent_id("root")
        .name("slow.bin")
        .body(ContentStream::from(pattern(256 * 1024)))
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();

    // one second of burst, the remaining 192 KiB at 64 KiB/s
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(2900), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
}

#[tokio::test]
async fn test_invalid_input_is_rejected() {
    let http = Arc::new(MockHttpClient::new());
    let api = Arc::new(MockUploadApi::new());
    let err = client_with(&http, 1)
        .upload()
        .api(api)
        .parent_id("root")
        .body(ContentStream::from("abc"))
        .initiate()
        .unwrap_err();
    assert_eq!(&ErrorKind::InputInvalid, err.kind());
}

fn temp_file(content: &[u8]) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().unwrap();
    tmp.write_all(content).unwrap();
    tmp
}

#[tokio::test]
async fn test_part_size_larger_than_file() {
    let content = pattern(100);
    let tmp = temp_file(&content);

    let http = Arc::new(MockHttpClient::new());
    let api = Arc::new(MockUploadApi::new().with_part_size(1 << 50));
    let output = client_with(&http, 2)
        .upload()
        .api(api.clone())
        .parent_id("root")
        .name("small.bin")
        .body(ContentStream::from_path(tmp.path()).unwrap())
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();
    assert_eq!(1, output.parts_uploaded);
    assert_eq!(content, reassemble(&http));

    let http = Arc::new(MockHttpClient::new());
    let output = client_with(&http, 2)
        .upload()
        .api(Arc::new(MockUploadApi::new()))
        .session(UploadSession::new("huge", 100, u64::MAX).unwrap())
        .body(ContentStream::from_path(tmp.path()).unwrap())
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();
    assert_eq!(1, output.parts_uploaded);
    assert_eq!(content, reassemble(&http));
}

#[tokio::test]
async fn test_pre_hash_match_without_proof_secret_transfers_content() {
    let http = Arc::new(MockHttpClient::new());
    let api = Arc::new(MockUploadApi::new().with_part_size(1024));
    let content = pattern(3000);
    api.store(&content, "file-stored");

    let output = client_with(&http, 2)
        .upload()
        .api(api.clone())
        .parent_id("root")
        .name("dup.bin")
        .body(ContentStream::from(content.clone()))
        .rapid_upload(true)
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();

    assert!(!output.rapid_upload);
    assert_eq!(3, output.parts_uploaded);
    assert_eq!(content, reassemble(&http));
    let created = api.created();
    assert_eq!(2, created.len());
    assert!(matches!(created[0].content_hash, ContentHash::PreHash(_)));
    assert_eq!(ContentHash::None, created[1].content_hash);
    assert_eq!(Some(etag(&content)), created[1].etag);
}

const CREATE_URL: &str = "https://api.test/upload/create";
const PART_URL_URL: &str = "https://api.test/upload/part-url";
const COMPLETE_URL: &str = "https://api.test/upload/complete";
const POLL_URL: &str = "https://api.test/upload/status";
const REFRESH_URL: &str = "https://auth.test/token";
const SESSION_URL: &str = "https://auth.test/session";
const PUT_URL: &str = "https://parts.test/s-1/put";

const SESSION_CREATED: &str =
    r#"{"code":0,"message":"ok","data":{"preuploadID":"s-1","reuse":false,"sliceSize":1024}}"#;
const PART_URL: &str =
    r#"{"code":0,"message":"ok","data":{"presignedURL":"https://parts.test/s-1/put"}}"#;
const COMPLETED: &str = r#"{"code":0,"message":"ok","data":{"completed":true,"fileID":77}}"#;
const TOKEN_EXPIRED: &str = r#"{"code":"AccessTokenInvalid","message":"token expired"}"#;

fn json_api(http: &Arc<MockHttpClient>) -> Arc<JsonUploadApi> {
    let identity = Identity::builder()
        .user_id("user-1")
        .app_id("app-1")
        .tokens(Tokens::new("access-0", "refresh-0"))
        .endpoints(AuthEndpoints {
            refresh_url: REFRESH_URL.to_owned(),
            session_url: SESSION_URL.to_owned(),
        })
        .http_client(http.clone())
        .build()
        .unwrap();
    Arc::new(JsonUploadApi::new(
        AuthenticatedClient::new(Arc::new(identity), http.clone()),
        UploadEndpoints {
            create: CREATE_URL.to_owned(),
            part_url: PART_URL_URL.to_owned(),
            complete: COMPLETE_URL.to_owned(),
            poll: POLL_URL.to_owned(),
        },
    ))
}

#[tokio::test(start_paused = true)]
async fn test_json_api_refreshes_once_for_concurrent_parts() {
    init_logs();
    let http = Arc::new(MockHttpClient::new().with_delay(Duration::from_millis(10)));
    http.respond_always(CREATE_URL, 200, SESSION_CREATED)
        .respond_times(PART_URL_URL, 3, 401, TOKEN_EXPIRED)
        .respond_always(PART_URL_URL, 200, PART_URL)
        .respond_always(COMPLETE_URL, 200, COMPLETED)
        .respond_always(
            REFRESH_URL,
            200,
            r#"{"access_token":"access-1","refresh_token":"refresh-1"}"#,
        );
    let content = pattern(3000);
    let (seen, sink) = progress_sink();

    let output = client_with(&http, 3)
        .upload()
        .api(json_api(&http))
        .parent_id("root")
        .name("a.bin")
        .body(ContentStream::from(content.clone()))
        .progress(sink)
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(Some("s-1"), output.session_id());
    assert_eq!(Some("77"), output.file_id());
    assert_eq!(3, output.parts_uploaded);

    let create = http.requests_to(CREATE_URL);
    assert_eq!(1, create.len());
    let body = create[0].json();
    assert_eq!("root", body["parentFileId"]);
    assert_eq!("a.bin", body["filename"]);
    assert_eq!(3000, body["size"]);
    assert_eq!(etag(&content), body["etag"]);

    // every part hit the expired credential once, only one refresh was made
    assert_eq!(1, http.requests_to(REFRESH_URL).len());
    let part_urls = http.requests_to(PART_URL_URL);
    assert_eq!(6, part_urls.len());
    let mut slices: Vec<u64> = part_urls
        .iter()
        .map(|req| req.json()["sliceNo"].as_u64().unwrap())
        .collect();
    slices.sort_unstable();
    assert_eq!(vec![1, 1, 2, 2, 3, 3], slices);

    let mut bodies: Vec<Bytes> = http
        .requests_to(PUT_URL)
        .into_iter()
        .map(|req| req.body)
        .collect();
    bodies.sort();
    let mut expected = vec![
        content.slice(0..1024),
        content.slice(1024..2048),
        content.slice(2048..3000),
    ];
    expected.sort();
    assert_eq!(expected, bodies);
    assert_eq!(1, http.requests_to(COMPLETE_URL).len());

    let seen = seen.lock().unwrap();
    assert_eq!(5, seen.len(), "{seen:?}");
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(Some(&100.0), seen.last());
}

#[tokio::test]
async fn test_json_api_envelope_error_fails_session_creation() {
    let http = Arc::new(MockHttpClient::new());
    http.respond_always(
        CREATE_URL,
        200,
        r#"{"code":5113,"message":"parent folder missing"}"#,
    );

    let err = client_with(&http, 2)
        .upload()
        .api(json_api(&http))
        .parent_id("missing")
        .name("a.bin")
        .body(ContentStream::from(pattern(100)))
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap_err();

    assert_eq!(&ErrorKind::SessionCreateFailed, err.kind());
    assert_eq!(
        Some(&RemoteErrorCode::Other("5113".to_owned())),
        err.remote_code()
    );
    assert!(http.requests_to(PART_URL_URL).is_empty());
    assert!(http.requests_to(COMPLETE_URL).is_empty());
}

#[tokio::test]
async fn test_json_api_reused_content_skips_transfer() {
    let http = Arc::new(MockHttpClient::new());
    http.respond_always(
        CREATE_URL,
        200,
        r#"{"code":0,"message":"ok","data":{"reuse":true,"fileID":"f-9"}}"#,
    );

    let output = client_with(&http, 2)
        .upload()
        .api(json_api(&http))
        .parent_id("root")
        .name("a.bin")
        .body(ContentStream::from(pattern(3000)))
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();

    assert!(output.rapid_upload);
    assert_eq!(Some("f-9"), output.file_id());
    assert_eq!(0, output.parts_uploaded);
    assert!(http.requests_to(PART_URL_URL).is_empty());
    assert!(http.requests_to(PUT_URL).is_empty());
    assert!(http.requests_to(COMPLETE_URL).is_empty());
}

#[tokio::test]
async fn test_json_api_pre_hash_match_submits_full_hash() {
    let http = Arc::new(MockHttpClient::new());
    http.respond(
        CREATE_URL,
        400,
        r#"{"code":"PreHashMatched","message":"pre hash matched"}"#,
    )
    .respond_always(
        CREATE_URL,
        200,
        r#"{"code":0,"message":"ok","data":{"reuse":true,"fileID":"f-1"}}"#,
    );
    let content = pattern(3000);

    let output = client_with(&http, 2)
        .upload()
        .api(json_api(&http))
        .parent_id("root")
        .name("a.bin")
        .body(ContentStream::from(content.clone()))
        .rapid_upload(true)
        .initiate()
        .unwrap()
        .join()
        .await
        .unwrap();

    assert!(output.rapid_upload);
    assert_eq!(Some("f-1"), output.file_id());
    assert!(http.requests_to(PUT_URL).is_empty());

    let create = http.requests_to(CREATE_URL);
    assert_eq!(2, create.len());
    let first = create[0].json();
    assert_eq!(40, first["preHash"].as_str().unwrap().len());
    assert!(first.get("contentHash").is_none());
    assert_eq!(etag(&content), first["etag"]);

    let full = create[1].json();
    assert!(full.get("preHash").is_none());
    assert_eq!(40, full["contentHash"].as_str().unwrap().len());
    assert_eq!("sha1", full["contentHashName"]);
    assert!(!full["proofCode"].as_str().unwrap().is_empty());
    assert_eq!("v1", full["proofVersion"]);
    assert_eq!(etag(&content), full["etag"]);
}
