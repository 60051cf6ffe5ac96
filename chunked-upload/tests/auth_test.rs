/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;
use std::time::Duration;

use chunked_upload::auth::{
    AuthEndpoints, AuthenticatedClient, Authority, DelegatedIdentity, Identity, Tokens,
};
use chunked_upload::error::ErrorKind;
use chunked_upload::http::HttpRequest;
use chunked_upload::types::RemoteErrorCode;
use http::Method;
use serde_json::{json, Value};
use test_common::{init_logs, MockHttpClient};

const API_URL: &str = "https://api.test/v1/files";
const REFRESH_URL: &str = "https://auth.test/token";
const SESSION_URL: &str = "https://auth.test/session";

const TOKEN_EXPIRED: &str = r#"{"code":"AccessTokenInvalid","message":"token expired"}"#;
const SIGNATURE_INVALID: &str =
    r#"{"code":"DeviceSessionSignatureInvalid","message":"bad signature"}"#;
const REFRESHED: &str = r#"{"access_token":"access-1","refresh_token":"refresh-1"}"#;

fn identity(http: &Arc<MockHttpClient>) -> Arc<Identity> {
    Arc::new(
        Identity::builder()
            .user_id("user-1")
            .app_id("app-1")
            .tokens(Tokens::new("access-0", "refresh-0"))
            .endpoints(AuthEndpoints {
                refresh_url: REFRESH_URL.to_owned(),
                session_url: SESSION_URL.to_owned(),
            })
            .http_client(http.clone())
            .build()
            .unwrap(),
    )
}

fn header<'a>(req: &'a test_common::RecordedRequest, name: &str) -> &'a str {
    req.headers.get(name).unwrap().to_str().unwrap()
}

#[tokio::test]
async fn test_expired_credential_is_refreshed_once() {
    init_logs();
    let http = Arc::new(MockHttpClient::new());
    http.respond(API_URL, 401, TOKEN_EXPIRED)
        .respond_always(API_URL, 200, r#"{"ok":true}"#)
        .respond_always(REFRESH_URL, 200, REFRESHED);
    let identity = identity(&http);
    let client = AuthenticatedClient::new(identity.clone(), http.clone());

    let resp: Value = client
        .send_json(Method::POST, API_URL, &json!({"name": "a"}))
        .await
        .unwrap();
    assert_eq!(json!({"ok": true}), resp);

    let refreshes = http.requests_to(REFRESH_URL);
    assert_eq!(1, refreshes.len());
    assert_eq!(
        json!({"refresh_token": "refresh-0", "grant_type": "refresh_token"}),
        refreshes[0].json()
    );

    let calls = http.requests_to(API_URL);
    assert_eq!(2, calls.len());
    assert_eq!("access-0", header(&calls[0], "authorization"));
    assert_eq!("access-1", header(&calls[1], "authorization"));
    assert_eq!(json!({"name": "a"}), calls[1].json());
    assert_eq!(Tokens::new("access-1", "refresh-1"), identity.tokens().await);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_refreshes_are_deduplicated() {
    let http = Arc::new(MockHttpClient::new().with_delay(Duration::from_millis(10)));
    http.respond_times(API_URL, 2, 401, TOKEN_EXPIRED)
        .respond_always(API_URL, 200, r#"{"ok":true}"#)
        .respond_always(REFRESH_URL, 200, REFRESHED);
    let client = AuthenticatedClient::new(identity(&http), http.clone());

    let body1 = json!({"n": 1});
    let body2 = json!({"n": 2});
    let (a, b) = tokio::join!(
        client.send_json::<_, Value>(Method::POST, API_URL, &body1),
        client.send_json::<_, Value>(Method::POST, API_URL, &body2),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(1, http.requests_to(REFRESH_URL).len());
    assert_eq!(4, http.requests_to(API_URL).len());
}

#[tokio::test]
async fn test_invalid_signature_recreates_session() {
    let http = Arc::new(MockHttpClient::new());
    http.respond(API_URL, 401, SIGNATURE_INVALID)
        .respond_always(API_URL, 200, r#"{"ok":true}"#)
        .respond_always(SESSION_URL, 200, "{}");
    let identity = identity(&http);
    let client = AuthenticatedClient::new(identity.clone(), http.clone());

    let _: Value = client
        .send_json(Method::POST, API_URL, &json!({}))
        .await
        .unwrap();

    let sessions = http.requests_to(SESSION_URL);
    assert_eq!(1, sessions.len());
    let body = sessions[0].json();
    assert_eq!("samsung", body["deviceName"]);
    assert_eq!("SM-G9810", body["modelName"]);
    assert_eq!(0, body["nonce"]);
    assert_eq!("refresh-0", body["refreshToken"]);
    let pub_key = body["pubKey"].as_str().unwrap();
    assert_eq!(130, pub_key.len());
    assert!(pub_key.starts_with("04"));

    // device id is the hex SHA-256 of the user id
    assert_eq!(
        "c6c289e49e9c05b2145860387b73bcb18df43fb09a1e4a4a9713c76c88bb541b",
        header(&sessions[0], "x-device-id")
    );

    let signing = identity.signing_context();
    let (_, _, generation) = signing.snapshot().await;
    assert_eq!(1, generation);
    assert_eq!(0, signing.retry_count().await);
}

#[tokio::test]
async fn test_session_repair_gives_up_after_three_attempts() {
    let http = Arc::new(MockHttpClient::new());
    http.respond_always(SESSION_URL, 500, "");
    let identity = identity(&http);

    let mut req = HttpRequest::new(Method::GET, API_URL);
    let ticket = identity.sign_request(&mut req).await.unwrap();

    for _ in 0..3 {
        let err = identity.recreate_session(ticket).await.unwrap_err();
        assert_eq!(&ErrorKind::RequestFailed, err.kind());
    }
    assert_eq!(3, identity.signing_context().retry_count().await);

    let err = identity.recreate_session(ticket).await.unwrap_err();
    assert_eq!(&ErrorKind::AuthRepairExhausted, err.kind());
    assert_eq!(0, identity.signing_context().retry_count().await);
    assert_eq!(3, http.requests_to(SESSION_URL).len());
}

#[tokio::test]
async fn test_unknown_code_is_surfaced() {
    let http = Arc::new(MockHttpClient::new());
    http.respond_always(
        API_URL,
        400,
        r#"{"code":"QuotaExhausted","message":"no space left"}"#,
    );
    let client = AuthenticatedClient::new(identity(&http), http.clone());

    let err = client
        .send_json::<_, Value>(Method::POST, API_URL, &json!({}))
        .await
        .unwrap_err();
    assert_eq!(
        Some(&RemoteErrorCode::Other("QuotaExhausted".to_owned())),
        err.remote_code()
    );
    assert_eq!(1, http.requests().len());
}

#[tokio::test]
async fn test_repairs_are_bounded_per_request() {
    let http = Arc::new(MockHttpClient::new());
    http.respond_always(API_URL, 401, TOKEN_EXPIRED)
        .respond_always(REFRESH_URL, 200, REFRESHED);
    let client = AuthenticatedClient::new(identity(&http), http.clone());

    let err = client
        .send_json::<_, Value>(Method::POST, API_URL, &json!({}))
        .await
        .unwrap_err();
    assert_eq!(Some(&RemoteErrorCode::AccessTokenInvalid), err.remote_code());
    assert_eq!(3, http.requests_to(API_URL).len());
    assert_eq!(2, http.requests_to(REFRESH_URL).len());
}

#[tokio::test]
async fn test_refresh_error_is_reported() {
    let http = Arc::new(MockHttpClient::new());
    http.respond_always(API_URL, 401, TOKEN_EXPIRED).respond_always(
        REFRESH_URL,
        400,
        r#"{"code":"InvalidGrant","message":"refresh token revoked"}"#,
    );
    let client = AuthenticatedClient::new(identity(&http), http.clone());

    let err = client
        .send_json::<_, Value>(Method::POST, API_URL, &json!({}))
        .await
        .unwrap_err();
    assert_eq!(
        Some(&RemoteErrorCode::Other("InvalidGrant".to_owned())),
        err.remote_code()
    );
    assert_eq!(1, http.requests_to(API_URL).len());
}

#[tokio::test]
async fn test_delegated_identity_shares_refresh() {
    let http = Arc::new(MockHttpClient::new());
    http.respond(API_URL, 401, TOKEN_EXPIRED)
        .respond_always(API_URL, 200, r#"{"ok":true}"#)
        .respond_always(REFRESH_URL, 200, REFRESHED);
    let primary = identity(&http);
    let delegated = Arc::new(DelegatedIdentity::new(primary.clone()));
    assert_eq!("user-1", delegated.user_id());

    let client = AuthenticatedClient::new(delegated, http.clone());
    let _: Value = client
        .send_json(Method::POST, API_URL, &json!({}))
        .await
        .unwrap();

    assert_eq!(1, http.requests_to(REFRESH_URL).len());
    assert_eq!("access-1", primary.access_token().await);
}
