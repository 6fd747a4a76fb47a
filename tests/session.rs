use std::time::Duration;

use amocrm_api::{Error, HttpSession, Session};
use httpmock::prelude::*;
use reqwest::Method;
use serde_json::json;

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn query_params_are_passed_through_raw() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v4/leads")
                .query_param("limit", "10")
                .query_param("page", "2");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"_embedded":{"leads":[]}}"#);
        })
        .await;

    let session = HttpSession::new().unwrap();
    let response = session
        .request(
            Method::GET,
            &server.url("/api/v4/leads"),
            None,
            None,
            Some(&[
                ("limit".to_string(), "10".to_string()),
                ("page".to_string(), "2".to_string()),
            ]),
            TIMEOUT,
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, 200);
    assert_eq!(response.json(), json!({ "_embedded": { "leads": [] } }));
}

#[tokio::test]
async fn post_sends_json_with_the_json_content_type() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/oauth2/access_token")
                .header("content-type", "application/json")
                .json_body(json!({ "grant_type": "refresh_token" }));
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"t"}"#);
        })
        .await;

    let session = HttpSession::new().unwrap();
    let response = session
        .post(
            &server.url("/oauth2/access_token"),
            &json!({ "grant_type": "refresh_token" }),
            TIMEOUT,
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status, 200);
    assert_eq!(response.json(), json!({ "access_token": "t" }));
}

#[tokio::test]
async fn error_statuses_keep_the_raw_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v4/leads");
            then.status(404).body("No leads here");
        })
        .await;

    let session = HttpSession::new().unwrap();
    let response = session
        .request(
            Method::GET,
            &server.url("/api/v4/leads"),
            None,
            None,
            None,
            TIMEOUT,
        )
        .await
        .unwrap();

    assert_eq!(response.status, 404);
    assert_eq!(response.text, "No leads here");
    // error bodies are never JSON-decoded
    assert_eq!(response.json(), json!({}));
}

#[tokio::test]
async fn empty_success_bodies_decode_to_an_empty_mapping() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v4/contacts");
            then.status(200);
        })
        .await;

    let session = HttpSession::new().unwrap();
    let response = session
        .request(
            Method::GET,
            &server.url("/api/v4/contacts"),
            None,
            None,
            None,
            TIMEOUT,
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.text, "");
    assert_eq!(response.json(), json!({}));
}

#[tokio::test]
async fn connection_failures_are_network_errors() {
    let session = HttpSession::new().unwrap();
    // nothing listens on the discard port
    let error = session
        .request(
            Method::GET,
            "http://127.0.0.1:9/api/v4/leads",
            None,
            None,
            None,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

    assert!(matches!(error, Error::Network(_)));
}
