mod helpers;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use helpers::{basic_auth, decode_token, foo_bar, IssuerBuilder};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tollgate::authz::errors::AuthorizerFailure;
use tollgate::authz::FnAuthorizer;
use tollgate::web;
use tower::ServiceExt;

const ROUTE: &str = "/v2/token/";

fn app() -> Router {
    let issuer = IssuerBuilder::new()
        .with_authorizer(0, FnAuthorizer::new("static", foo_bar))
        .build_shared();
    web::router(ROUTE, issuer)
}

async fn send(
    app: Router,
    uri: &str,
    authorization: Option<&str>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    let response = app
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

#[tokio::test]
async fn test_token_endpoint_issues_token() {
    let (status, headers, body) = send(
        app(),
        "/v2/token/?service=registry.docker.com&scope=repository:php:pull,push",
        Some(&basic_auth("foo", "bar")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    assert_eq!(headers[header::PRAGMA], "no-cache");
    assert_eq!(body["expires_in"], 3600);
    assert!(body["issued_at"].as_str().unwrap().ends_with('Z'));

    let (payload, _) = decode_token(body["token"].as_str().unwrap());
    assert_eq!(payload.subject(), Some("foo"));
    assert_eq!(
        payload.claim("access"),
        Some(&json!([{"type": "repository", "name": "php", "actions": ["pull", "push"]}]))
    );
}

#[tokio::test]
async fn test_route_without_trailing_slash() {
    let (status, _, _) = send(app(), "/v2/token", Some(&basic_auth("foo", "bar"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_or_malformed_credentials() {
    let (status, _, body) = send(app(), ROUTE, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _, _) = send(app(), ROUTE, Some("basic aaa:bbb")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rejected_credentials() {
    let (status, headers, body) =
        send(app(), ROUTE, Some(&basic_auth("fooooo", "baaaaar"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::WWW_AUTHENTICATE], "Basic realm=\"token\"");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_malformed_scope() {
    let (status, _, _) = send(
        app(),
        "/v2/token/?scope=repository:php",
        Some(&basic_auth("foo", "bar")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_authorizer_failure_is_server_error() {
    let issuer = IssuerBuilder::new()
        .with_authorizer(
            0,
            FnAuthorizer::new("backend", |_ctx| {
                Err(AuthorizerFailure::Backend("directory unreachable".into()))
            }),
        )
        .build_shared();
    let (status, _, body) = send(
        web::router(ROUTE, issuer),
        ROUTE,
        Some(&basic_auth("foo", "bar")),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("backend"));
}

#[tokio::test]
async fn test_healthz() {
    let response = app()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");
}
