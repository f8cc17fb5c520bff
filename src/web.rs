//! HTTP endpoints. The registry redirects clients to the token route with
//! `scope`/`service`/`account` query parameters and HTTP basic credentials.
use crate::authz::Credentials;
use crate::errors::TokenError;
use crate::issuer::{TokenIssuer, TokenRequest};
use crate::scope::ScopeRequest;
use crate::settings::Settings;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64ct::{Base64, Encoding};
use miette::IntoDiagnostic;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

const AUTH_USER_HEADER: &str = "x-auth-user";
const AUTH_PASSWORD_HEADER: &str = "x-auth-password";

#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<TokenIssuer>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub scope: Option<String>,
    pub account: Option<String>,
    pub service: Option<String>,
}

/// Router serving the token endpoint at `route` (with and without its
/// trailing slash) plus `/healthz`.
pub fn router(route: &str, issuer: Arc<TokenIssuer>) -> Router {
    let state = AppState { issuer };

    let mut router = Router::new().route("/healthz", get(healthz));
    router = router.route(route, get(token));
    let trimmed = route.trim_end_matches('/');
    if !trimmed.is_empty() && trimmed != route {
        router = router.route(trimmed, get(token));
    }

    router.with_state(state)
}

pub async fn serve(settings: Settings, issuer: Arc<TokenIssuer>) -> miette::Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;

    let router = router(&settings.server.route, issuer);

    tracing::info!(%addr, route = %settings.server.route, "Token service listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;
    tracing::info!("Token service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<Response, TokenError> {
    let credentials = extract_credentials(&headers)?;
    let scope = ScopeRequest::from_param(query.scope.as_deref())?;

    tracing::info!(
        username = %credentials.username,
        scope = ?scope.as_ref().map(|s| s.to_string()),
        service = ?query.service,
        account = ?query.account,
        "Token requested"
    );

    let request = TokenRequest {
        credentials,
        scope,
        account: query.account,
    };
    let issued = state.issuer.issue(&request).await?;

    let mut resp = Json(issued).into_response();
    let h = resp.headers_mut();
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    h.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    Ok(resp)
}

/// Credentials from the `X-Auth-User`/`X-Auth-Password` pair when both are
/// present, else from `Authorization: Basic`.
pub fn extract_credentials(headers: &HeaderMap) -> Result<Credentials, TokenError> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let (Some(user), Some(pass)) = (
        header_str(AUTH_USER_HEADER),
        header_str(AUTH_PASSWORD_HEADER),
    ) {
        return Ok(Credentials::new(user, pass));
    }

    let auth_val = header_str(header::AUTHORIZATION.as_str())
        .ok_or_else(|| TokenError::MalformedRequest("missing credentials".into()))?;
    let (scheme, b64) = auth_val
        .split_once(' ')
        .ok_or_else(|| TokenError::MalformedRequest("malformed Authorization header".into()))?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(TokenError::MalformedRequest(format!(
            "unsupported authorization scheme `{scheme}`"
        )));
    }

    let decoded = Base64::decode_vec(b64.trim())
        .map_err(|_| TokenError::MalformedRequest("invalid base64 in credentials".into()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| TokenError::MalformedRequest("credentials are not UTF-8".into()))?;
    let (user, pass) = decoded
        .split_once(':')
        .ok_or_else(|| TokenError::MalformedRequest("credentials lack a `:` separator".into()))?;
    Ok(Credentials::new(user, pass))
}
