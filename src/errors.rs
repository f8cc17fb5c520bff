use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::authz::errors::AuthorizerFailure;

/// Errors raised while mutating a [`ClaimSet`](crate::claims::ClaimSet).
///
/// These are contract violations by authorizers, not runtime conditions a
/// client can fix.
#[derive(Debug, Error, Diagnostic)]
pub enum ClaimError {
    #[error("Invalid claim field `{field}`, available fields: {available}")]
    #[diagnostic(
        code(tollgate::claims::invalid_field),
        help("The claim set only carries iss, sub, aud, iat, nbf, exp, jti and access")
    )]
    InvalidClaimField { field: String, available: String },

    #[error("Invalid value for claim `{field}`: {reason}")]
    #[diagnostic(code(tollgate::claims::invalid_value))]
    InvalidClaimValue { field: String, reason: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum TokenError {
    #[error("Malformed request: {0}")]
    #[diagnostic(code(tollgate::malformed_request))]
    MalformedRequest(String),

    #[error("Malformed scope `{0}`")]
    #[diagnostic(
        code(tollgate::malformed_scope),
        help("Scopes use the form type:name:action[,action...], e.g. repository:my-app:pull,push")
    )]
    MalformedScope(String),

    #[error("Invalid credentials")]
    #[diagnostic(code(tollgate::authentication_rejected))]
    AuthenticationRejected,

    #[error("Authorizer `{authorizer}` failed")]
    #[diagnostic(code(tollgate::authorizer_failure))]
    AuthorizerFailure {
        authorizer: String,
        #[source]
        source: AuthorizerFailure,
    },

    #[error("Invalid key material: {0}")]
    #[diagnostic(
        code(tollgate::invalid_key_material),
        help("Keys must be PEM encoded: -----BEGIN <LABEL>----- ... -----END <LABEL>-----")
    )]
    InvalidKeyMaterial(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Claim(#[from] ClaimError),

    #[error("Invalid settings: {0}")]
    #[diagnostic(code(tollgate::settings))]
    InvalidSettings(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(tollgate::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(tollgate::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(tollgate::serde))]
    Serde(#[from] serde_json::Error),

    #[error("JOSE error: {0}")]
    #[diagnostic(code(tollgate::jose))]
    Jose(String),
}

impl From<josekit::JoseError> for TokenError {
    fn from(value: josekit::JoseError) -> Self {
        TokenError::Jose(value.to_string())
    }
}

impl TokenError {
    pub fn status(&self) -> StatusCode {
        match self {
            TokenError::MalformedRequest(_) | TokenError::MalformedScope(_) => {
                StatusCode::BAD_REQUEST
            }
            TokenError::AuthenticationRejected => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        if status == StatusCode::UNAUTHORIZED {
            (
                status,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"token\"")],
                body,
            )
                .into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(
            TokenError::MalformedRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TokenError::MalformedScope("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TokenError::AuthenticationRejected.status(),
            StatusCode::UNAUTHORIZED
        );
        let failure = TokenError::AuthorizerFailure {
            authorizer: "ldap".into(),
            source: AuthorizerFailure::Backend("unreachable".into()),
        };
        assert_eq!(failure.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            TokenError::InvalidKeyMaterial("bad".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rejection_carries_challenge() {
        let resp = TokenError::AuthenticationRejected.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"token\""
        );
    }
}
