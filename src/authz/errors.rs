use miette::Diagnostic;
use thiserror::Error;

use crate::errors::ClaimError;

/// An authorizer could not reach a verdict. Distinct from a denial: the
/// chain stops and the request fails with an internal error.
#[derive(Debug, Error, Diagnostic)]
pub enum AuthorizerFailure {
    #[error("backend unavailable: {0}")]
    #[diagnostic(
        code(tollgate::authz::backend),
        help("Check that the authorizer's backing service is reachable")
    )]
    Backend(String),

    #[error("no verdict within {timeout_secs}s")]
    #[diagnostic(
        code(tollgate::authz::timeout),
        help("Raise token.authorizer_timeout_secs or fix the slow backend")
    )]
    Timeout { timeout_secs: u64 },

    #[error("misconfigured: {0}")]
    #[diagnostic(code(tollgate::authz::misconfigured))]
    Misconfigured(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Claim(#[from] ClaimError),
}
