//! Tri-state authorizer chain.
//!
//! Every registered authorizer runs for every request, in descending
//! priority order, against one shared [`Decision`]. The value left after the
//! last authorizer is the verdict; anything but [`Decision::Granted`] rejects.

pub mod directory;
pub mod errors;
pub mod file;

use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::authz::errors::AuthorizerFailure;
use crate::claims::ClaimSet;
use crate::errors::TokenError;
use crate::scope::ScopeRequest;
use crate::settings::{AuthorizerKind, AuthorizerSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decision {
    #[default]
    Abstain,
    Granted,
    Denied,
}

/// Username and password presented through HTTP basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Per-request state handed to each authorizer in turn.
pub struct AuthContext<'a> {
    credentials: &'a Credentials,
    scope: Option<&'a ScopeRequest>,
    claims: &'a mut ClaimSet,
    decision: Decision,
}

impl<'a> AuthContext<'a> {
    pub fn new(
        credentials: &'a Credentials,
        scope: Option<&'a ScopeRequest>,
        claims: &'a mut ClaimSet,
    ) -> Self {
        Self {
            credentials,
            scope,
            claims,
            decision: Decision::Abstain,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        self.credentials
    }

    pub fn scope(&self) -> Option<&ScopeRequest> {
        self.scope
    }

    pub fn claims(&self) -> &ClaimSet {
        &*self.claims
    }

    pub fn claims_mut(&mut self) -> &mut ClaimSet {
        &mut *self.claims
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn set_decision(&mut self, decision: Decision) {
        self.decision = decision;
    }

    pub fn grant(&mut self) {
        self.decision = Decision::Granted;
    }

    pub fn deny(&mut self) {
        self.decision = Decision::Denied;
    }

    pub fn is_granted(&self) -> bool {
        self.decision == Decision::Granted
    }

    pub fn is_denied(&self) -> bool {
        self.decision == Decision::Denied
    }
}

/// A pluggable authentication backend.
///
/// Implementations that should not override an earlier verdict must check
/// [`AuthContext::decision`] themselves; the chain always invokes them.
#[async_trait]
pub trait Authorizer: Send + Sync {
    fn name(&self) -> &str;

    async fn authorize(&self, ctx: &mut AuthContext<'_>) -> Result<(), AuthorizerFailure>;
}

/// Adapts a synchronous closure into an [`Authorizer`].
pub struct FnAuthorizer<F> {
    name: String,
    f: F,
}

impl<F> FnAuthorizer<F>
where
    F: Fn(&mut AuthContext<'_>) -> Result<(), AuthorizerFailure> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Authorizer for FnAuthorizer<F>
where
    F: Fn(&mut AuthContext<'_>) -> Result<(), AuthorizerFailure> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn authorize(&self, ctx: &mut AuthContext<'_>) -> Result<(), AuthorizerFailure> {
        (self.f)(ctx)
    }
}

#[derive(Clone)]
pub struct AuthorizerRegistration {
    pub priority: i32,
    pub handler: Arc<dyn Authorizer>,
}

impl fmt::Debug for AuthorizerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizerRegistration")
            .field("priority", &self.priority)
            .field("handler", &self.handler.name())
            .finish()
    }
}

pub const DEFAULT_AUTHORIZER_TIMEOUT: Duration = Duration::from_secs(10);

/// Ordered authorizer registrations. Built at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct AuthorizerChain {
    registrations: Vec<AuthorizerRegistration>,
    timeout: Duration,
}

impl Default for AuthorizerChain {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHORIZER_TIMEOUT)
    }
}

impl AuthorizerChain {
    pub fn new(timeout: Duration) -> Self {
        Self {
            registrations: Vec::new(),
            timeout,
        }
    }

    /// Add an authorizer. Higher priorities run first; equal priorities keep
    /// registration order.
    pub fn register(&mut self, priority: i32, handler: Arc<dyn Authorizer>) {
        self.registrations
            .push(AuthorizerRegistration { priority, handler });
        self.registrations.sort_by_key(|r| Reverse(r.priority));
    }

    pub fn with(mut self, priority: i32, handler: impl Authorizer + 'static) -> Self {
        self.register(priority, Arc::new(handler));
        self
    }

    pub fn registrations(&self) -> &[AuthorizerRegistration] {
        &self.registrations
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Run every authorizer and return the final decision. The first
    /// failure (or timeout) stops the chain.
    pub async fn evaluate(
        &self,
        credentials: &Credentials,
        scope: Option<&ScopeRequest>,
        claims: &mut ClaimSet,
    ) -> Result<Decision, TokenError> {
        let mut ctx = AuthContext::new(credentials, scope, claims);

        for registration in &self.registrations {
            let name = registration.handler.name();
            let outcome =
                tokio::time::timeout(self.timeout, registration.handler.authorize(&mut ctx)).await;

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(_) => Some(AuthorizerFailure::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                }),
            };
            if let Some(source) = failure {
                tracing::error!(authorizer = name, error = %source, "Authorizer failed, aborting chain");
                return Err(TokenError::AuthorizerFailure {
                    authorizer: name.to_string(),
                    source,
                });
            }

            tracing::debug!(
                authorizer = name,
                priority = registration.priority,
                decision = ?ctx.decision(),
                "Authorizer evaluated"
            );
        }

        Ok(ctx.decision())
    }
}

/// Build the chain described by the `authorizers` settings section.
pub fn build_chain(
    settings: &[AuthorizerSettings],
    timeout: Duration,
) -> Result<AuthorizerChain, TokenError> {
    let mut chain = AuthorizerChain::new(timeout);
    for entry in settings {
        let handler: Arc<dyn Authorizer> = match entry.kind {
            AuthorizerKind::File => {
                let path = entry.path.as_ref().ok_or_else(|| {
                    TokenError::InvalidSettings("file authorizer requires `path`".into())
                })?;
                Arc::new(file::FileAuthorizer::load(path)?)
            }
            AuthorizerKind::Directory => Arc::new(directory::DirectoryAuthorizer::from_settings(entry)?),
        };
        tracing::info!(
            authorizer = handler.name(),
            priority = entry.priority,
            "Registered authorizer"
        );
        chain.register(entry.priority, handler);
    }
    Ok(chain)
}
