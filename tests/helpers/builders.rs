use std::sync::Arc;

use base64ct::{Base64, Encoding};
use chrono::Duration;
use tollgate::authz::errors::AuthorizerFailure;
use tollgate::authz::{AuthContext, Authorizer, AuthorizerChain};
use tollgate::issuer::{IssuerConfig, TokenIssuer};

use super::keys::key_manager;

pub const ISSUER: &str = "auth.docker.com";
pub const AUDIENCE: &str = "registry.docker.com";

/// Builder for a [`TokenIssuer`] over the fixture keys
pub struct IssuerBuilder {
    lifetime: Duration,
    chain: AuthorizerChain,
}

impl IssuerBuilder {
    pub fn new() -> Self {
        Self {
            lifetime: Duration::seconds(3600),
            chain: AuthorizerChain::default(),
        }
    }

    pub fn with_lifetime(mut self, secs: i64) -> Self {
        self.lifetime = Duration::seconds(secs);
        self
    }

    pub fn with_authorizer(mut self, priority: i32, authorizer: impl Authorizer + 'static) -> Self {
        self.chain.register(priority, Arc::new(authorizer));
        self
    }

    pub fn build(self) -> TokenIssuer {
        TokenIssuer::new(
            IssuerConfig {
                issuer: ISSUER.to_string(),
                audience: AUDIENCE.to_string(),
                lifetime: self.lifetime,
            },
            self.chain,
            key_manager(),
        )
    }

    pub fn build_shared(self) -> Arc<TokenIssuer> {
        Arc::new(self.build())
    }
}

/// `Authorization` header value for HTTP basic auth
pub fn basic_auth(user: &str, pass: &str) -> String {
    format!(
        "Basic {}",
        Base64::encode_string(format!("{user}:{pass}").as_bytes())
    )
}

/// Grants foo/bar, denies everyone else.
pub fn foo_bar(ctx: &mut AuthContext<'_>) -> Result<(), AuthorizerFailure> {
    if ctx.credentials().username == "foo" && ctx.credentials().password == "bar" {
        ctx.grant();
    } else {
        ctx.deny();
    }
    Ok(())
}
