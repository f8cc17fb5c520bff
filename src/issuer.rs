//! Request orchestration: claim set construction, authorizer chain,
//! verdict, default grant and signing.

use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::Serialize;

use crate::authz::{self, AuthorizerChain, Credentials, Decision};
use crate::claims::ClaimSet;
use crate::errors::TokenError;
use crate::keys::KeyManager;
use crate::scope::{AccessGrant, ScopeRequest};
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct IssuerConfig {
    pub issuer: String,
    pub audience: String,
    pub lifetime: Duration,
}

/// Values extracted from one token request.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub credentials: Credentials,
    pub scope: Option<ScopeRequest>,
    /// `account` parameter; falls back to the username for `sub`
    pub account: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: i64,
    pub issued_at: String,
}

#[derive(Debug)]
pub struct TokenIssuer {
    config: IssuerConfig,
    chain: AuthorizerChain,
    keys: KeyManager,
}

impl TokenIssuer {
    pub fn new(config: IssuerConfig, chain: AuthorizerChain, keys: KeyManager) -> Self {
        Self {
            config,
            chain,
            keys,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, TokenError> {
        let keys = KeyManager::load(&settings.keys)?;
        let chain = authz::build_chain(
            &settings.authorizers,
            StdDuration::from_secs(settings.token.authorizer_timeout_secs),
        )?;
        if chain.is_empty() {
            tracing::warn!("No authorizers registered, every token request will be rejected");
        }
        let config = IssuerConfig {
            issuer: settings.token.issuer.clone(),
            audience: settings.token.audience.clone(),
            lifetime: Duration::try_seconds(settings.token.lifetime_secs).ok_or_else(|| {
                TokenError::InvalidSettings("token.lifetime_secs is out of range".into())
            })?,
        };
        Ok(Self::new(config, chain, keys))
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    /// Run the authorizer chain and build the claim set to sign. Fails with
    /// `AuthenticationRejected` unless the final decision is `Granted`.
    pub async fn authorize(&self, request: &TokenRequest) -> Result<ClaimSet, TokenError> {
        let subject = request
            .account
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(&request.credentials.username);
        let mut claims = ClaimSet::with_lifetime(
            self.config.audience.as_str(),
            subject,
            self.config.issuer.as_str(),
            self.config.lifetime,
        )?;

        let decision = self
            .chain
            .evaluate(&request.credentials, request.scope.as_ref(), &mut claims)
            .await?;

        if decision != Decision::Granted {
            tracing::info!(
                username = %request.credentials.username,
                decision = ?decision,
                "Token request rejected"
            );
            return Err(TokenError::AuthenticationRejected);
        }

        if let Some(scope) = &request.scope {
            let requested = AccessGrant::from(scope);
            if !claims.grants().iter().any(|g| g.is_equivalent(&requested)) {
                claims.add_access(requested);
            }
        }

        Ok(claims)
    }

    pub async fn issue(&self, request: &TokenRequest) -> Result<IssuedToken, TokenError> {
        let claims = self.authorize(request).await?;
        let token = self.keys.sign(&claims)?;

        tracing::info!(
            username = %request.credentials.username,
            subject = %claims.subject(),
            jti = %claims.token_id(),
            grants = claims.grants().len(),
            "Issued token"
        );

        Ok(IssuedToken {
            token,
            expires_in: claims.expires_in(),
            issued_at: claims.formatted_issued_at(),
        })
    }
}
