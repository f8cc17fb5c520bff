//! Directory service (LDAP) authorizer.
//!
//! The bind DN and search filter are templates: `{username}` is replaced by
//! the authenticating user (escaped for the target syntax) and `{host}` by the
//! configured host. The network part needs the `directory` cargo feature.

use crate::authz::errors::AuthorizerFailure;
use crate::authz::{AuthContext, Authorizer};
use crate::errors::TokenError;
use crate::settings::AuthorizerSettings;
use async_trait::async_trait;

pub const DEFAULT_FILTER: &str = "(uid={username})";

#[derive(Debug, Clone)]
pub struct DirectoryAuthorizer {
    name: String,
    url: String,
    host: String,
    bind_dn: String,
    filter: String,
}

impl DirectoryAuthorizer {
    pub fn new(url: impl Into<String>, bind_dn: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: "directory".to_string(),
            host: host_of(&url),
            url,
            bind_dn: bind_dn.into(),
            filter: DEFAULT_FILTER.to_string(),
        }
    }

    pub fn from_settings(settings: &AuthorizerSettings) -> Result<Self, TokenError> {
        let url = settings.url.as_ref().ok_or_else(|| {
            TokenError::InvalidSettings("directory authorizer requires `url`".into())
        })?;
        let bind_dn = settings.bind_dn.as_ref().ok_or_else(|| {
            TokenError::InvalidSettings("directory authorizer requires `bind_dn`".into())
        })?;
        if cfg!(not(feature = "directory")) {
            return Err(TokenError::InvalidSettings(
                "directory authorizer requires building with the `directory` feature".into(),
            ));
        }

        let mut authorizer = Self::new(url.clone(), bind_dn.clone());
        if let Some(host) = &settings.host {
            authorizer.host = host.clone();
        }
        if let Some(filter) = &settings.filter {
            authorizer.filter = filter.clone();
        }
        Ok(authorizer)
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Bind DN for `username`, already escaped for DN syntax.
    pub fn bind_dn_for(&self, escaped_username: &str) -> String {
        render_template(&self.bind_dn, escaped_username, &self.host)
    }

    /// Search filter for `username`, already escaped for filter syntax.
    pub fn filter_for(&self, escaped_username: &str) -> String {
        render_template(&self.filter, escaped_username, &self.host)
    }
}

pub fn render_template(template: &str, username: &str, host: &str) -> String {
    template
        .replace("{username}", username)
        .replace("{host}", host)
}

/// An empty password turns a simple bind into an unauthenticated bind,
/// which servers commonly report as a success.
pub fn is_unauthenticated_bind(password: &str) -> bool {
    password.is_empty()
}

/// Host part of an `ldap://host:port` style URL.
fn host_of(url: &str) -> String {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split('/').next().unwrap_or(rest);
    authority
        .rsplit_once(':')
        .map(|(h, _)| h)
        .unwrap_or(authority)
        .to_string()
}

#[cfg(feature = "directory")]
#[async_trait]
impl Authorizer for DirectoryAuthorizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authorize(&self, ctx: &mut AuthContext<'_>) -> Result<(), AuthorizerFailure> {
        use ldap3::{LdapConnAsync, Scope as SearchScope};

        if ctx.is_granted() {
            return Ok(());
        }

        let username = ctx.credentials().username.clone();
        if is_unauthenticated_bind(&ctx.credentials().password) {
            tracing::warn!(username = %username, "Refusing directory bind with empty password");
            ctx.deny();
            return Ok(());
        }

        let dn = self.bind_dn_for(&ldap3::dn_escape(username.as_str()));
        let filter = self.filter_for(&ldap3::ldap_escape(username.as_str()));
        tracing::info!(
            username = %username,
            scope = ?ctx.scope().map(|s| s.to_string()),
            dn = %dn,
            "Checking directory authentication"
        );

        let (conn, mut ldap) = LdapConnAsync::new(&self.url).await.map_err(|e| {
            AuthorizerFailure::Backend(format!("could not connect to {}: {e}", self.url))
        })?;
        ldap3::drive!(conn);

        let bound = ldap
            .simple_bind(&dn, &ctx.credentials().password)
            .await
            .map_err(|e| AuthorizerFailure::Backend(e.to_string()))?
            .success();
        if let Err(e) = bound {
            tracing::warn!(username = %username, error = %e, "Directory bind failed");
            ctx.deny();
            let _ = ldap.unbind().await;
            return Ok(());
        }

        let search = ldap
            .search(&dn, SearchScope::Subtree, &filter, vec!["uid"])
            .await
            .map_err(|e| AuthorizerFailure::Backend(e.to_string()))?
            .success();
        let _ = ldap.unbind().await;

        match search {
            Ok((entries, _)) if !entries.is_empty() => {
                tracing::info!(username = %username, "Directory authentication succeeded");
                ctx.grant();
            }
            Ok(_) => {
                tracing::warn!(username = %username, "Directory search returned no entries");
                ctx.deny();
            }
            Err(e) => {
                tracing::warn!(username = %username, error = %e, "Directory search failed");
                ctx.deny();
            }
        }
        Ok(())
    }
}

#[cfg(not(feature = "directory"))]
#[async_trait]
impl Authorizer for DirectoryAuthorizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authorize(&self, _ctx: &mut AuthContext<'_>) -> Result<(), AuthorizerFailure> {
        Err(AuthorizerFailure::Misconfigured(
            "built without the `directory` feature".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AuthorizerKind;

    #[test]
    fn test_render_template() {
        let authorizer = DirectoryAuthorizer::new(
            "ldap://ldap.example.com:389",
            "uid={username},ou=users,dc={host}",
        );
        assert_eq!(
            authorizer.bind_dn_for("alice"),
            "uid=alice,ou=users,dc=ldap.example.com"
        );
        assert_eq!(authorizer.filter_for("alice"), "(uid=alice)");

        let custom = authorizer.with_filter("(&(uid={username})(memberOf=cn=registry))");
        assert_eq!(
            custom.filter_for("bob"),
            "(&(uid=bob)(memberOf=cn=registry))"
        );
    }

    #[test]
    fn test_empty_password_is_unauthenticated_bind() {
        assert!(is_unauthenticated_bind(""));
        assert!(!is_unauthenticated_bind("secret"));
        assert!(!is_unauthenticated_bind(" "));
    }

    #[cfg(feature = "directory")]
    #[tokio::test]
    async fn test_empty_password_denied_without_connecting() {
        use crate::authz::{AuthorizerChain, Credentials, Decision};
        use crate::claims::ClaimSet;

        // nothing listens here; reaching the server would be a backend failure
        let chain = AuthorizerChain::default().with(
            0,
            DirectoryAuthorizer::new("ldap://127.0.0.1:1", "uid={username},dc=example"),
        );
        let mut claims = ClaimSet::new("aud", "alice", "iss");
        let decision = chain
            .evaluate(&Credentials::new("alice", ""), None, &mut claims)
            .await
            .unwrap();
        assert_eq!(decision, Decision::Denied);
    }

    #[test]
    fn test_host_of_url() {
        assert_eq!(host_of("ldap://ldap.example.com:389"), "ldap.example.com");
        assert_eq!(host_of("ldaps://directory"), "directory");
        assert_eq!(host_of("ldap://10.0.0.1:636/"), "10.0.0.1");
    }

    #[test]
    fn test_from_settings_requires_url_and_bind_dn() {
        let settings = AuthorizerSettings {
            kind: AuthorizerKind::Directory,
            priority: 0,
            path: None,
            url: None,
            host: None,
            bind_dn: Some("uid={username}".into()),
            filter: None,
        };
        assert!(matches!(
            DirectoryAuthorizer::from_settings(&settings),
            Err(TokenError::InvalidSettings(_))
        ));
    }

    #[cfg(feature = "directory")]
    #[test]
    fn test_from_settings_applies_overrides() {
        let settings = AuthorizerSettings {
            kind: AuthorizerKind::Directory,
            priority: 5,
            path: None,
            url: Some("ldap://ldap.example.com".into()),
            host: Some("example".into()),
            bind_dn: Some("uid={username},dc={host}".into()),
            filter: Some("(cn={username})".into()),
        };
        let authorizer = DirectoryAuthorizer::from_settings(&settings).unwrap();
        assert_eq!(authorizer.bind_dn_for("carol"), "uid=carol,dc=example");
        assert_eq!(authorizer.filter_for("carol"), "(cn=carol)");
    }
}
