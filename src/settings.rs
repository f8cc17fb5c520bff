use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::claims::MAX_LIFETIME_SECS;
use crate::errors::TokenError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: Server,
    pub token: Token,
    pub keys: Keys,
    #[serde(default)]
    pub logging: Logging,
    /// Ordered authorizer registrations
    #[serde(default)]
    pub authorizers: Vec<AuthorizerSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
    /// Path of the token endpoint, e.g. /v2/token/
    pub route: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// `iss` claim; must match the registry's configured issuer
    pub issuer: String,
    /// `aud` claim; the registry service name
    pub audience: String,
    pub lifetime_secs: i64,
    /// Upper bound on a single authorizer invocation
    pub authorizer_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KidSource {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keys {
    /// PEM encoded public key (SubjectPublicKeyInfo)
    pub public_key_path: PathBuf,
    /// PEM encoded RSA private key used for signing
    pub private_key_path: PathBuf,
    /// JWS algorithm: RS256, RS384 or RS512
    pub alg: String,
    /// Which key the `kid` header is derived from
    #[serde(default)]
    pub kid_source: KidSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Append logs to this file instead of stdout
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizerKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizerSettings {
    pub kind: AuthorizerKind,
    #[serde(default)]
    pub priority: i32,
    /// file: users file
    pub path: Option<PathBuf>,
    /// directory: server URL, e.g. ldap://ldap.example.com:389
    pub url: Option<String>,
    /// directory: value substituted for `{host}` in templates
    pub host: Option<String>,
    /// directory: bind DN template, e.g. uid={username},ou=users,dc=example,dc=com
    pub bind_dn: Option<String>,
    /// directory: search filter template
    pub filter: Option<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            route: "/v2/token/".to_string(),
        }
    }
}

impl Default for Token {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            audience: String::new(),
            lifetime_secs: crate::claims::DEFAULT_LIFETIME_SECS,
            authorizer_timeout_secs: 10,
        }
    }
}

impl Default for Keys {
    fn default() -> Self {
        Self {
            public_key_path: PathBuf::from("data/public.pem"),
            private_key_path: PathBuf::from("data/private.pem"),
            alg: "RS256".to_string(),
            kid_source: KidSource::Public,
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

pub const SUPPORTED_ALGS: [&str; 3] = ["RS256", "RS384", "RS512"];

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)
            .into_diagnostic()?
            .set_default("server.port", Server::default().port)
            .into_diagnostic()?
            .set_default("server.route", Server::default().route)
            .into_diagnostic()?
            .set_default("token.issuer", Token::default().issuer)
            .into_diagnostic()?
            .set_default("token.audience", Token::default().audience)
            .into_diagnostic()?
            .set_default("token.lifetime_secs", Token::default().lifetime_secs)
            .into_diagnostic()?
            .set_default(
                "token.authorizer_timeout_secs",
                Token::default().authorizer_timeout_secs as i64,
            )
            .into_diagnostic()?
            .set_default(
                "keys.public_key_path",
                Keys::default()
                    .public_key_path
                    .to_string_lossy()
                    .to_string(),
            )
            .into_diagnostic()?
            .set_default(
                "keys.private_key_path",
                Keys::default()
                    .private_key_path
                    .to_string_lossy()
                    .to_string(),
            )
            .into_diagnostic()?
            .set_default("keys.alg", Keys::default().alg)
            .into_diagnostic()?
            .set_default("logging.level", Logging::default().level)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: TOLLGATE__SERVER__PORT=9090, etc.
        builder = builder.add_source(config::Environment::with_prefix("TOLLGATE").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        // Normalize key paths to be relative to current dir
        let cwd = std::env::current_dir().into_diagnostic()?;
        if s.keys.public_key_path.is_relative() {
            s.keys.public_key_path = cwd.join(&s.keys.public_key_path);
        }
        if s.keys.private_key_path.is_relative() {
            s.keys.private_key_path = cwd.join(&s.keys.private_key_path);
        }
        for authorizer in &mut s.authorizers {
            if let Some(p) = authorizer.path.as_mut().filter(|p| p.is_relative()) {
                *p = cwd.join(&*p);
            }
        }

        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<(), TokenError> {
        if self.token.issuer.trim().is_empty() {
            return Err(TokenError::InvalidSettings(
                "token.issuer must be set".into(),
            ));
        }
        if self.token.audience.trim().is_empty() {
            return Err(TokenError::InvalidSettings(
                "token.audience must be set".into(),
            ));
        }
        if self.token.lifetime_secs <= 0 {
            return Err(TokenError::InvalidSettings(
                "token.lifetime_secs must be positive".into(),
            ));
        }
        if self.token.lifetime_secs > MAX_LIFETIME_SECS {
            return Err(TokenError::InvalidSettings(format!(
                "token.lifetime_secs must not exceed {MAX_LIFETIME_SECS}"
            )));
        }
        if !SUPPORTED_ALGS.contains(&self.keys.alg.as_str()) {
            return Err(TokenError::InvalidSettings(format!(
                "keys.alg `{}` is not one of {}",
                self.keys.alg,
                SUPPORTED_ALGS.join(", ")
            )));
        }
        if !self.server.route.starts_with('/') {
            return Err(TokenError::InvalidSettings(
                "server.route must start with `/`".into(),
            ));
        }
        Ok(())
    }
}
