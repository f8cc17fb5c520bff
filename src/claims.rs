//! The token payload handed to the registry.
//!
//! The claim set is a closed record: only the registered JWT claims used by
//! the registry token protocol plus the `access` list exist.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use data_encoding::HEXUPPER;
use rand::RngCore;
use serde_json::{json, Map, Value};

use crate::errors::{ClaimError, TokenError};
use crate::scope::AccessGrant;

pub const DEFAULT_LIFETIME_SECS: i64 = 3600;
pub const NOT_BEFORE_LEEWAY_SECS: i64 = 600;
/// Upper bound for a configured token lifetime (one year)
pub const MAX_LIFETIME_SECS: i64 = 365 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimField {
    Issuer,
    Subject,
    Audience,
    IssuedAt,
    NotBefore,
    ExpiresAt,
    TokenId,
    Access,
}

impl ClaimField {
    pub const ALL: [ClaimField; 8] = [
        ClaimField::Issuer,
        ClaimField::Subject,
        ClaimField::Audience,
        ClaimField::IssuedAt,
        ClaimField::NotBefore,
        ClaimField::ExpiresAt,
        ClaimField::TokenId,
        ClaimField::Access,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimField::Issuer => "iss",
            ClaimField::Subject => "sub",
            ClaimField::Audience => "aud",
            ClaimField::IssuedAt => "iat",
            ClaimField::NotBefore => "nbf",
            ClaimField::ExpiresAt => "exp",
            ClaimField::TokenId => "jti",
            ClaimField::Access => "access",
        }
    }
}

impl fmt::Display for ClaimField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimField {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClaimField::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ClaimError::InvalidClaimField {
                field: s.to_string(),
                available: ClaimField::ALL
                    .iter()
                    .map(|f| f.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

#[derive(Debug, Clone)]
pub struct ClaimSet {
    issuer: String,
    subject: String,
    audience: String,
    issued_at: DateTime<Utc>,
    not_before: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    token_id: String,
    grants: Vec<AccessGrant>,
}

impl ClaimSet {
    pub fn new(
        audience: impl Into<String>,
        subject: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        let issued_at = Utc::now().trunc_subsecs(0);
        let expires_at = issued_at + Duration::seconds(DEFAULT_LIFETIME_SECS);
        Self::build(audience, subject, issuer, issued_at, expires_at)
    }

    /// Like [`ClaimSet::new`] with an explicit lifetime. A lifetime that puts
    /// `exp` outside the representable range is a settings error.
    pub fn with_lifetime(
        audience: impl Into<String>,
        subject: impl Into<String>,
        issuer: impl Into<String>,
        lifetime: Duration,
    ) -> Result<Self, TokenError> {
        let issued_at = Utc::now().trunc_subsecs(0);
        let expires_at = issued_at.checked_add_signed(lifetime).ok_or_else(|| {
            TokenError::InvalidSettings(format!(
                "token lifetime of {}s overflows the expiry timestamp",
                lifetime.num_seconds()
            ))
        })?;
        Ok(Self::build(audience, subject, issuer, issued_at, expires_at))
    }

    fn build(
        audience: impl Into<String>,
        subject: impl Into<String>,
        issuer: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
            audience: audience.into(),
            issued_at,
            not_before: issued_at - Duration::seconds(NOT_BEFORE_LEEWAY_SECS),
            expires_at,
            token_id: random_token_id(),
            grants: Vec::new(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    pub fn grants(&self) -> &[AccessGrant] {
        &self.grants
    }

    pub fn add_access(&mut self, grant: AccessGrant) {
        self.grants.push(grant);
    }

    /// Seconds between `iat` and `exp`.
    pub fn expires_in(&self) -> i64 {
        (self.expires_at - self.issued_at).num_seconds()
    }

    /// `iat` as an RFC 3339 UTC timestamp with a `Z` suffix.
    pub fn formatted_issued_at(&self) -> String {
        self.issued_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Overwrite a claim by its wire name.
    ///
    /// Timestamps take integer unix seconds. `access` appends the given grant
    /// (or array of grants); existing grants are never dropped.
    pub fn set_claim(&mut self, name: &str, value: Value) -> Result<(), ClaimError> {
        let field: ClaimField = name.parse()?;
        match field {
            ClaimField::Issuer => self.issuer = string_value(field, value)?,
            ClaimField::Subject => self.subject = string_value(field, value)?,
            ClaimField::Audience => self.audience = string_value(field, value)?,
            ClaimField::TokenId => {
                self.token_id = match value {
                    Value::Number(n) => n.to_string(),
                    other => string_value(field, other)?,
                }
            }
            ClaimField::IssuedAt => self.issued_at = timestamp_value(field, &value)?,
            ClaimField::NotBefore => self.not_before = timestamp_value(field, &value)?,
            ClaimField::ExpiresAt => self.expires_at = timestamp_value(field, &value)?,
            ClaimField::Access => {
                let grants = match value {
                    Value::Array(_) => serde_json::from_value::<Vec<AccessGrant>>(value),
                    other => serde_json::from_value::<AccessGrant>(other).map(|g| vec![g]),
                }
                .map_err(|e| ClaimError::InvalidClaimValue {
                    field: field.to_string(),
                    reason: e.to_string(),
                })?;
                self.grants.extend(grants);
            }
        }
        Ok(())
    }

    /// Wire representation of the claim set. Empty strings and zero
    /// timestamps are left out; `access` is always present.
    pub fn to_claims(&self) -> Map<String, Value> {
        let mut claims = Map::new();
        for (field, value) in [
            (ClaimField::Issuer, &self.issuer),
            (ClaimField::Subject, &self.subject),
            (ClaimField::Audience, &self.audience),
        ] {
            if !value.is_empty() {
                claims.insert(field.to_string(), Value::String(value.clone()));
            }
        }
        for (field, value) in [
            (ClaimField::IssuedAt, self.issued_at),
            (ClaimField::NotBefore, self.not_before),
            (ClaimField::ExpiresAt, self.expires_at),
        ] {
            if value.timestamp() != 0 {
                claims.insert(field.to_string(), json!(value.timestamp()));
            }
        }
        if !self.token_id.is_empty() {
            claims.insert(
                ClaimField::TokenId.to_string(),
                Value::String(self.token_id.clone()),
            );
        }
        claims.insert(ClaimField::Access.to_string(), json!(self.grants));
        claims
    }
}

fn random_token_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    HEXUPPER.encode(&bytes)
}

fn string_value(field: ClaimField, value: Value) -> Result<String, ClaimError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Err(ClaimError::InvalidClaimValue {
            field: field.to_string(),
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn timestamp_value(field: ClaimField, value: &Value) -> Result<DateTime<Utc>, ClaimError> {
    value
        .as_i64()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| ClaimError::InvalidClaimValue {
            field: field.to_string(),
            reason: format!("expected unix seconds, got {value}"),
        })
}
