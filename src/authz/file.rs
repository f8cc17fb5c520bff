use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::authz::errors::AuthorizerFailure;
use crate::authz::{AuthContext, Authorizer};
use crate::errors::TokenError;
use crate::scope::AccessGrant;

/// One `[[users]]` entry of the users file.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password: String,
    /// Absent means the user may request any scope
    #[serde(default)]
    pub access: Option<Vec<AccessRule>>,
}

/// Filter applied to the requested scope. Unset fields match anything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessRule {
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub actions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<UserRecord>,
}

/// Authorizer backed by a static TOML users table.
///
/// Leaves an earlier grant alone. Unknown users abstain; a known user with a
/// scope outside their access rules is denied.
#[derive(Debug)]
pub struct FileAuthorizer {
    name: String,
    users: Vec<UserRecord>,
}

impl FileAuthorizer {
    pub fn load(path: &Path) -> Result<Self, TokenError> {
        let cfg = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            )
            .build()?;
        let file: UsersFile = cfg.try_deserialize()?;

        tracing::info!(
            path = %path.display(),
            users = file.users.len(),
            "Loaded users file"
        );

        Ok(Self::from_records(file.users))
    }

    pub fn from_records(users: Vec<UserRecord>) -> Self {
        Self {
            name: "file".to_string(),
            users,
        }
    }

    fn permits(user: &UserRecord, requested: &AccessGrant) -> bool {
        match &user.access {
            None => true,
            Some(rules) => rules.iter().any(|rule| {
                requested.matches(
                    rule.resource_type.as_deref(),
                    rule.name.as_deref(),
                    Some(rule.actions.as_slice()),
                )
            }),
        }
    }
}

#[async_trait]
impl Authorizer for FileAuthorizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authorize(&self, ctx: &mut AuthContext<'_>) -> Result<(), AuthorizerFailure> {
        if ctx.is_granted() {
            return Ok(());
        }

        let credentials = ctx.credentials();
        let Some(user) = self.users.iter().find(|u| {
            u.username == credentials.username && u.password == credentials.password
        }) else {
            tracing::debug!(username = %credentials.username, "No matching user in users file");
            return Ok(());
        };

        let permitted = match ctx.scope() {
            None => true,
            Some(scope) => Self::permits(user, &AccessGrant::from(scope)),
        };

        if permitted {
            tracing::info!(username = %user.username, "Users file authentication succeeded");
            ctx.grant();
        } else {
            tracing::info!(
                username = %user.username,
                scope = ?ctx.scope().map(|s| s.to_string()),
                "Requested scope not permitted for user"
            );
            ctx.deny();
        }
        Ok(())
    }
}
