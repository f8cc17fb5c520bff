use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::TokenError;

/// Access requested by a registry client, parsed from
/// `type:name:action[,action...]` e.g. `repository:samalba/my-app:pull,push`.
///
/// Actions are trimmed and lower-cased; order and duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRequest {
    pub resource_type: String,
    pub name: String,
    pub actions: Vec<String>,
}

impl ScopeRequest {
    /// Parse the optional `scope` request parameter. An absent or empty value
    /// means no access was requested.
    pub fn from_param(raw: Option<&str>) -> Result<Option<Self>, TokenError> {
        match raw {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => s.parse().map(Some),
        }
    }
}

impl FromStr for ScopeRequest {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [resource_type, name, actions] = parts.as_slice() else {
            return Err(TokenError::MalformedScope(s.to_string()));
        };

        let actions = if actions.is_empty() {
            Vec::new()
        } else {
            actions
                .split(',')
                .map(|a| a.trim().to_lowercase())
                .collect()
        };

        Ok(Self {
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            actions,
        })
    }
}

impl fmt::Display for ScopeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.resource_type,
            self.name,
            self.actions.join(",")
        )
    }
}

/// A single entry of the token's `access` claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl AccessGrant {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        actions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    /// Check this grant against optional filters.
    ///
    /// `resource_type` and `name` compare exactly. A non-empty `actions`
    /// filter must have the same number of entries as the grant and every
    /// filter action must be present in the grant (case-insensitive). A
    /// filter of `[pull]` therefore does NOT match a grant of `[pull, push]`.
    pub fn matches(
        &self,
        resource_type: Option<&str>,
        name: Option<&str>,
        actions: Option<&[String]>,
    ) -> bool {
        if resource_type.is_some_and(|t| t != self.resource_type) {
            return false;
        }
        if name.is_some_and(|n| n != self.name) {
            return false;
        }

        match actions {
            Some(filter) if !filter.is_empty() => {
                filter.len() == self.actions.len()
                    && filter
                        .iter()
                        .all(|f| self.actions.iter().any(|a| a.eq_ignore_ascii_case(f)))
            }
            _ => true,
        }
    }

    /// Same type and name, and the same set of actions (case-insensitive,
    /// ignoring order and repeats).
    pub fn is_equivalent(&self, other: &AccessGrant) -> bool {
        fn action_set(actions: &[String]) -> BTreeSet<String> {
            actions.iter().map(|a| a.to_ascii_lowercase()).collect()
        }
        self.resource_type == other.resource_type
            && self.name == other.name
            && action_set(&self.actions) == action_set(&other.actions)
    }
}

impl From<&ScopeRequest> for AccessGrant {
    fn from(scope: &ScopeRequest) -> Self {
        Self {
            resource_type: scope.resource_type.clone(),
            name: scope.name.clone(),
            actions: scope.actions.clone(),
        }
    }
}
