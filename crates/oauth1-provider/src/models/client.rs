//! Registered third-party applications and the resource owners who approve them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Secret;

/// Administrative status of a registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    #[default]
    Active,
    Disabled,
}

/// A registered third-party application (the OAuth "consumer").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Consumer key. Unique and immutable.
    pub client_id: String,
    /// Consumer secret, used by the signature layer.
    pub secret: Secret,
    pub application_name: Option<String>,
    pub application_uri: Option<String>,
    /// Registered callback endpoint.
    pub callback_uri: Option<String>,
    /// Permissions this client may request.
    pub permissions: BTreeSet<String>,
    pub status: ClientStatus,
    pub registered_at: DateTime<Utc>,
}

impl Client {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ClientStatus::Active
    }

    /// Check whether this client is pre-authorized for a permission.
    #[must_use]
    pub fn allows(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// First requested permission this client is not pre-authorized for.
    #[must_use]
    pub fn first_disallowed<'a>(&self, requested: &'a BTreeSet<String>) -> Option<&'a str> {
        requested
            .iter()
            .find(|p| !self.allows(p))
            .map(String::as_str)
    }
}

/// The end user who approves a client's access request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceOwner {
    pub login: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl ResourceOwner {
    #[must_use]
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            roles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(permissions: &[&str]) -> Client {
        Client {
            client_id: "c1".into(),
            secret: Secret::new("s"),
            application_name: None,
            application_uri: None,
            callback_uri: None,
            permissions: permissions.iter().map(|p| (*p).to_string()).collect(),
            status: ClientStatus::Active,
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_disallowed() {
        let c = client(&["read", "write"]);
        let ok: BTreeSet<String> = ["read".to_string()].into();
        assert_eq!(c.first_disallowed(&ok), None);

        let bad: BTreeSet<String> = ["admin".to_string(), "read".to_string()].into();
        assert_eq!(c.first_disallowed(&bad), Some("admin"));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ClientStatus::Disabled).unwrap();
        assert_eq!(json, "\"disabled\"");
    }
}
