//! Request and access token records.
//!
//! A request token moves `Pending -> Authorized -> Consumed`; the stored
//! state is a tagged enum so a verifier and a resource owner can only exist
//! once the token has been approved. Expiry is derived from the clock, and
//! revocation deletes the record outright.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{ResourceOwner, Secret};

/// Input for `create_request_token`. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTokenRegistration {
    pub client_id: String,
    /// Requested permissions. Empty means "the catalog defaults".
    pub permissions: BTreeSet<String>,
    /// Overrides the client's registered callback.
    pub callback: Option<String>,
    /// Opaque value echoed back to the client.
    pub state: Option<String>,
    /// Shorter lifetime than the configured default, if wanted.
    pub lifetime: Option<Duration>,
}

impl RequestTokenRegistration {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            permissions: BTreeSet::new(),
            callback: None,
            state: None,
            lifetime: None,
        }
    }

    #[must_use]
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        self.callback = Some(callback.into());
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }
}

/// Stored lifecycle state of a request token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequestTokenState {
    /// Issued, awaiting the resource owner's decision.
    Pending,
    /// Approved; exchangeable with the matching verifier.
    Authorized {
        verifier: Secret,
        resource_owner: ResourceOwner,
        authorized_at: DateTime<Utc>,
    },
    /// Exchanged for an access token. Terminal.
    Consumed {
        resource_owner: ResourceOwner,
        access_token_key: String,
        consumed_at: DateTime<Utc>,
    },
}

/// Observed status of a request token at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestTokenStatus {
    Pending,
    Authorized,
    Consumed,
    Expired,
}

impl fmt::Display for RequestTokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Authorized => "AUTHORIZED",
            Self::Consumed => "CONSUMED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}

/// A short-lived credential representing a pending authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestToken {
    pub key: String,
    pub secret: Secret,
    pub client_id: String,
    pub permissions: BTreeSet<String>,
    pub callback: Option<String>,
    pub client_state: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: RequestTokenState,
}

impl RequestToken {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> RequestTokenStatus {
        if self.is_expired(now) {
            return RequestTokenStatus::Expired;
        }
        match self.state {
            RequestTokenState::Pending => RequestTokenStatus::Pending,
            RequestTokenState::Authorized { .. } => RequestTokenStatus::Authorized,
            RequestTokenState::Consumed { .. } => RequestTokenStatus::Consumed,
        }
    }

    /// Verifier issued on approval, if the token has been authorized.
    #[must_use]
    pub fn verifier(&self) -> Option<&Secret> {
        match &self.state {
            RequestTokenState::Authorized { verifier, .. } => Some(verifier),
            _ => None,
        }
    }

    #[must_use]
    pub fn resource_owner(&self) -> Option<&ResourceOwner> {
        match &self.state {
            RequestTokenState::Pending => None,
            RequestTokenState::Authorized { resource_owner, .. }
            | RequestTokenState::Consumed { resource_owner, .. } => Some(resource_owner),
        }
    }

    #[must_use]
    pub fn is_consumed(&self) -> bool {
        matches!(self.state, RequestTokenState::Consumed { .. })
    }
}

/// Observed status of an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessTokenStatus {
    Active,
    Expired,
}

/// A long-lived credential granting delegated access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub key: String,
    pub secret: Secret,
    pub client_id: String,
    pub permissions: BTreeSet<String>,
    pub resource_owner: ResourceOwner,
    /// Key of the request token this was exchanged from.
    pub request_token_key: String,
    pub issued_at: DateTime<Utc>,
    /// `None` for non-expiring tokens.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> AccessTokenStatus {
        if self.is_expired(now) {
            AccessTokenStatus::Expired
        } else {
            AccessTokenStatus::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(expires_in: Duration) -> RequestToken {
        let now = Utc::now();
        RequestToken {
            key: "rt".into(),
            secret: Secret::new("secret"),
            client_id: "c1".into(),
            permissions: BTreeSet::new(),
            callback: None,
            client_state: None,
            issued_at: now,
            expires_at: now + expires_in,
            state: RequestTokenState::Pending,
        }
    }

    #[test]
    fn test_status_follows_state() {
        let now = Utc::now();
        let mut token = pending(Duration::minutes(10));
        assert_eq!(token.status(now), RequestTokenStatus::Pending);
        assert!(token.verifier().is_none());
        assert!(token.resource_owner().is_none());

        token.state = RequestTokenState::Authorized {
            verifier: Secret::new("v"),
            resource_owner: ResourceOwner::new("alice"),
            authorized_at: now,
        };
        assert_eq!(token.status(now), RequestTokenStatus::Authorized);
        assert_eq!(token.verifier().map(Secret::expose), Some("v"));
        assert_eq!(
            token.resource_owner().map(|o| o.login.as_str()),
            Some("alice")
        );
    }

    #[test]
    fn test_expiry_overrides_state() {
        let token = pending(Duration::minutes(10));
        let later = token.expires_at;
        assert_eq!(token.status(later), RequestTokenStatus::Expired);
    }

    #[test]
    fn test_non_expiring_access_token() {
        let token = AccessToken {
            key: "at".into(),
            secret: Secret::new("s"),
            client_id: "c1".into(),
            permissions: BTreeSet::new(),
            resource_owner: ResourceOwner::new("alice"),
            request_token_key: "rt".into(),
            issued_at: Utc::now(),
            expires_at: None,
        };
        let far_future = Utc::now() + Duration::days(365 * 100);
        assert_eq!(token.status(far_future), AccessTokenStatus::Active);
    }

    #[test]
    fn test_state_tag_in_json() {
        let json = serde_json::to_value(pending(Duration::minutes(1))).unwrap();
        assert_eq!(json["state"], "pending");
        assert_eq!(json["client_id"], "c1");
    }
}
