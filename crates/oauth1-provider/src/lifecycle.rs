//! Token lifecycle engine.
//!
//! [`TokenLifecycle`] validates inputs against the client registry and permission
//! catalog, drives request tokens through `Pending -> Authorized -> Consumed`, and
//! delegates persistence to a [`TokenStore`]. All state checks run inside the store's
//! atomic closures, so the decision and the write can never be split by a concurrent
//! caller.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::credentials::{self, KeyPair};
use crate::error::{InfrastructureError, OAuthError, OAuthResult, ServiceError};
use crate::models::{
    AccessToken, Client, OAuthPermission, RequestToken, RequestTokenRegistration,
    RequestTokenState, RequestTokenStatus, ResourceOwner, Secret,
};
use crate::registry::{ClientRegistry, PermissionCatalog};
use crate::store::{RemovedTokens, TokenStore};

/// The OAuth 1.0 data provider: every lifecycle operation in one place.
#[derive(Clone)]
pub struct TokenLifecycle {
    clients: Arc<dyn ClientRegistry>,
    permissions: Arc<dyn PermissionCatalog>,
    store: Arc<dyn TokenStore>,
    config: Config,
}

impl TokenLifecycle {
    #[must_use]
    pub fn new(
        clients: Arc<dyn ClientRegistry>,
        permissions: Arc<dyn PermissionCatalog>,
        store: Arc<dyn TokenStore>,
        config: Config,
    ) -> Self {
        Self {
            clients,
            permissions,
            store,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Look up a registered, active client.
    pub async fn get_client(&self, client_id: &str) -> OAuthResult<Client> {
        self.clients.get_client(client_id).await
    }

    /// Describe permissions for display. Unknown identifiers are rejected.
    pub async fn get_permissions_info(
        &self,
        requested: &BTreeSet<String>,
    ) -> OAuthResult<Vec<OAuthPermission>> {
        self.permissions.get_permissions_info(requested).await
    }

    /// Issue a request token in the `Pending` state.
    ///
    /// The returned token is the only one handed out with the secret the client
    /// signs its next request with.
    pub async fn create_request_token(
        &self,
        registration: RequestTokenRegistration,
    ) -> OAuthResult<RequestToken> {
        let client = self.clients.get_client(&registration.client_id).await?;
        let permissions = self
            .resolve_permissions(&client, registration.permissions)
            .await?;

        let now = Utc::now();
        let expires_at = expiry(now, self.request_token_lifetime(registration.lifetime))?;
        let KeyPair { key, secret } = KeyPair::generate(self.config.token_bytes)?;

        let token = RequestToken {
            key,
            secret: Secret::new(secret),
            client_id: client.client_id,
            permissions,
            callback: registration.callback.or(client.callback_uri),
            client_state: registration.state,
            issued_at: now,
            expires_at,
            state: RequestTokenState::Pending,
        };
        self.store.insert_request_token(token.clone()).await?;

        tracing::info!(
            client_id = %token.client_id,
            permissions = ?token.permissions,
            expires_at = %token.expires_at,
            "Issued request token"
        );
        Ok(token)
    }

    /// Look up a request token. Knowledge of the secret is not required.
    pub async fn get_request_token(&self, key: &str) -> OAuthResult<RequestToken> {
        let token = self
            .store
            .request_token(key)
            .await?
            .ok_or(ServiceError::TokenNotFound)?;
        if token.is_expired(Utc::now()) {
            tracing::debug!(client_id = %token.client_id, "Request token expired");
            return Err(ServiceError::TokenExpired.into());
        }
        Ok(token)
    }

    /// Record the resource owner's approval and return the verifier for the client.
    ///
    /// `request_token` may be stale; only its key and client are trusted, and the
    /// stored record decides whether the transition is legal.
    pub async fn set_request_token_verifier(
        &self,
        request_token: &RequestToken,
        resource_owner: ResourceOwner,
    ) -> OAuthResult<String> {
        let verifier = credentials::generate(self.config.verifier_bytes)?;
        let issued = verifier.clone();
        let client_id = request_token.client_id.clone();
        let login = resource_owner.login.clone();

        self.store
            .update_request_token(
                &request_token.key,
                Box::new(move |stored: &mut RequestToken| -> OAuthResult<()> {
                    let now = Utc::now();
                    if stored.client_id != client_id {
                        return Err(ServiceError::TokenNotFound.into());
                    }
                    if stored.is_expired(now) {
                        return Err(ServiceError::TokenExpired.into());
                    }
                    if !matches!(stored.state, RequestTokenState::Pending) {
                        return Err(wrong_state(RequestTokenStatus::Pending, stored, now));
                    }

                    stored.state = RequestTokenState::Authorized {
                        verifier: Secret::new(issued),
                        resource_owner,
                        authorized_at: now,
                    };
                    Ok(())
                }),
            )
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Rejected request token approval"))?;

        tracing::info!(
            client_id = %request_token.client_id,
            resource_owner = %login,
            "Request token authorized"
        );
        Ok(verifier)
    }

    /// Exchange an authorized request token for an access token, exactly once.
    ///
    /// Concurrent callers for the same request token are serialized by the store:
    /// one succeeds, the rest see `InvalidTokenState`.
    pub async fn create_access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> OAuthResult<AccessToken> {
        let KeyPair { key, secret } = KeyPair::generate(self.config.token_bytes)?;
        let client_id = request_token.client_id.clone();
        let supplied = verifier.to_owned();
        let access_lifetime = self.config.access_token_lifetime;

        let access = self
            .store
            .consume_request_token(
                &request_token.key,
                Box::new(move |stored: &mut RequestToken| -> OAuthResult<AccessToken> {
                    let now = Utc::now();
                    if stored.client_id != client_id {
                        return Err(ServiceError::TokenNotFound.into());
                    }
                    if stored.is_expired(now) {
                        return Err(ServiceError::TokenExpired.into());
                    }
                    let RequestTokenState::Authorized {
                        verifier,
                        resource_owner,
                        ..
                    } = &stored.state
                    else {
                        return Err(wrong_state(RequestTokenStatus::Authorized, stored, now));
                    };
                    if !credentials::verifier_matches(&supplied, verifier.expose()) {
                        return Err(ServiceError::VerifierMismatch.into());
                    }
                    let expires_at = access_lifetime.map(|l| expiry(now, l)).transpose()?;

                    let resource_owner = resource_owner.clone();
                    let access = AccessToken {
                        key,
                        secret: Secret::new(secret),
                        client_id: stored.client_id.clone(),
                        permissions: stored.permissions.clone(),
                        resource_owner: resource_owner.clone(),
                        request_token_key: stored.key.clone(),
                        issued_at: now,
                        expires_at,
                    };
                    stored.state = RequestTokenState::Consumed {
                        resource_owner,
                        access_token_key: access.key.clone(),
                        consumed_at: now,
                    };
                    Ok(access)
                }),
            )
            .await
            .inspect_err(|e| {
                if !e.is_infrastructure() {
                    tracing::warn!(
                        client_id = %request_token.client_id,
                        error = %e,
                        "Rejected token exchange"
                    );
                }
            })?;

        tracing::info!(
            client_id = %access.client_id,
            resource_owner = %access.resource_owner.login,
            permissions = ?access.permissions,
            "Issued access token"
        );
        Ok(access)
    }

    /// Look up an access token.
    pub async fn get_access_token(&self, key: &str) -> OAuthResult<AccessToken> {
        let token = self
            .store
            .access_token(key)
            .await?
            .ok_or(ServiceError::TokenNotFound)?;
        if token.is_expired(Utc::now()) {
            tracing::debug!(client_id = %token.client_id, "Access token expired");
            return Err(ServiceError::TokenExpired.into());
        }
        Ok(token)
    }

    /// Delete every request and access token owned by a client.
    pub async fn remove_tokens(&self, client_id: &str) -> OAuthResult<RemovedTokens> {
        let removed = self.store.remove_client_tokens(client_id).await?;
        tracing::info!(
            client_id,
            request_tokens = removed.request_tokens,
            access_tokens = removed.access_tokens,
            "Removed client tokens"
        );
        Ok(removed)
    }

    /// Revoke a request token, e.g. when the resource owner denies access.
    pub async fn revoke_request_token(&self, key: &str) -> OAuthResult<()> {
        let token = self
            .store
            .remove_request_token(key)
            .await?
            .ok_or(ServiceError::TokenNotFound)?;
        tracing::info!(client_id = %token.client_id, "Revoked request token");
        Ok(())
    }

    pub async fn revoke_access_token(&self, key: &str) -> OAuthResult<()> {
        let token = self
            .store
            .remove_access_token(key)
            .await?
            .ok_or(ServiceError::TokenNotFound)?;
        tracing::info!(client_id = %token.client_id, "Revoked access token");
        Ok(())
    }

    /// Delete expired tokens of both families.
    pub async fn purge_expired(&self) -> OAuthResult<RemovedTokens> {
        let removed = self.store.purge_expired(Utc::now()).await?;
        if removed.total() > 0 {
            tracing::debug!(
                request_tokens = removed.request_tokens,
                access_tokens = removed.access_tokens,
                "Cleaned up expired tokens"
            );
        }
        Ok(removed)
    }

    /// Start background cleanup task for expired tokens.
    pub fn start_cleanup_task(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.cleanup_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = self.purge_expired().await {
                    tracing::error!(error = %e, "Expired token cleanup failed");
                }
            }
        })
    }

    /// Registration override capped at the configured lifetime. Non-positive
    /// overrides fall back to the configured lifetime.
    fn request_token_lifetime(&self, requested: Option<Duration>) -> Duration {
        let configured = self.config.request_token_lifetime;
        requested
            .filter(|l| *l > Duration::zero())
            .map_or(configured, |l| l.min(configured))
    }

    /// Requested permissions, or the catalog defaults this client may hold.
    async fn resolve_permissions(
        &self,
        client: &Client,
        requested: BTreeSet<String>,
    ) -> OAuthResult<BTreeSet<String>> {
        if requested.is_empty() {
            let defaults = self.permissions.default_permissions().await?;
            return Ok(defaults
                .into_iter()
                .map(|p| p.permission)
                .filter(|p| client.allows(p))
                .collect());
        }

        if let Some(permission) = client.first_disallowed(&requested) {
            let err = ServiceError::permission_not_allowed(&client.client_id, permission);
            return Err(err.into());
        }
        // Rejects identifiers the catalog does not know
        self.permissions.get_permissions_info(&requested).await?;
        Ok(requested)
    }
}

impl std::fmt::Debug for TokenLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn expiry(
    issued_at: DateTime<Utc>,
    lifetime: Duration,
) -> Result<DateTime<Utc>, InfrastructureError> {
    issued_at
        .checked_add_signed(lifetime)
        .ok_or(InfrastructureError::LifetimeOverflow { lifetime })
}

fn wrong_state(
    expected: RequestTokenStatus,
    token: &RequestToken,
    now: DateTime<Utc>,
) -> OAuthError {
    let actual = token.status(now);
    OAuthError::from(ServiceError::invalid_state(expected, actual))
}
