//! Token storage contract.
//!
//! The lifecycle engine owns the state machine; a [`TokenStore`] owns atomicity.
//! Every backend must provide these guarantees:
//!
//! - **Key uniqueness.** A key is live in at most one family at a time. Inserting a
//!   key that is already present fails with [`InfrastructureError::KeyCollision`].
//! - **Atomic transitions.** `update_request_token` and `consume_request_token` run
//!   their closure while holding the record exclusively. If the closure returns
//!   `Err`, nothing is written. Two concurrent calls on the same key are serialized.
//! - **Atomic exchange.** `consume_request_token` writes the mutated request token and
//!   inserts the returned access token as one unit.
//! - **Atomic bulk removal.** `remove_client_tokens` is observed either entirely
//!   before or entirely after any transition on that client's tokens.
//! - **No global lock.** Operations on unrelated keys must not serialize behind one
//!   another.
//!
//! [`InfrastructureError::KeyCollision`]: crate::error::InfrastructureError::KeyCollision

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{OAuthResult, StoreResult};
use crate::models::{AccessToken, RequestToken};

pub use memory::InMemoryTokenStore;

/// Mutation applied to a stored request token.
pub type RequestTokenUpdate<'a> =
    Box<dyn FnOnce(&mut RequestToken) -> OAuthResult<()> + Send + 'a>;

/// Mutation applied to a stored request token that yields the access token to insert.
pub type RequestTokenExchange<'a> =
    Box<dyn FnOnce(&mut RequestToken) -> OAuthResult<AccessToken> + Send + 'a>;

/// Counts of records deleted by a bulk operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovedTokens {
    pub request_tokens: usize,
    pub access_tokens: usize,
}

impl RemovedTokens {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.request_tokens + self.access_tokens
    }
}

/// Persistence for request and access tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a new request token.
    async fn insert_request_token(&self, token: RequestToken) -> StoreResult<()>;

    /// Fetch a request token by key, expired or not.
    async fn request_token(&self, key: &str) -> StoreResult<Option<RequestToken>>;

    /// Atomically mutate a request token. Returns the stored result.
    ///
    /// Fails with `TokenNotFound` if the key is absent.
    async fn update_request_token(
        &self,
        key: &str,
        update: RequestTokenUpdate<'_>,
    ) -> OAuthResult<RequestToken>;

    /// Atomically mutate a request token and insert the access token the closure returns.
    ///
    /// Fails with `TokenNotFound` if the key is absent.
    async fn consume_request_token(
        &self,
        key: &str,
        exchange: RequestTokenExchange<'_>,
    ) -> OAuthResult<AccessToken>;

    /// Fetch an access token by key, expired or not.
    async fn access_token(&self, key: &str) -> StoreResult<Option<AccessToken>>;

    async fn remove_request_token(&self, key: &str) -> StoreResult<Option<RequestToken>>;

    async fn remove_access_token(&self, key: &str) -> StoreResult<Option<AccessToken>>;

    /// Delete every token owned by a client, all or nothing.
    async fn remove_client_tokens(&self, client_id: &str) -> StoreResult<RemovedTokens>;

    /// Delete every token whose expiry is at or before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<RemovedTokens>;
}
