//! In-memory token store.
//!
//! Tokens of both families share one `DashMap` keyspace, so a key can never be live
//! twice. Each record sits behind its own mutex. Records are also grouped into
//! per-client partitions: single-token operations hold the partition guard shared,
//! `remove_client_tokens` holds it exclusively.
//!
//! A partition is dropped once it owns no keys and no operation holds it, so the
//! partition map tracks clients with live tokens rather than every client ever seen.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tokio::sync::{Mutex, RwLock};

use super::{RemovedTokens, RequestTokenExchange, RequestTokenUpdate, TokenStore};
use crate::error::{InfrastructureError, OAuthResult, ServiceError, StoreResult};
use crate::models::{AccessToken, RequestToken};

/// One stored record. `None` once removed.
struct Slot<T> {
    client_id: String,
    record: Mutex<Option<T>>,
}

impl<T> Slot<T> {
    fn new(client_id: String, record: T) -> Arc<Self> {
        Arc::new(Self {
            client_id,
            record: Mutex::new(Some(record)),
        })
    }
}

#[derive(Clone)]
enum TokenEntry {
    Request(Arc<Slot<RequestToken>>),
    Access(Arc<Slot<AccessToken>>),
}

/// All keys owned by one client, plus the guard that makes bulk removal atomic.
#[derive(Default)]
struct ClientPartition {
    guard: RwLock<()>,
    keys: DashSet<String>,
}

/// In-memory token store.
#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
    tokens: Arc<DashMap<String, TokenEntry>>,
    partitions: Arc<DashMap<String, Arc<ClientPartition>>>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records of both families.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn partition(&self, client_id: &str) -> Arc<ClientPartition> {
        if let Some(partition) = self.partitions.get(client_id) {
            return Arc::clone(partition.value());
        }
        Arc::clone(&self.partitions.entry(client_id.to_owned()).or_default())
    }

    /// Drop partitions that own no keys and are not held by any operation.
    ///
    /// Handles are only cloned out of the map under its shard lock, so a strong
    /// count of one seen under the write lock cannot grow behind our back.
    fn prune_partitions(&self) {
        self.partitions
            .retain(|_, p| !p.keys.is_empty() || Arc::strong_count(p) > 1);
    }

    /// Drop `client_id`'s partition if `held` is its only handle besides the map.
    fn prune_partition(&self, client_id: &str, held: &Arc<ClientPartition>) {
        self.partitions.remove_if(client_id, |_, p| {
            Arc::ptr_eq(p, held) && p.keys.is_empty() && Arc::strong_count(p) == 2
        });
    }

    fn request_slot(&self, key: &str) -> Option<Arc<Slot<RequestToken>>> {
        match self.tokens.get(key)?.value() {
            TokenEntry::Request(slot) => Some(Arc::clone(slot)),
            TokenEntry::Access(_) => None,
        }
    }

    fn access_slot(&self, key: &str) -> Option<Arc<Slot<AccessToken>>> {
        match self.tokens.get(key)?.value() {
            TokenEntry::Access(slot) => Some(Arc::clone(slot)),
            TokenEntry::Request(_) => None,
        }
    }

    /// Claim `key` in the shared keyspace and record it in the client's partition.
    ///
    /// Caller must hold the partition guard.
    fn claim(&self, partition: &ClientPartition, key: &str, entry: TokenEntry) -> StoreResult<()> {
        match self.tokens.entry(key.to_owned()) {
            Entry::Occupied(_) => {
                tracing::error!("Generated token key collides with a live token");
                return Err(InfrastructureError::KeyCollision);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
        partition.keys.insert(key.to_owned());
        Ok(())
    }

    async fn read<T: Clone + Send>(&self, slot: &Slot<T>) -> Option<T> {
        let partition = self.partition(&slot.client_id);
        let _shared = partition.guard.read().await;
        slot.record.lock().await.clone()
    }

    /// Remove the record if `predicate` holds for it.
    async fn take_if<T: Send>(
        &self,
        key: &str,
        slot: &Slot<T>,
        predicate: impl Fn(&T) -> bool + Send,
    ) -> Option<T> {
        let partition = self.partition(&slot.client_id);
        let _shared = partition.guard.read().await;
        let mut record = slot.record.lock().await;
        if !record.as_ref().is_some_and(&predicate) {
            return None;
        }
        self.tokens.remove(key);
        partition.keys.remove(key);
        record.take()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn insert_request_token(&self, token: RequestToken) -> StoreResult<()> {
        let partition = self.partition(&token.client_id);
        let _shared = partition.guard.read().await;
        let key = token.key.clone();
        let slot = Slot::new(token.client_id.clone(), token);
        self.claim(&partition, &key, TokenEntry::Request(slot))
    }

    async fn request_token(&self, key: &str) -> StoreResult<Option<RequestToken>> {
        let Some(slot) = self.request_slot(key) else {
            return Ok(None);
        };
        Ok(self.read(&slot).await)
    }

    async fn update_request_token(
        &self,
        key: &str,
        update: RequestTokenUpdate<'_>,
    ) -> OAuthResult<RequestToken> {
        let slot = self.request_slot(key).ok_or(ServiceError::TokenNotFound)?;
        let partition = self.partition(&slot.client_id);
        let _shared = partition.guard.read().await;
        let mut record = slot.record.lock().await;

        let mut next = record.as_ref().ok_or(ServiceError::TokenNotFound)?.clone();
        update(&mut next)?;
        *record = Some(next.clone());
        Ok(next)
    }

    async fn consume_request_token(
        &self,
        key: &str,
        exchange: RequestTokenExchange<'_>,
    ) -> OAuthResult<AccessToken> {
        let slot = self.request_slot(key).ok_or(ServiceError::TokenNotFound)?;
        let partition = self.partition(&slot.client_id);
        let _shared = partition.guard.read().await;
        let mut record = slot.record.lock().await;

        let mut next = record.as_ref().ok_or(ServiceError::TokenNotFound)?.clone();
        let access = exchange(&mut next)?;
        if access.client_id != slot.client_id {
            let err = InfrastructureError::storage("access token must share the client");
            return Err(err.into());
        }

        let access_slot = Slot::new(access.client_id.clone(), access.clone());
        self.claim(&partition, &access.key, TokenEntry::Access(access_slot))?;
        *record = Some(next);
        Ok(access)
    }

    async fn access_token(&self, key: &str) -> StoreResult<Option<AccessToken>> {
        let Some(slot) = self.access_slot(key) else {
            return Ok(None);
        };
        Ok(self.read(&slot).await)
    }

    async fn remove_request_token(&self, key: &str) -> StoreResult<Option<RequestToken>> {
        let Some(slot) = self.request_slot(key) else {
            return Ok(None);
        };
        Ok(self.take_if(key, &slot, |_| true).await)
    }

    async fn remove_access_token(&self, key: &str) -> StoreResult<Option<AccessToken>> {
        let Some(slot) = self.access_slot(key) else {
            return Ok(None);
        };
        Ok(self.take_if(key, &slot, |_| true).await)
    }

    async fn remove_client_tokens(&self, client_id: &str) -> StoreResult<RemovedTokens> {
        let Some(partition) = self
            .partitions
            .get(client_id)
            .map(|p| Arc::clone(p.value()))
        else {
            return Ok(RemovedTokens::default());
        };
        let exclusive = partition.guard.write().await;

        let keys: Vec<String> = partition.keys.iter().map(|k| k.key().clone()).collect();
        let mut removed = RemovedTokens::default();
        for key in keys {
            let Some((_, entry)) = self.tokens.remove(&key) else {
                continue;
            };
            match entry {
                TokenEntry::Request(slot) => {
                    if slot.record.lock().await.take().is_some() {
                        removed.request_tokens += 1;
                    }
                }
                TokenEntry::Access(slot) => {
                    if slot.record.lock().await.take().is_some() {
                        removed.access_tokens += 1;
                    }
                }
            }
        }
        partition.keys.clear();
        drop(exclusive);

        self.prune_partition(client_id, &partition);
        Ok(removed)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<RemovedTokens> {
        let entries: Vec<(String, TokenEntry)> = self
            .tokens
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut removed = RemovedTokens::default();
        for (key, entry) in entries {
            match entry {
                TokenEntry::Request(slot) => {
                    let expired = self.take_if(&key, &slot, |t| t.is_expired(now)).await;
                    removed.request_tokens += usize::from(expired.is_some());
                }
                TokenEntry::Access(slot) => {
                    let expired = self.take_if(&key, &slot, |t| t.is_expired(now)).await;
                    removed.access_tokens += usize::from(expired.is_some());
                }
            }
        }

        self.prune_partitions();
        Ok(removed)
    }
}

impl std::fmt::Debug for InMemoryTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTokenStore")
            .field("tokens", &self.tokens.len())
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;

    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{RequestTokenState, ResourceOwner, Secret};

    fn request_token(key: &str, client_id: &str, ttl: Duration) -> RequestToken {
        let now = Utc::now();
        RequestToken {
            key: key.into(),
            secret: Secret::new(format!("{key}-secret")),
            client_id: client_id.into(),
            permissions: BTreeSet::from(["read".to_string()]),
            callback: None,
            client_state: None,
            issued_at: now,
            expires_at: now + ttl,
            state: RequestTokenState::Pending,
        }
    }

    fn access_token(key: &str, from: &RequestToken) -> AccessToken {
        AccessToken {
            key: key.into(),
            secret: Secret::new(format!("{key}-secret")),
            client_id: from.client_id.clone(),
            permissions: from.permissions.clone(),
            resource_owner: ResourceOwner::new("alice"),
            request_token_key: from.key.clone(),
            issued_at: Utc::now(),
            expires_at: None,
        }
    }

    async fn seed(
        store: &InMemoryTokenStore,
        key: &str,
        client_id: &str,
        ttl: Duration,
    ) -> RequestToken {
        let token = request_token(key, client_id, ttl);
        store.insert_request_token(token.clone()).await.unwrap();
        token
    }

    async fn stored(store: &InMemoryTokenStore, key: &str) -> RequestToken {
        store.request_token(key).await.unwrap().unwrap()
    }

    fn consume_into(issued: AccessToken) -> RequestTokenExchange<'static> {
        Box::new(move |token: &mut RequestToken| -> OAuthResult<AccessToken> {
            token.state = RequestTokenState::Consumed {
                resource_owner: issued.resource_owner.clone(),
                access_token_key: issued.key.clone(),
                consumed_at: Utc::now(),
            };
            Ok(issued)
        })
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = InMemoryTokenStore::new();
        seed(&store, "rt1", "c1", Duration::minutes(5)).await;

        assert_eq!(stored(&store, "rt1").await.client_id, "c1");
        assert!(store.access_token("rt1").await.unwrap().is_none());
        assert!(store.request_token("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_key_collision() {
        let store = InMemoryTokenStore::new();
        seed(&store, "rt1", "c1", Duration::minutes(5)).await;

        let err = store
            .insert_request_token(request_token("rt1", "c2", Duration::minutes(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, InfrastructureError::KeyCollision));
        // Original record untouched
        assert_eq!(stored(&store, "rt1").await.client_id, "c1");
    }

    #[tokio::test]
    async fn test_failed_update_writes_nothing() {
        let store = InMemoryTokenStore::new();
        seed(&store, "rt1", "c1", Duration::minutes(5)).await;

        let err = store
            .update_request_token(
                "rt1",
                Box::new(|token: &mut RequestToken| -> OAuthResult<()> {
                    token.callback = Some("https://evil.example.com".into());
                    Err(ServiceError::VerifierMismatch.into())
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::VerifierMismatch));
        assert!(stored(&store, "rt1").await.callback.is_none());
    }

    #[tokio::test]
    async fn test_update_missing_key() {
        let store = InMemoryTokenStore::new();
        let err = store
            .update_request_token(
                "nope",
                Box::new(|_: &mut RequestToken| -> OAuthResult<()> { Ok(()) }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TokenNotFound));
    }

    #[tokio::test]
    async fn test_consume_inserts_access_token() {
        let store = InMemoryTokenStore::new();
        let rt = seed(&store, "rt1", "c1", Duration::minutes(5)).await;

        let access = store
            .consume_request_token("rt1", consume_into(access_token("at1", &rt)))
            .await
            .unwrap();

        assert_eq!(access.key, "at1");
        assert!(stored(&store, "rt1").await.is_consumed());
        assert!(store.access_token("at1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_consume_collision_rolls_back() {
        let store = InMemoryTokenStore::new();
        let rt = seed(&store, "rt1", "c1", Duration::minutes(5)).await;
        seed(&store, "taken", "c1", Duration::minutes(5)).await;

        let err = store
            .consume_request_token("rt1", consume_into(access_token("taken", &rt)))
            .await
            .unwrap_err();

        assert!(err.is_infrastructure());
        assert!(!stored(&store, "rt1").await.is_consumed());
    }

    #[tokio::test]
    async fn test_remove_client_tokens() {
        let store = InMemoryTokenStore::new();
        let rt = seed(&store, "rt1", "c1", Duration::minutes(5)).await;
        seed(&store, "rt2", "c1", Duration::minutes(5)).await;
        seed(&store, "rt3", "c2", Duration::minutes(5)).await;

        store
            .consume_request_token("rt1", consume_into(access_token("at1", &rt)))
            .await
            .unwrap();

        let removed = store.remove_client_tokens("c1").await.unwrap();
        assert_eq!(removed.request_tokens, 2);
        assert_eq!(removed.access_tokens, 1);
        assert!(store.request_token("rt1").await.unwrap().is_none());
        assert!(store.access_token("at1").await.unwrap().is_none());
        assert!(store.request_token("rt3").await.unwrap().is_some());
        assert_eq!(store.len(), 1);

        // Unknown client is a no-op
        assert_eq!(store.remove_client_tokens("c9").await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_empty_partitions_are_pruned() {
        let store = InMemoryTokenStore::new();
        seed(&store, "rt1", "c1", Duration::minutes(5)).await;
        seed(&store, "rt2", "c2", Duration::seconds(-1)).await;
        assert_eq!(store.partitions.len(), 2);

        store.remove_client_tokens("c1").await.unwrap();
        assert!(!store.partitions.contains_key("c1"));

        store.purge_expired(Utc::now()).await.unwrap();
        assert!(store.partitions.is_empty());

        // A fresh partition serves later inserts
        seed(&store, "rt3", "c1", Duration::minutes(5)).await;
        assert_eq!(store.remove_client_tokens("c1").await.unwrap().total(), 1);
    }

    #[tokio::test]
    async fn test_partitions_with_live_tokens_survive_purge() {
        let store = InMemoryTokenStore::new();
        seed(&store, "old", "c1", Duration::seconds(-1)).await;
        seed(&store, "new", "c1", Duration::minutes(5)).await;

        store.purge_expired(Utc::now()).await.unwrap();
        assert!(store.partitions.contains_key("c1"));
        assert_eq!(store.remove_client_tokens("c1").await.unwrap().total(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryTokenStore::new();
        seed(&store, "old", "c1", Duration::seconds(-1)).await;
        seed(&store, "new", "c1", Duration::minutes(5)).await;

        let removed = store.purge_expired(Utc::now()).await.unwrap();
        assert_eq!(removed.request_tokens, 1);
        assert!(store.request_token("old").await.unwrap().is_none());
        assert!(store.request_token("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_single_token() {
        let store = InMemoryTokenStore::new();
        seed(&store, "rt1", "c1", Duration::minutes(5)).await;

        assert!(store.remove_request_token("rt1").await.unwrap().is_some());
        assert!(store.remove_request_token("rt1").await.unwrap().is_none());
        assert!(store.is_empty());
    }
}
