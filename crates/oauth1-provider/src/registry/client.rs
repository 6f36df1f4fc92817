//! Client registry.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use url::Url;

use crate::error::{OAuthResult, RegistrationError, ServiceError};
use crate::models::{Client, ClientStatus, Secret};

/// Resolves client identifiers to registered clients.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Look up a registered client.
    ///
    /// Fails with `ClientNotFound` for unknown identifiers and `ClientDisabled` for
    /// clients that have been deactivated.
    async fn get_client(&self, client_id: &str) -> OAuthResult<Client>;
}

/// Input for registering a new client.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistration {
    pub application_name: Option<String>,
    pub application_uri: Option<String>,
    pub callback_uri: Option<String>,
    pub permissions: BTreeSet<String>,
}

impl ClientRegistration {
    #[must_use]
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            permissions: permissions.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_application_uri(mut self, uri: impl Into<String>) -> Self {
        self.application_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_callback(mut self, uri: impl Into<String>) -> Self {
        self.callback_uri = Some(uri.into());
        self
    }
}

/// In-memory client registry.
#[derive(Clone, Default)]
pub struct InMemoryClientRegistry {
    clients: Arc<RwLock<HashMap<String, Client>>>,
}

impl InMemoryClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client with a generated consumer key and secret.
    pub async fn register(
        &self,
        registration: ClientRegistration,
    ) -> Result<Client, RegistrationError> {
        validate_url("application", registration.application_uri.as_deref())?;
        validate_url("callback", registration.callback_uri.as_deref())?;

        let client = Client {
            client_id: uuid::Uuid::new_v4().simple().to_string(),
            secret: Secret::new(format!(
                "{}{}",
                uuid::Uuid::new_v4().simple(),
                uuid::Uuid::new_v4().simple()
            )),
            application_name: registration.application_name,
            application_uri: registration.application_uri,
            callback_uri: registration.callback_uri,
            permissions: registration.permissions,
            status: ClientStatus::Active,
            registered_at: Utc::now(),
        };

        self.insert(client.clone()).await?;
        Ok(client)
    }

    /// Add a client provisioned elsewhere.
    pub async fn insert(&self, client: Client) -> Result<(), RegistrationError> {
        let mut clients = self.clients.write().await;
        if clients.contains_key(&client.client_id) {
            return Err(RegistrationError::DuplicateClient(client.client_id));
        }
        tracing::info!(client_id = %client.client_id, "Registered client");
        clients.insert(client.client_id.clone(), client);
        Ok(())
    }

    pub async fn set_status(
        &self,
        client_id: &str,
        status: ClientStatus,
    ) -> Result<(), RegistrationError> {
        let mut clients = self.clients.write().await;
        let client = clients
            .get_mut(client_id)
            .ok_or_else(|| RegistrationError::UnknownClient(client_id.to_owned()))?;
        client.status = status;
        tracing::info!(client_id, ?status, "Client status changed");
        Ok(())
    }

    pub async fn disable(&self, client_id: &str) -> Result<(), RegistrationError> {
        self.set_status(client_id, ClientStatus::Disabled).await
    }

    pub async fn enable(&self, client_id: &str) -> Result<(), RegistrationError> {
        self.set_status(client_id, ClientStatus::Active).await
    }

    /// Remove a client. Its tokens are not touched; see `TokenLifecycle::remove_tokens`.
    pub async fn remove(&self, client_id: &str) -> Option<Client> {
        self.clients.write().await.remove(client_id)
    }
}

#[async_trait]
impl ClientRegistry for InMemoryClientRegistry {
    async fn get_client(&self, client_id: &str) -> OAuthResult<Client> {
        let clients = self.clients.read().await;
        let client = clients
            .get(client_id)
            .ok_or_else(|| ServiceError::client_not_found(client_id))?;
        if !client.is_active() {
            return Err(ServiceError::client_disabled(client_id).into());
        }
        Ok(client.clone())
    }
}

impl std::fmt::Debug for InMemoryClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryClientRegistry")
            .finish_non_exhaustive()
    }
}

fn validate_url(field: &'static str, value: Option<&str>) -> Result<(), RegistrationError> {
    if let Some(raw) = value {
        Url::parse(raw)
            .map_err(|source| RegistrationError::InvalidUrl { field, source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = InMemoryClientRegistry::new();
        let client = registry
            .register(
                ClientRegistration::new(["read", "write"])
                    .with_name("Photo Printer")
                    .with_callback("https://printer.example.com/ready"),
            )
            .await
            .unwrap();

        assert!(!client.client_id.is_empty());
        assert_eq!(client.secret.expose().len(), 64);

        let found = registry.get_client(&client.client_id).await.unwrap();
        assert_eq!(found.application_name.as_deref(), Some("Photo Printer"));
        assert!(found.allows("write"));
    }

    #[tokio::test]
    async fn test_unknown_client() {
        let registry = InMemoryClientRegistry::new();
        let err = registry.get_client("nope").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ClientNotFound));
    }

    #[tokio::test]
    async fn test_disabled_client() {
        let registry = InMemoryClientRegistry::new();
        let client = registry
            .register(ClientRegistration::new(["read"]))
            .await
            .unwrap();

        registry.disable(&client.client_id).await.unwrap();
        let err = registry.get_client(&client.client_id).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ClientDisabled));

        registry.enable(&client.client_id).await.unwrap();
        assert!(registry.get_client(&client.client_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_invalid_callback() {
        let registry = InMemoryClientRegistry::new();
        let err = registry
            .register(ClientRegistration::new(["read"]).with_callback("not a url"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::InvalidUrl {
                field: "callback",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_duplicate_insert() {
        let registry = InMemoryClientRegistry::new();
        let client = registry
            .register(ClientRegistration::new(["read"]))
            .await
            .unwrap();
        let err = registry.insert(client).await.unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateClient(_)));
    }
}
