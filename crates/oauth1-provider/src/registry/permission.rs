//! Permission catalog.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{OAuthError, OAuthResult, ServiceError};
use crate::models::OAuthPermission;

/// Maps opaque permission identifiers to descriptors.
#[async_trait]
pub trait PermissionCatalog: Send + Sync {
    /// Resolve identifiers to descriptors, in identifier order.
    ///
    /// Unknown identifiers are rejected with `UnknownPermission` rather than dropped.
    async fn get_permissions_info(
        &self,
        requested: &BTreeSet<String>,
    ) -> OAuthResult<Vec<OAuthPermission>>;

    /// Permissions granted when a client asks for none.
    async fn default_permissions(&self) -> OAuthResult<Vec<OAuthPermission>>;
}

/// Immutable in-memory catalog.
#[derive(Clone, Default)]
pub struct InMemoryPermissionCatalog {
    permissions: Arc<HashMap<String, OAuthPermission>>,
}

impl InMemoryPermissionCatalog {
    #[must_use]
    pub fn new(permissions: impl IntoIterator<Item = OAuthPermission>) -> Self {
        let permissions = permissions
            .into_iter()
            .map(|p| (p.permission.clone(), p))
            .collect::<HashMap<_, _>>();
        Self {
            permissions: Arc::new(permissions),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

#[async_trait]
impl PermissionCatalog for InMemoryPermissionCatalog {
    async fn get_permissions_info(
        &self,
        requested: &BTreeSet<String>,
    ) -> OAuthResult<Vec<OAuthPermission>> {
        requested
            .iter()
            .map(|id| {
                self.permissions
                    .get(id)
                    .cloned()
                    .ok_or_else(|| OAuthError::from(ServiceError::unknown_permission(id)))
            })
            .collect()
    }

    async fn default_permissions(&self) -> OAuthResult<Vec<OAuthPermission>> {
        let mut defaults: Vec<_> = self
            .permissions
            .values()
            .filter(|p| p.is_default)
            .cloned()
            .collect();
        defaults.sort_by(|a, b| a.permission.cmp(&b.permission));
        Ok(defaults)
    }
}

impl std::fmt::Debug for InMemoryPermissionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryPermissionCatalog")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn catalog() -> InMemoryPermissionCatalog {
        InMemoryPermissionCatalog::new([
            OAuthPermission::new("read", "Read data").default_granted(),
            OAuthPermission::new("write", "Upload photos")
                .with_http_verbs(["POST", "PUT"]),
            OAuthPermission::new("admin", "Manage your account"),
        ])
    }

    fn ids(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_resolves_in_order() {
        let info = catalog()
            .get_permissions_info(&ids(&["write", "read"]))
            .await
            .unwrap();
        let names: Vec<_> = info.iter().map(|p| p.permission.as_str()).collect();
        assert_eq!(names, ["read", "write"]);
        assert_eq!(info[1].http_verbs, ["POST", "PUT"]);
    }

    #[tokio::test]
    async fn test_rejects_unknown() {
        let err = catalog()
            .get_permissions_info(&ids(&["read", "delete"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::UnknownPermission));
        assert!(err.to_string().contains("delete"));
    }

    #[tokio::test]
    async fn test_defaults() {
        let defaults = catalog().default_permissions().await.unwrap();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].permission, "read");
    }
}
