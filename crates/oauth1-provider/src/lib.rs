//! OAuth 1.0 Token Provider
//!
//! The token lifecycle engine and storage contract behind a three-legged OAuth 1.0
//! provider. A client obtains a request token, the resource owner approves it and a
//! verifier is issued, and the client exchanges the verified request token for an
//! access token, exactly once.
//!
//! # Features
//!
//! - **Strict lifecycle**: `Pending -> Authorized -> Consumed`, no skips, no repeats
//! - **Exactly-once exchange**: concurrent exchanges of one request token yield one
//!   access token
//! - **Pluggable storage**: any [`store::TokenStore`] that honors the atomicity contract
//! - **No global lock**: the in-memory store shards per key and partitions per client
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use oauth1_provider::models::{OAuthPermission, RequestTokenRegistration, ResourceOwner};
//! use oauth1_provider::registry::{
//!     ClientRegistration, InMemoryClientRegistry, InMemoryPermissionCatalog,
//! };
//! use oauth1_provider::store::InMemoryTokenStore;
//! use oauth1_provider::{Config, TokenLifecycle};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = InMemoryClientRegistry::new();
//!     let client = registry.register(ClientRegistration::new(["read"])).await?;
//!     let catalog = InMemoryPermissionCatalog::new([OAuthPermission::new("read", "Read data")]);
//!
//!     let provider = TokenLifecycle::new(
//!         Arc::new(registry),
//!         Arc::new(catalog),
//!         Arc::new(InMemoryTokenStore::new()),
//!         Config::from_env()?,
//!     );
//!
//!     let registration =
//!         RequestTokenRegistration::new(&client.client_id).with_permissions(["read"]);
//!     let request = provider.create_request_token(registration).await?;
//!     let verifier = provider
//!         .set_request_token_verifier(&request, ResourceOwner::new("alice"))
//!         .await?;
//!     let access = provider.create_access_token(&request, &verifier).await?;
//!     println!("{}", access.key);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod registry;
pub mod store;

pub use config::Config;
pub use error::{ErrorKind, InfrastructureError, OAuthError, OAuthResult, ServiceError};
pub use lifecycle::TokenLifecycle;
