//! Data model for clients, permissions and tokens.
//!
//! Persisted records derive `Serialize`/`Deserialize` so storage backends can
//! keep them as JSON documents; credential material is wrapped in [`Secret`].

mod client;
mod permission;
mod secret;
mod token;

pub use client::{Client, ClientStatus, ResourceOwner};
pub use permission::OAuthPermission;
pub use secret::Secret;
pub use token::{
    AccessToken, AccessTokenStatus, RequestToken, RequestTokenRegistration, RequestTokenState,
    RequestTokenStatus,
};
