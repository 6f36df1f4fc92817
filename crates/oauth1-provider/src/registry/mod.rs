//! Read-mostly lookups the lifecycle engine validates against.

mod client;
mod permission;

pub use client::{ClientRegistration, ClientRegistry, InMemoryClientRegistry};
pub use permission::{InMemoryPermissionCatalog, PermissionCatalog};
