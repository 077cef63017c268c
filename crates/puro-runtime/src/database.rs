//! The built-in database service.
//!
//! The server does not know how to talk to any particular database.  It
//! accepts a [`Database`] collaborator and exposes it to plugins as an
//! ordinary container service named [`DATABASE_SERVICE`]: the first
//! resolution opens a connection, teardown closes it.

use std::sync::Arc;

use async_trait::async_trait;

use puro_core::{ServiceDefinition, ServiceInstance, ServiceResult};

/// Name under which the database connection is registered.
pub const DATABASE_SERVICE: &str = "database";

/// Connection provider backing the built-in database service.
///
/// `get_connection` runs once per lifecycle, on the first resolution of
/// `"database"` in a scope.  `close_connection` runs when that scope shuts
/// down; it receives no arguments, so a provider that needs the connection
/// back must keep its own handle to it.
#[async_trait]
pub trait Database: Send + Sync {
    /// Opens a connection, returned as a type-erased instance.
    async fn get_connection(&self) -> ServiceResult<ServiceInstance>;

    /// Closes the connection opened by `get_connection`.
    async fn close_connection(&self) -> ServiceResult<()>;
}

/// Wraps a provider into a container definition for [`DATABASE_SERVICE`].
pub(crate) fn database_definition(provider: Arc<dyn Database>) -> ServiceDefinition {
    let load_provider = Arc::clone(&provider);
    ServiceDefinition::new(
        move || {
            let provider = Arc::clone(&load_provider);
            Box::pin(async move { provider.get_connection().await })
        },
        // The disposer goes through the provider, not the instance.
        move |_instance| {
            let provider = Arc::clone(&provider);
            Box::pin(async move { provider.close_connection().await })
        },
    )
}
