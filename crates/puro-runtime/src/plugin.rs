//! The plugin boundary.
//!
//! A [`Plugin`] is the unit of installation: it contributes a router of HTTP
//! endpoints, declares the services those endpoints depend on, and gets a
//! `prepare` hook to run one-off setup against the container before the
//! server starts.
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{Router, routing::get};
//! use puro_runtime::{Plugin, BoxError};
//! use puro_core::{Container, ServiceDefinition};
//!
//! struct Greeter;
//!
//! #[async_trait::async_trait]
//! impl Plugin for Greeter {
//!     fn name(&self) -> &str {
//!         "greeter"
//!     }
//!
//!     fn router(&self) -> Router {
//!         Router::new().route("/hello", get(|| async { "hello" }))
//!     }
//!
//!     fn services(&self) -> Vec<(String, ServiceDefinition)> {
//!         vec![("greeting".into(), greeting_definition())]
//!     }
//!
//!     async fn prepare(&self, container: &Container) -> Result<(), BoxError> {
//!         run_migrations(container).await?;
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;
use axum::Router;

use puro_core::{Container, ServiceDefinition};

use crate::error::BoxError;

/// A self-contained feature installed into a [`Puro`](crate::Puro) server.
///
/// Routes are relative to the server's basepath; service names share one flat
/// namespace across all plugins and the built-in services, so a duplicate
/// name fails setup.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name used in logs and setup errors.
    fn name(&self) -> &str;

    /// The endpoints this plugin contributes, mounted under the basepath.
    fn router(&self) -> Router;

    /// Named services this plugin provides.  Empty by default.
    fn services(&self) -> Vec<(String, ServiceDefinition)> {
        Vec::new()
    }

    /// One-off setup hook, run during server assembly before any route is
    /// served.  An error here aborts startup.
    async fn prepare(&self, container: &Container) -> Result<(), BoxError> {
        let _ = container;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    #[async_trait]
    impl Plugin for Bare {
        fn name(&self) -> &str {
            "bare"
        }

        fn router(&self) -> Router {
            Router::new()
        }
    }

    #[tokio::test]
    async fn default_hooks_are_noops() {
        let plugin = Bare;
        let container = Container::new();

        assert!(plugin.services().is_empty());
        assert!(plugin.prepare(&container).await.is_ok());
    }
}
