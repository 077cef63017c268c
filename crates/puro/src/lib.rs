//! # Puro
//!
//! A thin, plugin-based orchestration layer over an HTTP server.
//!
//! ## Overview
//!
//! Puro keeps the web layer deliberately small: plugins contribute routes
//! and named services, a shared container resolves those services lazily,
//! and every request is served inside its own service scope that is torn
//! down when the response completes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌───────────────────────────────┐     ┌───────────────┐
//! │   Puro   │────▶│ Plugin "users"  (router)      │────▶│   Container   │
//! │ (server) │────▶│ Plugin "orders" (router)      │────▶│ name → service │
//! └──────────┘     └───────────────────────────────┘     └───────────────┘
//! ```
//!
//! - **Puro**: Assembles plugins, owns the container, runs the server
//! - **Plugins**: Routers plus service definitions plus a `prepare` hook
//! - **Container**: Lazy, single-flight singleton resolution per scope
//! - **Scopes**: One per request; everything resolved there dies with it
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use puro::prelude::*;
//! use axum::{Router, routing::get};
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl Plugin for Hello {
//!     fn name(&self) -> &str {
//!         "hello"
//!     }
//!
//!     fn router(&self) -> Router {
//!         Router::new().route("/hello", get(|| async { "hello" }))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     Puro::new().install(Hello).listen(3000, None).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: Enable TOML configuration files (default)
//! - `json-log`: Enable JSON log output

pub use puro_core as core;
pub use puro_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use puro::prelude::*;
/// ```
pub mod prelude {
    // Server - main entry point
    pub use puro_runtime::{Puro, PuroBuilder, PuroOptions};

    // Plugin boundary - primary unit of installation
    pub use puro_runtime::{BoxError, Plugin};

    // Built-in database service
    pub use puro_runtime::{DATABASE_SERVICE, Database};

    // Request-side service access
    pub use puro_runtime::{HttpError, RequestScope, Services};

    // Container types - for service definitions
    pub use puro_core::{
        Container, ContainerError, ServiceDefinition, ServiceError, ServiceInstance,
    };
}
