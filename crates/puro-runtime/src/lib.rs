//! # Puro Runtime
//!
//! The orchestration layer of the Puro web framework.
//!
//! This crate turns a set of [`Plugin`]s into a running HTTP server:
//!
//! - **Plugins** contribute routers and named service definitions, plus a
//!   `prepare` hook for one-off setup.
//! - **[`Puro`]** assembles them: routes mount under a configurable
//!   basepath, services register in a shared
//!   [`Container`](puro_core::Container), and each request is served inside
//!   its own service scope that is torn down once the response completes.
//! - **Configuration and logging** are loaded from TOML files and
//!   environment variables and initialize `tracing`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use puro_runtime::Puro;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     Puro::builder()
//!         .build()?
//!         .database(PgDatabase::connect_lazy("postgres://localhost/app"))
//!         .install(UsersPlugin)
//!         .listen(3000, None)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod http;
pub mod logging;
pub mod plugin;
pub mod server;

pub use config::{ConfigError, ConfigLoader, ConfigResult, LoggingConfig, PuroConfig};
pub use database::{DATABASE_SERVICE, Database};
pub use error::{BoxError, RuntimeError, RuntimeResult, SetupError, SetupResult};
pub use http::{HttpError, RequestScope, Services};
pub use plugin::Plugin;
pub use server::{Puro, PuroBuilder, PuroOptions};
