//! # Puro Core
//!
//! The service container at the heart of the Puro web framework.
//!
//! This crate is deliberately small: it knows nothing about HTTP, plugins, or
//! configuration.  It provides three things:
//!
//! - **Definitions**: [`ServiceDefinition`] pairs an async factory with an
//!   async disposer for one named resource.
//! - **Resolution**: [`Container`] resolves names to lazy, at-most-once
//!   singletons with single-flight semantics under concurrency.
//! - **Teardown**: [`Scope::shutdown`] disposes every live instance,
//!   attempting all disposers and collecting failures in a
//!   [`ShutdownReport`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use puro_core::{Container, ServiceDefinition, ServiceError};
//!
//! let container = Container::new();
//! container.define(
//!     "cache",
//!     ServiceDefinition::of(
//!         || async { Ok(Cache::connect("127.0.0.1").await?) },
//!         |cache| async move {
//!             cache.quit().await.map_err(|e| ServiceError::release(e.to_string()))
//!         },
//!     ),
//! )?;
//!
//! let cache = container.resolve_as::<Cache>("cache").await?;
//! let report = container.shutdown().await;
//! assert!(report.is_clean());
//! ```

pub mod container;
pub mod error;
pub mod service;

pub use container::{Container, Scope, ShutdownFailure, ShutdownReport};
pub use error::{ContainerError, ContainerResult, ServiceError, ServiceResult};
pub use service::{ServiceDefinition, ServiceInstance};
