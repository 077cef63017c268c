//! Service container: registry, single-flight resolver, and bulk teardown.
//!
//! [`Container`] owns a map of named [`ServiceDefinition`]s and is the only
//! way to obtain a live instance:
//!
//! - [`define`](Container::define) registers a definition; duplicate names
//!   are a configuration error surfaced at setup time.
//! - [`resolve`](Container::resolve) lazily constructs a singleton per name.
//!   Concurrent first resolutions of the same name are **single-flight**: the
//!   first caller runs the factory, later callers await it and observe the
//!   same instance.  A failed factory leaves no live entry, so the next
//!   resolution retries.
//! - [`shutdown`](Container::shutdown) disposes every live instance.  Every
//!   disposer is attempted; failures are collected into a
//!   [`ShutdownReport`], never aborting the sweep.
//!
//! # Scopes
//!
//! [`Container::scope`] creates a [`Scope`]: a child resolution surface that
//! shares the definition map but owns its own live set.  Scopes let a caller
//! bound the lifetime of the instances it resolves (a request, a job) and
//! tear them down without touching instances held elsewhere.  The container
//! itself is the root scope, living as long as the process.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::error::{ContainerError, ContainerResult, ServiceError};
use crate::service::{ServiceDefinition, ServiceInstance};

type DefinitionMap = RwLock<HashMap<String, Arc<ServiceDefinition>>>;

/// Per-name resolution slot.  The async mutex is the single-flight guard:
/// whoever holds it either observes the stored instance or is the one
/// constructing it.
type Slot = Arc<AsyncMutex<Option<ServiceInstance>>>;

// =============================================================================
// Scope
// =============================================================================

/// A resolution surface over a shared definition map with its own live set.
///
/// Created by [`Container::scope`].  Dropping a scope without calling
/// [`shutdown`](Scope::shutdown) leaks nothing the process wasn't already
/// holding, but skips the disposers — callers that resolve through a scope
/// are expected to shut it down when the scope's unit of work ends.
pub struct Scope {
    definitions: Arc<DefinitionMap>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Scope {
    fn new(definitions: Arc<DefinitionMap>) -> Self {
        Self {
            definitions,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves `name` to its singleton instance within this scope.
    ///
    /// Invokes the definition's factory on first resolution; later calls
    /// return the same instance until [`shutdown`](Self::shutdown).
    pub async fn resolve(&self, name: &str) -> ContainerResult<ServiceInstance> {
        let definition = self
            .definitions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::UnknownService(name.to_string()))?;

        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(name.to_string()).or_default())
        };

        let mut live = slot.lock().await;
        if let Some(instance) = live.as_ref() {
            return Ok(Arc::clone(instance));
        }

        match definition.load().await {
            Ok(instance) => {
                debug!(service = %name, "Service loaded");
                *live = Some(Arc::clone(&instance));
                Ok(instance)
            }
            Err(source) => Err(ContainerError::LoadFailed {
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Resolves `name` and downcasts the instance to `Arc<T>`.
    pub async fn resolve_as<T>(&self, name: &str) -> ContainerResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.resolve(name)
            .await?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Returns whether `name` currently holds a live instance in this scope.
    pub async fn is_live(&self, name: &str) -> bool {
        let slot = {
            let slots = self.slots.lock();
            slots.get(name).cloned()
        };
        match slot {
            Some(slot) => slot.lock().await.is_some(),
            None => false,
        }
    }

    /// Disposes every live instance in this scope.
    ///
    /// Disposers run concurrently; each one is attempted regardless of the
    /// others' outcomes, and failures are collected into the returned
    /// [`ShutdownReport`].  Afterwards the live set is empty: a later
    /// `resolve` constructs a fresh instance.  Calling this with nothing live
    /// is a no-op.
    pub async fn shutdown(&self) -> ShutdownReport {
        let drained: Vec<(String, Slot)> = {
            let mut slots = self.slots.lock();
            slots.drain().collect()
        };

        let disposals = drained.into_iter().map(|(name, slot)| {
            let definitions = Arc::clone(&self.definitions);
            async move {
                let instance = { slot.lock().await.take() };
                let instance = instance?;
                let definition = {
                    let definitions = definitions.read();
                    definitions.get(&name).cloned()
                };
                // A slot only ever exists for a defined name.
                let definition = definition?;
                match definition.unload(instance).await {
                    Ok(()) => {
                        debug!(service = %name, "Service released");
                        Some(Ok(()))
                    }
                    Err(error) => {
                        warn!(service = %name, error = %error, "Service release failed");
                        Some(Err(ShutdownFailure {
                            service: name,
                            error,
                        }))
                    }
                }
            }
        });

        let mut report = ShutdownReport::default();
        for outcome in future::join_all(disposals).await.into_iter().flatten() {
            match outcome {
                Ok(()) => report.released += 1,
                Err(failure) => report.failures.push(failure),
            }
        }
        report
    }
}

// =============================================================================
// Container
// =============================================================================

/// The root service registry and resolver.
///
/// Created once per server instance.  `define` happens during setup, before
/// serving; `resolve`/`shutdown` are safe under concurrent access from many
/// in-flight requests.
pub struct Container {
    definitions: Arc<DefinitionMap>,
    root: Scope,
}

impl Container {
    /// Creates an empty container.
    pub fn new() -> Self {
        let definitions = Arc::new(RwLock::new(HashMap::new()));
        Self {
            root: Scope::new(Arc::clone(&definitions)),
            definitions,
        }
    }

    /// Registers `definition` under `name`.
    ///
    /// Fails with [`ContainerError::DuplicateDefinition`] if the name is
    /// taken; the earlier definition remains authoritative and the container
    /// stays usable.
    pub fn define(
        &self,
        name: impl Into<String>,
        definition: ServiceDefinition,
    ) -> ContainerResult<()> {
        let name = name.into();
        let mut definitions = self.definitions.write();
        if definitions.contains_key(&name) {
            return Err(ContainerError::DuplicateDefinition(name));
        }
        debug!(service = %name, "Service defined");
        definitions.insert(name, Arc::new(definition));
        Ok(())
    }

    /// Returns whether a definition exists for `name`.
    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }

    /// Returns the number of registered definitions.
    pub fn definition_count(&self) -> usize {
        self.definitions.read().len()
    }

    /// Creates a child [`Scope`] sharing this container's definitions.
    pub fn scope(&self) -> Scope {
        Scope::new(Arc::clone(&self.definitions))
    }

    /// Resolves `name` in the root scope.  See [`Scope::resolve`].
    pub async fn resolve(&self, name: &str) -> ContainerResult<ServiceInstance> {
        self.root.resolve(name).await
    }

    /// Typed root-scope resolution.  See [`Scope::resolve_as`].
    pub async fn resolve_as<T>(&self, name: &str) -> ContainerResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.root.resolve_as(name).await
    }

    /// Returns whether `name` is live in the root scope.
    pub async fn is_live(&self, name: &str) -> bool {
        self.root.is_live(name).await
    }

    /// Disposes every live instance in the root scope.  See
    /// [`Scope::shutdown`].
    pub async fn shutdown(&self) -> ShutdownReport {
        self.root.shutdown().await
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("definitions", &self.definition_count())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ShutdownReport
// =============================================================================

/// One disposer failure recorded during [`Scope::shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownFailure {
    /// Name of the service whose disposer failed.
    pub service: String,
    /// The disposer's error.
    pub error: ServiceError,
}

/// Outcome of a [`Scope::shutdown`] sweep.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    /// Number of instances released successfully.
    pub released: usize,
    /// Disposer failures, one per failing service.
    pub failures: Vec<ShutdownFailure>,
}

impl ShutdownReport {
    /// Returns `true` when every attempted disposer succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} service(s) released, {} failure(s)",
            self.released,
            self.failures.len()
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
