//! Service definitions — the load/unload contract for container-managed
//! resources.
//!
//! A [`ServiceDefinition`] bundles an async factory with an async disposer.
//! It says nothing about *when* either runs: the owning
//! [`Container`](crate::Container) guarantees the factory is invoked at most
//! once per active lifecycle and the disposer exactly once per live instance.
//!
//! # Example
//!
//! ```rust,ignore
//! use puro_core::{ServiceDefinition, ServiceError};
//!
//! let definition = ServiceDefinition::of(
//!     || async { Ok(redis::connect("127.0.0.1").await?) },
//!     |conn| async move { conn.quit().await.map_err(|e| ServiceError::release(e.to_string())) },
//! );
//! container.define("cache", definition)?;
//! ```

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::ServiceError;

/// A live, type-erased service instance.
///
/// Instances are shared by `Arc`; the scope that constructed one keeps the
/// authoritative reference and is the only component allowed to dispose it.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

type LoadFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<ServiceInstance, ServiceError>> + Send + Sync>;
type UnloadFn =
    Arc<dyn Fn(ServiceInstance) -> BoxFuture<'static, Result<(), ServiceError>> + Send + Sync>;

/// An async factory/disposer pair describing how to produce and release one
/// named resource.
#[derive(Clone)]
pub struct ServiceDefinition {
    load: LoadFn,
    unload: UnloadFn,
}

impl ServiceDefinition {
    /// Creates a definition from type-erased factory and disposer closures.
    ///
    /// Most callers want the typed [`of`](Self::of) constructor instead; this
    /// one exists for definitions that manage their instance type themselves
    /// (e.g. a disposer that ignores the instance entirely).
    pub fn new<L, U>(load: L, unload: U) -> Self
    where
        L: Fn() -> BoxFuture<'static, Result<ServiceInstance, ServiceError>>
            + Send
            + Sync
            + 'static,
        U: Fn(ServiceInstance) -> BoxFuture<'static, Result<(), ServiceError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            load: Arc::new(load),
            unload: Arc::new(unload),
        }
    }

    /// Creates a definition over a concrete instance type `T`.
    ///
    /// The factory returns a plain `T`; the disposer receives the `Arc<T>`
    /// back.  Erasure and downcasting are handled internally — a disposer
    /// handed an instance of the wrong type (impossible through normal
    /// container use) fails with [`ServiceError::TypeMismatch`].
    pub fn of<T, L, LFut, U, UFut>(load: L, unload: U) -> Self
    where
        T: Send + Sync + 'static,
        L: Fn() -> LFut + Send + Sync + 'static,
        LFut: Future<Output = Result<T, ServiceError>> + Send + 'static,
        U: Fn(Arc<T>) -> UFut + Send + Sync + 'static,
        UFut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        Self {
            load: Arc::new(move || {
                let fut = load();
                Box::pin(async move { fut.await.map(|value| Arc::new(value) as ServiceInstance) })
            }),
            unload: Arc::new(move |instance: ServiceInstance| {
                match instance.downcast::<T>() {
                    Ok(typed) => {
                        Box::pin(unload(typed)) as BoxFuture<'static, Result<(), ServiceError>>
                    }
                    Err(_) => Box::pin(async { Err(ServiceError::type_mismatch::<T>()) }),
                }
            }),
        }
    }

    /// Invokes the factory.  Called by the owning scope only.
    pub(crate) async fn load(&self) -> Result<ServiceInstance, ServiceError> {
        (self.load)().await
    }

    /// Invokes the disposer.  Called by the owning scope only.
    pub(crate) async fn unload(&self, instance: ServiceInstance) -> Result<(), ServiceError> {
        (self.unload)(instance).await
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition").finish_non_exhaustive()
    }
}
