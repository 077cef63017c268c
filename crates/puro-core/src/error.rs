//! Error types for the service container.

use thiserror::Error;

/// Errors produced by a service's own `load`/`unload` routines.
///
/// These are the only errors a [`ServiceDefinition`](crate::ServiceDefinition)
/// closure can return; the container wraps them with the service name where
/// useful.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The factory failed to produce an instance.
    #[error("service initialisation failed: {0}")]
    Init(String),

    /// The disposer failed to release an instance.
    #[error("service release failed: {0}")]
    Release(String),

    /// The instance handed to a typed disposer was not of the expected type.
    #[error("service instance is not a '{expected}'")]
    TypeMismatch {
        /// Expected concrete type name.
        expected: &'static str,
    },
}

impl ServiceError {
    /// Creates an initialisation error with the given message.
    pub fn init(message: impl Into<String>) -> Self {
        Self::Init(message.into())
    }

    /// Creates a release error with the given message.
    pub fn release(message: impl Into<String>) -> Self {
        Self::Release(message.into())
    }

    /// Creates a type-mismatch error for `T`.
    pub fn type_mismatch<T>() -> Self {
        Self::TypeMismatch {
            expected: std::any::type_name::<T>(),
        }
    }
}

/// Errors produced by container registration and resolution.
#[derive(Debug, Clone, Error)]
pub enum ContainerError {
    /// `define` was called twice for the same name.  The first definition
    /// remains authoritative; the container stays fully usable.
    #[error("service '{0}' is already defined")]
    DuplicateDefinition(String),

    /// `resolve` was called for a name that was never defined.
    #[error("service '{0}' is not defined")]
    UnknownService(String),

    /// The definition's factory failed.  No live instance is recorded, so a
    /// later `resolve` retries construction.
    #[error("service '{name}' failed to load")]
    LoadFailed {
        /// Name of the failing service.
        name: String,
        /// The factory's own error.
        #[source]
        source: ServiceError,
    },

    /// A typed resolution asked for a type the live instance does not have.
    #[error("service '{name}' is not a '{expected}'")]
    TypeMismatch {
        /// Name of the resolved service.
        name: String,
        /// Expected concrete type name.
        expected: &'static str,
    },
}

/// Result type for service `load`/`unload` routines.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;
