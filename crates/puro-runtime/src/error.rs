//! Runtime error types.

use thiserror::Error;

use puro_core::ContainerError;

/// Boxed error type for plugin hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while assembling the application during setup.
#[derive(Error, Debug)]
pub enum SetupError {
    /// A plugin's `prepare` hook failed.  Setup aborts: a plugin that cannot
    /// prepare must not serve traffic.
    #[error("plugin '{plugin}' failed to prepare")]
    PluginPrepare {
        /// Name of the failing plugin.
        plugin: String,
        /// The hook's own error.
        #[source]
        source: BoxError,
    },

    /// A plugin declared a service name that is already taken.
    #[error("plugin '{plugin}' could not register service '{service}'")]
    ServiceRegistration {
        /// Name of the plugin declaring the service.
        plugin: String,
        /// The conflicting service name.
        service: String,
        /// The container's rejection.
        #[source]
        source: ContainerError,
    },
}

/// Errors that can occur while running the server.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Application assembly failed.
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// Binding or serving the listener failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for setup operations.
pub type SetupResult<T> = Result<T, SetupError>;

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
