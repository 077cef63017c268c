//! The Puro server: plugin installation, application assembly, and serving.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use puro_runtime::Puro;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     Puro::new()
//!         .database(PgDatabase::connect_lazy("postgres://localhost/app"))
//!         .install(UsersPlugin)
//!         .install(OrdersPlugin)
//!         .listen(3000, None)
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Configuration-Driven
//!
//! ```rust,ignore
//! let app = Puro::builder()
//!     .config_file("config/production.toml")
//!     .profile("production")
//!     .build()?
//!     .install(UsersPlugin);
//! app.listen(3000, None).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use axum::{Extension, Router, middleware};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{debug, info, warn};

use puro_core::Container;

use crate::config::{ConfigLoader, ConfigResult, PuroConfig, schema};
use crate::database::{DATABASE_SERVICE, Database, database_definition};
use crate::error::{RuntimeResult, SetupError, SetupResult};
use crate::http;
use crate::logging;
use crate::plugin::Plugin;

// =============================================================================
// PuroOptions
// =============================================================================

/// Server options.
///
/// `basepath` is the prefix under which every plugin route is mounted; it
/// defaults to `/api/`.  Set it to `/` to mount plugin routes at the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PuroOptions {
    /// Path prefix for plugin routes.
    #[serde(default = "schema::default_basepath")]
    pub basepath: String,

    /// Free-form per-plugin settings, keyed by plugin name.
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for PuroOptions {
    fn default() -> Self {
        Self {
            basepath: schema::default_basepath(),
            extra: HashMap::new(),
        }
    }
}

// =============================================================================
// Puro
// =============================================================================

/// The server orchestrator.
///
/// A `Puro` value collects plugins and an optional [`Database`] provider,
/// then assembles them into a running HTTP server: plugin routers are
/// mounted under the basepath, plugin services are registered in a shared
/// [`Container`], and every request is served inside its own service scope.
pub struct Puro {
    options: PuroOptions,
    container: Arc<Container>,
    plugins: Vec<Arc<dyn Plugin>>,
    database: Option<Arc<dyn Database>>,
}

impl Puro {
    /// Creates a server with default options.
    pub fn new() -> Self {
        Self::with_options(PuroOptions::default())
    }

    /// Creates a server with explicit options.
    pub fn with_options(options: PuroOptions) -> Self {
        Self {
            options,
            container: Arc::new(Container::new()),
            plugins: Vec::new(),
            database: None,
        }
    }

    /// Creates a server from loaded configuration.
    ///
    /// Initializes logging from the config; basepath and per-plugin settings
    /// come from the `server` and `plugins` sections.
    pub fn from_config(config: &PuroConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            basepath = %config.server.basepath,
            "Server configured"
        );

        Self::with_options(PuroOptions {
            basepath: config.server.basepath.clone(),
            extra: config.plugins.clone(),
        })
    }

    /// Creates a builder that loads configuration before constructing the
    /// server.
    pub fn builder() -> PuroBuilder {
        PuroBuilder::new()
    }

    /// Sets the [`Database`] provider backing the built-in `"database"`
    /// service.
    pub fn database<D: Database + 'static>(mut self, provider: D) -> Self {
        self.database = Some(Arc::new(provider));
        self
    }

    /// Installs a plugin.  Plugins are set up in installation order.
    pub fn install<P: Plugin + 'static>(mut self, plugin: P) -> Self {
        let plugin = Arc::new(plugin);
        debug!(plugin = %plugin.name(), "Plugin registered");
        self.plugins.push(plugin);
        self
    }

    /// Returns the server options.
    pub fn options(&self) -> &PuroOptions {
        &self.options
    }

    /// Returns the shared service container.
    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Assembles the application router.
    ///
    /// Runs the full setup sequence:
    ///
    /// 1. Registers the built-in `"database"` service when a provider is set.
    /// 2. For each plugin, in installation order: runs `prepare` (aborting
    ///    setup on failure), merges its router, and registers its services
    ///    (a duplicate name aborts setup).
    /// 3. Mounts the combined plugin router under the basepath, adds the 404
    ///    fallback, and wires up request tracing and per-request service
    ///    scopes.
    pub async fn build_router(&self) -> SetupResult<Router> {
        if let Some(provider) = &self.database {
            self.container
                .define(DATABASE_SERVICE, database_definition(Arc::clone(provider)))
                .map_err(|source| SetupError::ServiceRegistration {
                    plugin: "builtin".to_string(),
                    service: DATABASE_SERVICE.to_string(),
                    source,
                })?;
            debug!(service = DATABASE_SERVICE, "Built-in database service registered");
        }

        let mut api = Router::new();
        for plugin in &self.plugins {
            let name = plugin.name().to_string();

            plugin
                .prepare(&self.container)
                .await
                .map_err(|source| SetupError::PluginPrepare {
                    plugin: name.clone(),
                    source,
                })?;

            api = api.merge(plugin.router());

            for (service, definition) in plugin.services() {
                self.container.define(&service, definition).map_err(|source| {
                    SetupError::ServiceRegistration {
                        plugin: name.clone(),
                        service: service.clone(),
                        source,
                    }
                })?;
            }

            info!(plugin = %name, "Plugin installed");
        }

        let app = match self.normalized_basepath() {
            Some(base) => Router::new().nest(&base, api),
            None => api,
        };

        Ok(app
            .fallback(http::not_found)
            .layer(middleware::from_fn(http::trace_request))
            .layer(middleware::from_fn(http::scope_request))
            .layer(Extension(Arc::clone(&self.container))))
    }

    /// Assembles the application and serves it until a shutdown signal.
    ///
    /// `hostname` defaults to `0.0.0.0`.  After the listener stops, services
    /// still live in the root container (resolved during `prepare`, for
    /// instance) are torn down.
    pub async fn listen(self, port: u16, hostname: Option<&str>) -> RuntimeResult<()> {
        let app = self.build_router().await?;

        let host = hostname.unwrap_or("0.0.0.0");
        let listener = tokio::net::TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;
        info!(addr = %addr, basepath = %self.options.basepath, "Puro listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_shutdown())
            .await?;

        let report = self.container.shutdown().await;
        if report.is_clean() {
            info!(%report, "Server stopped");
        } else {
            warn!(%report, "Server stopped with teardown failures");
        }
        Ok(())
    }

    /// Basepath normalized for mounting: trailing slashes stripped, leading
    /// slash ensured.  `None` means plugin routes mount at the root.
    fn normalized_basepath(&self) -> Option<String> {
        let trimmed = self.options.basepath.trim_end_matches('/');
        if trimmed.is_empty() {
            None
        } else if trimmed.starts_with('/') {
            Some(trimmed.to_string())
        } else {
            Some(format!("/{trimmed}"))
        }
    }
}

impl Default for Puro {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to register SIGTERM handler");

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down");
    }
}

// =============================================================================
// PuroBuilder
// =============================================================================

/// Builder that loads configuration before constructing a [`Puro`] server.
///
/// # Example
///
/// ```rust,ignore
/// let app = Puro::builder()
///     .config_file("config/production.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct PuroBuilder {
    config_loader: ConfigLoader,
}

impl PuroBuilder {
    /// Creates a new builder searching the current directory for config.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: PuroConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads configuration and builds the server.
    pub fn build(self) -> ConfigResult<Puro> {
        let config = self.config_loader.load()?;
        Ok(Puro::from_config(&config))
    }
}

impl Default for PuroBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    use puro_core::{ServiceDefinition, ServiceInstance, ServiceResult};

    use super::*;
    use crate::http::Services;

    struct GreeterPlugin {
        loads: Arc<AtomicUsize>,
        unloads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Plugin for GreeterPlugin {
        fn name(&self) -> &str {
            "greeter"
        }

        fn router(&self) -> Router {
            Router::new().route(
                "/hello",
                get(|Services(services): Services| async move {
                    let greeting = services.resolve_as::<String>("greeting").await?;
                    Ok::<_, crate::http::HttpError>(greeting.as_str().to_owned())
                }),
            )
        }

        fn services(&self) -> Vec<(String, ServiceDefinition)> {
            let loads = Arc::clone(&self.loads);
            let unloads = Arc::clone(&self.unloads);
            vec![(
                "greeting".to_string(),
                ServiceDefinition::of(
                    move || {
                        let loads = Arc::clone(&loads);
                        async move {
                            loads.fetch_add(1, Ordering::SeqCst);
                            Ok("hello from greeter".to_string())
                        }
                    },
                    move |_instance: Arc<String>| {
                        let unloads = Arc::clone(&unloads);
                        async move {
                            unloads.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    },
                ),
            )]
        }
    }

    struct FailingPlugin;

    #[async_trait]
    impl Plugin for FailingPlugin {
        fn name(&self) -> &str {
            "failing"
        }

        fn router(&self) -> Router {
            Router::new()
        }

        async fn prepare(&self, _container: &Container) -> Result<(), crate::error::BoxError> {
            Err("migration failed".into())
        }
    }

    struct FakeDatabase {
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Database for FakeDatabase {
        async fn get_connection(&self) -> ServiceResult<ServiceInstance> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new("connection".to_string()) as ServiceInstance)
        }

        async fn close_connection(&self) -> ServiceResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Polls until the spawned scope-release task has run.
    async fn wait_for_count(counter: &AtomicUsize, expected: usize) {
        for _ in 0..100 {
            if counter.load(Ordering::SeqCst) == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "counter stuck at {} (expected {expected})",
            counter.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn routes_are_mounted_under_the_basepath() {
        let loads = Arc::new(AtomicUsize::new(0));
        let unloads = Arc::new(AtomicUsize::new(0));
        let app = Puro::new().install(GreeterPlugin {
            loads: Arc::clone(&loads),
            unloads: Arc::clone(&unloads),
        });

        let router = app.build_router().await.unwrap();
        let response = router
            .clone()
            .oneshot(Request::get("/api/hello").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "hello from greeter");

        // Outside the basepath the same path is unknown.
        let response = router
            .oneshot(Request::get("/hello").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn request_services_are_torn_down_after_the_response() {
        let loads = Arc::new(AtomicUsize::new(0));
        let unloads = Arc::new(AtomicUsize::new(0));
        let app = Puro::new().install(GreeterPlugin {
            loads: Arc::clone(&loads),
            unloads: Arc::clone(&unloads),
        });
        let router = app.build_router().await.unwrap();

        let response = router
            .clone()
            .oneshot(Request::get("/api/hello").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        drop(response);

        wait_for_count(&unloads, 1).await;
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        // A second request gets a fresh instance.
        let response = router
            .oneshot(Request::get("/api/hello").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        drop(response);

        wait_for_count(&unloads, 2).await;
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn one_request_tears_down_services_from_every_plugin() {
        // "alpha" comes from the plugin serving the route, "beta" from a
        // second plugin that only provides services.
        fn counted_string(
            value: &'static str,
            unloads: &Arc<AtomicUsize>,
        ) -> ServiceDefinition {
            let unloads = Arc::clone(unloads);
            ServiceDefinition::of(
                move || async move { Ok(value.to_string()) },
                move |_instance: Arc<String>| {
                    let unloads = Arc::clone(&unloads);
                    async move {
                        unloads.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            )
        }

        struct AlphaPlugin {
            unloads: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl Plugin for AlphaPlugin {
            fn name(&self) -> &str {
                "alpha"
            }

            fn router(&self) -> Router {
                Router::new().route(
                    "/both",
                    get(|Services(services): Services| async move {
                        let alpha = services.resolve_as::<String>("alpha").await?;
                        let beta = services.resolve_as::<String>("beta").await?;
                        Ok::<_, crate::http::HttpError>(format!("{alpha}+{beta}"))
                    }),
                )
            }

            fn services(&self) -> Vec<(String, ServiceDefinition)> {
                vec![("alpha".to_string(), counted_string("a", &self.unloads))]
            }
        }

        struct BetaPlugin {
            unloads: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl Plugin for BetaPlugin {
            fn name(&self) -> &str {
                "beta"
            }

            fn router(&self) -> Router {
                Router::new()
            }

            fn services(&self) -> Vec<(String, ServiceDefinition)> {
                vec![("beta".to_string(), counted_string("b", &self.unloads))]
            }
        }

        let unloads = Arc::new(AtomicUsize::new(0));
        let app = Puro::new()
            .install(AlphaPlugin {
                unloads: Arc::clone(&unloads),
            })
            .install(BetaPlugin {
                unloads: Arc::clone(&unloads),
            });
        let router = app.build_router().await.unwrap();

        let response = router
            .oneshot(Request::get("/api/both").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "a+b");

        wait_for_count(&unloads, 2).await;
    }

    #[tokio::test]
    async fn database_connection_is_closed_after_the_request() {
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        struct DbPlugin;

        #[async_trait]
        impl Plugin for DbPlugin {
            fn name(&self) -> &str {
                "db-user"
            }

            fn router(&self) -> Router {
                Router::new().route(
                    "/conn",
                    get(|Services(services): Services| async move {
                        let conn = services.resolve_as::<String>(DATABASE_SERVICE).await?;
                        Ok::<_, crate::http::HttpError>(conn.as_str().to_owned())
                    }),
                )
            }
        }

        let app = Puro::new()
            .database(FakeDatabase {
                opened: Arc::clone(&opened),
                closed: Arc::clone(&closed),
            })
            .install(DbPlugin);
        let router = app.build_router().await.unwrap();

        let response = router
            .oneshot(Request::get("/api/conn").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "connection");

        wait_for_count(&closed, 1).await;
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prepare_failure_aborts_setup() {
        let app = Puro::new().install(FailingPlugin);
        let err = app.build_router().await.unwrap_err();
        assert!(matches!(err, SetupError::PluginPrepare { plugin, .. } if plugin == "failing"));
    }

    #[tokio::test]
    async fn duplicate_service_names_abort_setup() {
        // Provides no routes, but claims the service name the greeter
        // already registered.
        struct SquatterPlugin;

        #[async_trait]
        impl Plugin for SquatterPlugin {
            fn name(&self) -> &str {
                "squatter"
            }

            fn router(&self) -> Router {
                Router::new()
            }

            fn services(&self) -> Vec<(String, ServiceDefinition)> {
                vec![(
                    "greeting".to_string(),
                    ServiceDefinition::of(
                        || async { Ok("hijacked".to_string()) },
                        |_instance: Arc<String>| async { Ok(()) },
                    ),
                )]
            }
        }

        let loads = Arc::new(AtomicUsize::new(0));
        let unloads = Arc::new(AtomicUsize::new(0));
        let app = Puro::new()
            .install(GreeterPlugin {
                loads: Arc::clone(&loads),
                unloads: Arc::clone(&unloads),
            })
            .install(SquatterPlugin);

        let err = app.build_router().await.unwrap_err();
        assert!(matches!(
            err,
            SetupError::ServiceRegistration { plugin, service, .. }
                if plugin == "squatter" && service == "greeting"
        ));
    }

    #[tokio::test]
    async fn unmatched_routes_get_a_json_404() {
        let app = Puro::new();
        let router = app.build_router().await.unwrap();

        let response = router
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error"], "no route for /nope");
    }

    #[tokio::test]
    async fn root_basepath_mounts_plugins_at_the_root() {
        let loads = Arc::new(AtomicUsize::new(0));
        let unloads = Arc::new(AtomicUsize::new(0));
        let app = Puro::with_options(PuroOptions {
            basepath: "/".to_string(),
            ..Default::default()
        })
        .install(GreeterPlugin {
            loads: Arc::clone(&loads),
            unloads: Arc::clone(&unloads),
        });
        let router = app.build_router().await.unwrap();

        let response = router
            .oneshot(Request::get("/hello").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn options_default_to_the_api_basepath() {
        assert_eq!(PuroOptions::default().basepath, "/api/");
        assert_eq!(Puro::new().options().basepath, "/api/");
    }
}
