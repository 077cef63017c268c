//! Greeter Example
//!
//! A small application demonstrating the Puro framework: one plugin with a
//! couple of routes, a named service resolved per request, and an in-memory
//! stand-in for the database provider.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package greeter
//! curl http://127.0.0.1:3000/api/hello/World
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use axum::routing::get;
use axum::{Json, Router, extract::Path};
use puro::prelude::*;
use serde_json::json;
use tracing::info;

// ============================================================================
// Database provider
// ============================================================================

/// In-memory stand-in for a real connection provider.  Each request that
/// touches the `"database"` service gets a fresh "connection" which is
/// closed again once the response is done.
struct MemoryDatabase {
    opened: AtomicU64,
}

impl MemoryDatabase {
    fn new() -> Self {
        Self {
            opened: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn get_connection(&self) -> Result<ServiceInstance, ServiceError> {
        let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        info!(connection = id, "Opening connection");
        Ok(Arc::new(format!("connection-{id}")) as ServiceInstance)
    }

    async fn close_connection(&self) -> Result<(), ServiceError> {
        info!("Closing connection");
        Ok(())
    }
}

// ============================================================================
// Greeter plugin
// ============================================================================

struct GreeterPlugin;

/// The per-request greeting service.  Loading is where a real application
/// would fetch a template or open a session.
fn greeting_service() -> ServiceDefinition {
    ServiceDefinition::of(
        || async { Ok("Hello".to_string()) },
        |_greeting: Arc<String>| async { Ok(()) },
    )
}

async fn hello(
    Services(services): Services,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let greeting = services.resolve_as::<String>("greeting").await?;
    Ok(Json(json!({ "message": format!("{greeting}, {name}!") })))
}

async fn status(Services(services): Services) -> Result<Json<serde_json::Value>, HttpError> {
    let connection = services.resolve_as::<String>(DATABASE_SERVICE).await?;
    Ok(Json(json!({ "database": connection.as_str() })))
}

#[async_trait]
impl Plugin for GreeterPlugin {
    fn name(&self) -> &str {
        "greeter"
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/hello/{name}", get(hello))
            .route("/status", get(status))
    }

    fn services(&self) -> Vec<(String, ServiceDefinition)> {
        vec![("greeting".to_string(), greeting_service())]
    }

    async fn prepare(&self, container: &Container) -> Result<(), BoxError> {
        info!(services = container.definition_count(), "Greeter ready");
        Ok(())
    }
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    Puro::builder()
        .build()?
        .database(MemoryDatabase::new())
        .install(GreeterPlugin)
        .listen(3000, None)
        .await?;
    Ok(())
}
