//! HTTP glue: error responses, request tracing, and per-request service
//! scopes.
//!
//! Every request is served inside its own container scope.  Handlers resolve
//! services through the [`Services`] extractor; whatever they resolved is
//! torn down automatically once the response has been fully written (or the
//! client disconnected), so a connection opened for one request never leaks
//! into the next.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use axum::Json;
use axum::extract::{FromRequestParts, Request};
use axum::http::{StatusCode, Uri, request::Parts};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use puro_core::{Container, ContainerError, ContainerResult, ServiceInstance};

// =============================================================================
// HttpError
// =============================================================================

/// An error rendered as a JSON response body.
///
/// Handlers return this directly; infrastructure errors (a failed service
/// load, a missing scope) convert into it so that clients always see the
/// same `{"error": ...}` shape.
#[derive(Debug, Clone)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    /// Creates an error with an explicit status code.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Creates a `400 Bad Request` error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Creates a `404 Not Found` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Creates a `500 Internal Server Error` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Returns the response status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ContainerError> for HttpError {
    fn from(error: ContainerError) -> Self {
        Self::internal(error.to_string())
    }
}

/// Fallback handler for unmatched routes.
pub(crate) async fn not_found(uri: Uri) -> HttpError {
    HttpError::not_found(format!("no route for {}", uri.path()))
}

// =============================================================================
// RequestScope
// =============================================================================

/// The container scope serving one request.
///
/// Obtained through the [`Services`] extractor.  Resolution behaves like
/// [`Container::resolve`](puro_core::Container::resolve), but everything
/// resolved here lives only as long as the request.
pub struct RequestScope {
    scope: puro_core::Scope,
    released: AtomicBool,
}

impl RequestScope {
    fn new(scope: puro_core::Scope) -> Self {
        Self {
            scope,
            released: AtomicBool::new(false),
        }
    }

    /// Resolves a named service within this request.
    pub async fn resolve(&self, name: &str) -> ContainerResult<ServiceInstance> {
        self.scope.resolve(name).await
    }

    /// Resolves a named service and downcasts it to `Arc<T>`.
    pub async fn resolve_as<T>(&self, name: &str) -> ContainerResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.scope.resolve_as::<T>(name).await
    }

    /// Tears down everything resolved in this scope.  Idempotent.
    async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let report = self.scope.shutdown().await;
        if report.is_clean() {
            debug!(%report, "Request scope released");
        } else {
            warn!(%report, "Request scope released with failures");
        }
    }
}

/// Extractor handing a request's [`RequestScope`] to a handler.
///
/// # Example
///
/// ```rust,ignore
/// async fn list_users(Services(services): Services) -> Result<Json<Vec<User>>, HttpError> {
///     let db = services.resolve_as::<DbConnection>("database").await?;
///     Ok(Json(db.query_users().await?))
/// }
/// ```
#[derive(Clone)]
pub struct Services(pub Arc<RequestScope>);

impl<S> FromRequestParts<S> for Services
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<RequestScope>>()
            .cloned()
            .map(Services)
            .ok_or_else(|| HttpError::internal("request served outside a service scope"))
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// Releases the request scope when the response is dropped, which happens
/// only after the body has been fully written or the client went away.
/// Cloning shares the underlying guard, so release still fires exactly once.
#[derive(Clone)]
struct ScopeGuard(#[allow(dead_code)] Arc<ReleaseOnDrop>);

struct ReleaseOnDrop {
    scope: Arc<RequestScope>,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        let scope = Arc::clone(&self.scope);
        // Drop is synchronous; the actual teardown runs as a detached task.
        // Release is best-effort at process exit: if the runtime has already
        // stopped, the disposers are skipped and the instances simply drop.
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move { scope.release().await });
        }
    }
}

/// Opens a fresh service scope for each request and schedules its teardown
/// for after the response completes.
pub(crate) async fn scope_request(
    axum::Extension(container): axum::Extension<Arc<Container>>,
    mut request: Request,
    next: Next,
) -> Response {
    let scope = Arc::new(RequestScope::new(container.scope()));
    request.extensions_mut().insert(Arc::clone(&scope));

    let guard = ScopeGuard(Arc::new(ReleaseOnDrop { scope }));
    let mut response = next.run(request).await;
    // Parking the guard in the response keeps the scope alive while the body
    // streams; teardown fires when the response is finally dropped.
    response.extensions_mut().insert(guard);
    response
}

/// Logs one line per handled request.
pub(crate) async fn trace_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    debug!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request handled"
    );
    response
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn http_error_renders_json() {
        let response = HttpError::not_found("no such thing").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "no such thing" }));
    }

    #[tokio::test]
    async fn container_errors_become_internal_errors() {
        let error = HttpError::from(ContainerError::UnknownService("cache".into()));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let container = Container::new();
        container
            .define(
                "value",
                puro_core::ServiceDefinition::of(
                    || async { Ok(1u32) },
                    |_instance: std::sync::Arc<u32>| async { Ok(()) },
                ),
            )
            .unwrap();

        let scope = RequestScope::new(container.scope());
        scope.resolve("value").await.unwrap();
        scope.release().await;
        scope.release().await;
        assert!(!scope.scope.is_live("value").await);
    }
}
