//! HTTP listener
//!
//! Accepts `GET /{topic}/{message}` and answers with the status of the relay
//! outcome. The raw, still percent-encoded path is handed to the relay so an
//! encoded `/` (`%2F`) inside a segment is not mistaken for a separator.

use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::relay::{Publisher, RelayHandler};

#[cfg(test)]
mod tests;

pub fn router<P: Publisher>(handler: RelayHandler<P>) -> Router {
    Router::new()
        .route("/", get(relay_request::<P>))
        .route("/*path", get(relay_request::<P>))
        .with_state(handler)
}

/// Runs the relay in its own task so a client hanging up does not abort a
/// publish that is already under way; the response is then simply dropped.
///
/// axum routes HEAD to GET handlers, so the method is checked here; only a
/// real GET may publish.
async fn relay_request<P: Publisher>(
    State(handler): State<RelayHandler<P>>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET {
        debug!("Refusing {} {}", method, uri.path());
        return (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "GET")]).into_response();
    }

    let path = uri.path().to_string();
    let relay = tokio::spawn(async move { handler.handle(&path).await });

    match relay.await {
        Ok(outcome) => outcome.into_response(),
        Err(e) => {
            error!("Relay task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serves until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Starting HTTP server on http://{}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
