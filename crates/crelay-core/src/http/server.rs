//! HTTP server: axum router for the `/gpio` API and the control page.
//!
//! Every request is decoded into a [`Command`] with [`Command::from_form`],
//! run through the shared [`Dispatcher`], and rendered either as a
//! plain-text relay table (any path containing `gpio`) or as the HTML page
//! (everything else).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Response};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::build_info::SERVER_NAME;
use crate::card::CardError;
use crate::command::Command;
use crate::dispatch::{Dispatcher, Outcome};
use crate::error::RelayError;

use super::page;

/// Path of the plain-text API.
pub const API_PATH: &str = "/gpio";

/// Any request path containing this is answered by the API.
const API_KEYWORD: &str = "gpio";

/// Shared state accessible to all route handlers.
pub struct AppState {
    pub dispatcher: Dispatcher,
    /// Effective labels for channels 1 to 8.
    pub labels: Vec<String>,
}

/// Build the axum router. Paths are matched by substring rather than by
/// route, so `/gpio/`, `/api/gpio` and the like all reach the API.
pub fn router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .fallback(handle_request)
        .layer(axum::middleware::map_response(add_headers))
        .with_state(state)
}

/// Serve on an already bound listener until a shutdown signal arrives.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
            info!("HTTP server shutting down");
        })
        .await
}

/// HTTP status for a failed request.
pub fn error_status(err: &RelayError) -> StatusCode {
    match err {
        RelayError::NoDeviceFound { .. } | RelayError::Backend(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        RelayError::ChannelOutOfRange { .. } | RelayError::MalformedRequest(_) => {
            StatusCode::BAD_REQUEST
        }
    }
}

/// POST requests carry their parameters in the body, everything else in the
/// query string.
fn command_from_request(method: &Method, query: Option<String>, body: &Bytes) -> Command {
    let input = if method == Method::POST {
        String::from_utf8_lossy(body).into_owned()
    } else {
        query.unwrap_or_default()
    };
    let command = Command::from_form(&input);
    debug!(%method, ?command, "Decoded request");
    command
}

/// Run a request on its own task.
///
/// hyper drops the handler future when the client disconnects. Detaching
/// the dispatch means a pulse that has already inverted a relay still
/// restores it.
async fn dispatch_detached(state: &Arc<AppState>, command: Command) -> Result<Outcome, RelayError> {
    let state = Arc::clone(state);
    let task = tokio::spawn(async move { state.dispatcher.dispatch(&command).await });
    match task.await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Request task failed");
            Err(CardError::io("request", std::io::Error::other(e.to_string())).into())
        }
    }
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_request(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let command = command_from_request(&method, query, &body);
    if uri.path().contains(API_KEYWORD) {
        handle_api(&state, command).await
    } else {
        handle_page(&state, command).await
    }
}

async fn handle_api(state: &Arc<AppState>, command: Command) -> Response {
    match dispatch_detached(state, command).await {
        Ok(outcome) => plain(StatusCode::OK, api_body(&outcome)),
        Err(err) => {
            info!(error = %err, "API request failed");
            plain(error_status(&err), format!("ERROR: {err}\n"))
        }
    }
}

async fn handle_page(state: &Arc<AppState>, command: Command) -> Response {
    let serial = command.serial.clone();
    let result = dispatch_detached(state, command).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(err) => {
            info!(error = %err, "Page request failed");
            error_status(err)
        }
    };
    let html = page::render(&result, &state.labels, serial.as_deref());
    (status, Html(html)).into_response()
}

fn api_body(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Snapshot(snapshot) => snapshot.to_table(),
        Outcome::Card(card) => format!("Card:{}:{}\n", card.card_type, card.path),
        Outcome::Cards(cards) => cards
            .iter()
            .map(|card| format!("Card:{}:{}\n", card.card_type, card.path))
            .collect(),
    }
}

fn plain(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

/// One request per connection, and identify the server.
async fn add_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
