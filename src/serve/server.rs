// src/serve/server.rs

//! Static file server with a live-reload event stream.
//!
//! Routes:
//! - `GET /__buildwatch/events`: Server-Sent Events, one `reload` event
//!   (`data: {"seq":N}`) per successful build.
//! - `GET /__buildwatch/reload.js`: client that reloads the page on each
//!   event.
//! - everything else: files under the base directory. HTML pages get a
//!   `<script>` tag for the reload client inserted before `</body>`.

use std::convert::Infallible;
use std::path::Path;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, StatusCode},
    middleware,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::get,
    Router,
};
use tokio_stream::{Stream, StreamExt};
use tower_http::services::ServeDir;
use tracing::{debug, warn};

use crate::reload::ReloadChannel;

pub const EVENTS_PATH: &str = "/__buildwatch/events";
pub const RELOAD_SCRIPT_PATH: &str = "/__buildwatch/reload.js";

const RELOAD_SCRIPT: &str = r#"(function () {
  var source = new EventSource("/__buildwatch/events");
  source.addEventListener("reload", function () {
    window.location.reload();
  });
})();
"#;

const RELOAD_TAG: &str = r#"<script src="/__buildwatch/reload.js"></script>"#;

/// Largest HTML page the reload tag is inserted into.
const MAX_HTML_BYTES: usize = 16 * 1024 * 1024;

pub fn router(base_dir: &Path, reload: ReloadChannel) -> Router {
    Router::new()
        .route(EVENTS_PATH, get(handle_events))
        .route(RELOAD_SCRIPT_PATH, get(handle_reload_script))
        .fallback_service(ServeDir::new(base_dir))
        .layer(middleware::map_response(inject_reload_client))
        .with_state(reload)
}

async fn inject_reload_client(method: Method, response: Response) -> Response {
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"));
    if method != Method::GET || response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let html = match axum::body::to_bytes(body, MAX_HTML_BYTES).await {
        Ok(html) => html,
        Err(e) => {
            warn!(error = %e, "could not buffer HTML page for the reload client");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(insert_reload_tag(&html)))
}

/// Put the reload `<script>` before the last `</body>`, or at the end of a
/// page without one. Pages that already load the client are left alone.
fn insert_reload_tag(html: &[u8]) -> Vec<u8> {
    let html = String::from_utf8_lossy(html);
    if html.contains(RELOAD_SCRIPT_PATH) {
        return html.into_owned().into_bytes();
    }

    let mut out = String::with_capacity(html.len() + RELOAD_TAG.len() + 1);
    match html.rfind("</body>") {
        Some(pos) => {
            out.push_str(&html[..pos]);
            out.push_str(RELOAD_TAG);
            out.push_str(&html[pos..]);
        }
        None => {
            out.push_str(&html);
            out.push('\n');
            out.push_str(RELOAD_TAG);
        }
    }
    out.into_bytes()
}

async fn handle_events(
    State(reload): State<ReloadChannel>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = reload.subscribe();
    debug!(subscribers = reload.subscriber_count(), "reload client connected");

    let stream = subscription
        .into_stream()
        .filter_map(|event| Event::default().event("reload").json_data(event).ok())
        .map(Ok);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

async fn handle_reload_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        RELOAD_SCRIPT,
    )
}
