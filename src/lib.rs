//! A static development server with LiveReload, built on top of [tower] and
//! [axum].
//!
//! # Example
//!
//! ```no_run
//! use livehttpd::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), livehttpd::Error> {
//!     let server = Server::bind(Config::new(".")).await?;
//!     server.run(async { tokio::signal::ctrl_c().await.ok(); }).await
//! }
//! ```
//!
//! [axum]: https://docs.rs/axum
//! [tower]: https://docs.rs/tower
//!
//! # How it works
//!
//! Every HTML document served from the root gets a small script appended to
//! it. The script opens a WebSocket to the server on the same
//! port, and the server sends it `file-change-event` whenever something below
//! the served root changes, which makes the page reload.
//!
//! The [`LiveReloadLayer`] can also be used on its own, in front of any
//! service. The [`Hub`] returned by [`LiveReloadLayer::hub`] triggers reloads
//! by hand.
//!
//! # Heuristics
//!
//! A response is injectable when the request was a `GET` or `HEAD` for a
//! path ending in `.html` or `/`, the status is `200 OK`, [`Content-Type`]
//! starts with `text/html`, [`Content-Length`] is set, and
//! [`Content-Encoding`] is not set.
//!
//! [`Content-Type`]: https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Content-Type
//! [`Content-Length`]: https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Content-Length
//! [`Content-Encoding`]: https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Content-Encoding

#![warn(clippy::all, missing_docs, nonstandard_style, future_incompatible)]
#![forbid(unsafe_code)]

pub mod config;
mod endpoint;
mod error;
pub mod hub;
mod inject;
mod overlay;
pub mod predicate;
mod server;
pub mod static_files;
pub mod watcher;

use std::{
    task::{Context, Poll},
    time::Duration,
};

use axum::body::Body;
use endpoint::{is_reload_upgrade, ReloadEndpoint, ENDPOINT_PATH};
use http::{Request, Response};
use inject::InjectService;
use overlay::OverlayService;
use predicate::{ContentTypeStartsWithPredicate, HtmlDocumentRequestPredicate};
use tower::{Layer, Service};

pub use config::Config;
pub use error::Error;
pub use hub::{Hub, RELOAD_SIGNAL};
pub use server::{router, Server};
pub use static_files::ServedRoot;

/// How long the browser waits before reconnecting a dropped channel.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Script appended to HTML documents, connecting back to `port`.
pub fn reload_script(port: u16) -> String {
    format!(
        include_str!("../assets/reload.html"),
        port = port,
        path = ENDPOINT_PATH,
        signal = RELOAD_SIGNAL,
        retry_ms = RECONNECT_DELAY.as_millis(),
    )
}

/// Layer to apply [`LiveReload`] middleware.
#[derive(Clone, Debug)]
pub struct LiveReloadLayer {
    port: u16,
    hub: Hub,
}

impl LiveReloadLayer {
    /// Create a new [`LiveReloadLayer`] whose script connects to `port`.
    pub fn new(port: u16) -> LiveReloadLayer {
        LiveReloadLayer {
            port,
            hub: Hub::new(),
        }
    }

    /// Return the [`Hub`] holding the clients of this layer.
    pub fn hub(&self) -> Hub {
        self.hub.clone()
    }
}

impl<S> Layer<S> for LiveReloadLayer {
    type Service = LiveReload<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LiveReload::new(inner, self.hub.clone(), self.port)
    }
}

type InnerService<S> = OverlayService<
    ReloadEndpoint,
    InjectService<S, HtmlDocumentRequestPredicate, ContentTypeStartsWithPredicate<&'static str>>,
>;

/// Middleware to enable LiveReload functionality.
#[derive(Clone, Debug)]
pub struct LiveReload<S> {
    service: InnerService<S>,
}

impl<S> LiveReload<S> {
    /// Create a new [`LiveReload`] middleware registering clients with `hub`.
    pub fn new(service: S, hub: Hub, port: u16) -> Self {
        let inject = InjectService::new(
            service,
            reload_script(port).into(),
            HtmlDocumentRequestPredicate,
            ContentTypeStartsWithPredicate::new("text/html"),
        );
        let overlay = OverlayService::new(inject, ReloadEndpoint::new(hub), is_reload_upgrade);

        LiveReload { service: overlay }
    }
}

impl<RespBody, S> Service<Request<Body>> for LiveReload<S>
where
    S: Service<Request<Body>, Response = Response<RespBody>>,
    RespBody: http_body::Body,
{
    type Response = <InnerService<S> as Service<Request<Body>>>::Response;
    type Error = <InnerService<S> as Service<Request<Body>>>::Error;
    type Future = <InnerService<S> as Service<Request<Body>>>::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        self.service.call(req)
    }
}
