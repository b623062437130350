//! WebSocket endpoint that live-reload clients connect to.

use std::{
    convert::Infallible,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRequestParts,
    },
    response::{IntoResponse, Response},
};
use futures_core::future::BoxFuture;
use http::{header, request::Parts, Request};
use tower::Service;

use crate::hub::{Client, Hub};

/// Path browsers open their live-reload channel on.
pub const ENDPOINT_PATH: &str = "/";

/// Whether a request asks to open a live-reload channel.
pub fn is_reload_upgrade(parts: &Parts) -> bool {
    parts.uri.path() == ENDPOINT_PATH
        && parts
            .headers
            .get(header::UPGRADE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

/// Service accepting WebSocket upgrades and handing each socket to the [`Hub`].
#[derive(Clone, Debug)]
pub struct ReloadEndpoint {
    hub: Hub,
}

impl ReloadEndpoint {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }
}

impl Service<Request<Body>> for ReloadEndpoint {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let hub = self.hub.clone();
        Box::pin(async move {
            let (mut parts, _body) = request.into_parts();
            let response = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
                Ok(upgrade) => upgrade
                    .on_upgrade(move |socket| serve_client(hub, socket))
                    .into_response(),
                Err(rejection) => {
                    tracing::debug!(%rejection, "rejected live-reload upgrade");
                    rejection.into_response()
                }
            };
            Ok(response)
        })
    }
}

/// Forward reload signals to one socket until either side goes away.
async fn serve_client(hub: Hub, mut socket: WebSocket) {
    let (client, mut signals) = Client::new();
    let id = hub.register(client);
    tracing::debug!(client = %id, "live-reload client connected");

    loop {
        tokio::select! {
            signal = signals.recv() => match signal {
                Some(signal) => {
                    let message = Message::Text(signal.payload().to_owned().into());
                    if socket.send(message).await.is_err() {
                        break;
                    }
                }
                None => {
                    socket.send(Message::Close(None)).await.ok();
                    break;
                }
            },
            message = socket.recv() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unregister(id);
    tracing::debug!(client = %id, "live-reload client disconnected");
}
