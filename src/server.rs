use std::{future::Future, net::SocketAddr};

use axum::Router;
use http::{header, HeaderValue};
use tokio::net::TcpListener;
use tower::layer::util::Stack;
use tower_http::{
    set_header::SetResponseHeaderLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    static_files::serve_dir, watcher::FileWatcher, Config, Error, Hub, LiveReloadLayer,
    ServedRoot,
};

type Srhl = SetResponseHeaderLayer<HeaderValue>;

fn no_cache_layer() -> Stack<Srhl, Stack<Srhl, Srhl>> {
    Stack::new(
        SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ),
        Stack::new(
            SetResponseHeaderLayer::overriding(header::PRAGMA, HeaderValue::from_static("no-cache")),
            SetResponseHeaderLayer::overriding(header::EXPIRES, HeaderValue::from_static("0")),
        ),
    )
}

/// Build the application serving `root` behind the live-reload middleware.
pub fn router(root: ServedRoot, livereload: LiveReloadLayer) -> Router {
    let files = serve_dir(&root);
    Router::new()
        .route("/", files.clone())
        .route("/{*path}", files)
        .layer(livereload)
        .layer(no_cache_layer())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// A bound development server, ready to [`run`](Server::run).
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    root: ServedRoot,
    config: Config,
    livereload: LiveReloadLayer,
}

impl Server {
    /// Validate the served root and bind the listening socket.
    pub async fn bind(config: Config) -> Result<Self, Error> {
        let root = ServedRoot::new(&config.root)?;
        let addr = config.socket_addr();
        let listen_failure = |source| Error::ListenFailure { addr, source };

        let listener = TcpListener::bind(addr).await.map_err(listen_failure)?;
        let port = listener.local_addr().map_err(listen_failure)?.port();

        Ok(Self {
            listener,
            root,
            config,
            livereload: LiveReloadLayer::new(port),
        })
    }

    /// Address the server accepts connections on.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        let addr = self.config.socket_addr();
        self.listener
            .local_addr()
            .map_err(|source| Error::ListenFailure { addr, source })
    }

    /// Directory being served.
    pub fn root(&self) -> &ServedRoot {
        &self.root
    }

    /// Clients connected to this server.
    pub fn hub(&self) -> Hub {
        self.livereload.hub()
    }

    /// Serve requests until `shutdown` completes.
    ///
    /// If the served root cannot be watched the server keeps running without
    /// live reload. On shutdown every live-reload channel is closed.
    pub async fn run<F>(self, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let hub = self.hub();
        let watcher = match FileWatcher::watch(self.root.path(), self.config.debounce) {
            Ok((watcher, changes)) => {
                tokio::spawn(hub.clone().run(changes));
                Some(watcher)
            }
            Err(error) => {
                tracing::warn!(%error, "live reload disabled");
                None
            }
        };

        let app = router(self.root, self.livereload);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("shutting down");
                hub.close_all();
            })
            .await
            .map_err(Error::Serve)?;

        drop(watcher);
        Ok(())
    }
}
