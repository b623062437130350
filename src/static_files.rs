//! Static file serving from the served root.

use std::{
    convert::Infallible,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    handler::HandlerWithoutStateExt,
    routing::{get_service, MethodRouter},
};
use bytes::Bytes;
use futures_core::future::BoxFuture;
use http::{Request, Response, Uri};
use tower::Service;
use tower_http::services::ServeDir;

use crate::Error;

/// Canonical directory that requests are resolved against.
#[derive(Clone, Debug)]
pub struct ServedRoot(Arc<PathBuf>);

impl ServedRoot {
    /// Canonicalize `path` and check that it is a directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let invalid = |source| Error::InvalidRoot {
            path: path.to_path_buf(),
            source,
        };

        let canonical = std::fs::canonicalize(path).map_err(invalid)?;
        if !std::fs::metadata(&canonical).map_err(invalid)?.is_dir() {
            return Err(invalid(io::ErrorKind::NotADirectory.into()));
        }

        Ok(Self(Arc::new(canonical)))
    }

    /// The canonical served directory.
    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// [`ServeDir`] reporting read failures as errors instead of bare 500s.
///
/// Missing files, `..` segments and directories without an `index.html` go
/// to the fallback service.
#[derive(Clone, Debug)]
pub struct StaticFiles<F> {
    dir: ServeDir<F>,
}

impl<F, FResBody> Service<Request<Body>> for StaticFiles<F>
where
    F: Service<Request<Body>, Response = Response<FResBody>, Error = Infallible>
        + Clone
        + Send
        + 'static,
    F::Future: Send + 'static,
    FResBody: http_body::Body<Data = Bytes> + Send + 'static,
    FResBody::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = Response<Body>;
    type Error = io::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let future = self.dir.try_call(request);
        Box::pin(async move { Ok(future.await?.map(Body::new)) })
    }
}

async fn not_found(uri: Uri) -> Error {
    tracing::warn!(path = uri.path(), "404");
    Error::NotFound
}

async fn read_failure(uri: Uri, source: io::Error) -> Error {
    Error::io(uri.path(), source)
}

/// Serve every file below `root`, with the JSON 404 body for anything missing.
///
/// Directories are served through their `index.html`; a directory requested
/// without its trailing slash is redirected to it first.
pub fn serve_dir(root: &ServedRoot) -> MethodRouter {
    let dir = ServeDir::new(root.path())
        .append_index_html_on_directories(true)
        .not_found_service(not_found.into_service());

    get_service(StaticFiles { dir }).handle_error(read_failure)
}
