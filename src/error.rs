use std::{io, net::SocketAddr, path::PathBuf};

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::Serialize;

use crate::hub::ClientId;

/// Errors produced while serving files and pushing reloads.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested file does not exist below the served root.
    #[error("requested file not found on the directory")]
    NotFound,

    /// Reading from the served root failed for a reason other than absence.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// A recursive watch could not be established, live reload is off.
    #[error("cannot watch {}: {source}", path.display())]
    WatcherUnavailable {
        /// Directory that was to be watched.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: notify::Error,
    },

    /// The listening socket could not be bound.
    #[error("cannot listen on {addr}: {source}")]
    ListenFailure {
        /// Address the server tried to bind.
        addr: SocketAddr,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// A live-reload client went away before a signal could be queued.
    #[error("live-reload client {0} is gone")]
    ClientSendFailure(ClientId),

    /// The served root is missing or is not a directory.
    #[error("cannot serve {}: {source}", path.display())]
    InvalidRoot {
        /// Directory given as the served root.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// The accept loop stopped with an error.
    #[error("server failed: {0}")]
    Serve(#[source] io::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => Error::NotFound,
            _ => Error::Io {
                path: path.into(),
                source,
            },
        }
    }
}

/// Body of every 404 response.
#[derive(Debug, Serialize)]
pub(crate) struct NotFoundBody {
    code: &'static str,
    message: &'static str,
}

pub(crate) const NOT_FOUND_BODY: NotFoundBody = NotFoundBody {
    code: "NOT-FOUND",
    message: "Requested file not found on the directory.",
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::NotFound => (StatusCode::NOT_FOUND, Json(NOT_FOUND_BODY)).into_response(),
            Error::Io { ref path, ref source } => {
                tracing::error!(path = %path.display(), error = %source, "failed to read file");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            Error::WatcherUnavailable { .. }
            | Error::ListenFailure { .. }
            | Error::ClientSendFailure(_)
            | Error::InvalidRoot { .. }
            | Error::Serve(_) => {
                tracing::error!(error = %self, "unexpected error while handling request");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
