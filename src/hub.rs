//! Registry of connected live-reload clients.
//!
//! The [`Hub`] owns every [`Client`] for the lifetime of its connection.
//! Broadcasting never waits on a client: each client has a small queue, and
//! a full queue already holds a pending reload for that client.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures_core::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::StreamExt;

use crate::{watcher::ChangeEvent, Error};

/// Text sent to browsers to make them reload.
pub const RELOAD_SIGNAL: &str = "file-change-event";

const CLIENT_QUEUE: usize = 4;

/// The "reload now" signal queued for a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReloadSignal;

impl ReloadSignal {
    /// Wire representation of the signal.
    pub fn payload(self) -> &'static str {
        RELOAD_SIGNAL
    }
}

/// Identifier of a registered client, unique for the process lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hub side of one live-reload connection.
#[derive(Debug)]
pub struct Client {
    sender: mpsc::Sender<ReloadSignal>,
}

impl Client {
    /// Create a client together with the receiving end its connection reads.
    pub fn new() -> (Self, mpsc::Receiver<ReloadSignal>) {
        let (sender, receiver) = mpsc::channel(CLIENT_QUEUE);
        (Self { sender }, receiver)
    }
}

#[derive(Debug, Default)]
struct ClientSet {
    clients: HashMap<ClientId, Client>,
    next_id: u64,
    closed: bool,
}

/// Shared registry of live-reload clients.
#[derive(Clone, Debug, Default)]
pub struct Hub {
    inner: Arc<Mutex<ClientSet>>,
}

impl Hub {
    /// Create an empty [`Hub`].
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ClientSet> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a newly connected client.
    ///
    /// After [`Hub::close_all`] the client is dropped right away, which closes
    /// its connection.
    pub fn register(&self, client: Client) -> ClientId {
        let mut set = self.lock();
        let id = ClientId(set.next_id);
        set.next_id += 1;
        if !set.closed {
            set.clients.insert(id, client);
        }
        id
    }

    /// Remove a client. Removing an absent client does nothing.
    pub fn unregister(&self, id: ClientId) {
        self.lock().clients.remove(&id);
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.lock().clients.len()
    }

    /// Whether no client is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue a reload for every registered client.
    ///
    /// Clients whose connection is gone are removed. Returns the number of
    /// clients that will reload.
    pub fn broadcast(&self) -> usize {
        let mut set = self.lock();
        let mut failed = Vec::new();
        let mut delivered = 0;

        for (&id, client) in &set.clients {
            match client.sender.try_send(ReloadSignal) {
                Ok(()) | Err(TrySendError::Full(_)) => delivered += 1,
                Err(TrySendError::Closed(_)) => failed.push(id),
            }
        }

        for id in failed {
            set.clients.remove(&id);
            tracing::debug!(error = %Error::ClientSendFailure(id), "dropped live-reload client");
        }

        delivered
    }

    /// Drop every client and refuse new ones.
    pub fn close_all(&self) {
        let mut set = self.lock();
        set.closed = true;
        set.clients.clear();
    }

    /// Broadcast a reload for every change until the stream ends.
    pub async fn run<C>(self, changes: C)
    where
        C: Stream<Item = ChangeEvent> + Unpin,
    {
        let mut changes = changes;
        while let Some(ChangeEvent) = changes.next().await {
            let clients = self.broadcast();
            tracing::info!(clients, "Reloading clients...");
        }
        tracing::debug!("change stream ended");
    }
}
