//! Recursive filesystem watching.
//!
//! Raw [`notify`] events are forwarded from the watcher thread into a channel
//! and collapsed into [`ChangeEvent`]s by a debounce task.

use std::{
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::Error;

const CHANGE_QUEUE: usize = 16;

/// Something below the watched root changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeEvent;

/// Stream of [`ChangeEvent`]s produced by a [`FileWatcher`].
pub type ChangeStream = ReceiverStream<ChangeEvent>;

/// Keeps a recursive watch alive; dropping it stops watching.
#[derive(Debug)]
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `root` recursively.
    ///
    /// Events closer together than `debounce` are reported as a single
    /// change. Must be called from within a tokio runtime.
    pub fn watch(root: &Path, debounce: Duration) -> Result<(Self, ChangeStream), Error> {
        let unavailable = |source| Error::WatcherUnavailable {
            path: root.to_path_buf(),
            source,
        };

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let reported = AtomicBool::new(false);
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            match event {
                Ok(event) if event.kind.is_access() => {}
                Ok(_) => {
                    raw_tx.send(()).ok();
                }
                Err(error) => {
                    if !reported.swap(true, Ordering::Relaxed) {
                        tracing::warn!(%error, "file watcher reported an error");
                    }
                }
            }
        })
        .map_err(unavailable)?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(unavailable)?;

        let (change_tx, change_rx) = mpsc::channel(CHANGE_QUEUE);
        tokio::spawn(debounce_changes(raw_rx, change_tx, debounce));

        tracing::debug!(root = %root.display(), ?debounce, "watching for changes");
        Ok((Self { _watcher: watcher }, ReceiverStream::new(change_rx)))
    }
}

/// Turn raw events into [`ChangeEvent`]s, one per quiet period of `window`.
pub(crate) async fn debounce_changes(
    mut raw: mpsc::UnboundedReceiver<()>,
    changes: mpsc::Sender<ChangeEvent>,
    window: Duration,
) {
    while raw.recv().await.is_some() {
        if !window.is_zero() {
            while let Ok(Some(())) = tokio::time::timeout(window, raw.recv()).await {}
        }
        if changes.send(ChangeEvent).await.is_err() {
            break;
        }
    }
}
