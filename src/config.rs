//! Server configuration.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 3000;

/// Quiet period used to collapse bursts of filesystem events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// File that marks a directory as a project that may be served.
pub const PROJECT_MARKER: &str = "gc.config.json";

/// Settings for a [`Server`](crate::Server).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Address to listen on.
    pub addr: IpAddr,
    /// Port for both HTTP and live-reload connections. `0` picks a free port.
    pub port: u16,
    /// Directory to serve and watch.
    pub root: PathBuf,
    /// Quiet period before a burst of changes triggers a reload.
    pub debounce: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            root: PathBuf::from("."),
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl Config {
    /// Configuration serving `root` with defaults for everything else.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

/// Whether `dir` contains the [`PROJECT_MARKER`] file.
pub fn has_project_marker(dir: &Path) -> bool {
    dir.join(PROJECT_MARKER).is_file()
}

/// URL to open in a browser for a server listening on `addr`.
///
/// Loopback and unspecified addresses are reached through `localhost`.
pub fn browser_url(addr: SocketAddr) -> String {
    let ip = addr.ip();
    if ip.is_loopback() || ip.is_unspecified() {
        format!("http://localhost:{}/", addr.port())
    } else {
        format!("http://{addr}/")
    }
}
