use std::{process::ExitCode, time::Duration};

use clap::Parser;
use livehttpd::{
    config::{browser_url, has_project_marker, DEFAULT_PORT},
    Config, Server,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(color=clap::ColorChoice::Never)]
struct Command {
    #[arg(short = 'a', long = "addr", default_value = "127.0.0.1")]
    #[arg(help = "Address to listen on", hide_default_value = true)]
    addr: std::net::IpAddr,

    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_PORT)]
    #[arg(help = "Port to listen on (default 3000)", hide_default_value = true)]
    port: u16,

    #[arg(long = "debounce", default_value = "50", value_name = "MS")]
    #[arg(help = "Milliseconds of quiet before a change triggers a reload")]
    debounce: u64,

    #[arg(long = "skip-project-check")]
    #[arg(help = "Serve even without a gc.config.json in the directory")]
    skip_project_check: bool,

    #[arg(long = "no-open")]
    #[arg(help = "Do not open the served page in a browser")]
    no_open: bool,

    #[arg(help = "Path to serve as HTTP root (default: current directory)")]
    directory: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Command::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("livehttpd=info,tower_http=info")),
        )
        .init();

    let root = args.directory.unwrap_or_else(|| ".".into());
    if !args.skip_project_check && !has_project_marker(&root) {
        eprintln!("This directory is not associated with a project.");
        return ExitCode::SUCCESS;
    }

    let config = Config {
        addr: args.addr,
        port: args.port,
        root,
        debounce: Duration::from_millis(args.debounce),
    };

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(error) => {
            tracing::error!(%error, "failed to start development server");
            return ExitCode::FAILURE;
        }
    };

    if let Ok(addr) = server.local_addr() {
        eprintln!("listening on: http://{}/", addr);
        if !args.no_open {
            let url = browser_url(addr);
            if let Err(error) = open::that_detached(&url) {
                tracing::warn!(%error, url = %url, "could not open a browser");
            }
        }
    }
    tracing::info!(root = %server.root().path().display(), "development server started");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
    };
    match server.run(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "development server stopped");
            ExitCode::FAILURE
        }
    }
}
