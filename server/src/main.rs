//! Codenotes Server Entry Point
//!
//! Serves the annotation store as newline-delimited JSON-RPC over stdio.
//! Logs go to stderr so they never interleave with responses.

use clap::Parser;
use codenotes_server::{AnnotationServer, LineTransport, ServerConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "codenotes-server")]
#[command(about = "Git-backed code annotation server")]
#[command(version)]
struct Args {
    /// Annotation repository root (defaults to ~/.codenotes)
    #[arg(long, env = "CODENOTES_REPO_ROOT")]
    repo_root: Option<PathBuf>,

    /// Remote preferred for push and pull
    #[arg(long, env = "CODENOTES_REMOTE", default_value = "origin")]
    remote: String,

    /// git executable to run
    #[arg(long, env = "CODENOTES_GIT", default_value = "git")]
    git: PathBuf,

    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_filter = if args.verbose {
        "codenotes_server=debug,codenotes_store=debug"
    } else {
        "codenotes_server=info,codenotes_store=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ServerConfig::new(args.repo_root, args.remote, args.git);
    tracing::info!("Starting codenotes server");
    tracing::info!("Repository root: {:?}", config.repo_root);

    let mut server = AnnotationServer::from_config(config);
    let mut transport = LineTransport::stdio();
    if let Err(e) = server.run(&mut transport).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
