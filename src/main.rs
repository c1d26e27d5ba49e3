use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tower_lsp::{LspService, Server};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ldls::backend::Backend;
use ldls::config::Overrides;

/// Language server for Turtle, TriG and JSON-LD.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Serve a single client over TCP instead of stdio, e.g. 127.0.0.1:7612
    #[arg(long, value_name = "ADDR")]
    tcp: Option<String>,

    /// Vocabulary cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Never fetch vocabularies or prefixes from the network
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LDLS_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let overrides = Overrides {
        cache_dir: args.cache_dir,
        offline: args.offline,
    };
    let (service, socket) = LspService::new(|client| Backend::new(client, overrides.clone()));

    match args.tcp {
        Some(addr) => {
            let listener = TcpListener::bind(&addr).await?;
            info!("listening on {addr}");
            let (stream, peer) = listener.accept().await?;
            info!("client connected from {peer}");
            let (read, write) = stream.into_split();
            Server::new(read, write, socket).serve(service).await;
        }
        None => {
            let stdin = tokio::io::stdin();
            let stdout = tokio::io::stdout();
            Server::new(stdin, stdout, socket).serve(service).await;
        }
    }

    Ok(())
}
