//! Guide server for tutor tutorials.
//!
//! Serves a tutorial's HTML guide on an ephemeral loopback port and prints
//! the address for the learner. Runs until interrupted.

mod server;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tutor-guide")]
#[command(about = "Serve a tutorial's guide over local HTTP")]
struct Args {
    /// Guide directory (static HTML).
    #[arg(long)]
    root: PathBuf,

    /// Language of the entry page (`index-<lang>.html`).
    #[arg(long)]
    lang: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args = Args::parse();
    if !args.root.is_dir() {
        bail!("guide directory {} does not exist", args.root.display());
    }
    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("resolve {}", args.root.display()))?;

    let listener = server::bind().await?;
    let addr = listener.local_addr()?;
    println!(
        "Open this in your browser: {}",
        server::guide_url(addr, args.lang.as_deref())
    );
    println!("Press Ctrl+C to stop the server.");

    server::serve(listener, root, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}
