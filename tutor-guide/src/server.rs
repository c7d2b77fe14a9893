//! Static guide server.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Router serving `root` as static files, with `index.html` for directories.
pub fn router(root: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root).append_index_html_on_directories(true))
        .layer(TraceLayer::new_for_http())
}

/// Entry page for the learner: the language-specific index when requested.
pub fn guide_url(addr: SocketAddr, lang: Option<&str>) -> String {
    let page = match lang {
        Some(lang) => format!("/index-{lang}.html"),
        None => String::new(),
    };
    format!("http://localhost:{}{page}", addr.port())
}

/// Bind an ephemeral port on loopback.
pub async fn bind() -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    info!(addr = %listener.local_addr()?, "guide server bound");
    Ok(listener)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    root: PathBuf,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!(root = %root.display(), "serving guide");
    axum::serve(listener, router(&root))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
