//! Static host for the viewer's assets.
//!
//! Serves files under the public root with content types guessed from the
//! extension. Directory requests fall back to their `index.html`. The video
//! itself is never proxied here: the bundled `index.html` is a landing page
//! that points at the media server's WHEP endpoint and the `view` command.

use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::HostConfig;

pub fn build_router(config: &HostConfig) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(&config.root))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(config: HostConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.socket_addr()).await?;
    let addr = listener.local_addr()?;

    info!("web server is running on http://{addr}");
    info!("serving {}; the video stream itself comes from the media server", config.root.display());

    axum::serve(listener, build_router(&config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("web server stopped");
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn host_with_assets() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>viewer</h1>").unwrap();
        std::fs::write(dir.path().join("style.css"), "body {}").unwrap();
        std::fs::create_dir(dir.path().join("icons")).unwrap();
        std::fs::write(dir.path().join("icons/muted.svg"), "<svg/>").unwrap();

        let config = HostConfig {
            root: dir.path().to_path_buf(),
            ..HostConfig::default()
        };
        let router = build_router(&config);
        (dir, router)
    }

    async fn get(router: Router, uri: &str) -> axum::response::Response {
        router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn serves_assets_with_guessed_content_type() {
        let (_dir, router) = host_with_assets();
        let response = get(router, "/style.css").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
    }

    #[tokio::test]
    async fn root_serves_index() {
        let (_dir, router) = host_with_assets();
        let response = get(router, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"<h1>viewer</h1>");
    }

    #[tokio::test]
    async fn bundled_landing_page_names_the_endpoint() {
        let config = HostConfig {
            root: concat!(env!("CARGO_MANIFEST_DIR"), "/public").into(),
            ..HostConfig::default()
        };
        let response = get(build_router(&config), "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(page.contains(":8889/stream/whep"));
        assert!(page.contains("whep-viewer view"));
    }

    #[tokio::test]
    async fn nested_assets_are_served() {
        let (_dir, router) = host_with_assets();
        let response = get(router, "/icons/muted.svg").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/svg+xml");
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let (_dir, router) = host_with_assets();
        let response = get(router, "/stream/whep").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn paths_cannot_escape_the_root() {
        let (_dir, router) = host_with_assets();
        let response = get(router, "/../Cargo.toml").await;
        assert_ne!(response.status(), StatusCode::OK);
    }
}
