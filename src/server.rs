//! HTTP(S) listener
//!
//! Serves the API router until SIGINT or SIGTERM. With certificate and key
//! configured every connection goes through a rustls handshake first and
//! is then handed to hyper; otherwise plain HTTP is served.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use color_eyre::{eyre::eyre, Result};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::Service;
use tracing::{debug, info, warn};

use crate::config::ServerConfig as ListenerConfig;
use crate::tls::load_server_tls;

pub async fn run(app: Router, config: &ListenerConfig) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| eyre!("Failed to bind {}: {}", addr, e))?;

    match config.tls_files() {
        Some((cert_file, key_file)) => {
            let tls = load_server_tls(cert_file, key_file).await?;
            info!(transport = "HTTPS", address = %addr, "listening");
            serve_tls(listener, app, tls, shutdown_signal()).await
        }
        None => {
            warn!("No certificate configured, serving plain HTTP");
            info!(transport = "HTTP", address = %addr, "listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .map_err(|e| eyre!("Server failed: {}", e))
        }
    }
}

/// Accepts TLS connections until `shutdown` resolves. Connections already
/// accepted keep running on their own tasks.
pub async fn serve_tls(
    listener: TcpListener,
    app: Router,
    tls: Arc<ServerConfig>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let acceptor = TlsAcceptor::from(tls);
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!(%peer, "TLS handshake failed: {}", e);
                    return;
                }
            };

            let service = hyper::service::service_fn(move |request: hyper::Request<Incoming>| {
                app.clone().call(request)
            });

            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(TokioIo::new(stream), service)
                .await
            {
                debug!(%peer, "Connection closed with error: {}", e);
            }
        });
    }

    info!("HTTPS listener stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
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
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
