// flowgate-http/src/server.rs
// ============================================================================
// Module: HTTP Server Bootstrap
// Description: TLS configuration, listener binding, and graceful shutdown for
//              the public Flow API and (optionally) the internal shard router.
// Purpose: Wire the axum routers built in api.rs/internal.rs to a real
//          listener, following the codebase's existing TLS/shutdown pattern.
// Dependencies: axum, axum_server, rustls, rustls_pemfile, tokio
// ============================================================================

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::PrivateKeyDer;
use rustls_pemfile::Item;
use thiserror::Error;

/// TLS material, loaded once at startup.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    /// PEM-encoded certificate chain.
    pub cert_path: PathBuf,
    /// PEM-encoded private key.
    pub key_path: PathBuf,
}

/// Bind address and optional TLS configuration for [`serve`].
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Socket address to bind.
    pub bind: SocketAddr,
    /// TLS certificate/key paths; `None` serves plaintext (local/dev only).
    pub tls: Option<TlsPaths>,
}

/// Errors raised while starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured bind address could not be bound.
    #[error("failed to bind {0}")]
    Bind(SocketAddr),
    /// A TLS certificate or key file could not be read or parsed.
    #[error("tls configuration invalid: {0}")]
    Tls(String),
    /// The server loop exited with an I/O failure.
    #[error("http server failed: {0}")]
    Serve(String),
}

/// Serves `app` at `config.bind`, over TLS if configured, until a Ctrl-C or
/// SIGTERM is received, then drains in-flight requests before returning.
///
/// # Errors
///
/// Returns [`ServerError`] if the address cannot be bound or the TLS
/// material is invalid.
pub async fn serve(app: Router, config: HttpServerConfig) -> Result<(), ServerError> {
    match config.tls {
        Some(tls) => serve_tls(app, config.bind, &tls).await,
        None => serve_plaintext(app, config.bind).await,
    }
}

async fn serve_plaintext(app: Router, bind: SocketAddr) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|_| ServerError::Bind(bind))?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| ServerError::Serve(err.to_string()))
}

async fn serve_tls(app: Router, bind: SocketAddr, tls: &TlsPaths) -> Result<(), ServerError> {
    let tls_config = build_tls_config(tls)?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_handle.graceful_shutdown(Some(std::time::Duration::from_secs(30)));
    });
    axum_server::bind_rustls(bind, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|err| ServerError::Serve(err.to_string()))
}

/// Resolves on Ctrl-C (and, on Unix, SIGTERM) so `serve` can drain gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            std::future::pending::<()>().await;
            return;
        };
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

fn build_tls_config(paths: &TlsPaths) -> Result<axum_server::tls_rustls::RustlsConfig, ServerError> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let certs = load_certificates(&paths.cert_path)?;
    let key = load_private_key(&paths.key_path)?;
    let mut server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| ServerError::Tls(err.to_string()))?;
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(axum_server::tls_rustls::RustlsConfig::from_config(Arc::new(server_config)))
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let file = File::open(path).map_err(|err| ServerError::Tls(format!("cert open failed: {err}")))?;
    let mut reader = BufReader::new(file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<_, _>>()
        .map_err(|err| ServerError::Tls(format!("cert read failed: {err}")))?;
    if certs.is_empty() {
        return Err(ServerError::Tls("cert file contains no certificates".to_string()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let file = File::open(path).map_err(|err| ServerError::Tls(format!("key open failed: {err}")))?;
    let mut reader = BufReader::new(file);
    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::Pkcs8Key(key))) => return Ok(PrivateKeyDer::Pkcs8(key)),
            Ok(Some(Item::Pkcs1Key(key))) => return Ok(PrivateKeyDer::Pkcs1(key)),
            Ok(Some(Item::Sec1Key(key))) => return Ok(PrivateKeyDer::Sec1(key)),
            Ok(Some(_)) => continue,
            Ok(None) => return Err(ServerError::Tls("key file contains no private key".to_string())),
            Err(err) => return Err(ServerError::Tls(format!("key read failed: {err}"))),
        }
    }
}
