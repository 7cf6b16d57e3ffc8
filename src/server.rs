//! Web server

use crate::app::Service;
use crate::cli::CommandLineArgs;

use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use axum::ServiceExt;
use axum_server::{tls_rustls::RustlsConfig, Handle};
use expanduser::expanduser;
use thiserror::Error;
use tokio::signal;

/// Failure to start or run the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The host and port do not form a socket address
    #[error("invalid listen address {addr}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    /// A TLS certificate or key path could not be resolved
    #[error("TLS {kind} file {path} not usable")]
    TlsFile {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The TLS certificate or key could not be loaded
    #[error("failed to load TLS certificate files")]
    TlsConfig(#[source] std::io::Error),

    /// The server failed while binding or serving
    #[error("server failed")]
    Serve(#[from] std::io::Error),
}

/// Serve the EAR service until a shutdown signal arrives.
///
/// # Arguments
///
/// * `args`: Command line arguments
/// * `service`: The [crate::app::Service] to serve
pub async fn serve(args: &CommandLineArgs, service: Service) -> Result<(), ServerError> {
    let addr = listen_addr(args)?;
    let tls = if args.https {
        let cert_file = tls_file("certificate", &args.cert_file)?;
        let key_file = tls_file("key", &args.key_file)?;
        Some(
            RustlsConfig::from_pem_file(cert_file, key_file)
                .await
                .map_err(ServerError::TlsConfig)?,
        )
    } else {
        None
    };

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(
        handle.clone(),
        Duration::from_secs(args.graceful_shutdown_timeout),
    ));

    let make_service = service.into_make_service();
    match tls {
        Some(tls_config) => {
            tracing::info!("listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(make_service)
                .await?
        }
        None => {
            tracing::info!("listening on http://{}", addr);
            axum_server::bind(addr)
                .handle(handle)
                .serve(make_service)
                .await?
        }
    }
    Ok(())
}

fn listen_addr(args: &CommandLineArgs) -> Result<SocketAddr, ServerError> {
    let addr = format!("{}:{}", args.host, args.port);
    addr.parse()
        .map_err(|source| ServerError::InvalidAddress { addr, source })
}

/// Expand `~` in `path` and resolve it to an existing absolute path.
fn tls_file(kind: &'static str, path: &str) -> Result<PathBuf, ServerError> {
    expanduser(path)
        .and_then(|expanded| expanded.canonicalize())
        .map_err(|source| ServerError::TlsFile {
            kind,
            path: path.to_string(),
            source,
        })
}

/// Graceful shutdown handler
///
/// Waits for Ctrl-C or SIGTERM, then gives in-flight requests `timeout` to complete.
/// A signal that cannot be installed is logged and never fires.
async fn shutdown_signal(handle: Handle, timeout: Duration) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::warn!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to install SIGTERM handler: {}", err);
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

    tracing::info!("signal received, starting graceful shutdown");
    handle.graceful_shutdown(Some(timeout));
}
