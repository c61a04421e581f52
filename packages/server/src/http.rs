//! HTTP accept loop with optional TLS and graceful drain.
//!
//! Connections are served through hyper's auto builder and registered with
//! a [`GracefulShutdown`]: when `shutdown` fires the loop stops accepting,
//! every watched connection is asked to finish its in-flight requests, and
//! [`serve`] returns once the last one is gone — the caller bounds that
//! wait with the shutdown deadline. A TLS handshake (when configured) runs
//! in its own task so a slow client never stalls the accept loop; the
//! established stream is handed back to the loop to be served and watched
//! like any other connection.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::config::TlsCertConfig;
use crate::error::ServerError;

/// Build a TLS acceptor from PEM cert/key files.
pub(crate) fn load_tls_config(tls: &TlsCertConfig) -> Result<Arc<rustls::ServerConfig>, ServerError> {
    let certs = rustls_pemfile::certs(&mut pem_reader(&tls.cert_file)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Init(format!("bad certificate in {}: {e}", tls.cert_file.display())))?;

    let key = rustls_pemfile::private_key(&mut pem_reader(&tls.key_file)?)
        .map_err(|e| ServerError::Init(format!("bad private key in {}: {e}", tls.key_file.display())))?
        .ok_or_else(|| {
            ServerError::Init(format!("no private key found in {}", tls.key_file.display()))
        })?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Init(format!("invalid TLS material: {e}")))?;

    Ok(Arc::new(config))
}

fn pem_reader(path: &Path) -> Result<BufReader<File>, ServerError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| ServerError::Init(format!("cannot open {}: {e}", path.display())))
}

/// Accept connections until `shutdown` fires, then wait for watched
/// connections to drain. The caller bounds the drain with a deadline.
pub(crate) async fn serve(
    listener: TcpListener,
    app: Router,
    tls: Option<TlsAcceptor>,
    mut shutdown: watch::Receiver<bool>,
) {
    let graceful = GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());
    let service = TowerToHyperService::new(app);

    // Established TLS streams come back to this loop so they are served and
    // watched exactly like plaintext connections.
    let (handshaken_tx, mut handshaken_rx) =
        mpsc::unbounded_channel::<(TlsStream<TcpStream>, SocketAddr)>();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                match &tls {
                    Some(acceptor) => {
                        let acceptor = acceptor.clone();
                        let handshaken_tx = handshaken_tx.clone();
                        tokio::spawn(async move {
                            match acceptor.accept(stream).await {
                                Ok(stream) => {
                                    let _ = handshaken_tx.send((stream, peer));
                                }
                                Err(e) => debug!(%peer, error = %e, "TLS handshake failed"),
                            }
                        });
                    }
                    None => {
                        let conn = http.serve_connection(TokioIo::new(stream), service.clone());
                        let conn = graceful.watch(conn.into_owned());
                        tokio::spawn(async move {
                            if let Err(e) = conn.await {
                                debug!(%peer, error = %e, "connection error");
                            }
                        });
                    }
                }
            }

            Some((stream, peer)) = handshaken_rx.recv() => {
                let conn = http.serve_connection(TokioIo::new(stream), service.clone());
                let conn = graceful.watch(conn.into_owned());
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        debug!(%peer, error = %e, "connection error");
                    }
                });
            }

            _ = shutdown.changed() => break,
        }
    }

    // Wait for in-flight requests to complete.
    graceful.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tls_files_are_an_init_error() {
        let err = load_tls_config(&TlsCertConfig {
            cert_file: "/nonexistent/server.crt".into(),
            key_file: "/nonexistent/server.key".into(),
        })
        .unwrap_err();
        assert!(matches!(err, ServerError::Init(_)));
    }
}
