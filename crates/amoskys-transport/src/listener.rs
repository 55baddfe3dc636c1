//! The bus's accept side: a TCP listener wrapped in a hot-reloadable TLS
//! acceptor (§6.1, §6.2). Modeled on the read-without-locking,
//! write-is-an-atomic-swap RCU shape used for certificate rotation: a
//! config reload takes effect for the next accepted connection without
//! disturbing connections already established under the old config.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use amoskys_core::error::{codes, CoreError};
use arc_swap::ArcSwap;
use rustls::ServerConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::warn;

use crate::channel::FramedChannel;
use crate::tls;

#[derive(Clone)]
pub struct HotReloadingServerConfig {
    inner: Arc<ArcSwap<ServerConfig>>,
}

impl HotReloadingServerConfig {
    pub fn new(initial: ServerConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::new(Arc::new(initial))),
        }
    }

    pub fn replace(&self, next: ServerConfig) {
        self.inner.store(Arc::new(next));
    }

    /// Re-reads certificate material from disk and swaps it in, for the
    /// bus's SIGHUP handler.
    pub fn reload_from_disk(
        &self,
        cert_path: &Path,
        key_path: &Path,
        ca_path: Option<&Path>,
    ) -> Result<(), CoreError> {
        let config = tls::load_server_config(cert_path, key_path, ca_path)?;
        self.replace(config);
        Ok(())
    }

    fn snapshot(&self) -> Arc<ServerConfig> {
        self.inner.load_full()
    }
}

pub struct BusListener {
    listener: TcpListener,
    config: HotReloadingServerConfig,
    max_frame_bytes: usize,
}

impl BusListener {
    pub async fn bind(
        addr: SocketAddr,
        config: HotReloadingServerConfig,
        max_frame_bytes: usize,
    ) -> Result<Self, CoreError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CoreError::new(codes::TRANSPORT_IO, "failed to bind listener").with_cause(e))?;
        Ok(Self {
            listener,
            config,
            max_frame_bytes,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CoreError> {
        self.listener
            .local_addr()
            .map_err(|e| CoreError::new(codes::TRANSPORT_IO, "failed to read local address").with_cause(e))
    }

    /// Accepts one TCP connection and drives it through the TLS
    /// handshake, using whatever config snapshot is current at the
    /// moment of accept. On handshake failure, logs and returns the
    /// error rather than panicking the accept loop — one bad client
    /// must not take the listener down.
    pub async fn accept(&self) -> Result<(FramedChannel<TlsStream<TcpStream>>, SocketAddr), CoreError> {
        let (tcp_stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| CoreError::new(codes::TRANSPORT_IO, "failed to accept tcp connection").with_cause(e))?;

        let acceptor = TlsAcceptor::from(self.config.snapshot());
        let tls_stream = acceptor.accept(tcp_stream).await.map_err(|e| {
            warn!(%peer_addr, error = %e, "tls handshake failed");
            CoreError::new(codes::TRANSPORT_TLS_HANDSHAKE_FAILED, "tls handshake failed").with_cause(e)
        })?;

        let channel = FramedChannel::new(tls_stream, self.max_frame_bytes, peer_addr.to_string());
        Ok((channel, peer_addr))
    }
}
