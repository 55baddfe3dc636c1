//! The agent's connect side (§6.5): dial the bus, complete the TLS
//! handshake, and hand back a framed channel ready for envelope shipping.

use std::net::SocketAddr;

use amoskys_core::error::{codes, CoreError};
use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::channel::FramedChannel;

pub async fn connect(
    addr: SocketAddr,
    server_name: &str,
    config: Arc<ClientConfig>,
    max_frame_bytes: usize,
) -> Result<FramedChannel<TlsStream<TcpStream>>, CoreError> {
    let tcp_stream = TcpStream::connect(addr)
        .await
        .map_err(|e| CoreError::new(codes::TRANSPORT_IO, "failed to connect to bus").with_cause(e))?;

    let name = ServerName::try_from(server_name.to_owned())
        .map_err(|e| CoreError::new(codes::TRANSPORT_TLS_HANDSHAKE_FAILED, "invalid server name").with_cause(e))?;

    let connector = TlsConnector::from(config);
    let tls_stream = connector
        .connect(name, tcp_stream)
        .await
        .map_err(|e| CoreError::new(codes::TRANSPORT_TLS_HANDSHAKE_FAILED, "tls handshake to bus failed").with_cause(e))?;

    Ok(FramedChannel::new(tls_stream, max_frame_bytes, addr.to_string()))
}
