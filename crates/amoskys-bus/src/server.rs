//! The connection-handling loop: accept a framed mTLS connection, read
//! frames off it until the peer closes, run each through the admission
//! pipeline, and write the resulting [`crate::ack::PublishAck`] back
//! (§4.1, §6.1).

use std::sync::Arc;

use amoskys_core::error::{codes, CoreError};
use amoskys_core::time::Clock;
use amoskys_transport::BusListener;
use tokio_rustls::server::TlsStream;
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::admission::AdmissionPipeline;

pub struct BusServer {
    listener: BusListener,
    pipeline: Arc<AdmissionPipeline>,
    clock: Arc<dyn Clock>,
}

impl BusServer {
    pub fn new(listener: BusListener, pipeline: Arc<AdmissionPipeline>, clock: Arc<dyn Clock>) -> Self {
        Self { listener, pipeline, clock }
    }

    /// Runs the accept loop until the listener itself errors (a bind-time
    /// failure that can't be recovered from in-process). A single
    /// connection's failure never ends the loop — it's logged and the
    /// loop accepts the next one.
    pub async fn run(&self) -> Result<(), CoreError> {
        loop {
            let (channel, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                    continue;
                }
            };
            info!(%peer_addr, "accepted connection");

            let pipeline = Arc::clone(&self.pipeline);
            let clock = Arc::clone(&self.clock);
            let channel = Arc::new(channel);
            tokio::spawn(async move {
                if let Err(err) = serve_connection(channel, pipeline, clock).await {
                    warn!(%peer_addr, error = %err, "connection ended with an error");
                }
            });
        }
    }
}

async fn serve_connection(
    channel: Arc<amoskys_transport::FramedChannel<TlsStream<TcpStream>>>,
    pipeline: Arc<AdmissionPipeline>,
    clock: Arc<dyn Clock>,
) -> Result<(), CoreError> {
    loop {
        let frame = match channel.read_frame().await? {
            Some(frame) => frame,
            None => return Ok(()),
        };

        let ack = pipeline.admit(&frame, clock.now_ns()).await;
        let encoded = serde_json::to_vec(&ack)
            .map_err(|e| CoreError::new(codes::CODEC_ENCODE_FAILED, "failed to encode publish ack").with_cause(e))?;
        channel.write_frame(&encoded).await?;
    }
}
