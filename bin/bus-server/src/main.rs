//! The EventBus ingest binary (§6.1, §6.4, §6.7): brings up the mTLS
//! admission listener, the plain-HTTP liveness/metrics surface, and the
//! correlation fan-out, then waits for a SIGHUP (reload TLS material
//! and the trust map in place) or a fatal listener error.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use amoskys_bus::{AdmissionPipeline, BusMetrics, BusServer, LivenessState};
use amoskys_core::config::BusConfig;
use amoskys_core::time::{Clock, SystemClock};
use amoskys_correlation::{CorrelationEngine, EventView};
use amoskys_store::Store;
use amoskys_transport::listener::HotReloadingServerConfig;
use amoskys_transport::{BusListener, TrustMap};
use clap::Parser;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "bus-server")]
#[command(about = "Runs the AMOSKYS EventBus ingest service")]
struct Args {
    /// Plain-HTTP bind address for /healthz and /metrics (§6.7).
    #[arg(long, env = "AMOSKYS_LIVENESS_ADDR", default_value = "127.0.0.1:9090")]
    liveness_addr: SocketAddr,

    /// Path to the libSQL-backed store database (WAL + telemetry + incidents).
    #[arg(long, env = "AMOSKYS_STORE_PATH", default_value = "data/bus/store.db")]
    store_path: PathBuf,

    /// Server certificate presented during the TLS handshake.
    #[arg(long, env = "AMOSKYS_TLS_CERT")]
    tls_cert: PathBuf,

    /// Private key for the server certificate.
    #[arg(long, env = "AMOSKYS_TLS_KEY")]
    tls_key: PathBuf,

    /// CA bundle. When set, client certificates are required (mTLS).
    #[arg(long, env = "AMOSKYS_TLS_CA")]
    tls_ca: Option<PathBuf>,

    /// YAML `{cn → pubkey path}` map of agents the bus admits.
    #[arg(long, env = "AMOSKYS_TRUST_MAP_PATH")]
    trust_map_path: PathBuf,

    /// Correlation window size (§4.4 sliding window).
    #[arg(long, env = "AMOSKYS_CORRELATION_WINDOW_SEC", default_value_t = 1800)]
    correlation_window_sec: u64,

    /// Tumbling-cadence period for the periodic full re-evaluation pass.
    #[arg(long, env = "AMOSKYS_CORRELATION_EVAL_SEC", default_value_t = 30)]
    correlation_eval_sec: u64,
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "bus_server=info,amoskys_bus=info".into()))
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("bus-server: failed to start async runtime: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "bus-server exiting on fatal error");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let bus_config = BusConfig::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if let Some(parent) = args.store_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store_path = args.store_path.to_str().ok_or_else(|| anyhow::anyhow!("store path is not valid UTF-8"))?;
    let store = Arc::new(Store::open(store_path).await?);
    let metrics = Arc::new(BusMetrics::new()?);

    let trust_map = TrustMap::load(&args.trust_map_path)?;
    info!(agents = trust_map.len(), path = %args.trust_map_path.display(), "loaded trust map");

    let server_config = HotReloadingServerConfig::new(amoskys_transport::tls::load_server_config(
        &args.tls_cert,
        &args.tls_key,
        args.tls_ca.as_deref(),
    )?);

    let bind_addr: SocketAddr = format!("0.0.0.0:{}", bus_config.server_port)
        .parse()
        .map_err(|_| anyhow::anyhow!("BUS_SERVER_PORT {} does not form a valid bind address", bus_config.server_port))?;
    let listener = BusListener::bind(bind_addr, server_config.clone(), bus_config.max_env_bytes).await?;

    let (telemetry_tx, mut telemetry_rx) = tokio::sync::mpsc::unbounded_channel();
    let pipeline = Arc::new(AdmissionPipeline::new(bus_config, Arc::clone(&store), Arc::clone(&metrics), Arc::clone(&clock)).with_telemetry_sender(telemetry_tx));

    spawn_sighup_reload_listener(server_config, trust_map.clone(), args.tls_cert.clone(), args.tls_key.clone(), args.tls_ca.clone(), args.trust_map_path.clone(), Arc::clone(&pipeline));

    let engine = Arc::new(CorrelationEngine::new(Duration::from_secs(args.correlation_window_sec), Arc::clone(&store), Arc::clone(&clock)));

    let correlation_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        while let Some((device_id, event)) = telemetry_rx.recv().await {
            correlation_engine.ingest(EventView::from_telemetry(device_id, event));
        }
    });

    let eval_engine = Arc::clone(&engine);
    let eval_interval = Duration::from_secs(args.correlation_eval_sec.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(eval_interval);
        loop {
            ticker.tick().await;
            match eval_engine.evaluate_all().await {
                Ok(count) if count > 0 => info!(incidents = count, "correlation sweep emitted incidents"),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "correlation sweep failed"),
            }
        }
    });

    let liveness_state = LivenessState { metrics: Arc::clone(&metrics), pipeline: Arc::clone(&pipeline) };
    let liveness_addr = args.liveness_addr;
    tokio::spawn(async move {
        let tcp_listener = match tokio::net::TcpListener::bind(liveness_addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!(%liveness_addr, error = %err, "failed to bind liveness listener");
                return;
            }
        };
        info!(%liveness_addr, "liveness/metrics surface listening");
        if let Err(err) = axum::serve(tcp_listener, amoskys_bus::liveness::router(liveness_state)).await {
            error!(error = %err, "liveness server exited");
        }
    });

    let bus_server = BusServer::new(listener, pipeline, clock);
    info!(%bind_addr, "bus ingest listener running");
    bus_server.run().await?;
    Ok(())
}

/// SIGHUP reloads TLS material and the trust map in place, without
/// restarting the listener or dropping connections already accepted
/// under the previous config.
fn spawn_sighup_reload_listener(
    server_config: HotReloadingServerConfig,
    trust_map: TrustMap,
    tls_cert: PathBuf,
    tls_key: PathBuf,
    tls_ca: Option<PathBuf>,
    trust_map_path: PathBuf,
    pipeline: Arc<AdmissionPipeline>,
) {
    tokio::spawn(async move {
        let Ok(mut stream) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) else {
            warn!("failed to install SIGHUP handler");
            return;
        };
        while stream.recv().await.is_some() {
            info!("received SIGHUP, reloading TLS material and trust map");
            if let Err(err) = server_config.reload_from_disk(&tls_cert, &tls_key, tls_ca.as_deref()) {
                error!(error = %err, "failed to reload TLS material");
            }
            if let Err(err) = trust_map.reload(&trust_map_path) {
                error!(error = %err, "failed to reload trust map");
            } else {
                info!(agents = trust_map.len(), "trust map reloaded");
            }
            match BusConfig::from_env() {
                Ok(reloaded) => {
                    pipeline.set_overloaded(reloaded.overload_flag_seed);
                    info!(overloaded = reloaded.overload_flag_seed, "runtime overload flag reloaded");
                }
                Err(err) => error!(error = %err, "failed to reload BUS_OVERLOAD"),
            }
        }
    });
}
