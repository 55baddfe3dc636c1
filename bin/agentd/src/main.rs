//! The endpoint agent daemon (§6.5, §6.6): wires an [`AgentConfig`] to the
//! five collectors, a durable queue, and the bus shipper, then runs them
//! on the configured cadence until a SIGHUP or a fatal shipper condition
//! ends the process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use amoskys_agent::collectors::{DnsCollector, FimCollector, KernelAuditCollector, NullDnsQuerySource, PeripheralCollector, ProcessCollector};
use amoskys_agent::{AgentConfig, EnvelopeSink, Shipper, ShipperConfig, ShipperHalt, ShutdownFlag};
use amoskys_core::observability::{LogLevel, ObservabilityFacade, OpsEvent, TracingFacade};
use amoskys_core::time::{Clock, SystemClock};
use amoskys_envelope::{DeviceType, TelemetryEvent};
use amoskys_queue::DurableQueue;
use clap::Parser;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "agentd")]
#[command(about = "Collects endpoint telemetry and ships it to the AMOSKYS bus")]
struct Args {
    /// Identifies this endpoint; doubles as the envelope's source identity.
    #[arg(long, env = "AMOSKYS_AGENT_ID")]
    agent_id: String,

    /// Collector scan cadence in seconds (overrides AMOSKYS_AGENT_INTERVAL_SEC).
    #[arg(long)]
    interval: Option<u64>,

    /// Run every collector once, flush what they find, and exit.
    #[arg(long)]
    scan_once: bool,

    /// Write a fresh FIM baseline and exit without emitting any events.
    #[arg(long)]
    baseline_only: bool,
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "agentd=info,amoskys_agent=info".into()))
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("agentd: failed to start async runtime: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "agentd exiting on fatal error");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AgentConfig::from_env(args.agent_id.clone())?;
    if let Some(interval) = args.interval {
        config = config.with_interval(Duration::from_secs(interval));
    }
    config = config.with_scan_once(args.scan_once).with_baseline_only(args.baseline_only);

    let observability = TracingFacade;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if config.baseline_only {
        if config.fim_roots.is_empty() {
            warn!("--baseline-only given but AMOSKYS_FIM_ROOTS is empty, nothing to baseline");
            return Ok(());
        }
        let fim = FimCollector::new(config.fim_roots.clone(), config.fim_baseline_path.clone(), Arc::clone(&clock));
        fim.write_baseline_only()?;
        info!(path = %config.fim_baseline_path.display(), "wrote fresh fim baseline");
        return Ok(());
    }

    let queue_path = config.queue_path.clone();
    if let Some(parent) = queue_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let queue = Arc::new(
        DurableQueue::open(
            queue_path.to_str().ok_or_else(|| anyhow::anyhow!("queue path is not valid UTF-8"))?,
            config.queue_max_bytes,
            config.queue_max_retry,
        )
        .await?,
    );

    let ca_path = config.ca_path.clone().ok_or_else(|| anyhow::anyhow!("AMOSKYS_TLS_CA must be set"))?;
    let tls_config = Arc::new(amoskys_transport::tls::load_client_config(
        &ca_path,
        config.client_cert_path.as_deref(),
        config.client_key_path.as_deref(),
    )?);

    let bus_addr = config
        .bus_addr
        .parse()
        .map_err(|_| anyhow::anyhow!("AMOSKYS_BUS_ADDR {:?} is not a valid socket address", config.bus_addr))?;

    let shutdown = ShutdownFlag::new();
    spawn_sighup_listener(shutdown.clone());

    let shipper_config = ShipperConfig {
        bus_addr,
        bus_server_name: config.bus_server_name.clone(),
        tls_config,
        max_frame_bytes: config.max_env_bytes,
        batch_size: 32,
        idle_poll_interval: Duration::from_millis(500),
    };
    let shipper = Shipper::new(Arc::clone(&queue), shipper_config, shutdown.clone());
    let shipper_handle = tokio::spawn(async move { shipper.run().await });

    let sink = EnvelopeSink::new(Arc::clone(&queue), Arc::clone(&clock), config.agent_id.clone(), DeviceType::Endpoint);
    let collectors = AgentCollectors::new(&config, Arc::clone(&clock));

    if config.scan_once {
        collectors.run_once(&sink).await;
        wait_for_queue_drain(&queue, Duration::from_secs(30)).await;
        shutdown.request();
    } else {
        run_loop(&collectors, &sink, &shutdown, config.interval).await;
    }

    match shipper_handle.await {
        Ok(Ok(ShipperHalt::Shutdown)) => {
            info!("agent shut down cleanly");
            Ok(())
        }
        Ok(Ok(ShipperHalt::Unauthorized)) => {
            observability
                .ops_bus()
                .publish(OpsEvent::new(LogLevel::Error, "agent stopped shipping: bus reports UNAUTHORIZED"));
            Err(anyhow::anyhow!("bus rejected this agent's identity"))
        }
        Ok(Err(err)) => Err(anyhow::anyhow!("shipper failed: {err}")),
        Err(join_err) => Err(anyhow::anyhow!("shipper task panicked: {join_err}")),
    }
}

struct AgentCollectors {
    fim: Option<FimCollector>,
    process: ProcessCollector,
    dns: DnsCollector,
    kernel_audit: KernelAuditCollector,
    peripheral: PeripheralCollector,
}

impl AgentCollectors {
    fn new(config: &AgentConfig, clock: Arc<dyn Clock>) -> Self {
        let fim = if config.fim_roots.is_empty() {
            None
        } else {
            Some(FimCollector::new(config.fim_roots.clone(), config.fim_baseline_path.clone(), Arc::clone(&clock)))
        };
        Self {
            fim,
            process: ProcessCollector::new(Arc::clone(&clock)),
            dns: DnsCollector::new(Box::new(NullDnsQuerySource), Arc::clone(&clock)),
            kernel_audit: KernelAuditCollector::new(Arc::clone(&clock)),
            peripheral: PeripheralCollector::new(clock),
        }
    }

    async fn run_once(&self, sink: &EnvelopeSink) {
        if let Some(fim) = &self.fim {
            match fim.collect() {
                Ok(events) => publish(sink, events, "fim").await,
                Err(err) => warn!(error = %err, "fim collector failed"),
            }
        }
        publish(sink, self.process.collect(), "process").await;
        publish(sink, self.dns.collect(), "dns").await;
        publish(sink, self.kernel_audit.collect(), "kernel_audit").await;
        publish(sink, self.peripheral.collect(), "peripheral").await;
    }
}

async fn publish(sink: &EnvelopeSink, events: Vec<TelemetryEvent>, collector: &'static str) {
    if events.is_empty() {
        return;
    }
    let count = events.len();
    if let Err(err) = sink.publish(events).await {
        warn!(collector, error = %err, "failed to enqueue collector output");
    } else {
        info!(collector, count, "enqueued collector output");
    }
}

async fn run_loop(collectors: &AgentCollectors, sink: &EnvelopeSink, shutdown: &ShutdownFlag, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        if shutdown.is_requested() {
            return;
        }
        ticker.tick().await;
        if shutdown.is_requested() {
            return;
        }
        collectors.run_once(sink).await;
    }
}

async fn wait_for_queue_drain(queue: &DurableQueue, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match queue.is_empty().await {
            Ok(true) => return,
            Ok(false) => {}
            Err(err) => {
                warn!(error = %err, "failed to check queue depth while draining");
                return;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("timed out waiting for the local queue to drain before exit");
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

fn spawn_sighup_listener(shutdown: ShutdownFlag) {
    tokio::spawn(async move {
        let Ok(mut stream) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) else {
            warn!("failed to install SIGHUP handler");
            return;
        };
        while stream.recv().await.is_some() {
            info!("received SIGHUP, requesting graceful shutdown");
            shutdown.request();
        }
    });
}
