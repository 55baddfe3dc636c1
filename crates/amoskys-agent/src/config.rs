//! Agent-side configuration (§6.3 state layout, §6.4 env vars, §6.5 CLI
//! surface). Mirrors `amoskys_core::config::BusConfig`'s shape: load
//! typed defaults from the environment, then let the binary's `clap`
//! layer override the handful of fields the CLI exposes.

use std::path::PathBuf;
use std::time::Duration;

use amoskys_core::error::{codes, CoreError};

/// Agent-side configuration. `agent_id` doubles as the envelope's
/// `source_identity` and as the default queue file's stem (§6.3: one
/// queue file per agent, `data/queue/<agent>.db`).
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub agent_id: String,
    pub bus_addr: String,
    pub bus_server_name: String,
    pub queue_path: PathBuf,
    pub queue_max_bytes: u64,
    pub queue_max_retry: u32,
    pub max_env_bytes: usize,
    /// Collector scan cadence; overridden by `--interval` (§6.5).
    pub interval: Duration,
    /// Run every collector once and exit instead of looping (`--scan-once`).
    pub scan_once: bool,
    /// FIM-only: write a fresh baseline and exit without emitting any
    /// `FileChange` events (`--baseline-only`).
    pub baseline_only: bool,
    pub fim_roots: Vec<String>,
    pub fim_baseline_path: PathBuf,
    pub ca_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
}

impl AgentConfig {
    /// Loads configuration from the process environment. `agent_id` has
    /// no sane default (it identifies this specific endpoint), so it is
    /// a required argument rather than something `from_env` invents.
    pub fn from_env(agent_id: impl Into<String>) -> Result<Self, CoreError> {
        let agent_id = agent_id.into();
        let default_queue_path: PathBuf = ["data", "queue", &format!("{agent_id}.db")].iter().collect();

        Ok(Self {
            bus_addr: env_or("AMOSKYS_BUS_ADDR", "127.0.0.1:7443".to_string()),
            bus_server_name: env_or("AMOSKYS_BUS_SERVER_NAME", "amoskys-bus".to_string()),
            queue_path: env_path("AMOSKYS_QUEUE_PATH", default_queue_path),
            queue_max_bytes: env_parsed("AMOSKYS_QUEUE_MAX_BYTES", 64 * 1024 * 1024)?,
            queue_max_retry: env_parsed("AMOSKYS_QUEUE_MAX_RETRY", 8)?,
            max_env_bytes: env_parsed("BUS_MAX_ENV_BYTES", 131_072)?,
            interval: Duration::from_secs(env_parsed("AMOSKYS_AGENT_INTERVAL_SEC", 60)?),
            scan_once: false,
            baseline_only: false,
            fim_roots: env_list("AMOSKYS_FIM_ROOTS"),
            fim_baseline_path: env_path("AMOSKYS_FIM_BASELINE_PATH", PathBuf::from("data/fim-baseline.json")),
            ca_path: std::env::var("AMOSKYS_TLS_CA").ok().map(PathBuf::from),
            client_cert_path: std::env::var("AMOSKYS_TLS_CLIENT_CERT").ok().map(PathBuf::from),
            client_key_path: std::env::var("AMOSKYS_TLS_CLIENT_KEY").ok().map(PathBuf::from),
            agent_id,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_scan_once(mut self, scan_once: bool) -> Self {
        self.scan_once = scan_once;
        self
    }

    pub fn with_baseline_only(mut self, baseline_only: bool) -> Self {
        self.baseline_only = baseline_only;
        self
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| {
            CoreError::new(
                codes::STORE_SCHEMA,
                format!("environment variable {key}={raw:?} is not a valid value"),
            )
        }),
    }
}

/// Comma-separated list, trimmed, empty entries dropped. Unset → empty.
fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("AMOSKYS_QUEUE_MAX_BYTES");
        let cfg = AgentConfig::from_env("agent-1").unwrap();
        assert_eq!(cfg.queue_max_bytes, 64 * 1024 * 1024);
        assert_eq!(cfg.queue_path, PathBuf::from("data/queue/agent-1.db"));
    }

    #[test]
    fn parses_fim_roots_list() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("AMOSKYS_FIM_ROOTS", "/usr/bin, /etc ,");
        let cfg = AgentConfig::from_env("agent-1").unwrap();
        assert_eq!(cfg.fim_roots, vec!["/usr/bin", "/etc"]);
        std::env::remove_var("AMOSKYS_FIM_ROOTS");
    }

    #[test]
    fn rejects_garbage_numeric_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("AMOSKYS_QUEUE_MAX_RETRY", "not-a-number");
        assert!(AgentConfig::from_env("agent-1").is_err());
        std::env::remove_var("AMOSKYS_QUEUE_MAX_RETRY");
    }
}
