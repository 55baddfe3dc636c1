//! Minimal environment-variable configuration surface for the EventBus
//! (§6.4). This is deliberately not a generic layered config framework —
//! full configuration loading is one of spec.md's external-collaborator
//! concerns — but the handful of variables the admission pipeline actually
//! branches on (size limit, dedupe TTL, overload toggle, mTLS enforcement)
//! need a single typed, fallible place to come from.

use std::time::Duration;

use crate::error::{codes, CoreError};

/// Tri-state overload admission mode (§4.1 step 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverloadMode {
    /// Every publish is shed with RETRY, unconditionally.
    On,
    /// Overload shedding never triggers.
    Off,
    /// Consult the runtime-settable overload flag (seeded from
    /// `BUS_OVERLOAD`, updatable afterwards e.g. via a reload signal).
    Auto,
}

/// Bus-side configuration, loaded from the variables in §6.4.
#[derive(Clone, Debug)]
pub struct BusConfig {
    pub server_port: u16,
    pub overload_mode: OverloadMode,
    /// Seed value for the runtime overload flag when `overload_mode` is
    /// [`OverloadMode::Auto`]; read from `BUS_OVERLOAD`.
    pub overload_flag_seed: bool,
    pub max_env_bytes: usize,
    /// Soft cap on concurrently in-flight admission requests (§4.1 step 3).
    /// Not in the documented env table; defaults to the §5 worker pool
    /// size (50) and can be overridden via `BUS_MAX_INFLIGHT` for load
    /// testing without recompiling.
    pub max_inflight: usize,
    pub dedupe_ttl: Duration,
    pub dedupe_max: usize,
    pub require_client_auth: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            server_port: 7443,
            overload_mode: OverloadMode::Auto,
            overload_flag_seed: false,
            max_env_bytes: 131_072,
            max_inflight: 50,
            dedupe_ttl: Duration::from_secs(300),
            dedupe_max: 50_000,
            require_client_auth: false,
        }
    }
}

impl BusConfig {
    /// Load configuration from the process environment, falling back to
    /// [`BusConfig::default`] for anything unset. Fails only when a set
    /// variable can't be parsed — unset is never an error.
    pub fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();
        Ok(Self {
            server_port: env_parsed("BUS_SERVER_PORT", defaults.server_port)?,
            overload_mode: OverloadMode::Auto,
            overload_flag_seed: env_bool("BUS_OVERLOAD", defaults.overload_flag_seed)?,
            max_env_bytes: env_parsed("BUS_MAX_ENV_BYTES", defaults.max_env_bytes)?,
            max_inflight: env_parsed("BUS_MAX_INFLIGHT", defaults.max_inflight)?,
            dedupe_ttl: Duration::from_secs(env_parsed(
                "BUS_DEDUPE_TTL_SEC",
                defaults.dedupe_ttl.as_secs(),
            )?),
            dedupe_max: env_parsed("BUS_DEDUPE_MAX", defaults.dedupe_max)?,
            require_client_auth: env_bool(
                "EVENTBUS_REQUIRE_CLIENT_AUTH",
                defaults.require_client_auth,
            )?,
        })
    }
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

/// Parses the `true/false/on/off/1/0` vocabulary from §6.4's `BUS_OVERLOAD`
/// row (case-insensitive).
fn env_bool(key: &str, default: bool) -> Result<bool, CoreError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "on" | "1" => Ok(true),
            "false" | "off" | "0" => Ok(false),
            other => Err(CoreError::new(
                codes::STORE_SCHEMA,
                format!("{key}={other:?} is not one of true/false/on/off/1/0"),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize the tests that
    // touch them so they don't race each other under `cargo test`.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("BUS_MAX_ENV_BYTES");
        let cfg = BusConfig::from_env().unwrap();
        assert_eq!(cfg.max_env_bytes, 131_072);
    }

    #[test]
    fn parses_overload_vocabulary() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("BUS_OVERLOAD", "On");
        let cfg = BusConfig::from_env().unwrap();
        assert!(cfg.overload_flag_seed);
        std::env::set_var("BUS_OVERLOAD", "0");
        let cfg = BusConfig::from_env().unwrap();
        assert!(!cfg.overload_flag_seed);
        std::env::remove_var("BUS_OVERLOAD");
    }

    #[test]
    fn rejects_garbage_overload_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("BUS_OVERLOAD", "maybe");
        assert!(BusConfig::from_env().is_err());
        std::env::remove_var("BUS_OVERLOAD");
    }
}
