//! Configuration types for the Foreman and Bee binaries.

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

use crate::agents::model::BeeRole;
use crate::error::ConfigError;

/// Foreman (router) configuration.
#[derive(Debug, Clone)]
pub struct ForemanConfig {
    /// Address the HTTP surface binds to.
    pub bind_addr: String,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// How long a claim lease lasts before the Reaper may reclaim it.
    pub lease_ttl: Duration,
    /// Claim budget per task; a retryable failure at this count goes terminal.
    pub max_retries: u32,
    /// How often the Reaper sweeps for expired leases.
    pub reaper_interval: Duration,
}

impl Default for ForemanConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            db_path: PathBuf::from("./data/colony.db"),
            lease_ttl: Duration::from_secs(300), // 5 minutes
            max_retries: 3,
            reaper_interval: Duration::from_secs(30),
        }
    }
}

impl ForemanConfig {
    /// Build from environment variables, falling back to defaults.
    ///
    /// `COLONY_SERVER_ADDR`, `COLONY_DB_PATH`, `COLONY_LEASE_TTL_SECS`,
    /// `COLONY_MAX_RETRIES`, `COLONY_REAPER_INTERVAL_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: env_string("COLONY_SERVER_ADDR", &defaults.bind_addr),
            db_path: std::env::var("COLONY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            lease_ttl: env_duration_secs("COLONY_LEASE_TTL_SECS", defaults.lease_ttl)?,
            max_retries: env_u32("COLONY_MAX_RETRIES", defaults.max_retries)?,
            reaper_interval: env_duration_secs(
                "COLONY_REAPER_INTERVAL_SECS",
                defaults.reaper_interval,
            )?,
        })
    }
}

/// Bee (worker) configuration.
#[derive(Debug, Clone)]
pub struct BeeConfig {
    /// Worker identifier sent on every call. Unique per process.
    pub bee_id: String,
    /// This worker's role; selects the executor.
    pub role: BeeRole,
    /// Capability tags advertised at registration and on each poll.
    /// Defaults to the role's skill set.
    pub capabilities: Vec<String>,
    /// Base URL of the Foreman, e.g. "http://localhost:8080".
    pub foreman_url: String,
    /// Sleep between empty polls.
    pub poll_interval: Duration,
    /// Heartbeat emission interval.
    pub heartbeat_interval: Duration,
    /// Back-off after an RPC failure before polling resumes.
    pub error_backoff: Duration,
    /// Per-call timeout for every Foreman RPC.
    pub rpc_timeout: Duration,
}

impl BeeConfig {
    /// Config for the given role with generated id and default skills.
    pub fn for_role(role: BeeRole) -> Self {
        Self {
            bee_id: default_bee_id(role),
            role,
            capabilities: role
                .default_skills()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            foreman_url: "http://localhost:8080".to_string(),
            poll_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(10),
        }
    }

    /// Build from environment variables, falling back to defaults.
    ///
    /// `BEE_ROLE`, `BEE_NAME`, `COLONY_SERVER_URL`, `BEE_POLL_INTERVAL_SECS`,
    /// `BEE_HEARTBEAT_INTERVAL_SECS`, `BEE_ERROR_BACKOFF_SECS`,
    /// `BEE_RPC_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let role_str = env_string("BEE_ROLE", "DocBee");
        let role: BeeRole = role_str
            .parse()
            .map_err(|message| ConfigError::InvalidValue {
                key: "BEE_ROLE".to_string(),
                message,
            })?;

        let defaults = Self::for_role(role);
        Ok(Self {
            bee_id: env_string("BEE_NAME", &defaults.bee_id),
            role,
            capabilities: defaults.capabilities,
            foreman_url: env_string("COLONY_SERVER_URL", &defaults.foreman_url),
            poll_interval: env_duration_secs("BEE_POLL_INTERVAL_SECS", defaults.poll_interval)?,
            heartbeat_interval: env_duration_secs(
                "BEE_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            )?,
            error_backoff: env_duration_secs("BEE_ERROR_BACKOFF_SECS", defaults.error_backoff)?,
            rpc_timeout: env_duration_secs("BEE_RPC_TIMEOUT_SECS", defaults.rpc_timeout)?,
        })
    }

    /// Builder: override the advertised capability list.
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Generated worker id, e.g. "docbee-7f3a91c2".
fn default_bee_id(role: BeeRole) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", role.as_str().to_lowercase(), &suffix[..8])
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u32(key: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_u32(key, &raw),
        Err(_) => Ok(default),
    }
}

fn env_duration_secs(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_duration_secs(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_u32(key: &str, raw: &str) -> Result<u32, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected a non-negative integer, got '{raw}'"),
    })
}

fn parse_duration_secs(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected seconds as an integer, got '{raw}'"),
    })?;
    Ok(Duration::from_secs(secs))
}
