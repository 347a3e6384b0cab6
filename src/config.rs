// src/config.rs

//! Manages controller configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Which convergence executor variant drives groups.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// One HTTP request per plan step.
    #[default]
    Steps,
    /// Render the group as a stack and delegate to orchestration.
    Heat,
}

/// Credential strategy for the identity token exchange.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum IdentityCredentialsConfig {
    Password { username: String, password: String },
    Apikey { username: String, api_key: String },
}

impl Default for IdentityCredentialsConfig {
    fn default() -> Self {
        Self::Password {
            username: "otter".to_string(),
            password: String::new(),
        }
    }
}

/// Identity service settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_endpoint")]
    pub endpoint: String,
    #[serde(flatten)]
    pub credentials: IdentityCredentialsConfig,
    /// Fallback token lifetime when identity omits an expiry.
    #[serde(with = "humantime_serde", default = "default_token_ttl")]
    pub token_ttl: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            endpoint: default_identity_endpoint(),
            credentials: IdentityCredentialsConfig::default(),
            token_ttl: default_token_ttl(),
        }
    }
}

fn default_identity_endpoint() -> String {
    "https://identity.api.rackspacecloud.com/v2.0".to_string()
}
fn default_token_ttl() -> Duration {
    Duration::from_secs(3600)
}

/// HTTP pipeline settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HttpConfig {
    #[serde(with = "humantime_serde", default = "default_http_timeout")]
    pub timeout: Duration,
    /// Total attempts per request, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(with = "humantime_serde", default = "default_backoff_base")]
    pub backoff_base: Duration,
    #[serde(with = "humantime_serde", default = "default_backoff_max")]
    pub backoff_max: Duration,
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
            pool_max_idle_per_host: default_pool_max_idle(),
        }
    }
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_max_retries() -> u32 {
    5
}
fn default_backoff_base() -> Duration {
    Duration::from_millis(500)
}
fn default_backoff_max() -> Duration {
    Duration::from_secs(30)
}
fn default_pool_max_idle() -> usize {
    32
}

/// Names the cloud services carry in tenants' catalogs, and the region to
/// resolve endpoints in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServicesConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_compute_service")]
    pub compute: String,
    #[serde(default = "default_lb_service")]
    pub load_balancer: String,
    #[serde(default = "default_orchestration_service")]
    pub orchestration: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            compute: default_compute_service(),
            load_balancer: default_lb_service(),
            orchestration: default_orchestration_service(),
        }
    }
}

fn default_region() -> String {
    "ORD".to_string()
}
fn default_compute_service() -> String {
    "cloudServersOpenStack".to_string()
}
fn default_lb_service() -> String {
    "cloudLoadBalancers".to_string()
}
fn default_orchestration_service() -> String {
    "cloudOrchestration".to_string()
}

/// Scheduler settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    #[serde(with = "humantime_serde", default = "default_scheduler_interval")]
    pub interval: Duration,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Number of event buckets shared across instances.
    #[serde(default = "default_buckets")]
    pub buckets: u32,
    /// An owned bucket with an event older than this is unhealthy.
    #[serde(with = "humantime_serde", default = "default_health_threshold")]
    pub health_threshold: Duration,
    #[serde(default = "default_partition_path")]
    pub partition_path: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: default_scheduler_interval(),
            batch_size: default_batch_size(),
            buckets: default_buckets(),
            health_threshold: default_health_threshold(),
            partition_path: default_partition_path(),
        }
    }
}

fn default_scheduler_interval() -> Duration {
    Duration::from_secs(10)
}
fn default_batch_size() -> usize {
    100
}
fn default_buckets() -> u32 {
    10
}
fn default_health_threshold() -> Duration {
    Duration::from_secs(60)
}
fn default_partition_path() -> String {
    "/scheduler_partition".to_string()
}

/// Self-heal settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SelfHealConfig {
    #[serde(with = "humantime_serde", default = "default_selfheal_interval")]
    pub interval: Duration,
    #[serde(default = "default_selfheal_lock_path")]
    pub lock_path: String,
    /// Tenants enabled for convergence; empty enables every tenant.
    #[serde(default)]
    pub enabled_tenants: Vec<String>,
}

impl Default for SelfHealConfig {
    fn default() -> Self {
        Self {
            interval: default_selfheal_interval(),
            lock_path: default_selfheal_lock_path(),
            enabled_tenants: Vec::new(),
        }
    }
}

fn default_selfheal_interval() -> Duration {
    Duration::from_secs(300)
}
fn default_selfheal_lock_path() -> String {
    "/selfheallock".to_string()
}

/// Convergence settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConvergenceConfig {
    /// A BUILD older than this counts as errored and is replaced.
    #[serde(with = "humantime_serde", default = "default_build_timeout")]
    pub build_timeout: Duration,
    /// Pause before the single follow-up pass after `UpdateInProgress`.
    #[serde(with = "humantime_serde", default = "default_update_backoff")]
    pub update_backoff: Duration,
    #[serde(default)]
    pub executor: ExecutorKind,
    /// Stack operation timeout handed to the orchestration service.
    #[serde(default = "default_stack_timeout_mins")]
    pub stack_timeout_mins: u64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            build_timeout: default_build_timeout(),
            update_backoff: default_update_backoff(),
            executor: ExecutorKind::default(),
            stack_timeout_mins: default_stack_timeout_mins(),
        }
    }
}

fn default_build_timeout() -> Duration {
    Duration::from_secs(crate::core::convergence::planner::DEFAULT_BUILD_TIMEOUT_SECS as u64)
}
fn default_update_backoff() -> Duration {
    Duration::from_secs(10)
}
fn default_stack_timeout_mins() -> u64 {
    60
}

/// Health probe endpoint settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HealthConfig {
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,
    #[serde(default = "default_health_port")]
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_enabled(),
            port: default_health_port(),
        }
    }
}

fn default_health_enabled() -> bool {
    true
}
fn default_health_port() -> u16 {
    8876
}

/// Represents the final, validated controller configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub selfheal: SelfHealConfig,
    #[serde(default)]
    pub convergence: ConvergenceConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.buckets == 0 {
            return Err(anyhow!("scheduler.buckets cannot be 0"));
        }
        if self.scheduler.batch_size == 0 {
            return Err(anyhow!("scheduler.batch_size cannot be 0"));
        }
        if self.scheduler.interval.is_zero() {
            return Err(anyhow!("scheduler.interval cannot be 0"));
        }
        if self.selfheal.interval <= Duration::from_secs(5) {
            return Err(anyhow!(
                "selfheal.interval must exceed 5 seconds to leave room for the trigger window"
            ));
        }
        if self.http.max_retries == 0 {
            return Err(anyhow!("http.max_retries cannot be 0"));
        }
        if self.http.timeout.is_zero() {
            return Err(anyhow!("http.timeout cannot be 0"));
        }
        if self.health.enabled && self.health.port == 0 {
            return Err(anyhow!("health.port cannot be 0 when the probe is enabled"));
        }
        url::Url::parse(&self.identity.endpoint)
            .map_err(|e| anyhow!("identity.endpoint is not a valid URL: {e}"))?;
        Ok(())
    }
}
