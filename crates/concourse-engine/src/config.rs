//! # Engine Configuration
//!
//! Configuration management for the fulfillment engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CONCOURSE_MERCHANT_ID=gate-c-coffee                                │
//! │     CONCOURSE_ACCEPTANCE_WINDOW_SECS=120                               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/concourse/engine.toml (Linux)                            │
//! │     ~/Library/Application Support/com.concourse.engine/engine.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     90 s to accept, 30 min to deliver, 100.00 ops threshold            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # engine.toml
//! [merchant]
//! id = "gate-c-coffee"
//! name = "Gate C Coffee"
//!
//! [sla]
//! acceptance_window_secs = 90
//! delivery_window_secs = 1800
//! tick_interval_ms = 1000
//!
//! [refunds]
//! ops_approval_threshold_cents = 10000
//! daily_limit_cents = 50000   # optional
//!
//! [capacity]
//! max_queue_length = 20
//! avg_prep_time_minutes = 12
//! accepting_orders = true
//! store_status = "open"       # open | busy | closed
//! ```

use chrono::Duration as ChronoDuration;
use concourse_core::{
    CapacitySettings, Money, StoreStatus, DEFAULT_ACCEPTANCE_WINDOW_SECS,
    DEFAULT_DELIVERY_WINDOW_SECS,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Merchant
// =============================================================================

/// The merchant this engine instance serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantConfig {
    pub id: String,

    #[serde(default)]
    pub name: String,
}

impl Default for MerchantConfig {
    fn default() -> Self {
        MerchantConfig {
            id: "default-merchant".to_string(),
            name: "Default Merchant".to_string(),
        }
    }
}

// =============================================================================
// SLA Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaSettings {
    /// Seconds a merchant has to accept a new order.
    #[serde(default = "default_acceptance_window")]
    pub acceptance_window_secs: i64,

    /// Seconds from admission to handoff at the gate.
    #[serde(default = "default_delivery_window")]
    pub delivery_window_secs: i64,

    /// Scheduler tick period (milliseconds).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

fn default_acceptance_window() -> i64 {
    DEFAULT_ACCEPTANCE_WINDOW_SECS
}

fn default_delivery_window() -> i64 {
    DEFAULT_DELIVERY_WINDOW_SECS
}

fn default_tick_interval() -> u64 {
    1000
}

impl Default for SlaSettings {
    fn default() -> Self {
        SlaSettings {
            acceptance_window_secs: default_acceptance_window(),
            delivery_window_secs: default_delivery_window(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

impl SlaSettings {
    pub fn acceptance_window(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.acceptance_window_secs)
    }

    pub fn delivery_window(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.delivery_window_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

// =============================================================================
// Refund Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundSettings {
    /// Refunds strictly above this need ops review.
    #[serde(default = "default_ops_threshold")]
    pub ops_approval_threshold_cents: i64,

    /// Optional cap on a UTC day's approved + pending refunds. Crossing it
    /// sends the refund to ops review; it never refuses the request.
    #[serde(default)]
    pub daily_limit_cents: Option<i64>,
}

fn default_ops_threshold() -> i64 {
    concourse_core::DEFAULT_OPS_APPROVAL_THRESHOLD.cents()
}

impl Default for RefundSettings {
    fn default() -> Self {
        RefundSettings {
            ops_approval_threshold_cents: default_ops_threshold(),
            daily_limit_cents: None,
        }
    }
}

impl RefundSettings {
    pub fn ops_approval_threshold(&self) -> Money {
        Money::from_cents(self.ops_approval_threshold_cents)
    }

    pub fn daily_limit(&self) -> Option<Money> {
        self.daily_limit_cents.map(Money::from_cents)
    }
}

// =============================================================================
// Capacity Settings
// =============================================================================

/// Initial capacity policy. Managers can change it at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityConfig {
    #[serde(default = "default_max_queue")]
    pub max_queue_length: u32,

    #[serde(default = "default_prep_time")]
    pub avg_prep_time_minutes: u32,

    #[serde(default = "default_true")]
    pub accepting_orders: bool,

    #[serde(default)]
    pub store_status: StoreStatus,
}

fn default_max_queue() -> u32 {
    20
}

fn default_prep_time() -> u32 {
    12
}

fn default_true() -> bool {
    true
}

impl Default for CapacityConfig {
    fn default() -> Self {
        CapacityConfig {
            max_queue_length: default_max_queue(),
            avg_prep_time_minutes: default_prep_time(),
            accepting_orders: true,
            store_status: StoreStatus::Open,
        }
    }
}

impl CapacityConfig {
    /// Starting settings with an empty queue.
    pub fn initial_settings(&self) -> CapacitySettings {
        CapacitySettings {
            current_queue_length: 0,
            max_queue_length: self.max_queue_length,
            avg_prep_time_minutes: self.avg_prep_time_minutes,
            is_accepting_orders: self.accepting_orders,
            store_status: self.store_status,
        }
    }
}

// =============================================================================
// Simulator Settings
// =============================================================================

/// Knobs for the demo harness. Ignored by the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorSettings {
    /// Seconds between synthetic orders.
    #[serde(default = "default_order_interval")]
    pub order_interval_secs: u64,

    /// Seconds between kitchen auto-advance attempts.
    #[serde(default = "default_advance_interval")]
    pub advance_interval_secs: u64,

    /// Chance (0.0-1.0) that an attempt moves one accepted order to preparing.
    #[serde(default = "default_advance_probability")]
    pub advance_probability: f64,
}

fn default_order_interval() -> u64 {
    20
}

fn default_advance_interval() -> u64 {
    15
}

fn default_advance_probability() -> f64 {
    0.3
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        SimulatorSettings {
            order_interval_secs: default_order_interval(),
            advance_interval_secs: default_advance_interval(),
            advance_probability: default_advance_probability(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub merchant: MerchantConfig,

    #[serde(default)]
    pub sla: SlaSettings,

    #[serde(default)]
    pub refunds: RefundSettings,

    #[serde(default)]
    pub capacity: CapacityConfig,

    #[serde(default)]
    pub simulator: SimulatorSettings,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.merchant.id.trim().is_empty() {
            return Err(EngineError::InvalidConfig("merchant.id must be set".into()));
        }

        if self.sla.acceptance_window_secs <= 0 || self.sla.delivery_window_secs <= 0 {
            return Err(EngineError::InvalidConfig(
                "SLA windows must be greater than 0".into(),
            ));
        }

        if self.sla.tick_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "tick_interval_ms must be greater than 0".into(),
            ));
        }

        if self.refunds.ops_approval_threshold_cents < 0 {
            return Err(EngineError::InvalidConfig(
                "ops_approval_threshold_cents cannot be negative".into(),
            ));
        }

        if matches!(self.refunds.daily_limit_cents, Some(limit) if limit <= 0) {
            return Err(EngineError::InvalidConfig(
                "daily_limit_cents must be greater than 0 when set".into(),
            ));
        }

        if self.capacity.max_queue_length == 0 {
            return Err(EngineError::InvalidConfig(
                "max_queue_length must be greater than 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.simulator.advance_probability) {
            return Err(EngineError::InvalidConfig(format!(
                "advance_probability must be between 0 and 1, got: {}",
                self.simulator.advance_probability
            )));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("CONCOURSE_MERCHANT_ID") {
            debug!(merchant_id = %id, "Overriding merchant ID from environment");
            self.merchant.id = id;
        }

        if let Ok(name) = std::env::var("CONCOURSE_MERCHANT_NAME") {
            self.merchant.name = name;
        }

        if let Ok(secs) = std::env::var("CONCOURSE_ACCEPTANCE_WINDOW_SECS") {
            if let Ok(s) = secs.parse::<i64>() {
                debug!(secs = s, "Overriding acceptance window from environment");
                self.sla.acceptance_window_secs = s;
            }
        }

        if let Ok(secs) = std::env::var("CONCOURSE_DELIVERY_WINDOW_SECS") {
            if let Ok(s) = secs.parse::<i64>() {
                self.sla.delivery_window_secs = s;
            }
        }

        if let Ok(cents) = std::env::var("CONCOURSE_OPS_THRESHOLD_CENTS") {
            if let Ok(c) = cents.parse::<i64>() {
                debug!(cents = c, "Overriding ops approval threshold from environment");
                self.refunds.ops_approval_threshold_cents = c;
            }
        }

        if let Ok(max) = std::env::var("CONCOURSE_MAX_QUEUE_LENGTH") {
            if let Ok(m) = max.parse::<u32>() {
                self.capacity.max_queue_length = m;
            }
        }

        if let Ok(status) = std::env::var("CONCOURSE_STORE_STATUS") {
            match status.parse() {
                Ok(parsed) => self.capacity.store_status = parsed,
                Err(_) => warn!(status = %status, "Unknown store status in environment"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "concourse", "engine")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn merchant_id(&self) -> &str {
        &self.merchant.id
    }
}
