//! Engine configuration surface, per spec §6.
//!
//! `EngineConfig` is the value the host program (`insider-cli`) parses and
//! hands to [`crate::engine::Engine::new`]. There is no global/singleton
//! config here — every component that needs a setting receives it
//! explicitly, per spec §9's re-architecture note.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

fn default_window_minutes() -> i64 {
    30
}
fn default_delayed_threshold() -> f64 {
    5.0
}
fn default_recon_half_life_hours() -> f64 {
    48.0
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_clock_skew_tolerance_secs() -> i64 {
    300
}
fn default_file_context_ttl_secs() -> i64 {
    3_600
}
fn default_file_context_negative_ttl_secs() -> i64 {
    300
}
fn default_file_context_cache_capacity() -> usize {
    10_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ReconStateBackend {
    Memory,
    Kv { connection_string: String },
}

impl Default for ReconStateBackend {
    fn default() -> Self {
        ReconStateBackend::Memory
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Suppressions {
    pub allowed_external_domains: BTreeSet<String>,
    pub security_investigation_ous: BTreeSet<String>,
    pub exclude_actors: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityOverrides {
    pub high_risk_ous: BTreeSet<String>,
    pub sensitive_labels: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    pub webhook_url: Option<String>,
    pub alert_on_severities: BTreeSet<String>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            alert_on_severities: ["high", "medium", "low"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The additive signal weights behind the intent classifier (spec §4.5's
/// table, kept literal but configurable per SPEC_FULL §9 Open Questions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentWeights {
    pub initial_score: f64,
    pub allowed_domain: f64,
    pub partner_domain: f64,
    pub first_time_destination: f64,
    pub non_owned_file: f64,
    pub off_hours: f64,
    pub high_cumulative_recon: f64,
    pub high_sensitivity: f64,
    pub repeat_same_destination: f64,
    pub routine_sharer: f64,
    pub malicious_threshold: f64,
    pub suspicious_threshold: f64,
    pub high_recon_score_threshold: f64,
    pub routine_sharer_frequency_per_day: f64,
}

impl Default for IntentWeights {
    fn default() -> Self {
        Self {
            initial_score: 0.5,
            allowed_domain: -0.35,
            partner_domain: -0.15,
            first_time_destination: 0.20,
            non_owned_file: 0.10,
            off_hours: 0.10,
            high_cumulative_recon: 0.15,
            high_sensitivity: 0.15,
            repeat_same_destination: -0.10,
            routine_sharer: -0.10,
            malicious_threshold: 0.7,
            suspicious_threshold: 0.4,
            high_recon_score_threshold: 10.0,
            routine_sharer_frequency_per_day: 3.0,
        }
    }
}

/// Full configuration surface of the correlation engine, per spec §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    #[serde(default = "default_delayed_threshold")]
    pub delayed_threshold: f64,
    #[serde(default = "default_recon_half_life_hours")]
    pub recon_half_life_hours: f64,
    #[serde(default = "default_clock_skew_tolerance_secs")]
    pub clock_skew_tolerance_secs: i64,
    #[serde(default = "default_file_context_ttl_secs")]
    pub file_context_ttl_secs: i64,
    #[serde(default = "default_file_context_negative_ttl_secs")]
    pub file_context_negative_ttl_secs: i64,
    #[serde(default = "default_file_context_cache_capacity")]
    pub file_context_cache_capacity: usize,
    pub recon_state_backend: ReconStateBackend,
    pub suppressions: Suppressions,
    pub partner_domains: BTreeSet<String>,
    pub high_risk_folders: BTreeSet<String>,
    pub severity_overrides: SeverityOverrides,
    pub alerting: AlertingConfig,
    pub intent_weights: IntentWeights,
    pub high_risk_ous: BTreeSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            window_minutes: default_window_minutes(),
            delayed_threshold: default_delayed_threshold(),
            recon_half_life_hours: default_recon_half_life_hours(),
            clock_skew_tolerance_secs: default_clock_skew_tolerance_secs(),
            file_context_ttl_secs: default_file_context_ttl_secs(),
            file_context_negative_ttl_secs: default_file_context_negative_ttl_secs(),
            file_context_cache_capacity: default_file_context_cache_capacity(),
            recon_state_backend: ReconStateBackend::default(),
            suppressions: Suppressions::default(),
            partner_domains: BTreeSet::new(),
            high_risk_folders: BTreeSet::new(),
            severity_overrides: SeverityOverrides::default(),
            alerting: AlertingConfig::default(),
            intent_weights: IntentWeights::default(),
            high_risk_ous: BTreeSet::new(),
        }
    }
}

impl EngineConfig {
    /// Validates range constraints named in spec §6 (e.g.
    /// `window_minutes ∈ [1, 1440]`). Returns a `Configuration` error on the
    /// first violation, matching spec §7's "abort before any fetch" rule.
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(1..=1440).contains(&self.window_minutes) {
            return Err(crate::error::Error::Configuration(format!(
                "window_minutes must be in [1, 1440], got {}",
                self.window_minutes
            )));
        }
        if self.delayed_threshold < 0.0 {
            return Err(crate::error::Error::Configuration(
                "delayed_threshold must be non-negative".to_string(),
            ));
        }
        if self.recon_half_life_hours <= 0.0 {
            return Err(crate::error::Error::Configuration(
                "recon_half_life_hours must be positive".to_string(),
            ));
        }
        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(crate::error::Error::Configuration(format!(
                "invalid IANA timezone: {}",
                self.timezone
            )));
        }
        Ok(())
    }
}
