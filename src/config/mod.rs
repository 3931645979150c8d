use config::{Config, ConfigError, Environment, File};
use gotcha::ConfigWrapper;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Delivery tuning for the event bus workers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BusConfig {
    /// Fallback poll interval when no publish wake-up arrives (default: 1000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Messages fetched per round trip (default: 100)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Attempts per message before it is dead-lettered (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_min_backoff_ms")]
    pub min_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// A handler running longer than this counts as a failed attempt (default: 30000)
    #[serde(default = "default_ack_deadline_ms")]
    pub ack_deadline_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    100
}

fn default_max_attempts() -> u32 {
    5
}

fn default_min_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_ack_deadline_ms() -> u64 {
    30_000
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            min_backoff_ms: default_min_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            ack_deadline_ms: default_ack_deadline_ms(),
        }
    }
}

impl BusConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ack_deadline(&self) -> Duration {
        Duration::from_millis(self.ack_deadline_ms)
    }

    /// Backoff before retry number `attempt` (1-based), doubling up to the cap
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let millis = self
            .min_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SweepConfig {
    /// Seconds between sweeps (default: 60)
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MailConfig {
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default = "default_welcome_text")]
    pub welcome_text: String,
}

fn default_sender() -> String {
    "noreply@example.com".to_string()
}

fn default_welcome_text() -> String {
    "You are sooo welcome!".to_string()
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sender: default_sender(),
            welcome_text: default_welcome_text(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// PostgreSQL URL; empty runs everything in memory
    #[serde(default)]
    pub database_url: String,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

impl Settings {
    pub fn new() -> Result<ConfigWrapper<Self>, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with defaults
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local configuration file (not tracked by git)
            .add_source(File::with_name("config/local").required(false))
            // TALLY_APPLICATION__DATABASE_URL, TALLY_APPLICATION__SWEEP__INTERVAL_SECS, ...
            .add_source(
                Environment::with_prefix("TALLY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn uses_database(&self) -> bool {
        !self.database_url.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let bus = BusConfig {
            min_backoff_ms: 100,
            max_backoff_ms: 1000,
            ..BusConfig::default()
        };

        assert_eq!(bus.backoff(1), Duration::from_millis(100));
        assert_eq!(bus.backoff(2), Duration::from_millis(200));
        assert_eq!(bus.backoff(4), Duration::from_millis(800));
        assert_eq!(bus.backoff(5), Duration::from_millis(1000));
        assert_eq!(bus.backoff(64), Duration::from_millis(1000));
    }

    #[test]
    fn test_empty_application_section_uses_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();

        assert!(!settings.uses_database());
        assert_eq!(settings.sweep.interval_secs, 60);
        assert_eq!(settings.bus.max_attempts, 5);
        assert_eq!(settings.mail.sender, "noreply@example.com");
    }
}
