//! Configuration for the aggregation server.
//!
//! This module defines [`Settings`], loaded from an optional TOML file and layered over
//! built-in defaults through `figment`.
//!
//! ## Schema
//!
//! - `bind_address`: the address the channel and controller listeners bind to.
//! - `base_channel_port` / `channel_amount`: channel `i` listens on `base_channel_port + i`
//!   for `i` in `[0, channel_amount)`. Channel id 0 is always the reference channel.
//! - `controller_port`: the single controller connection's port.
//! - `packet_size`: number of coherently summed complex samples per combiner output block.
//! - `carrier_threshold`: modulus (in raw int16 units) a sample must exceed to be
//!   considered a candidate carrier onset.
//! - `max_recv`: chunk size used when looping to fill a channel frame payload.
//! - `work_queue_capacity`: bound on the channel→worker submission queue.
//! - `log_level`: default `RUST_LOG` level when the environment variable is unset.
//!
//! ## Validation
//!
//! [`Settings::validate`] checks that ports don't collide, that `channel_amount` and
//! `packet_size` are non-zero, and that numeric values fall within sane ranges. A
//! configuration that fails validation prevents the server from starting.

use crate::validation::{is_in_range, is_valid_ip, is_valid_port};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Carrier modulus threshold, in raw int16 units, used when the config omits one.
pub const DEFAULT_CARRIER_THRESHOLD: f64 = 1000.0;
/// Packet size used when the config omits one.
pub const DEFAULT_PACKET_SIZE: usize = 1024;
/// First channel port used when the config omits one.
pub const DEFAULT_BASE_CHANNEL_PORT: u16 = 9000;
/// Controller port used when the config omits one.
pub const DEFAULT_CONTROLLER_PORT: u16 = 9100;
/// Channel count used when the config omits one.
pub const DEFAULT_CHANNEL_AMOUNT: u8 = 2;
/// Chunk size, in bytes, used to fill a channel-frame payload read.
pub const DEFAULT_MAX_RECV: usize = 65536;
/// Bound on the channel -> worker submission queue.
pub const DEFAULT_WORK_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub bind_address: String,
    pub base_channel_port: u16,
    pub controller_port: u16,
    pub channel_amount: u8,
    pub packet_size: usize,
    pub carrier_threshold: f64,
    pub max_recv: usize,
    pub work_queue_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            bind_address: "0.0.0.0".to_string(),
            base_channel_port: DEFAULT_BASE_CHANNEL_PORT,
            controller_port: DEFAULT_CONTROLLER_PORT,
            channel_amount: DEFAULT_CHANNEL_AMOUNT,
            packet_size: DEFAULT_PACKET_SIZE,
            carrier_threshold: DEFAULT_CARRIER_THRESHOLD,
            max_recv: DEFAULT_MAX_RECV,
            work_queue_capacity: DEFAULT_WORK_QUEUE_CAPACITY,
        }
    }
}

impl Settings {
    /// Loads settings from `path` if given, falling back to built-in defaults for any
    /// field the file omits. Validates before returning.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        use figment::providers::{Format, Serialized, Toml};
        use figment::Figment;

        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }

        let settings: Settings = figment
            .extract()
            .context("failed to parse configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// The TCP port channel `i` (0-based) listens on.
    pub fn channel_port(&self, i: u8) -> u16 {
        self.base_channel_port + i as u16
    }

    /// Re-validates the settings. Called once after loading, and again by the CLI after
    /// applying any command-line overrides.
    pub fn validate(&self) -> Result<()> {
        is_valid_ip(&self.bind_address)
            .map_err(anyhow::Error::msg)
            .context("invalid bind_address")?;

        if self.channel_amount == 0 {
            anyhow::bail!("channel_amount must be at least 1");
        }
        is_in_range(self.channel_amount, 1..=64)
            .map_err(anyhow::Error::msg)
            .context("channel_amount out of range")?;

        if self.packet_size == 0 {
            anyhow::bail!("packet_size must be at least 1");
        }
        is_in_range(self.packet_size, 1..=1_000_000)
            .map_err(anyhow::Error::msg)
            .context("packet_size out of range")?;

        is_valid_port(self.base_channel_port)
            .map_err(anyhow::Error::msg)
            .context("invalid base_channel_port")?;
        is_valid_port(self.controller_port)
            .map_err(anyhow::Error::msg)
            .context("invalid controller_port")?;

        let last_channel_port = self
            .base_channel_port
            .checked_add(self.channel_amount as u16 - 1)
            .context("base_channel_port + channel_amount overflows u16")?;
        if (self.base_channel_port..=last_channel_port).contains(&self.controller_port) {
            anyhow::bail!(
                "controller_port {} collides with the channel port range {}-{}",
                self.controller_port,
                self.base_channel_port,
                last_channel_port
            );
        }

        if self.carrier_threshold <= 0.0 {
            anyhow::bail!("carrier_threshold must be positive");
        }

        if self.max_recv == 0 {
            anyhow::bail!("max_recv must be at least 1");
        }

        is_in_range(self.work_queue_capacity, 1..=1_000_000)
            .map_err(anyhow::Error::msg)
            .context("work_queue_capacity out of range")?;

        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.log_level.to_lowercase().as_str()) {
            anyhow::bail!("invalid log level: {}", self.log_level);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn zero_channel_amount_fails() {
        let mut settings = Settings::default();
        settings.channel_amount = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_packet_size_fails() {
        let mut settings = Settings::default();
        settings.packet_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn colliding_controller_port_fails() {
        let mut settings = Settings::default();
        settings.base_channel_port = 9000;
        settings.channel_amount = 4;
        settings.controller_port = 9002;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn controller_port_just_outside_range_is_fine() {
        let mut settings = Settings::default();
        settings.base_channel_port = 9000;
        settings.channel_amount = 4;
        settings.controller_port = 9004;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn channel_port_numbering() {
        let mut settings = Settings::default();
        settings.base_channel_port = 9000;
        assert_eq!(settings.channel_port(0), 9000);
        assert_eq!(settings.channel_port(3), 9003);
    }

    #[test]
    fn invalid_log_level_fails() {
        let mut settings = Settings::default();
        settings.log_level = "verbose".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn invalid_bind_address_fails() {
        let mut settings = Settings::default();
        settings.bind_address = "not-an-ip".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn load_with_no_file_uses_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.channel_amount, DEFAULT_CHANNEL_AMOUNT);
        assert_eq!(settings.packet_size, DEFAULT_PACKET_SIZE);
    }

    #[test]
    fn load_from_file_overrides_defaults() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!(
            "ils_aggregator_test_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "channel_amount = 3\npacket_size = 8\ncarrier_threshold = 500.0\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.channel_amount, 3);
        assert_eq!(settings.packet_size, 8);
        assert_eq!(settings.carrier_threshold, 500.0);

        std::fs::remove_file(&path).ok();
    }
}
