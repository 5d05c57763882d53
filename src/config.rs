//! Configuration file parsing
//!
//! Settings are read from a TOML file; every key is optional:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0"
//! port = 328
//! client_timeout_ms = 100
//!
//! [bus]
//! clock_hz = 300000        # 0 selects GPIO bitbang
//! spidev = "/dev/spidev0.0"
//! gpiochip = "0"
//! sck = 11
//! mosi = 10
//! miso = 9
//!
//! [reset]
//! gpiochip = "0"
//! line = 25
//! active_high = false
//! hold_in_reset = false
//!
//! [protocol]
//! framing = "classic"      # or "sequenced"
//! strict_polling = false
//!
//! [timing]
//! poll_attempts = 100
//! flash_write_delay_us = 10000
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use netisp_core::{Framing, InterpreterConfig, Timing};
use netisp_tcp::{TcpConfig, DEFAULT_PORT};
use serde::Deserialize;
use thiserror::Error;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// File is not valid TOML or has unknown keys
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub bus: BusConfig,
    pub reset: ResetConfig,
    pub protocol: ProtocolConfig,
    pub timing: TimingConfig,
}

/// `[server]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen: String,
    /// TCP port
    pub port: u16,
    /// How long a read waits for the rest of a frame
    pub client_timeout_ms: u64,
    /// How long a reply write may block
    pub write_timeout_ms: u64,
    /// Sleep between polls of the connection
    pub tick_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            client_timeout_ms: 100,
            write_timeout_ms: 1000,
            tick_ms: 1,
        }
    }
}

/// `[bus]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// SPI clock in Hz; 0 bitbangs the lines below instead of using spidev
    pub clock_hz: u32,
    /// spidev device used when `clock_hz` is non-zero
    pub spidev: String,
    /// GPIO chip for the bitbang lines (number or path)
    pub gpiochip: String,
    /// Clock line offset
    pub sck: u32,
    /// Data out line offset
    pub mosi: u32,
    /// Data in line offset
    pub miso: u32,
    /// Bitbang clock in Hz
    pub bitbang_hz: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        // Raspberry Pi SPI0 header pins
        Self {
            clock_hz: 300_000,
            spidev: "/dev/spidev0.0".into(),
            gpiochip: "0".into(),
            sck: 11,
            mosi: 10,
            miso: 9,
            bitbang_hz: 100_000,
        }
    }
}

impl BusConfig {
    /// Whether the bus is bitbanged on GPIO lines
    pub fn is_bitbang(&self) -> bool {
        self.clock_hz == 0
    }
}

/// `[reset]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResetConfig {
    /// GPIO chip carrying the reset line (number or path)
    pub gpiochip: String,
    /// Reset line offset
    pub line: u32,
    /// Drive the line high to hold the target in reset
    pub active_high: bool,
    /// Keep the target in reset while no programming session is active
    pub hold_in_reset: bool,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            gpiochip: "0".into(),
            line: 25,
            active_high: false,
            hold_in_reset: false,
        }
    }
}

/// Framing names accepted in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FramingName {
    /// Plain STK500v1
    #[default]
    Classic,
    /// Sequence-numbered envelope
    Sequenced,
}

impl From<FramingName> for Framing {
    fn from(name: FramingName) -> Self {
        match name {
            FramingName::Classic => Framing::Classic,
            FramingName::Sequenced => Framing::Sequenced,
        }
    }
}

/// `[protocol]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolConfig {
    pub framing: FramingName,
    /// Reply FAILED when a write poll times out
    pub strict_polling: bool,
}

/// `[timing]` section, all in microseconds except the counts
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    pub flash_write_delay_us: u32,
    pub eeprom_write_delay_us: u32,
    pub chip_erase_delay_us: u32,
    pub poll_attempts: u32,
    pub poll_interval_us: u32,
    pub reset_pulse_us: u32,
    pub reset_settle_us: u32,
    pub enable_attempts: u32,
    pub enable_retry_settle_us: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let t = Timing::default();
        Self {
            flash_write_delay_us: t.flash_write_delay_us,
            eeprom_write_delay_us: t.eeprom_write_delay_us,
            chip_erase_delay_us: t.chip_erase_delay_us,
            poll_attempts: t.poll_attempts,
            poll_interval_us: t.poll_interval_us,
            reset_pulse_us: t.reset_pulse_us,
            reset_settle_us: t.reset_settle_us,
            enable_attempts: t.enable_attempts,
            enable_retry_settle_us: t.enable_retry_settle_us,
        }
    }
}

impl From<&TimingConfig> for Timing {
    fn from(t: &TimingConfig) -> Self {
        Timing {
            flash_write_delay_us: t.flash_write_delay_us,
            eeprom_write_delay_us: t.eeprom_write_delay_us,
            chip_erase_delay_us: t.chip_erase_delay_us,
            poll_attempts: t.poll_attempts,
            poll_interval_us: t.poll_interval_us,
            reset_pulse_us: t.reset_pulse_us,
            reset_settle_us: t.reset_settle_us,
            // At least one attempt is always made
            enable_attempts: t.enable_attempts.max(1),
            enable_retry_settle_us: t.enable_retry_settle_us,
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Interpreter settings
    pub fn interpreter(&self) -> InterpreterConfig {
        InterpreterConfig {
            framing: self.protocol.framing.into(),
            timing: Timing::from(&self.timing),
            strict_polling: self.protocol.strict_polling,
            hold_reset_when_idle: self.reset.hold_in_reset,
        }
    }

    /// Listener settings
    pub fn tcp(&self) -> TcpConfig {
        TcpConfig::new(format!("{}:{}", self.server.listen, self.server.port))
            .with_read_timeout_ms(self.server.client_timeout_ms)
            .with_write_timeout_ms(self.server.write_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 328);
        assert_eq!(config.bus.clock_hz, 300_000);
        assert!(!config.bus.is_bitbang());
        assert_eq!(config.interpreter(), InterpreterConfig::default());
        assert_eq!(config.tcp().addr, "0.0.0.0:328");
    }

    #[test]
    fn test_full_file() {
        let config = Config::from_toml_str(
            r#"
            [server]
            listen = "127.0.0.1"
            port = 3280
            client_timeout_ms = 250

            [bus]
            clock_hz = 0
            gpiochip = "/dev/gpiochip4"
            sck = 21
            mosi = 20
            miso = 19

            [reset]
            line = 16
            active_high = true
            hold_in_reset = true

            [protocol]
            framing = "sequenced"
            strict_polling = true

            [timing]
            poll_attempts = 20
            enable_attempts = 0
            "#,
        )
        .unwrap();

        assert!(config.bus.is_bitbang());
        assert_eq!(config.bus.sck, 21);
        assert!(config.reset.active_high);

        let tcp = config.tcp();
        assert_eq!(tcp.addr, "127.0.0.1:3280");
        assert_eq!(tcp.read_timeout.as_millis(), 250);

        let interp = config.interpreter();
        assert_eq!(interp.framing, Framing::Sequenced);
        assert!(interp.strict_polling);
        assert!(interp.hold_reset_when_idle);
        assert_eq!(interp.timing.poll_attempts, 20);
        assert_eq!(interp.timing.enable_attempts, 1);
        assert_eq!(
            interp.timing.flash_write_delay_us,
            Timing::default().flash_write_delay_us
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            Config::from_toml_str("[bus]\nspeed = 1\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[protocol]\nframing = \"stk500v2\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::load(Path::new("/nonexistent/netisp.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
