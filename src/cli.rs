//! CLI argument parsing

use crate::config::{Config, FramingName};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Parts the emulated target can pretend to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DummyPart {
    /// ATmega328P (32 KiB flash)
    #[default]
    M328p,
    /// ATmega2560 (256 KiB flash, extended addressing)
    M2560,
}

#[derive(Parser, Debug)]
#[command(name = "netisp")]
#[command(author, version, about = "STK500 network bridge for AVR in-system programming", long_about = None)]
#[command(after_help = "Program a target with: avrdude -c arduino -P net:<host>:328 -p m328p ...")]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    pub listen: Option<String>,

    /// TCP port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Client read timeout in milliseconds
    #[arg(long)]
    pub client_timeout_ms: Option<u64>,

    /// Serve an emulated target instead of real hardware
    #[arg(long)]
    pub dummy: bool,

    /// Part emulated with --dummy
    #[arg(long, value_enum, default_value_t = DummyPart::default(), requires = "dummy")]
    pub dummy_part: DummyPart,

    /// SPI clock in Hz (0 bitbangs the bus on GPIO lines)
    #[arg(long)]
    pub clock_hz: Option<u32>,

    /// spidev device
    #[arg(long)]
    pub spidev: Option<String>,

    /// GPIO chip for bus and reset lines (number or path)
    #[arg(long)]
    pub gpiochip: Option<String>,

    /// Bitbang clock line
    #[arg(long)]
    pub sck: Option<u32>,

    /// Bitbang data out line
    #[arg(long)]
    pub mosi: Option<u32>,

    /// Bitbang data in line
    #[arg(long)]
    pub miso: Option<u32>,

    /// Reset line
    #[arg(long)]
    pub reset_line: Option<u32>,

    /// Reset is asserted by driving the line high
    #[arg(long)]
    pub reset_active_high: bool,

    /// Keep the target in reset while no programming session is active
    #[arg(long)]
    pub hold_in_reset: bool,

    /// Request framing
    #[arg(long, value_enum)]
    pub framing: Option<FramingName>,

    /// Reply FAILED when a write poll times out
    #[arg(long)]
    pub strict_polling: bool,
}

impl Cli {
    /// Override file settings with the flags given on the command line
    pub fn apply(&self, config: &mut Config) {
        if let Some(listen) = &self.listen {
            config.server.listen = listen.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ms) = self.client_timeout_ms {
            config.server.client_timeout_ms = ms;
        }
        if let Some(hz) = self.clock_hz {
            config.bus.clock_hz = hz;
        }
        if let Some(dev) = &self.spidev {
            config.bus.spidev = dev.clone();
        }
        if let Some(chip) = &self.gpiochip {
            config.bus.gpiochip = chip.clone();
            config.reset.gpiochip = chip.clone();
        }
        if let Some(line) = self.sck {
            config.bus.sck = line;
        }
        if let Some(line) = self.mosi {
            config.bus.mosi = line;
        }
        if let Some(line) = self.miso {
            config.bus.miso = line;
        }
        if let Some(line) = self.reset_line {
            config.reset.line = line;
        }
        if self.reset_active_high {
            config.reset.active_high = true;
        }
        if self.hold_in_reset {
            config.reset.hold_in_reset = true;
        }
        if let Some(framing) = self.framing {
            config.protocol.framing = framing;
        }
        if self.strict_polling {
            config.protocol.strict_polling = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_file() {
        let mut config = Config::from_toml_str("[server]\nport = 1000\n[bus]\nsck = 3\n").unwrap();
        let cli = Cli::parse_from([
            "netisp",
            "--port",
            "2000",
            "--clock-hz",
            "0",
            "--gpiochip",
            "2",
            "--framing",
            "sequenced",
            "--strict-polling",
        ]);
        cli.apply(&mut config);

        assert_eq!(config.server.port, 2000);
        assert!(config.bus.is_bitbang());
        assert_eq!(config.bus.sck, 3);
        assert_eq!(config.bus.gpiochip, "2");
        assert_eq!(config.reset.gpiochip, "2");
        assert_eq!(config.protocol.framing, FramingName::Sequenced);
        assert!(config.protocol.strict_polling);
    }

    #[test]
    fn test_dummy_part_needs_dummy() {
        assert!(Cli::try_parse_from(["netisp", "--dummy-part", "m2560"]).is_err());
        let cli = Cli::try_parse_from(["netisp", "--dummy", "--dummy-part", "m2560"]).unwrap();
        assert_eq!(cli.dummy_part, DummyPart::M2560);
    }
}
