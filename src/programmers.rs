//! Target backend selection
//!
//! Builds the programming bus and reset line named by the configuration,
//! with support for feature-gated inclusion of each backend.

use crate::cli::DummyPart;
use crate::config::Config;
use netisp_core::programmer::{IspBus, ResetLine};

/// Bus and reset line handed to the interpreter
pub struct Target {
    pub bus: Box<dyn IspBus>,
    pub reset: Box<dyn ResetLine>,
    /// Human-readable description for the startup log
    pub description: String,
}

/// Open the backend for the emulated target
#[cfg(feature = "dummy")]
pub fn open_dummy(part: DummyPart) -> Result<Target, Box<dyn std::error::Error>> {
    use netisp_dummy::{DummyAvr, DummyConfig};

    let (config, name) = match part {
        DummyPart::M328p => (DummyConfig::default(), "ATmega328P"),
        DummyPart::M2560 => (DummyConfig::atmega2560(), "ATmega2560"),
    };
    let avr = DummyAvr::new(config);
    let reset = avr.reset_line();
    Ok(Target {
        bus: Box::new(avr),
        reset: Box::new(reset),
        description: format!("emulated {}", name),
    })
}

#[cfg(not(feature = "dummy"))]
pub fn open_dummy(_part: DummyPart) -> Result<Target, Box<dyn std::error::Error>> {
    Err("emulated target not available (recompile with the `dummy` feature)".into())
}

/// Open the hardware bus and reset line named by `config`
pub fn open_hardware(config: &Config) -> Result<Target, Box<dyn std::error::Error>> {
    let (bus, bus_desc) = open_bus(config)?;
    let reset = open_reset(config)?;
    Ok(Target {
        bus,
        reset,
        description: format!("{}, reset on line {}", bus_desc, config.reset.line),
    })
}

fn open_bus(config: &Config) -> Result<(Box<dyn IspBus>, String), Box<dyn std::error::Error>> {
    if config.bus.is_bitbang() {
        open_bitbang(config)
    } else {
        open_spidev(config)
    }
}

#[cfg(feature = "linux-spi")]
fn open_spidev(config: &Config) -> Result<(Box<dyn IspBus>, String), Box<dyn std::error::Error>> {
    use netisp_linux_spi::{LinuxSpi, LinuxSpiConfig};

    log::info!("Opening Linux SPI bus...");

    let spi_config = LinuxSpiConfig::new(config.bus.spidev.clone()).with_speed(config.bus.clock_hz);
    let spi = LinuxSpi::open(&spi_config).map_err(|e| {
        format!(
            "Failed to open Linux SPI device: {}\n\
             Make sure the device exists and you have read/write permissions.\n\
             You may need to: sudo usermod -aG spi $USER",
            e
        )
    })?;

    Ok((
        Box::new(spi),
        format!("{} at {} kHz", config.bus.spidev, config.bus.clock_hz / 1000),
    ))
}

#[cfg(not(feature = "linux-spi"))]
fn open_spidev(_config: &Config) -> Result<(Box<dyn IspBus>, String), Box<dyn std::error::Error>> {
    Err("spidev bus not available (recompile with the `linux-spi` feature or set clock_hz = 0)".into())
}

#[cfg(feature = "linux-gpio")]
fn open_bitbang(config: &Config) -> Result<(Box<dyn IspBus>, String), Box<dyn std::error::Error>> {
    use netisp_core::programmer::BitbangBus;
    use netisp_linux_gpio::{chip_path, LinuxGpioBitbang, LinuxGpioBitbangConfig};

    log::info!("Opening GPIO bitbang bus...");

    let device = chip_path(&config.bus.gpiochip);
    let gpio_config =
        LinuxGpioBitbangConfig::new(device.clone(), config.bus.sck, config.bus.mosi, config.bus.miso)
            .with_speed_hz(config.bus.bitbang_hz);
    let master = LinuxGpioBitbang::open(&gpio_config).map_err(|e| {
        format!(
            "Failed to open GPIO lines: {}\n\
             Make sure {} exists and you have read/write permissions.",
            e, device
        )
    })?;

    Ok((
        Box::new(BitbangBus::new(master)),
        format!(
            "bitbang on {} (sck={}, mosi={}, miso={})",
            device, config.bus.sck, config.bus.mosi, config.bus.miso
        ),
    ))
}

#[cfg(not(feature = "linux-gpio"))]
fn open_bitbang(_config: &Config) -> Result<(Box<dyn IspBus>, String), Box<dyn std::error::Error>> {
    Err("GPIO bitbang not available (recompile with the `linux-gpio` feature)".into())
}

#[cfg(feature = "linux-gpio")]
fn open_reset(config: &Config) -> Result<Box<dyn ResetLine>, Box<dyn std::error::Error>> {
    use netisp_core::programmer::Polarity;
    use netisp_linux_gpio::{chip_path, LinuxGpioReset, LinuxGpioResetConfig};

    let polarity = if config.reset.active_high {
        Polarity::ActiveHigh
    } else {
        Polarity::ActiveLow
    };
    let reset_config = LinuxGpioResetConfig::new(chip_path(&config.reset.gpiochip), config.reset.line)
        .with_polarity(polarity);
    let reset = LinuxGpioReset::open(&reset_config)
        .map_err(|e| format!("Failed to open reset line: {}", e))?;
    Ok(Box::new(reset))
}

#[cfg(not(feature = "linux-gpio"))]
fn open_reset(_config: &Config) -> Result<Box<dyn ResetLine>, Box<dyn std::error::Error>> {
    Err("GPIO reset line not available (recompile with the `linux-gpio` feature)".into())
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;

    #[test]
    fn test_open_dummy() {
        let mut target = open_dummy(DummyPart::M2560).unwrap();
        assert_eq!(target.description, "emulated ATmega2560");
        target.bus.claim().unwrap();
        target.reset.set_level(true).unwrap();
        target.bus.transfer(0xAC).unwrap();
        target.bus.transfer(0x53).unwrap();
        assert_eq!(target.bus.transfer(0x00).unwrap(), 0x53);
    }
}
