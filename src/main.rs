//! netisp - STK500 network bridge for AVR in-system programming
//!
//! Listens for a single STK500 client (avrdude's `arduino` programmer over
//! `net:host:port`) and programs the attached AVR through its serial
//! programming interface.
//!
//! # Architecture
//!
//! The bus to the target is either:
//! - **spidev** - a hardware SPI controller, `clock_hz` > 0
//! - **GPIO bitbang** - clock, data out and data in on plain GPIO lines,
//!   `clock_hz` = 0
//!
//! Reset is always a GPIO line. `--dummy` swaps both for an emulated part.

mod cli;
mod config;
mod programmers;

use clap::Parser;
use cli::Cli;
use config::Config;
use netisp_core::{Interpreter, Programmer, ProgrammerState};
use netisp_tcp::TcpServer;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            log::info!("Loaded configuration from {}", path.display());
            config
        }
        None => Config::default(),
    };
    cli.apply(&mut config);

    let target = if cli.dummy {
        programmers::open_dummy(cli.dummy_part)?
    } else {
        programmers::open_hardware(&config)?
    };
    log::info!("Target: {}", target.description);

    let interpreter = Interpreter::new(target.bus, target.reset, config.interpreter())?;
    let server = TcpServer::bind(&config.tcp())?;
    log::info!(
        "Use: avrdude -c arduino -P net:{}:{} -p <part>",
        config.server.listen,
        config.server.port
    );

    let mut programmer = Programmer::new(server, interpreter);
    let tick = Duration::from_millis(config.server.tick_ms);
    let mut last = ProgrammerState::Idle;

    loop {
        match programmer.serve() {
            Ok(state) => {
                if state != last {
                    log::debug!("State: {:?} -> {:?}", last, state);
                    last = state;
                }
            }
            Err(e) => log::error!("{}", e),
        }
        std::thread::sleep(tick);
    }
}
