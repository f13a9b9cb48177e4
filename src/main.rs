use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use snescon::config::{default_config_path, DriverConfig};
use snescon::controller::{ControllerHandle, DriverError};
use snescon::gpio::rppal_pins::RppalPins;
use snescon::gpio::PinController;
use snescon::sink::channel::ChannelRegistry;
use snescon::sink::PadFrame;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

/// NES/SNES pad driver for Raspberry Pi GPIO
#[derive(Parser, Debug)]
#[command(name = "snescon", version)]
struct Args {
    /// Config file, defaults to ~/.config/snescon/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// GPIO pins: clock, latch, data 1..5 (overrides the config file)
    #[arg(long, value_delimiter = ',')]
    pins: Option<Vec<u8>>,

    /// Look for the four-player adapter
    #[arg(long)]
    adapter: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = DriverConfig::load_or_default(&config_path).await?;
    if let Some(pins) = args.pins {
        config.pin_assignment = pins;
    }
    if args.adapter {
        config.adapter_enabled = true;
    }

    let (frame_tx, frame_rx) = mpsc::channel(256);
    let mut registry = ChannelRegistry::new(frame_tx);

    let handle = ControllerHandle::spawn(config, acquire_gpio, &mut registry)
        .map_err(|e| eyre!("Failed to start pad driver: {}", e))?;
    info!("{} pad devices registered", registry.devices().len());

    let printer = tokio::spawn(log_frames(frame_rx));

    // Stand in for the consumers of every pad device.
    for slot in 0..handle.slot_count() {
        handle.open(slot).await?;
    }

    info!("Polling pads, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    for slot in 0..handle.slot_count() {
        handle.close(slot).await;
    }
    handle.shutdown(&mut registry).await;

    drop(registry);
    printer.await?;
    Ok(())
}

fn acquire_gpio(
    assignment: &snescon::config::PinAssignment,
) -> Result<Box<dyn PinController>, DriverError> {
    RppalPins::open(assignment.pins())
        .map(|pins| Box::new(pins) as Box<dyn PinController>)
        .map_err(|e| DriverError::GpioUnavailable(e.to_string()))
}

async fn log_frames(mut frames: mpsc::Receiver<PadFrame>) {
    let mut last: HashMap<usize, PadFrame> = HashMap::new();

    while let Some(frame) = frames.recv().await {
        let changed = last
            .get(&frame.slot)
            .map_or(true, |previous| !previous.same_reports(&frame));

        if changed {
            let pressed: Vec<_> = frame
                .buttons
                .iter()
                .filter(|(_, pressed)| *pressed)
                .map(|(button, _)| *button)
                .collect();
            info!(
                "Pad {} at {}: buttons {:?}, x {}, y {}",
                frame.slot + 1,
                frame.timestamp.format("%H:%M:%S.%3f"),
                pressed,
                frame.x,
                frame.y
            );
            last.insert(frame.slot, frame);
        }
    }

    debug!("Frame channel closed");
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
