use clap::Parser;
use parking_lot::Mutex;
use serial_comms_handler::comms::{ByteListener, CommsHandler};
use serial_comms_handler::config::{Config, ConfigLoader};
use serial_comms_handler::{logging, port};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Open a serial device, print everything it sends, optionally transmit a message.",
    long_about = "Connects to a serial device, prints every received chunk to stdout and \
                  runs until Ctrl-C or the requested duration elapses. Logs go to stderr."
)]
struct Args {
    /// Device path or configured alias (e.g. /dev/ttyUSB0, COM3).
    #[arg(short, long)]
    device: Option<String>,

    /// Baud rate. Defaults to the configured value.
    #[arg(short, long)]
    baud: Option<u32>,

    /// Configuration file. Defaults to the standard search path.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List available serial devices and exit.
    #[arg(long)]
    list: bool,

    /// Text to transmit once connected.
    #[arg(short, long)]
    send: Option<String>,

    /// Print received bytes as hex instead of text.
    #[arg(long)]
    hex: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    duration: Option<u64>,
}

/// Prints each received chunk, as text or as hex.
///
/// The first failed write (e.g. a closed pipe) is logged; later failures are
/// counted silently so a dead stdout does not flood the log.
struct ConsolePrinter<W> {
    hex: bool,
    out: Mutex<W>,
    failed: AtomicBool,
}

impl<W: Write + Send> ConsolePrinter<W> {
    fn new(out: W, hex: bool) -> Self {
        Self {
            hex,
            out: Mutex::new(out),
            failed: AtomicBool::new(false),
        }
    }

    fn print(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut out = self.out.lock();
        if self.hex {
            let line: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            writeln!(out, "{}", line.join(" "))?;
        } else {
            out.write_all(String::from_utf8_lossy(bytes).as_bytes())?;
        }
        out.flush()
    }
}

impl<W: Write + Send> ByteListener for ConsolePrinter<W> {
    fn on_bytes(&self, bytes: &[u8]) {
        if let Err(e) = self.print(bytes) {
            if !self.failed.swap(true, Ordering::Relaxed) {
                warn!(error = %e, "cannot write received data to the console, dropping output");
            }
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(ConfigLoader::load_from(path)?.into_config()),
        None => match ConfigLoader::load() {
            Ok(loader) => Ok(loader.into_config()),
            Err(e) => {
                eprintln!("Warning: Failed to load config, using defaults: {}", e);
                Ok(ConfigLoader::with_defaults().into_config())
            }
        },
    }
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Warning: Failed to initialise logging: {}", e);
    }

    if args.list {
        for info in port::list_ports()? {
            println!("{}\t{:?}", info.port_name, info.port_type);
        }
        return Ok(());
    }

    let device = args
        .device
        .as_deref()
        .or(config.serial.device.as_deref())
        .map(|name| config.serial.resolve_port(name))
        .ok_or("no device given: pass --device or set serial.device in the config")?;
    let baud_rate = args.baud.unwrap_or(config.serial.baud_rate);

    let handler = Arc::new(CommsHandler::serial(config.serial.handler_settings()));
    handler.add_listener(ConsolePrinter::new(std::io::stdout(), args.hex));
    handler.start(&device, baud_rate)?;

    if let Some(text) = &args.send {
        if let Err(e) = handler.transmit(text.as_bytes()) {
            error!(error = %e, "transmit failed");
        }
    }

    match args.duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {},
                _ = shutdown_signal() => {},
            }
        }
        None => shutdown_signal().await,
    }

    // stop joins the receive thread, keep it off the async workers
    let stopper = Arc::clone(&handler);
    tokio::task::spawn_blocking(move || stopper.stop()).await??;

    if let Some(stats) = handler.last_session_stats() {
        info!(
            reads = stats.reads,
            bytes = stats.bytes_received,
            dispatches = stats.dispatches,
            read_errors = stats.read_errors,
            listener_panics = stats.listener_panics,
            "session finished"
        );
    }

    Ok(())
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, shutting down");
}
