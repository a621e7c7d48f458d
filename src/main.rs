use async_serial::config::{ConfigError, ConfigLoader, LogFormat, LoggingConfig};
use async_serial::{
    BaudRate, ChannelObserver, DataBits, OpenMode, Parity, PortEvent, SerialPort, StopBits,
};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long to wait for queued bytes to reach the device before closing.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Pipe stdin to a serial device and print what it sends back.",
    long_about = concat!(
        "Opens a serial device in non-blocking mode, forwards each line read from stdin ",
        "to it, and writes everything received from the device to stdout. Settings come ",
        "from the command line, then the configuration file, then built-in defaults."
    )
)]
struct Args {
    /// Device path or configured alias.
    path: Option<String>,

    /// Explicit configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Baud rate (one of the standard termios rates).
    #[arg(short, long)]
    baud: Option<BaudRate>,

    /// Parity: none, even, odd.
    #[arg(long)]
    parity: Option<Parity>,

    /// Stop bits: 1 or 2.
    #[arg(long)]
    stop_bits: Option<StopBits>,

    /// Data bits: 5 to 8.
    #[arg(long)]
    data_bits: Option<DataBits>,

    /// Open mode: read-only, write-only, read-write.
    #[arg(short, long)]
    mode: Option<OpenMode>,

    /// Print received bytes as hex instead of raw.
    #[arg(long)]
    hex: bool,

    /// Terminate sent lines with CRLF instead of LF.
    #[arg(long)]
    crlf: bool,
}

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let mut config = loader.into_config();

    if let Some(path) = &args.path {
        config.port.path = Some(path.clone());
    }
    if let Some(baud) = args.baud {
        config.port.baud = baud;
    }
    if let Some(parity) = args.parity {
        config.port.parity = parity;
    }
    if let Some(stop_bits) = args.stop_bits {
        config.port.stop_bits = stop_bits;
    }
    if let Some(data_bits) = args.data_bits {
        config.port.data_bits = data_bits;
    }
    if let Some(mode) = args.mode {
        config.port.mode = mode;
    }

    init_tracing(&config.logging);

    let name = config
        .port
        .path
        .clone()
        .ok_or(ConfigError::NoDevice)?;
    let path = config.port.resolve_path(&name);
    let line = config.port.line_configuration();

    let (observer, mut events) = ChannelObserver::new();
    let port = SerialPort::new(path);
    port.set_observer(&observer);
    port.open(config.port.mode)?;
    port.configure_with(&line)?;
    info!(path = port.path(), %line, "serial-pipe ready");

    let eol: &[u8] = if args.crlf { b"\r\n" } else { b"\n" };
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = stdin.next_line() => match line? {
                Some(text) => {
                    let mut bytes = text.into_bytes();
                    bytes.extend_from_slice(eol);
                    port.send(&bytes)?;
                }
                None => break,
            },
            event = events.recv() => match event {
                Some(PortEvent::Received(bytes)) => {
                    if args.hex {
                        stdout.write_all(hex_line(&bytes).as_bytes()).await?;
                    } else {
                        stdout.write_all(&bytes).await?;
                    }
                    stdout.flush().await?;
                }
                Some(PortEvent::Failed(error)) => {
                    warn!(%error, "device error");
                    if error.direction == async_serial::IoDirection::Read {
                        break;
                    }
                }
                None => break,
            },
            _ = &mut shutdown => break,
        }
    }

    let deadline = Instant::now() + DRAIN_GRACE;
    while port.has_pending_outgoing_data() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    if port.has_pending_outgoing_data() {
        warn!(pending = port.pending_outgoing_len(), "closing with unsent data");
    }
    port.close();

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    if let Err(e) = result {
        eprintln!("Warning: failed to initialise logging: {}", e);
    }
}

fn hex_line(bytes: &[u8]) -> String {
    let mut line = bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");
    line.push('\n');
    line
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
            Ok(mut stream) => {
                stream.recv().await;
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
