use clap::{Parser, Subcommand};
use serial_stream::config::{ConfigLoader, SerialConfig};
use serial_stream::format::parse_config;
use serial_stream::relay;
use serial_stream::{PortConfig, SerialStream};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::info;

/// Read timeout used by `bridge` when the port would otherwise block forever.
const BRIDGE_POLL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Open, configure and talk to serial ports.",
    long_about = "Open, configure and talk to serial ports.\n\n\
        PORT arguments take the form NAME:BAUD[,SETTINGS[,TIMEOUT]], e.g. \
        /dev/ttyUSB0:115200,8N1,500ms. A bare NAME (or an alias from the \
        configuration file) uses the configured defaults."
)]
struct Args {
    /// Configuration file to use instead of the standard locations.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "serial_stream=trace". RUST_LOG takes precedence.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial devices present on this machine.
    List {
        /// Only devices whose UART exposes an rx trigger in sysfs (Linux).
        #[arg(long)]
        rx: bool,
    },
    /// Copy everything received on PORT to stdout.
    Monitor { port: String },
    /// Write DATA to PORT, then print any reply.
    Send {
        port: String,
        data: String,
        /// Treat DATA as hex digits.
        #[arg(long)]
        hex: bool,
        /// How long to collect a reply after writing, in milliseconds.
        #[arg(long, default_value_t = 0)]
        wait_ms: u64,
    },
    /// Connect stdin and stdout to PORT.
    Bridge { port: String },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match args.config {
        Some(ref path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let mut config = loader.into_config();
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    serial_stream::logging::init(&config.logging).map_err(|e| e.to_string())?;

    match args.command {
        Command::List { rx } => list(rx)?,
        Command::Monitor { port } => monitor(&port_config(&port, &config.serial)?)?,
        Command::Send {
            port,
            data,
            hex,
            wait_ms,
        } => {
            let payload = if hex {
                relay::decode_hex(&data).ok_or("DATA is not valid hex")?
            } else {
                data.into_bytes()
            };
            send(
                &port_config(&port, &config.serial)?,
                &payload,
                Duration::from_millis(wait_ms),
            )?
        }
        Command::Bridge { port } => bridge(port_config(&port, &config.serial)?)?,
    }

    Ok(())
}

/// Parse a PORT argument, expanding aliases from the configuration.
fn port_config(arg: &str, serial: &SerialConfig) -> Result<PortConfig, Box<dyn std::error::Error>> {
    if !arg.contains(':') {
        return Ok(serial.port_config(arg));
    }
    let mut config = parse_config(arg)?;
    config.name = serial.resolve_port(&config.name);
    config.assert_dtr = serial.assert_dtr;
    Ok(config)
}

#[cfg(unix)]
fn list(rx: bool) -> Result<(), Box<dyn std::error::Error>> {
    use serial_stream::list;

    let ports = if rx {
        list::ports_with_rx_trigger()?
    } else {
        list::available_ports()?
    };
    let mut stdout = io::stdout().lock();
    for port in ports {
        writeln!(stdout, "{port}")?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn list(_rx: bool) -> Result<(), Box<dyn std::error::Error>> {
    Err("port listing is not supported on this platform".into())
}

fn monitor(config: &PortConfig) -> Result<(), Box<dyn std::error::Error>> {
    let port = serial_stream::open(config)?;
    info!(port = %config, "monitoring");
    relay::pump(&port, &mut io::stdout().lock(), || false)?;
    Ok(())
}

fn send(
    config: &PortConfig,
    payload: &[u8],
    wait: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let port = serial_stream::open(config)?;
    port.write_all(payload)?;
    info!(port = %config, bytes = payload.len(), "sent");

    if !wait.is_zero() {
        let reply = relay::collect(&port, wait)?;
        io::stdout().lock().write_all(&reply)?;
    }
    port.close()?;
    Ok(())
}

fn bridge(mut config: PortConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.read_timeout.is_zero() {
        config.read_timeout = BRIDGE_POLL;
    }
    let port = serial_stream::open(&config)?;
    let done = AtomicBool::new(false);
    info!(port = %config, "bridging stdin and stdout");

    thread::scope(|s| -> Result<(), Box<dyn std::error::Error>> {
        let reader = s.spawn(|| {
            relay::pump(&port, &mut io::stdout().lock(), || {
                done.load(Ordering::Acquire)
            })
        });

        let fed = relay::feed(&mut io::stdin().lock(), &port);
        done.store(true, Ordering::Release);

        let pumped = reader.join().map_err(|_| "reader thread panicked")?;
        fed?;
        pumped?;
        Ok(())
    })?;

    port.close()?;
    Ok(())
}
