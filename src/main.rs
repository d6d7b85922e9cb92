//! picocell-link - diagnostic CLI for the concentrator MCU bridge.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use picocell_link as bridge;

use bridge::McuLink;
use bridge::config::{ConfigLoadResult, LinkConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Talk to a LoRa concentrator MCU bridge over USB CDC.
#[derive(Parser)]
#[command(name = "picocell-link", version)]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only try this device instead of the configured port list
    #[arg(long)]
    port: Option<PathBuf>,

    /// Log frames at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Also write a daily rolling log file into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Open the link and check the MCU firmware version
    Check,
    /// Read one register
    Read {
        #[arg(value_parser = parse_u8)]
        addr: u8,
    },
    /// Write one register
    Write {
        #[arg(value_parser = parse_u8)]
        addr: u8,
        #[arg(value_parser = parse_u8)]
        value: u8,
    },
    /// Burst read `size` bytes starting at a register
    Dump {
        #[arg(value_parser = parse_u8)]
        addr: u8,
        #[arg(value_parser = parse_usize)]
        size: usize,
    },
    /// Burst write hex bytes starting at a register
    Fill {
        #[arg(value_parser = parse_u8)]
        addr: u8,
        /// Bytes as a hex string, e.g. "00a1ff"
        data: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Keep the guard alive so the file writer flushes on exit.
    let _log_guard = init_logging(cli.verbose, cli.log_dir.as_deref());

    let config_path = cli.config.clone().unwrap_or_else(LinkConfig::default_path);
    tracing::info!("Config path: {:?}", config_path);

    let mut config = match LinkConfig::try_load(&config_path) {
        ConfigLoadResult::Loaded(config) => {
            tracing::info!("Config loaded successfully");
            config
        }
        ConfigLoadResult::Missing => {
            tracing::info!("Config missing, using defaults");
            LinkConfig::default()
        }
        ConfigLoadResult::Invalid(e) => bail!("invalid config {}: {e}", config_path.display()),
    };
    if let Some(port) = cli.port {
        config.ports = vec![port];
    }

    let link = McuLink::open(config).context("failed to open MCU bridge")?;

    match cli.command {
        Cmd::Check => println!("MCU bridge OK, firmware {:#010x}", link.config().firmware_version),
        Cmd::Read { addr } => {
            let value = link.read_register(addr)?;
            println!("{addr:#04x}: {value:#04x}");
        }
        Cmd::Write { addr, value } => {
            link.write_register(addr, value)?;
            println!("{addr:#04x} <- {value:#04x}");
        }
        Cmd::Dump { addr, size } => {
            let mut buf = vec![0u8; size];
            link.read_burst(addr, &mut buf)?;
            for (i, row) in buf.chunks(16).enumerate() {
                let hex: Vec<String> = row.iter().map(|b| format!("{b:02x}")).collect();
                println!("{:04x}: {}", i * 16, hex.join(" "));
            }
        }
        Cmd::Fill { addr, data } => {
            let bytes = parse_hex(&data)?;
            link.write_burst(addr, &bytes)?;
            println!("Wrote {} bytes at {addr:#04x}", bytes.len());
        }
    }

    link.close()?;
    Ok(())
}

/// Install the fmt subscriber, plus a rolling file layer when requested.
fn init_logging(
    verbose: bool,
    log_dir: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = log_filter(verbose, std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "picocell-link.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

/// `RUST_LOG` directives win; the verbosity flag only sets the default level.
fn log_filter(verbose: bool, directives: Option<&str>) -> EnvFilter {
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(directives.unwrap_or_default())
}

fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let value = parse_number(s)?;
    u8::try_from(value).map_err(|_| format!("{s} does not fit in one byte"))
}

fn parse_usize(s: &str) -> Result<usize, String> {
    let value = parse_number(s)?;
    usize::try_from(value).map_err(|_| format!("{s} is too large"))
}

fn parse_hex(s: &str) -> anyhow::Result<Vec<u8>> {
    let s = s.trim();
    if s.is_empty() || s.len() % 2 != 0 || !s.is_ascii() {
        bail!("hex data must be a non-empty, even-length ASCII string");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16).with_context(|| format!("invalid hex byte '{}'", &s[i..i + 2]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_env_overrides_default() {
        assert_eq!(log_filter(false, None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(true, None).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(log_filter(false, Some("trace")).max_level_hint(), Some(LevelFilter::TRACE));
        assert_eq!(log_filter(true, Some("warn")).max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_u8("0x1f"), Ok(0x1F));
        assert_eq!(parse_u8("200"), Ok(200));
        assert!(parse_u8("256").is_err());
        assert_eq!(parse_hex("00a1ff").unwrap(), vec![0x00, 0xA1, 0xFF]);
        assert!(parse_hex("abc").is_err());
    }
}
