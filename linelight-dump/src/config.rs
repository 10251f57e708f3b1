//! Command line + environment configuration.
//!
//! Command line flags win over `LINELIGHT_*` variables, which win over the
//! built-in defaults.

use anyhow::{Context, Result, anyhow, bail};
use linelight_core::{CAPTURE_DIR_NAME, DEFAULT_CHUNK_SIZE};
use linelight_io::SerialSettings;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

pub const USAGE: &str = "\
Usage: linelight-dump [PORT] [OPTIONS]

Captures STX/ETX delimited records from a serial device into
~/rt-linelight/<YYYY-MM-DD_HH-MM-SS>.csv until interrupted.

Options:
  --baud <N>         Baud rate (default 912600)
  --dir <PATH>       Capture directory (default ~/rt-linelight)
  --chunk <N>        Bytes per read (default 1024)
  --timeout-ms <N>   Read timeout in milliseconds (default 1000)
  -l, --list         List serial ports and exit
  -h, --help         Show this help

Environment:
  LINELIGHT_PORT, LINELIGHT_BAUD, LINELIGHT_DIR
  LINELIGHT_LOG      Log level on stderr (default info)";

/// Low enough that record milestones reach stderr when stdout is piped.
pub const DEFAULT_LOG_LEVEL: Level = Level::INFO;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Capture,
    ListPorts,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DumpConfig {
    pub command: Command,
    pub serial: SerialSettings,
    pub capture_dir: PathBuf,
    pub chunk_size: usize,
    pub log_level: Level,
}

impl DumpConfig {
    /// Read the real process arguments, environment and home directory.
    pub fn from_env() -> Result<Self> {
        let home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        Self::parse(std::env::args().skip(1), |key| std::env::var(key).ok(), home)
    }

    pub fn parse<I, E>(args: I, env: E, home: Option<PathBuf>) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
        E: Fn(&str) -> Option<String>,
    {
        let mut serial = SerialSettings::default();
        let mut dir: Option<PathBuf> = None;
        let mut chunk_size = DEFAULT_CHUNK_SIZE;
        let mut log_level = DEFAULT_LOG_LEVEL;
        let mut command = Command::Capture;

        // -- Environment --
        if let Some(port) = env("LINELIGHT_PORT") {
            serial.port_name = port;
        }
        if let Some(baud) = env("LINELIGHT_BAUD") {
            serial.baud_rate = parse_number("LINELIGHT_BAUD", &baud)?;
        }
        if let Some(path) = env("LINELIGHT_DIR") {
            dir = Some(PathBuf::from(path));
        }
        if let Some(level) = env("LINELIGHT_LOG") {
            log_level = level
                .parse()
                .map_err(|_| anyhow!("LINELIGHT_LOG: unknown level {:?}", level))?;
        }

        // -- Command line --
        let mut port_seen = false;
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => command = Command::Help,
                "-l" | "--list" => command = Command::ListPorts,
                "--baud" => {
                    serial.baud_rate = parse_number("--baud", &value_for("--baud", &mut args)?)?;
                }
                "--dir" => dir = Some(PathBuf::from(value_for("--dir", &mut args)?)),
                "--chunk" => {
                    chunk_size = parse_number("--chunk", &value_for("--chunk", &mut args)?)?;
                    if chunk_size == 0 {
                        bail!("--chunk must be at least 1");
                    }
                }
                "--timeout-ms" => {
                    let ms: u64 =
                        parse_number("--timeout-ms", &value_for("--timeout-ms", &mut args)?)?;
                    if ms == 0 {
                        bail!("--timeout-ms must be at least 1");
                    }
                    serial.read_timeout = Duration::from_millis(ms);
                }
                flag if flag.starts_with('-') => bail!("unknown option {}\n\n{}", flag, USAGE),
                port => {
                    if port_seen {
                        bail!("unexpected argument {:?}\n\n{}", port, USAGE);
                    }
                    serial.port_name = port.to_string();
                    port_seen = true;
                }
            }
        }

        let capture_dir = match (dir, home) {
            (Some(dir), _) => dir,
            (None, Some(home)) => home.join(CAPTURE_DIR_NAME),
            (None, None) if command == Command::Capture => {
                bail!("cannot locate the home directory; pass --dir or set LINELIGHT_DIR")
            }
            (None, None) => PathBuf::new(),
        };

        Ok(Self {
            command,
            serial,
            capture_dir,
            chunk_size,
            log_level,
        })
    }
}

fn value_for(flag: &str, args: &mut impl Iterator<Item = String>) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{} needs a value", flag))
}

fn parse_number<T>(what: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{}: {:?} is not a valid number", what, raw))
}
