use chrono::Local;
use linelight_core::{CaptureError, CaptureObserver, RecordName, RecordSummary};
use linelight_dump::config::{Command, DEFAULT_LOG_LEVEL, DumpConfig};
use linelight_dump::console::{
    BoxedObserver, ConsoleObserver, observer_for, progress_line, select_observer,
};
use linelight_dump::logging;
use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::Level;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

fn no_env() -> impl Fn(&str) -> Option<String> {
    |_: &str| None
}

fn home() -> Option<PathBuf> {
    Some(PathBuf::from("/home/tester"))
}

// ============================================================================
// DumpConfig Tests
// ============================================================================

#[test]
fn test_config_defaults() {
    let config = DumpConfig::parse(args(&[]), no_env(), home()).unwrap();
    assert_eq!(config.command, Command::Capture);
    assert_eq!(config.serial.port_name, "/dev/ttyACM0");
    assert_eq!(config.serial.baud_rate, 912_600);
    assert_eq!(config.serial.read_timeout, Duration::from_secs(1));
    assert_eq!(config.capture_dir, PathBuf::from("/home/tester/rt-linelight"));
    assert_eq!(config.chunk_size, 1024);
    assert_eq!(config.log_level, Level::INFO);
    assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
}

#[test]
fn test_config_positional_port_and_flags() {
    let config = DumpConfig::parse(
        args(&[
            "/dev/ttyUSB1",
            "--baud",
            "115200",
            "--dir",
            "/tmp/caps",
            "--chunk",
            "64",
            "--timeout-ms",
            "250",
        ]),
        no_env(),
        home(),
    )
    .unwrap();
    assert_eq!(config.serial.port_name, "/dev/ttyUSB1");
    assert_eq!(config.serial.baud_rate, 115_200);
    assert_eq!(config.capture_dir, PathBuf::from("/tmp/caps"));
    assert_eq!(config.chunk_size, 64);
    assert_eq!(config.serial.read_timeout, Duration::from_millis(250));
}

#[test]
fn test_config_environment() {
    let env = env_from(&[
        ("LINELIGHT_PORT", "COM7"),
        ("LINELIGHT_BAUD", "9600"),
        ("LINELIGHT_DIR", "/data/linelight"),
        ("LINELIGHT_LOG", "debug"),
    ]);
    let config = DumpConfig::parse(args(&[]), env, home()).unwrap();
    assert_eq!(config.serial.port_name, "COM7");
    assert_eq!(config.serial.baud_rate, 9600);
    assert_eq!(config.capture_dir, PathBuf::from("/data/linelight"));
    assert_eq!(config.log_level, Level::DEBUG);
}

#[test]
fn test_config_command_line_beats_environment() {
    let env = env_from(&[("LINELIGHT_PORT", "COM7"), ("LINELIGHT_BAUD", "9600")]);
    let config = DumpConfig::parse(args(&["COM3", "--baud", "57600"]), env, home()).unwrap();
    assert_eq!(config.serial.port_name, "COM3");
    assert_eq!(config.serial.baud_rate, 57_600);
}

#[test]
fn test_config_list_and_help() {
    let list = DumpConfig::parse(args(&["--list"]), no_env(), home()).unwrap();
    assert_eq!(list.command, Command::ListPorts);
    let short = DumpConfig::parse(args(&["-l"]), no_env(), home()).unwrap();
    assert_eq!(short.command, Command::ListPorts);
    let help = DumpConfig::parse(args(&["-h"]), no_env(), home()).unwrap();
    assert_eq!(help.command, Command::Help);
}

#[test]
fn test_config_rejects_bad_number() {
    let err = DumpConfig::parse(args(&["--baud", "fast"]), no_env(), home()).unwrap_err();
    assert!(format!("{:#}", err).contains("--baud"));

    let err = DumpConfig::parse(args(&[]), env_from(&[("LINELIGHT_BAUD", "x")]), home())
        .unwrap_err();
    assert!(format!("{:#}", err).contains("LINELIGHT_BAUD"));
}

#[test]
fn test_config_rejects_zero_chunk_and_timeout() {
    assert!(DumpConfig::parse(args(&["--chunk", "0"]), no_env(), home()).is_err());
    assert!(DumpConfig::parse(args(&["--timeout-ms", "0"]), no_env(), home()).is_err());
}

#[test]
fn test_config_rejects_unknown_flag() {
    let err = DumpConfig::parse(args(&["--parity", "even"]), no_env(), home()).unwrap_err();
    assert!(err.to_string().contains("unknown option --parity"));
}

#[test]
fn test_config_rejects_second_port() {
    let err = DumpConfig::parse(args(&["COM1", "COM2"]), no_env(), home()).unwrap_err();
    assert!(err.to_string().contains("COM2"));
}

#[test]
fn test_config_missing_value() {
    let err = DumpConfig::parse(args(&["--dir"]), no_env(), home()).unwrap_err();
    assert!(err.to_string().contains("--dir needs a value"));
}

#[test]
fn test_config_rejects_bad_log_level() {
    let err = DumpConfig::parse(args(&[]), env_from(&[("LINELIGHT_LOG", "loud")]), home())
        .unwrap_err();
    assert!(err.to_string().contains("LINELIGHT_LOG"));
}

#[test]
fn test_config_without_home() {
    assert!(DumpConfig::parse(args(&[]), no_env(), None).is_err());
    assert!(DumpConfig::parse(args(&["--dir", "/tmp/x"]), no_env(), None).is_ok());
    assert!(DumpConfig::parse(args(&["--list"]), no_env(), None).is_ok());
}

// ============================================================================
// ConsoleObserver Tests
// ============================================================================

fn summary(bytes: u64) -> RecordSummary {
    let name = RecordName::from_timestamp(&Local::now());
    RecordSummary {
        path: PathBuf::from("/tmp").join(name.as_str()),
        name,
        bytes_written: bytes,
        opened_at: Local::now(),
    }
}

fn rendered(observer: ConsoleObserver<Vec<u8>>) -> String {
    String::from_utf8(observer.into_inner()).unwrap()
}

#[test]
fn test_progress_line_is_right_aligned() {
    assert_eq!(progress_line(4), "         4 bytes received");
    assert_eq!(progress_line(1_234_567), "   1234567 bytes received");
}

#[test]
fn test_console_record_lifecycle() {
    let mut console = ConsoleObserver::new(Vec::new());
    let done = summary(4);

    console.on_chatter(b"hello");
    console.on_record_opened(&done.name, Path::new("/tmp"));
    console.on_progress(&done.name, 2);
    console.on_record_closed(&done);

    let text = rendered(console);
    let chatter_end = text.find("hello\n").expect("chatter line terminated");
    let opened = text.find("STX is received").unwrap();
    let progress = text.find(&progress_line(2)).unwrap();
    let closed = text
        .find(&format!("ETX is received (Total: 4 bytes), close \"{}\"", done.name))
        .unwrap();
    assert!(chatter_end < opened && opened < progress && progress < closed);
}

#[test]
fn test_console_chatter_passes_through() {
    let mut console = ConsoleObserver::new(Vec::new());
    console.on_chatter(b"line one\n");
    console.on_chatter(b"caf\xC3\xA9");
    assert_eq!(rendered(console), "line one\ncafé");
}

#[test]
fn test_console_reports_abandoned_and_interrupted() {
    let mut console = ConsoleObserver::new(Vec::new());
    let bad = summary(3);
    let error = CaptureError::Decode {
        name: bad.name.to_string(),
        offset: 3,
    };
    console.on_record_abandoned(&bad, &error);
    console.on_record_interrupted(&summary(9));

    let text = rendered(console);
    assert!(text.contains("after 3 bytes"));
    assert!(text.contains("not valid UTF-8"));
    assert!(text.contains("Interrupted, kept 9 bytes"));
}

// ============================================================================
// Piped Output Tests
// ============================================================================

/// In-memory log sink shared with the subscriber.
#[derive(Clone, Default)]
struct SharedLog(Arc<Mutex<Vec<u8>>>);

impl Write for SharedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Drive one record through `observer` and return what the log captured.
fn logged_record(mut observer: BoxedObserver, level: Level, done: &RecordSummary) -> String {
    let log = SharedLog::default();
    let writer = log.clone();
    let subscriber = logging::subscriber(level, move || writer.clone());

    tracing::subscriber::with_default(subscriber, || {
        observer.on_record_opened(&done.name, Path::new("/tmp"));
        observer.on_progress(&done.name, 2);
        observer.on_record_closed(done);
    });

    let bytes = log.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}

#[test]
fn test_piped_default_config_logs_closed_record() {
    let config = DumpConfig::parse(args(&[]), no_env(), home()).unwrap();
    let done = summary(4);

    let text = logged_record(observer_for(false), config.log_level, &done);
    assert!(text.contains("STX is received"));
    assert!(text.contains("ETX is received (Total: 4 bytes)"));
    assert!(text.contains(done.name.as_str()));
    // Progress stays below the default level.
    assert!(!text.contains("bytes received"));
}

#[test]
fn test_piped_warn_level_hides_milestones() {
    let text = logged_record(observer_for(false), Level::WARN, &summary(4));
    assert!(!text.contains("ETX is received"));
}

#[test]
fn test_select_observer_falls_back_to_log_when_piped() {
    // Only meaningful when the test harness's stdout is redirected.
    if std::io::stdout().is_terminal() {
        return;
    }
    let text = logged_record(select_observer(), DEFAULT_LOG_LEVEL, &summary(7));
    assert!(text.contains("ETX is received (Total: 7 bytes)"));
}
