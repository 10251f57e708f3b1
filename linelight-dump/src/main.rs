use anyhow::{Context, Result};
use linelight_core::{CancelToken, CaptureLoop, FileSink, ensure_capture_dir};
use linelight_dump::config::{Command, DumpConfig, USAGE};
use linelight_dump::{console, logging};
use linelight_io::SerialSource;

#[tokio::main]
async fn main() -> Result<()> {
    let config = DumpConfig::from_env()?;

    tracing::subscriber::set_global_default(logging::subscriber(
        config.log_level,
        std::io::stderr,
    ))
    .context("failed to install log subscriber")?;

    match config.command {
        Command::Help => {
            println!("{}", USAGE);
            return Ok(());
        }
        Command::ListPorts => {
            let ports =
                linelight_io::available_ports().context("failed to enumerate serial ports")?;
            if ports.is_empty() {
                eprintln!("No serial ports detected");
            }
            for port in ports {
                println!("{}", port);
            }
            return Ok(());
        }
        Command::Capture => {}
    }

    let dir = ensure_capture_dir(&config.capture_dir)?;
    let source = SerialSource::open(&config.serial)?;
    tracing::info!(
        "Capturing from {} into {}",
        source.port_name(),
        dir.display()
    );

    let cancel = CancelToken::new();
    let mut capture = CaptureLoop::new(
        source,
        FileSink::new(dir),
        console::select_observer(),
        cancel.clone(),
    )
    .with_chunk_size(config.chunk_size);

    // Ctrl+C trips the token; the loop notices within one read timeout.
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, stopping capture");
                on_signal.cancel();
            }
            Err(e) => tracing::error!("Cannot listen for Ctrl+C: {}", e),
        }
    });

    let outcome = tokio::task::spawn_blocking(move || {
        let result = capture.run();
        // Releases the serial port before the runtime winds down.
        drop(capture);
        result
    })
    .await
    .context("capture thread panicked")?;

    console::reset_terminal();

    let report = outcome.context("capture aborted")?;
    tracing::info!(
        "Captured {} record(s), {} payload bytes, {} abandoned",
        report.records_completed,
        report.payload_bytes,
        report.records_abandoned
    );
    Ok(())
}
