//! stderr log subscriber shared by the binary and its tests.

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Plain `fmt` subscriber capped at `level`.
pub fn subscriber<W>(
    level: Level,
    writer: W,
) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(writer)
        .finish()
}
