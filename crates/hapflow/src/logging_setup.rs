use anyhow::{Context, Result};
use hapflow_core::LogConfig;
use std::fs::File;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Keeps the file writer thread alive; drop it last
pub struct LogGuard {
    _guard: WorkerGuard,
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LogConfig) -> Result<Option<LogGuard>> {
    config
        .ensure_log_directory()
        .context("Cannot create the log directory")?;

    let filter = EnvFilter::builder()
        .with_default_directive(config.parse_level().into())
        .from_env_lossy();

    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(true)
            .with_filter(filter.clone())
    });

    let mut guard = None;
    let file_layer = if config.file_output {
        let path = config.current_log_path();
        let file = File::create(&path)
            .with_context(|| format!("Cannot open log file {}", path.display()))?;
        let (writer, writer_guard) = tracing_appender::non_blocking(file);
        guard = Some(LogGuard {
            _guard: writer_guard,
        });
        eprintln!("Writing log to {}", path.display());

        Some(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(level = %config.level, "Logging ready");
    Ok(guard)
}
