//! Tracing setup for hosts and tools embedding the WebSocket core

use anyhow::Result;
use std::path::Path;
use tracing::level_filters::LevelFilter;

/// Initialize the global tracing subscriber
///
/// Debug builds log to stderr. Release builds log to a daily rolling file in
/// `log_dir` (or `./logs`). An already installed subscriber is left alone.
pub fn init_logging(log_dir: Option<&Path>) -> Result<()> {
    let level = resolve_log_level();

    #[cfg(debug_assertions)]
    {
        let _ = log_dir;
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .try_init();
    }

    #[cfg(not(debug_assertions))]
    {
        use anyhow::Context;

        let log_dir = log_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| std::path::PathBuf::from("logs"));

        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
        let file_appender = tracing_appender::rolling::daily(&log_dir, "cheddarws_core");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Logging lasts until process exit
        std::mem::forget(guard);

        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(non_blocking)
            .try_init();
    }

    tracing::info!("Cheddar WebSocket core initialized v{}", crate::VERSION);
    Ok(())
}

/// Map `RUST_LOG` to a level filter, defaulting to INFO
pub fn resolve_log_level() -> LevelFilter {
    match std::env::var("RUST_LOG") {
        Ok(val) => parse_level(&val),
        Err(_) => LevelFilter::INFO,
    }
}

fn parse_level(val: &str) -> LevelFilter {
    match val.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}
