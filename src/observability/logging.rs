use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the logging system with both console and file output.
///
/// The file layer always writes JSON lines to a daily-rolling file under
/// `log_dir`. The console layer is human readable unless `json_console` is
/// set, in which case it emits the same JSON records on stdout.
///
/// The returned guard flushes the file writer when dropped, so callers keep
/// it alive for the whole run.
pub fn init_logging(log_dir: &Path, json_console: bool) -> WorkerGuard {
    // Ensure logs directory exists
    let _ = fs::create_dir_all(log_dir);

    // Create a non-blocking file appender for daily log rotation
    let file_appender = tracing_appender::rolling::daily(log_dir, "roxie_scraper.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    let json_console_layer = json_console.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stdout)
    });
    let text_console_layer = (!json_console).then(|| {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stdout)
    });

    // Respect RUST_LOG if set; otherwise info for our crate, warn for dependencies
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("roxie_scraper=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(json_console_layer)
        .with(text_console_layer)
        .init();

    guard
}
