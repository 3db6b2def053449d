use std::fs;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE: &str = "maville.log";
const DEFAULT_DIRECTIVE: &str = "maville=info";

/// Sets up console logging plus daily-rotated JSON files under `dir`.
/// RUST_LOG refines the filter; the crate logs at info by default.
pub fn init_logging(dir: &str) {
    let dir = Path::new(dir);
    let _ = fs::create_dir_all(dir);

    let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive(DEFAULT_DIRECTIVE.parse().expect("valid directive")),
        )
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();

    // The guard flushes buffered lines when dropped; the subscriber
    // lives for the whole process, so leak it.
    std::mem::forget(guard);
}
