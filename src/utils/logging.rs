use tracing_appender::non_blocking::WorkerGuard;

use crate::config::Config;

/// Route `tracing` output to a daily rolling file in `config.log_dir`.
///
/// The returned guard flushes the background writer; keep it alive for the
/// life of the process.
pub fn init_tracing(config: &Config) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "privileges.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_ansi(false)
        .with_writer(non_blocking)
        .init();

    Ok(guard)
}
