use procura_core::config::{LogFormat, LoggingConfig};

/// Install the global tracing subscriber from the logging section of the
/// application config. Call once at process startup; later calls are
/// ignored so embedded and test setups can race safely.
pub fn init_logging(config: &LoggingConfig) {
    use tracing::Level;

    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);

    let result = match config.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
    };

    let _ = result;
}
