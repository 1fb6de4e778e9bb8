use tracing_subscriber::EnvFilter;

/// Initialise logging. The default level is `info`; the settings file can
/// opt into `debug`, and when it does `RUST_LOG` may override the filter
/// further. With debug logging off the environment variable is ignored so
/// a stray `RUST_LOG` never floods the overlay's log.
pub fn init(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
