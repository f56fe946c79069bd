use tracing_subscriber::{fmt, EnvFilter};

/// Default filter directive: `debug` when asked for, `info` otherwise.
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Initialize logging on stderr. `RUST_LOG` overrides the default filter;
/// `DEBUG=1` (set by `--debug`) lowers it to `debug`.
pub fn init_logging() {
    let debug = std::env::var("DEBUG").is_ok_and(|value| value == "1");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
