use tracing_subscriber::{EnvFilter, fmt};

/// Logs go to stderr so `--json` output on stdout stays machine readable.
/// `RUST_LOG` wins over the `--debug` default.
pub fn init(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .try_init();
}
