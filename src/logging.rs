use tracing_subscriber::EnvFilter;

/// Initialize process-wide logging to stderr.
///
/// `RUST_LOG` overrides the default level; the debug flag raises the default
/// from `info` to `debug`. Call once, before any session work.
pub fn init(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
