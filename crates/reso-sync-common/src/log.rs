use tracing_subscriber::EnvFilter;

/// Initializes the process-wide structured logger. `debug` widens the
/// default filter from `info` to `debug`; `RUST_LOG` always wins when set,
/// matching `EnvFilter::from_default_env`'s precedence.
pub fn init(debug: bool) {
    let default_directive = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
