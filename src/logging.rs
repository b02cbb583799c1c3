use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing once for binaries and tests embedding the pool.
pub fn init_logging() {
    // Avoid a panic if a subscriber was already installed.
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
    tracing::info!(target = "pool", "tracing initialized");
}
