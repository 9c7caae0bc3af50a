use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "acadtrackd=info";

/// Stdout carries the IPC protocol, so logs always go to stderr.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
