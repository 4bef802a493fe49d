use tracing_subscriber::EnvFilter;

/// tiberius reports every login and environment change at info; keep it to
/// warnings unless RUST_LOG asks for more.
pub fn default_directives(log_level: &str) -> String {
    format!("{log_level},tiberius=warn")
}

pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}
