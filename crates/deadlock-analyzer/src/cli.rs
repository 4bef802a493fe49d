use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "deadlock-analyzer", version)]
pub struct Args {
    /// Address the HTTP API listens on.
    #[arg(long, env = "DEADLOCK_ANALYZER_LISTEN", default_value = "127.0.0.1:5000")]
    pub listen: String,

    /// Logging level (stderr). Also supports RUST_LOG.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Command timeout for diagnostic queries that don't specify one. 0 disables it.
    #[arg(long, env = "DEADLOCK_ANALYZER_TIMEOUT", default_value_t = 30)]
    pub default_timeout_secs: u64,

    /// Command timeout for reading deadlock events from the event file target.
    #[arg(long, default_value_t = 60)]
    pub deadlock_timeout_secs: u64,

    /// Upper bound on deadlock events returned per request.
    #[arg(long, default_value_t = 1000)]
    pub max_deadlock_records: usize,

    /// Serve a static frontend from this directory (index.html by default).
    #[arg(long, env = "DEADLOCK_ANALYZER_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_service_contract() {
        let args = Args::parse_from(["deadlock-analyzer"]);
        assert_eq!(args.default_timeout_secs, 30);
        assert_eq!(args.deadlock_timeout_secs, 60);
        assert_eq!(args.max_deadlock_records, 1000);
        assert!(args.static_dir.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "deadlock-analyzer",
            "--listen",
            "0.0.0.0:8080",
            "--default-timeout-secs",
            "5",
            "--static-dir",
            "wwwroot",
        ]);
        assert_eq!(args.listen, "0.0.0.0:8080");
        assert_eq!(args.default_timeout_secs, 5);
        assert_eq!(args.static_dir, Some(PathBuf::from("wwwroot")));
    }
}
