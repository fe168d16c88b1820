use std::env;
use std::path::PathBuf;

/// Load `.env` from the working directory, if present, and fill defaults
/// for variables the daemon reads.
///
/// Runs before logging is initialised, so `RUST_LOG` from the file takes
/// effect. Returns the loaded file for the caller to log once tracing is up.
pub fn configure_app() -> Result<PathBuf, dotenv::Error> {
    let loaded = dotenv::dotenv();
    set_default_env_vars();
    loaded
}

fn set_default_env_vars() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", "info,gt_daemon=debug");
    }
}

/// Config path override from `GEOTRACK_CONFIG`.
pub fn config_path_override() -> Option<PathBuf> {
    env::var_os("GEOTRACK_CONFIG")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
