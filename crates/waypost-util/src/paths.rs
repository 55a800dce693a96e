//! Default paths for waypost components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/waypost/waypostd.sock` or `/tmp/waypost-$USER/waypostd.sock`
//! - Data: `$XDG_DATA_HOME/waypost` or `~/.local/share/waypost`
//! - Config: `$XDG_CONFIG_HOME/waypost/config.toml` or `~/.config/waypost/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the config file
pub const WAYPOST_CONFIG_ENV: &str = "WAYPOST_CONFIG";

const SOCKET_FILENAME: &str = "waypostd.sock";
const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "waypost";

/// Default socket path.
///
/// `$XDG_RUNTIME_DIR/waypost/waypostd.sock`, else `/tmp/waypost-$USER/waypostd.sock`.
/// `WAYPOST_SOCKET` is applied by the daemon's command line instead.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Default data directory; `WAYPOST_DATA_DIR` is applied by the daemon's command line.
pub fn default_data_dir() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default configuration file path.
///
/// Order of precedence:
/// 1. `$WAYPOST_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/waypost/config.toml`
/// 3. `~/.config/waypost/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(WAYPOST_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_contains_app_dir() {
        let path = default_socket_path();
        assert!(path.to_string_lossy().contains("waypost"));
        assert!(path.to_string_lossy().ends_with(".sock"));
    }

    #[test]
    fn data_dir_contains_app_dir() {
        let path = default_data_dir();
        assert!(path.to_string_lossy().contains("waypost"));
    }

    #[test]
    fn config_path_is_toml() {
        let path = default_config_path();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("toml"));
    }
}
