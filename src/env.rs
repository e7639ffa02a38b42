//! Environment constants and path utilities for the provisioner.
//!
//! Centralizes file names, directory names and environment variable names so
//! the CLI, configuration discovery and logging agree on them.

use std::path::{Path, PathBuf};

/// Application directory name (hidden directory like .git)
pub const FANOUT_DIR_NAME: &str = ".fanout";

/// Configuration file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file name in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "fanout.toml";

/// System-wide configuration file
pub const SYSTEM_CONFIG_FILE: &str = "/etc/fanout/config.toml";

/// Default log file used by `--log-file` when given without a path
pub const DEFAULT_LOG_FILE: &str = "application.log";

/// Environment variable holding the service access token
pub const API_TOKEN_ENV: &str = "ZITADEL_API_TOKEN";

/// Default service endpoint
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1.sslip.io:8080";

/// Default tracing directive when `RUST_LOG` is unset
pub const DEFAULT_LOG_DIRECTIVE: &str = "fanout_provisioner=info";

/// Build the .fanout directory path from a root
pub fn fanout_dir_path(root: &Path) -> PathBuf {
    root.join(FANOUT_DIR_NAME)
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    fanout_dir_path(home_dir).join(CONFIG_FILE_NAME)
}

/// Build the `./.fanout/config.toml` path
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    fanout_dir_path(current_dir).join(CONFIG_FILE_NAME)
}

/// Build the `./fanout.toml` path
pub fn local_root_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}

/// Home directory from `HOME`, falling back to `USERPROFILE`
pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths() {
        let home_dir = Path::new("/home/user");
        let current_dir = Path::new("/current/project");

        assert_eq!(
            user_config_file_path(home_dir),
            Path::new("/home/user/.fanout/config.toml")
        );
        assert_eq!(
            local_config_file_path(current_dir),
            Path::new("/current/project/.fanout/config.toml")
        );
        assert_eq!(
            local_root_config_file_path(current_dir),
            Path::new("/current/project/fanout.toml")
        );
    }
}
