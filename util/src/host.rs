//! Host platform utility functions

use std::env;
use std::path::PathBuf;

/// Environment variable which points at the root of the software checkout.
pub const SW_ROOT_ENV_VAR: &str = "FOLLOW_SW_ROOT";

/// Get the root directory of the software, which contains the `params` directory and the
/// `sessions` directory.
pub fn get_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}

/// Get the name of the machine we're running on, if it can be determined.
pub fn get_hostname() -> Option<String> {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
