use std::{env, path::PathBuf};

use crate::config::DEFAULT_LOGSVIEWER_HOME;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable overriding the logsviewer home directory.
pub const LOGSVIEWER_HOME_ENV_VAR: &str = "LOGSVIEWER_HOME";

/// Environment variable overriding the path of the configuration file.
pub const LOGSVIEWER_CONFIG_ENV_VAR: &str = "LOGSVIEWER_CONFIG";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The home directory: `$LOGSVIEWER_HOME` if set and not empty, `~/.logsviewer` otherwise.
pub fn get_logsviewer_home_path() -> PathBuf {
    match env::var(LOGSVIEWER_HOME_ENV_VAR) {
        Ok(home) if !home.is_empty() => PathBuf::from(home),
        _ => DEFAULT_LOGSVIEWER_HOME.to_path_buf(),
    }
}

/// The configuration file named by `$LOGSVIEWER_CONFIG`, if set.
pub fn get_config_path_from_env() -> Option<PathBuf> {
    env::var_os(LOGSVIEWER_CONFIG_ENV_VAR)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}
