use std::{path::PathBuf, sync::LazyLock};

use crate::utils::LOGSVIEWER_HOME_DIR;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The default number of persistence workers.
pub const DEFAULT_WORKERS: usize = 2;

/// The default deadline of a single store operation, in milliseconds.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 1000;

/// The default number of retries of a failed store operation.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The default first retry delay, in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 5;

/// The default upper bound of the retry delay, in milliseconds.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 1_000_000;

/// The default number of rows per page when listing.
pub const DEFAULT_PER_PAGE: u32 = 50;

/// The path where all logsviewer data is stored by default.
pub static DEFAULT_LOGSVIEWER_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(LOGSVIEWER_HOME_DIR)
});
