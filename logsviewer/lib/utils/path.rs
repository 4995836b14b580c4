//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The sub directory of the user's home where logsviewer keeps its data.
pub const LOGSVIEWER_HOME_DIR: &str = ".logsviewer";

/// The file name of the record database.
pub const LOGSVIEWER_DB_FILENAME: &str = "logsviewer.db";

/// The sub directory archives are extracted into.
pub const STAGING_SUBDIR: &str = "space";

/// The file name of the enrichment lookup document.
pub const ENRICHMENT_FILENAME: &str = "result.json";

/// The file name of the optional configuration file in the home directory.
pub const LOGSVIEWER_CONFIG_FILENAME: &str = "logsviewer.yaml";
