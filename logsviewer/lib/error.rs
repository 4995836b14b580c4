use std::{
    error::Error,
    fmt::{self, Display},
    path::PathBuf,
};

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a logsviewer-related operation.
pub type LogsViewerResult<T> = Result<T, LogsViewerError>;

/// An error that occurred while importing, storing or correlating cluster resources.
#[derive(pretty_error_debug::Debug, Error)]
pub enum LogsViewerError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error that can represent any error.
    #[error(transparent)]
    Custom(#[from] AnyError),

    /// An error returned by the database.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An error that occurred while applying the schema migrations.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An error that occurred while decoding YAML.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An error that occurred while encoding or decoding JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// An invalid glob pattern.
    #[error("glob pattern error: {0}")]
    Glob(#[from] globset::Error),

    /// An error that occurred while walking a directory tree.
    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// A store operation exceeded its deadline.
    #[error("store operation timed out after {0}ms")]
    StoreTimeout(u64),

    /// The archive could not be decompressed or unpacked.
    #[error("archive error for {path}: {source}")]
    Archive {
        /// The archive being extracted.
        path: PathBuf,

        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The archive carried no `timestamp` file.
    #[error("timestamp file missing: {0}")]
    TimestampMissing(PathBuf),

    /// The `timestamp` file could not be parsed.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// An archive with the same file name was already imported.
    #[error("must-gather already imported: {0}")]
    AlreadyImported(String),

    /// A single manifest could not be decoded into a canonical record.
    #[error("failed to decode manifest {path}: {reason}")]
    ManifestDecode {
        /// The manifest file.
        path: PathBuf,

        /// Why decoding failed.
        reason: String,
    },

    /// An invalid argument was supplied.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No row exists for the requested entity.
    #[error("{kind} not found: {id}")]
    EntityNotFound {
        /// The kind of entity looked up.
        kind: &'static str,

        /// The identifier used for the lookup.
        id: String,
    },

    /// The entity exists but one of the dependent lookups found nothing.
    #[error("not enough data to build a query: {0} not found")]
    CorrelationIncomplete(MissingLink),
}

/// The dependent lookup that came back empty while correlating an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissingLink {
    /// The owning virtual machine instance.
    Vmi,

    /// A launcher pod created by the virtual machine instance.
    LauncherPod,

    /// The launcher pod that ran right before a migration started.
    SourcePod,

    /// The launcher pod a migration moved to.
    TargetPod,

    /// The virt-handler on the migration source node.
    SourceHandler,

    /// The virt-handler on the migration target node.
    TargetHandler,

    /// The virt-handler on the launcher's node.
    Handler,

    /// The migration carries no start timestamp.
    MigrationStart,
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LogsViewerError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> LogsViewerError {
        LogsViewerError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Whether the error means the store holds too little data to answer a query.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LogsViewerError::EntityNotFound { .. } | LogsViewerError::CorrelationIncomplete(_)
        )
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `LogsViewerResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> LogsViewerResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}

impl Display for MissingLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissingLink::Vmi => "virtual machine instance",
            MissingLink::LauncherPod => "launcher pod",
            MissingLink::SourcePod => "source launcher pod",
            MissingLink::TargetPod => "target launcher pod",
            MissingLink::SourceHandler => "source virt-handler",
            MissingLink::TargetHandler => "target virt-handler",
            MissingLink::Handler => "virt-handler",
            MissingLink::MigrationStart => "migration start timestamp",
        };
        write!(f, "{name}")
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let missing = LogsViewerError::EntityNotFound {
            kind: "pod",
            id: "abc".to_string(),
        };
        assert!(missing.is_not_found());

        let incomplete = LogsViewerError::CorrelationIncomplete(MissingLink::SourceHandler);
        assert!(incomplete.is_not_found());
        assert_eq!(
            incomplete.to_string(),
            "not enough data to build a query: source virt-handler not found"
        );

        let other = LogsViewerError::StoreTimeout(1000);
        assert!(!other.is_not_found());
    }
}
