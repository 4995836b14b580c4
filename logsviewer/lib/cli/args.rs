use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    config::DEFAULT_PER_PAGE,
    management::{ListFilter, StatusBucket},
    LogsViewerResult,
};

use super::styles;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// `logsviewer` imports must-gather archives and answers which pods, nodes and volumes were
/// involved in a workload event
#[derive(Debug, Parser)]
#[command(name = "logsviewer", author, about, version, styles = styles::styles())]
pub struct LogsViewerArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<LogsViewerSubcommand>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Home directory, overriding the configuration
    #[arg(long, global = true, value_name = "PATH")]
    pub home: Option<PathBuf>,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum LogsViewerSubcommand {
    /// Import a must-gather archive (.tar.gz)
    #[command(name = "import")]
    Import {
        /// Path to the archive
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },

    /// Correlate a workload event
    #[command(name = "query")]
    Query {
        /// What to correlate
        #[command(subcommand)]
        query: QuerySubcommand,
    },

    /// List stored records of one kind
    #[command(name = "list")]
    List {
        /// The kind: pod, node, vm, vmi, migration, pvc or subscription
        #[arg(value_name = "KIND")]
        kind: String,

        /// Filters and pagination
        #[command(flatten)]
        filter: ListArgs,
    },

    /// Print a stored object as it was imported
    #[command(name = "get")]
    Get {
        /// The kind: pod, node, vm, vmi, migration, pvc or subscription
        #[arg(value_name = "KIND")]
        kind: String,

        /// The UUID, or the name for nodes
        #[arg(value_name = "ID")]
        id: String,

        /// Print YAML instead of JSON
        #[arg(long)]
        yaml: bool,
    },

    /// List the PVCs of a pod or a VMI
    #[command(name = "pvcs")]
    Pvcs {
        /// The kind: pod or vmi
        #[arg(value_name = "KIND")]
        kind: String,

        /// The UUID
        #[arg(value_name = "UUID")]
        uuid: String,
    },

    /// Count the stored records of every kind
    #[command(name = "stats")]
    Stats,

    /// List the imported archives
    #[command(name = "imports")]
    Imports,
}

/// Correlation queries
#[derive(Debug, Subcommand)]
pub enum QuerySubcommand {
    /// A single pod
    #[command(name = "pod")]
    Pod {
        /// The pod UUID
        #[arg(value_name = "UUID")]
        uuid: String,
    },

    /// A VMI on one node
    #[command(name = "vmi")]
    Vmi {
        /// The VMI UUID
        #[arg(value_name = "UUID")]
        uuid: String,

        /// The node the VMI ran on
        #[arg(short, long)]
        node: String,
    },

    /// A live migration
    #[command(name = "migration")]
    Migration {
        /// The migration UUID
        #[arg(value_name = "UUID")]
        uuid: String,
    },

    /// Everything a VMI ever ran on
    #[command(name = "history")]
    History {
        /// The VMI UUID
        #[arg(value_name = "UUID")]
        uuid: String,
    },
}

/// Listing filters
#[derive(Debug, Clone, Default, Args)]
pub struct ListArgs {
    /// Match this UUID (name for nodes)
    #[arg(long)]
    pub uuid: Option<String>,

    /// Match this name
    #[arg(long)]
    pub name: Option<String>,

    /// Match these namespaces
    #[arg(short, long = "namespace", value_name = "NAMESPACE")]
    pub namespaces: Vec<String>,

    /// Match a status bucket: running, pending, failed, succeeded, bound, ready, notready or
    /// unknown
    #[arg(short, long)]
    pub status: Option<String>,

    /// The 1-based page
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Rows per page
    #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
    pub per_page: u32,

    /// Return every row on one page
    #[arg(long)]
    pub all: bool,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl ListArgs {
    /// Builds the store filter.
    pub fn to_filter(&self) -> LogsViewerResult<ListFilter> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<StatusBucket>)
            .transpose()?;

        Ok(ListFilter {
            uuid: self.uuid.clone(),
            name: self.name.clone(),
            namespace: None,
            uuids: Vec::new(),
            names: Vec::new(),
            namespaces: self.namespaces.clone(),
            status,
            page: self.page,
            per_page: (!self.all).then_some(self.per_page),
        })
    }
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------
