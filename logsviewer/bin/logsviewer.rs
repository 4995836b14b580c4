use clap::{CommandFactory, Parser};
use logsviewer::{
    cli::{LogsViewerArgs, LogsViewerSubcommand, QuerySubcommand},
    config::LogsViewerConfig,
    ingest::Ingester,
    management,
    models::RecordKind,
    resolver::Resolver,
    store::ObjectStore,
    utils, LogsViewerError, LogsViewerResult,
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> LogsViewerResult<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = LogsViewerArgs::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let Some(subcommand) = args.subcommand else {
        LogsViewerArgs::command().print_help()?;
        return Ok(());
    };

    let config_path = args.config.or_else(utils::get_config_path_from_env);
    let mut config = LogsViewerConfig::load_or_default(config_path.as_deref()).await?;
    if let Some(home) = args.home {
        config = config.with_home_dir(home);
    }
    tracing::debug!(?config, "Loaded configuration");

    let store = ObjectStore::new(config.db_path(), config.store_options());

    match subcommand {
        LogsViewerSubcommand::Import { archive } => {
            import(&config, store, &archive).await?;
        }
        LogsViewerSubcommand::Query { query } => {
            let resolver = Resolver::new(store.pool().await?);
            let results = match query {
                QuerySubcommand::Pod { uuid } => resolver.resolve_by_pod(&uuid).await?,
                QuerySubcommand::Vmi { uuid, node } => resolver.resolve_by_vmi(&uuid, &node).await?,
                QuerySubcommand::Migration { uuid } => resolver.resolve_by_migration(&uuid).await?,
                QuerySubcommand::History { uuid } => resolver.resolve_full_history(&uuid).await?,
            };
            print_json(&results)?;
        }
        LogsViewerSubcommand::List { kind, filter } => {
            let pool = store.pool().await?;
            let filter = filter.to_filter()?;
            match kind.parse::<RecordKind>()? {
                RecordKind::Pod => print_json(&management::list_pods(&pool, &filter).await?)?,
                RecordKind::Node => print_json(&management::list_nodes(&pool, &filter).await?)?,
                RecordKind::Vm => print_json(&management::list_vms(&pool, &filter).await?)?,
                RecordKind::Vmi => print_json(&management::list_vmis(&pool, &filter).await?)?,
                RecordKind::Migration => {
                    print_json(&management::list_migrations(&pool, &filter).await?)?
                }
                RecordKind::Pvc => print_json(&management::list_pvcs(&pool, &filter).await?)?,
                RecordKind::Subscription => {
                    print_json(&management::list_subscriptions(&pool, &filter).await?)?
                }
                RecordKind::ImportedMustGather => {
                    print_json(&management::list_imports(&pool).await?)?
                }
            }
        }
        LogsViewerSubcommand::Get { kind, id, yaml } => {
            let pool = store.pool().await?;
            let kind = kind.parse::<RecordKind>()?;
            if yaml {
                print!("{}", management::object_yaml(&pool, kind, &id).await?);
            } else {
                print_json(&management::object_content(&pool, kind, &id).await?)?;
            }
        }
        LogsViewerSubcommand::Pvcs { kind, uuid } => {
            let pool = store.pool().await?;
            let pvcs = match kind.parse::<RecordKind>()? {
                RecordKind::Pod => management::pod_pvcs(&pool, &uuid).await?,
                RecordKind::Vmi => management::vmi_pvcs(&pool, &uuid).await?,
                other => {
                    return Err(LogsViewerError::InvalidArgument(format!(
                        "pvcs are listed for pods and vmis, not {other}"
                    )))
                }
            };
            print_json(&pvcs)?;
        }
        LogsViewerSubcommand::Stats => {
            let pool = store.pool().await?;
            print_json(&management::resource_stats(&pool).await?)?;
        }
        LogsViewerSubcommand::Imports => {
            let pool = store.pool().await?;
            print_json(&management::list_imports(&pool).await?)?;
        }
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: *
//--------------------------------------------------------------------------------------------------

async fn import(
    config: &LogsViewerConfig,
    store: ObjectStore,
    archive: &std::path::Path,
) -> LogsViewerResult<()> {
    let (stop_tx, stop_rx) = watch::channel(false);
    let runner = {
        let store = store.clone();
        let workers = *config.get_workers();
        tokio::spawn(async move { store.run(workers, stop_rx).await })
    };

    let ingester = Ingester::new(store, config.staging_dir(), config.enrichment_file());
    let result = ingester.import(archive).await;

    // Stop the workers whether or not the import went through
    let _ = stop_tx.send(true);
    runner.await??;

    let report = result?;
    print_json(&json!({
        "archive": archive.display().to_string(),
        "gatherTime": report.gather_time,
        "imported": report.imported,
        "perKind": report.per_kind,
        "renamedFiles": report.extraction.renamed,
        "errors": report.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
    }))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> LogsViewerResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
