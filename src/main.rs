//! Library registry command line

use clap::Parser;
use futures::TryStreamExt;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use library_registry::{
    auth::Permissions,
    collector::OrphanCollector,
    config::{Args, Command},
    db::{ConfigDao, Federation, MongoDbConnector},
    engine::LocalStorageEngine,
    logging::AuditLogger,
    registry::{ConfigRegistry, ConfigWriter, CredentialsResolver, NamespaceCredentialsHelper},
    RegistryConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("library_registry={},info", log_level).into()),
        )
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let config = args.registry_config();

    info!("======================================");
    info!("  Library Registry");
    info!("======================================");
    info!("Environment: {}", config.env);
    info!("MongoDB: {}", args.mongodb_uri);
    info!(
        "Default namespace: {} ({})",
        config.default_namespace,
        config.database_for(&config.default_namespace)
    );
    info!("======================================");

    let connector = MongoDbConnector::from_uri(&args.mongodb_uri, &config.env, &config.app_name).await?;

    let outcome = run(&connector, &config, args.command).await;
    connector.close().await;
    outcome
}

async fn run(connector: &MongoDbConnector, config: &RegistryConfig, command: Command) -> anyhow::Result<()> {
    let default_dao: Arc<dyn ConfigDao> =
        Arc::new(connector.config_dao(&config.default_namespace, config));

    match command {
        Command::Resolve {
            lib_name,
            credentials_namespaces,
            read_only,
        } => {
            let registry = ConfigRegistry::new(default_dao);
            let helper = if credentials_namespaces.is_empty() {
                None
            } else {
                let permissions = if read_only {
                    Permissions::read_only()
                } else {
                    Permissions::read_write()
                };
                let federation = Federation::connect(connector, config, &credentials_namespaces)?;
                Some(NamespaceCredentialsHelper::new(federation, permissions))
            };

            let (resolved, open_mode) = registry
                .resolve(&lib_name, helper.as_ref().map(|h| h as &dyn CredentialsResolver))
                .await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "config": resolved,
                    "open_mode": open_mode,
                }))?
            );
        }

        Command::ListLibraries { regex } => {
            let mut names = default_dao.list_libraries(regex.as_deref()).await?;
            while let Some(name) = names.try_next().await? {
                println!("{}", name);
            }
        }

        Command::ListStorages => {
            let mut ids = default_dao.list_storages().await?;
            while let Some(id) = ids.try_next().await? {
                println!("{}", id);
            }
        }

        Command::DeleteLibrary { lib_name } => {
            ConfigWriter::new(default_dao).delete_library(&lib_name).await?;
            info!(library = %lib_name, "Library deleted; unreferenced storages are left for collect-orphans");
        }

        Command::CollectOrphans(collector_args) => {
            let federation = Federation::connect(connector, config, &collector_args.namespaces)?;
            let mut collector = OrphanCollector::new(
                federation,
                Arc::new(LocalStorageEngine::new()),
                collector_args.collector_config(),
            );

            if let Some(path) = collector_args.audit_log.clone() {
                let audit = AuditLogger::new();
                audit.init_file(path).await?;
                collector = collector.with_audit(audit);
            }

            let run = collector.run().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "summary": run.summary(),
                    "untracked": run.untracked,
                    "reports": run.reports,
                }))?
            );
        }
    }

    Ok(())
}
