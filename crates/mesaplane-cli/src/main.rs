// crates/mesaplane-cli/src/main.rs
// ============================================================================
// Module: Mesaplane CLI Entry Point
// Description: Command dispatcher for serving the control plane and for
//              offline config/store administration.
// Purpose: Bootstrap & Supervisor: wire every collaborator together, serve
//          the Request Layer, and run the background loops until shutdown.
// Dependencies: clap, mesaplane-config, mesaplane-core, mesaplane-engine,
//               mesaplane-executors, mesaplane-plugins, mesaplane-server,
//               mesaplane-store-sqlite, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! `serve` is the only long-running command: it loads [`MesaplaneConfig`],
//! builds every collaborator (store, object store, catalog, executor,
//! plugin registry), assembles [`AppState`], and serves
//! [`mesaplane_server::build_router`] alongside the Run Engine poll loop and
//! rate-limiter sweeper, both of which run on every instance. The Scheduler,
//! Trigger tick, and Reaper are leader-only: a supervisor task blocks on the
//! store's advisory lock (with backoff) before starting them, so exactly one
//! replica runs the background daemons, with automatic failover if that
//! replica releases the lock or exits. Every loop is stopped together on
//! Ctrl-C through its own `oneshot` signal. `config validate` and `store
//! migrate`/`store prune` are one-shot administration commands that reuse
//! the same config/store construction without starting the server.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use mesaplane_config::MesaplaneConfig;
use mesaplane_core::CatalogClient;
use mesaplane_core::MetadataStore;
use mesaplane_core::ObjectStore;
use mesaplane_core::TriggerEvent;
use mesaplane_engine::Reaper;
use mesaplane_engine::ReaperConfig;
use mesaplane_engine::RunEngine;
use mesaplane_engine::Scheduler;
use mesaplane_engine::TriggerEvaluator;
use mesaplane_executors::EndpointPolicy;
use mesaplane_executors::HttpCatalogClient;
use mesaplane_executors::HttpObjectStore;
use mesaplane_executors::NullExecutorPlugin;
use mesaplane_executors::PluginExecutor;
use mesaplane_executors::WarmExecutor;
use mesaplane_executors::WarmExecutorConfig;
use mesaplane_plugins::PluginBindingConfig;
use mesaplane_plugins::PluginRegistry;
use mesaplane_server::AppState;
use mesaplane_server::RateLimiter;
use mesaplane_server::RateLimiterConfig;
use mesaplane_server::ServerConfig;
use mesaplane_server::build_router;
use mesaplane_store_sqlite::SqliteMetadataStore;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use url::Url;
use uuid::Uuid;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Cadence of the background loop that checks `cron`/`cron_dependency`
/// triggers; finer than cron's own minute granularity is unnecessary.
const TRIGGER_TICK_INTERVAL: Duration = Duration::from_secs(60);
/// Read-connection pool size for the metadata store.
const STORE_READ_POOL_SIZE: usize = 4;
/// Per-call timeout applied to the warm executor and collaborator HTTP clients.
const COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(30);
/// Hard cap on JSON request bodies, in bytes.
const MAX_JSON_BODY_BYTES: usize = 1_048_576;
/// Hard cap on multipart upload bodies, in bytes.
const MAX_UPLOAD_BODY_BYTES: usize = 256 * 1_048_576;
/// Advisory-lock name guarding the Scheduler/Trigger-tick/Reaper daemons.
const LEADER_LOCK_NAME: &str = "leader";
/// Initial backoff between failed leader-lock acquisition attempts.
const LEADER_RETRY_INITIAL: Duration = Duration::from_millis(200);
/// Backoff ceiling once leader-lock acquisition keeps failing.
const LEADER_RETRY_MAX: Duration = Duration::from_secs(10);

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "mesaplane", disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the control-plane server and its background loops.
    Serve(ConfigPathArg),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Metadata store administration utilities.
    Store {
        /// Selected store subcommand.
        #[command(subcommand)]
        command: StoreCommand,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a configuration file without starting the server.
    Validate(ConfigPathArg),
}

/// Store subcommands.
#[derive(Subcommand, Debug)]
enum StoreCommand {
    /// Open the store, applying its schema, and report success.
    Migrate(ConfigPathArg),
    /// Run one retention sweep and exit.
    Prune(ConfigPathArg),
}

/// Shared `--config` argument for commands that load [`MesaplaneConfig`].
#[derive(Args, Debug)]
struct ConfigPathArg {
    /// Path to a TOML configuration file; built-in defaults apply when omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_target(true).init();
    match run().await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => command_serve(args).await,
        Commands::Config { command: ConfigCommand::Validate(args) } => command_config_validate(args),
        Commands::Store { command: StoreCommand::Migrate(args) } => command_store_migrate(args),
        Commands::Store { command: StoreCommand::Prune(args) } => command_store_prune(args).await,
    }
}

// ============================================================================
// SECTION: Config Loading
// ============================================================================

fn load_config(args: &ConfigPathArg) -> CliResult<MesaplaneConfig> {
    MesaplaneConfig::load(args.config.as_deref()).map_err(|err| CliError::new(format!("loading config: {err}")))
}

fn parse_endpoint(raw: &str, what: &str) -> CliResult<Url> {
    if raw.is_empty() {
        return Err(CliError::new(format!("{what} is not configured")));
    }
    Url::parse(raw).map_err(|err| CliError::new(format!("{what} is not a valid URL: {err}")))
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

fn command_config_validate(args: ConfigPathArg) -> CliResult<ExitCode> {
    let config = load_config(&args)?;
    tracing::info!(listen_addr = %config.listen_addr, "configuration is valid");
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Store Commands
// ============================================================================

fn open_store(config: &MesaplaneConfig) -> CliResult<Arc<SqliteMetadataStore>> {
    let path = PathBuf::from(&config.database_url);
    let store = SqliteMetadataStore::open(&path, STORE_READ_POOL_SIZE)
        .map_err(|err| CliError::new(format!("opening store: {err}")))?;
    Ok(Arc::new(store))
}

fn command_store_migrate(args: ConfigPathArg) -> CliResult<ExitCode> {
    let config = load_config(&args)?;
    let _store = open_store(&config)?;
    tracing::info!(database_url = %config.database_url, "schema applied");
    Ok(ExitCode::SUCCESS)
}

async fn command_store_prune(args: ConfigPathArg) -> CliResult<ExitCode> {
    let config = load_config(&args)?;
    let store = open_store(&config)?;
    let object_store = build_object_store(&config)?;
    let catalog = build_catalog_client(&config)?;
    let reaper = Reaper::new(store, object_store, catalog, reaper_config(&config));
    reaper.tick().await;
    tracing::info!("retention sweep complete");
    Ok(ExitCode::SUCCESS)
}

fn reaper_config(config: &MesaplaneConfig) -> ReaperConfig {
    ReaperConfig {
        max_runs_per_pipeline: config.retention.max_runs_per_pipeline,
        max_age_days: config.retention.max_age_days,
        log_retention_days: config.retention.log_retention_days,
        stuck_timeout_minutes: config.retention.stuck_timeout_minutes,
        interval_minutes: config.retention.reaper_interval_minutes,
    }
}

// ============================================================================
// SECTION: Collaborator Construction
// ============================================================================

fn build_object_store(config: &MesaplaneConfig) -> CliResult<Arc<dyn ObjectStore>> {
    let base_url = parse_endpoint(&config.object_store.endpoint, "object_store.endpoint")?;
    let store = HttpObjectStore::new(
        base_url,
        EndpointPolicy::default(),
        config.object_store.access_key_id.clone(),
        config.object_store.secret_access_key.clone(),
    )
    .map_err(|err| CliError::new(format!("building object store client: {err}")))?;
    Ok(Arc::new(store))
}

fn build_catalog_client(config: &MesaplaneConfig) -> CliResult<Arc<dyn CatalogClient>> {
    let base_url = parse_endpoint(&config.catalog.url, "catalog.url")?;
    let client = HttpCatalogClient::new(base_url, EndpointPolicy::default())
        .map_err(|err| CliError::new(format!("building catalog client: {err}")))?;
    Ok(Arc::new(client))
}

async fn build_executor(config: &MesaplaneConfig) -> CliResult<PluginExecutor> {
    let warm_base_url = parse_endpoint(&config.worker.address, "worker.address")?;
    let warm = WarmExecutor::new(WarmExecutorConfig {
        base_url: warm_base_url,
        timeout: COLLABORATOR_TIMEOUT,
        policy: EndpointPolicy::default(),
    })
    .map_err(|err| CliError::new(format!("building warm executor: {err}")))?;

    let mut bindings = Vec::with_capacity(config.plugins.len());
    for (slot, plugin) in &config.plugins {
        let address = parse_endpoint(&plugin.address, &format!("plugins.{slot}.address"))?;
        bindings.push(PluginBindingConfig { slot: slot.clone(), address });
    }
    let (registry, outcomes) = PluginRegistry::load(bindings).await;
    for outcome in &outcomes {
        tracing::info!(outcome = ?outcome, "plugin binding result");
    }

    let executor_plugin = registry.executor().unwrap_or_else(|| Arc::new(NullExecutorPlugin));
    Ok(PluginExecutor::new(executor_plugin, warm))
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

async fn command_serve(args: ConfigPathArg) -> CliResult<ExitCode> {
    let config = load_config(&args)?;

    let store: Arc<dyn MetadataStore> = open_store(&config)?;
    let object_store = build_object_store(&config)?;
    let catalog = build_catalog_client(&config)?;
    let executor = Arc::new(build_executor(&config).await?);

    let (completions_tx, completions_rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = Arc::new(RunEngine::new(Arc::clone(&store), Arc::clone(&executor), completions_tx));
    engine.recover_active().await.map_err(|err| CliError::new(format!("recovering active runs: {err}")))?;

    let scheduler = Arc::new(Scheduler::new(Arc::clone(&store), Arc::clone(&engine)));
    let trigger_evaluator = Arc::new(TriggerEvaluator::new(Arc::clone(&store), Arc::clone(&engine)));
    let reaper = Arc::new(Reaper::new(
        Arc::clone(&store),
        Arc::clone(&object_store),
        Arc::clone(&catalog),
        reaper_config(&config),
    ));

    let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
        max_requests: config.rate_limit.capacity,
        ..RateLimiterConfig::default()
    }));

    let completion_store = Arc::clone(&store);
    let holder_id = Uuid::new_v4().to_string();

    let state = AppState::new(
        store,
        object_store,
        catalog,
        Arc::clone(&engine),
        Arc::clone(&executor),
        Arc::clone(&trigger_evaluator),
        Arc::clone(&rate_limiter),
        MAX_JSON_BODY_BYTES,
        MAX_UPLOAD_BODY_BYTES,
    );
    let router = build_router(state, ServerConfig::default());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|err| CliError::new(format!("binding {}: {err}", config.listen_addr)))?;
    tracing::info!(listen_addr = %config.listen_addr, "mesaplane listening");

    let (engine_stop_tx, engine_stop_rx) = oneshot::channel();
    let (sweeper_stop_tx, sweeper_stop_rx) = oneshot::channel();
    let (leader_stop_tx, leader_stop_rx) = oneshot::channel();

    let engine_handle = engine.spawn_poll_loop(engine_stop_rx);
    let sweeper_handle = rate_limiter.spawn_sweeper(sweeper_stop_rx);
    let leader_handle = spawn_leader_supervisor(
        Arc::clone(&completion_store),
        scheduler,
        Arc::clone(&trigger_evaluator),
        reaper,
        holder_id,
        leader_stop_rx,
    );
    let completions_handle =
        spawn_completion_relay(completions_rx, Arc::clone(&completion_store), Arc::clone(&trigger_evaluator));

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| CliError::new(format!("server error: {err}")))?;

    tracing::info!("shutting down background loops");
    let _ = engine_stop_tx.send(());
    let _ = sweeper_stop_tx.send(());
    let _ = leader_stop_tx.send(());
    completions_handle.abort();
    let _ = engine_handle.await;
    let _ = sweeper_handle.await;
    let _ = leader_handle.await;

    Ok(ExitCode::SUCCESS)
}

/// Acquires the named advisory lock, retrying with capped exponential
/// backoff until it succeeds or `stop` fires (e.g. shutdown before this
/// replica ever becomes leader). Returns `false` in the latter case.
async fn acquire_leader_lock(store: &Arc<dyn MetadataStore>, holder: &str, stop: &mut oneshot::Receiver<()>) -> bool {
    let mut delay = LEADER_RETRY_INITIAL;
    loop {
        match store.try_acquire_advisory_lock(LEADER_LOCK_NAME, holder).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(err) => tracing::warn!(error = %err, "leader lock acquisition attempt failed"),
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => {
                delay = (delay * 2).min(LEADER_RETRY_MAX);
            }
            _ = &mut *stop => return false,
        }
    }
}

/// Blocks (with backoff, cancellable on shutdown) until this replica holds
/// the leader lock, then starts the Scheduler, Trigger-tick, and Reaper
/// daemons for as long as leadership is held; releases the lock on stop.
fn spawn_leader_supervisor<E>(
    store: Arc<dyn MetadataStore>,
    scheduler: Arc<Scheduler<E>>,
    trigger_evaluator: Arc<TriggerEvaluator<E>>,
    reaper: Arc<Reaper>,
    holder: String,
    mut stop: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()>
where
    E: mesaplane_core::Executor + 'static,
{
    tokio::spawn(async move {
        if !acquire_leader_lock(&store, &holder, &mut stop).await {
            return;
        }
        tracing::info!(holder = %holder, "acquired leader lock; starting scheduler, trigger tick, and reaper");

        let (scheduler_stop_tx, scheduler_stop_rx) = oneshot::channel();
        let (reaper_stop_tx, reaper_stop_rx) = oneshot::channel();
        let (trigger_stop_tx, trigger_stop_rx) = oneshot::channel();
        let scheduler_handle = scheduler.spawn(scheduler_stop_rx);
        let reaper_handle = reaper.spawn(reaper_stop_rx);
        let trigger_handle = spawn_trigger_tick_loop(trigger_evaluator, trigger_stop_rx);

        let _ = stop.await;
        tracing::info!(holder = %holder, "releasing leadership");
        let _ = scheduler_stop_tx.send(());
        let _ = reaper_stop_tx.send(());
        let _ = trigger_stop_tx.send(());
        let _ = scheduler_handle.await;
        let _ = reaper_handle.await;
        let _ = trigger_handle.await;
        if let Err(err) = store.release_advisory_lock(LEADER_LOCK_NAME, &holder).await {
            tracing::warn!(error = %err, "releasing leader lock failed");
        }
    })
}

/// Waits for Ctrl-C (or, on Unix, SIGTERM), whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            return;
        };
        signal.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Drives `pipeline_success`/`cron_dependency` triggers off each run's
/// terminal status, the only consumer of [`RunEngine`]'s completion channel.
fn spawn_completion_relay<E>(
    mut completions: UnboundedReceiver<mesaplane_core::Run>,
    store: Arc<dyn MetadataStore>,
    trigger_evaluator: Arc<TriggerEvaluator<E>>,
) -> tokio::task::JoinHandle<()>
where
    E: mesaplane_core::Executor + 'static,
{
    tokio::spawn(async move {
        while let Some(run) = completions.recv().await {
            let pipeline = match store.get_pipeline(run.pipeline_id).await {
                Ok(Some(pipeline)) => pipeline,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(error = %err, "looking up completed run's pipeline failed");
                    continue;
                }
            };
            let event = TriggerEvent::RunComplete {
                namespace: pipeline.namespace,
                layer: pipeline.layer,
                pipeline_name: pipeline.name,
                status: run.status,
            };
            if let Err(err) = trigger_evaluator.handle_event(&event).await {
                tracing::warn!(error = %err, "trigger evaluation after run completion failed");
            }
        }
    })
}

/// Periodically fires [`TriggerEvent::Tick`] so `cron`/`cron_dependency`
/// triggers are checked even with no other inbound event.
fn spawn_trigger_tick_loop<E>(
    trigger_evaluator: Arc<TriggerEvaluator<E>>,
    mut stop: oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()>
where
    E: mesaplane_core::Executor + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TRIGGER_TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = trigger_evaluator.handle_event(&TriggerEvent::Tick).await {
                        tracing::warn!(error = %err, "trigger tick evaluation failed");
                    }
                }
                _ = &mut stop => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only output and panic-based assertions are permitted."
    )]

    use super::*;

    #[test]
    fn parse_endpoint_rejects_empty() {
        assert!(parse_endpoint("", "object_store.endpoint").is_err());
    }

    #[test]
    fn parse_endpoint_accepts_https_url() {
        assert!(parse_endpoint("https://objects.internal", "object_store.endpoint").is_ok());
    }

    #[test]
    fn reaper_config_maps_retention_fields() {
        let config = MesaplaneConfig::default();
        let derived = reaper_config(&config);
        assert_eq!(derived.max_runs_per_pipeline, config.retention.max_runs_per_pipeline);
        assert_eq!(derived.interval_minutes, config.retention.reaper_interval_minutes);
    }

    fn temp_store() -> (tempfile::TempDir, Arc<dyn MetadataStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteMetadataStore::open(&dir.path().join("leader-test.sqlite3"), 1).expect("open store");
        (dir, Arc::new(store))
    }

    #[tokio::test]
    async fn acquire_leader_lock_succeeds_immediately_when_uncontested() {
        let (_dir, store) = temp_store();
        let (_stop_tx, mut stop_rx) = oneshot::channel();
        assert!(acquire_leader_lock(&store, "node-a", &mut stop_rx).await);
    }

    #[tokio::test]
    async fn acquire_leader_lock_gives_up_when_stopped_before_lock_frees() {
        let (_dir, store) = temp_store();
        assert!(store.try_acquire_advisory_lock(LEADER_LOCK_NAME, "node-a").await.expect("acquire"));

        let (stop_tx, mut stop_rx) = oneshot::channel();
        stop_tx.send(()).expect("send stop");
        assert!(!acquire_leader_lock(&store, "node-b", &mut stop_rx).await);
    }
}
