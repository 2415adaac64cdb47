// # linode-ipctl - Linode networking IP driver
//
// This binary is a THIN integration layer:
// - All reconciliation logic lives in linode-ip-core
// - All HTTP lives in linode-ip-client
// - Configuration is via environment variables (see env.rs); only the
//   subcommand and its arguments come from the command line
//
// The binary is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the client, state store and reconciler together
// 4. Running one subcommand, with Ctrl-C cancelling in-flight API calls
//
// ## Example
//
// ```bash
// export LINODE_TOKEN=your_token
// export LINODE_IP_STATE_PATH=/var/lib/linode-ip/state.json
//
// echo '{"reserved": true, "region": "us-east"}' > web.json
// linode-ipctl apply web --config web.json
// linode-ipctl refresh web
// linode-ipctl destroy web
// ```

mod commands;
mod env;

use anyhow::Result;
use clap::Parser;
use linode_ip_client::LinodeClient;
use linode_ip_core::{
    Diagnostic, Error, FileStateStore, LinodeApi, MemoryStateStore, NetworkingIpDataSource,
    NetworkingIpReconciler, OperationContext, ReconcileEvent, StateStore, StateStoreConfig,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::commands::{Cli, Command, Runner};
use crate::env::Config;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Success
/// - 1: Configuration error (environment or resource configuration)
/// - 2: Runtime error (API, state store, interruption)
#[derive(Debug, Clone, Copy)]
enum IpctlExitCode {
    /// Command completed
    Success = 0,
    /// Configuration error
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<IpctlExitCode> for ExitCode {
    fn from(code: IpctlExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = Config::from_env();
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return IpctlExitCode::ConfigError.into();
    }

    // Initialize tracing; stdout is reserved for command output
    let log_level = match config.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return IpctlExitCode::ConfigError.into();
        }
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return IpctlExitCode::ConfigError.into();
    }

    debug!(?config, "configuration loaded");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return IpctlExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(run(cli.command, config));

    match result {
        Ok(()) => IpctlExitCode::Success.into(),
        Err(e) => report(&e).into(),
    }
}

/// Log a failed command and pick its exit code
fn report(err: &anyhow::Error) -> IpctlExitCode {
    match err.downcast_ref::<Error>() {
        Some(core) => {
            commands::log_diagnostic(&Diagnostic::from(core));
            match core {
                Error::Config(_) => IpctlExitCode::ConfigError,
                _ => IpctlExitCode::RuntimeError,
            }
        }
        None => {
            error!("{:#}", err);
            IpctlExitCode::RuntimeError
        }
    }
}

/// Run one subcommand
async fn run(command: Command, config: Config) -> Result<()> {
    let core = config.to_core();

    let api: Arc<dyn LinodeApi> = Arc::new(LinodeClient::new(&core.provider)?);
    debug!(api = api.api_name(), "API client ready");

    let store = open_state_store(&core.state_store).await?;

    let (reconciler, events) = NetworkingIpReconciler::new(Arc::clone(&api), core.reconciler);
    let data_source = NetworkingIpDataSource::new(api);
    let event_log = tokio::spawn(log_events(events));

    let (cancel_tx, ctx) = OperationContext::cancellable();
    let ctx = match config.timeout()? {
        Some(timeout) => ctx.with_timeout(timeout),
        None => ctx,
    };

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling in-flight requests");
            let _ = cancel_tx.send(true);
        }
    });

    let runner = Runner {
        reconciler: &reconciler,
        data_source: &data_source,
        store: store.as_ref(),
        ctx: &ctx,
    };
    let result = runner.execute(command).await;

    interrupt.abort();
    let flushed = store.flush().await;

    // closing the channel ends the event log
    drop(reconciler);
    if let Err(e) = event_log.await {
        warn!("Event log task failed: {}", e);
    }

    finish(result, flushed)
}

/// Combine the command result with the final state flush
///
/// A command error wins over a flush error; the flush error is logged.
fn finish(result: Result<()>, flushed: linode_ip_core::Result<()>) -> Result<()> {
    match flushed {
        Ok(()) => result,
        Err(e) if result.is_err() => {
            error!("Failed to flush state store: {}", e);
            result
        }
        Err(e) => Err(e.into()),
    }
}

async fn open_state_store(config: &StateStoreConfig) -> Result<Box<dyn StateStore>> {
    match config {
        StateStoreConfig::File { path } => {
            let store = FileStateStore::new(path).await?;
            info!("Using state file {}", store.path().display());
            Ok(Box::new(store))
        }
        StateStoreConfig::Memory => {
            warn!("Using in-memory state store; state will not persist");
            Ok(Box::new(MemoryStateStore::new()))
        }
    }
}

/// Log reconcile events until the reconciler is dropped
async fn log_events(events: mpsc::Receiver<ReconcileEvent>) {
    let mut events = ReceiverStream::new(events);
    while let Some(event) = events.next().await {
        match event {
            ReconcileEvent::Created { address, kind } => {
                info!(%address, %kind, "created")
            }
            ReconcileEvent::Refreshed { address } => debug!(%address, "refreshed"),
            ReconcileEvent::Removed { address } => info!(%address, "removed remotely"),
            ReconcileEvent::Updated { address } => info!(%address, "updated"),
            ReconcileEvent::Deleted { address } => info!(%address, "deleted"),
            ReconcileEvent::DriftDetected {
                address,
                expected_linode_id,
                actual_linode_id,
            } => warn!(
                %address,
                expected_linode_id,
                actual_linode_id = ?actual_linode_id,
                "assignment drift"
            ),
            ReconcileEvent::OperationFailed { operation, error } => {
                debug!(operation, %error, "operation failed")
            }
        }
    }
}
