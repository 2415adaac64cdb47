// Subcommands of linode-ipctl
//
// Each command is a thin sequence of library calls: load state, run one or
// two reconciler operations, persist the result. No reconciliation logic
// lives here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linode_ip_core::{
    Diagnostic, Error, IpQuery, IpResourceConfig, IpResourceState, NetworkingIpDataSource,
    NetworkingIpReconciler, OperationContext, ReadOutcome, StateStore,
};
use serde::Serialize;
use tracing::{info, warn};

/// Manage Linode networking IP addresses declaratively
#[derive(Debug, Parser)]
#[command(name = "linode-ipctl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create or update a resource from a JSON configuration file
    Apply {
        /// Resource name in the state file
        name: String,
        /// Path to the resource configuration (JSON)
        #[arg(long, short)]
        config: PathBuf,
    },
    /// Refresh a resource's state from the API
    Refresh {
        /// Resource name in the state file
        name: String,
    },
    /// Delete a resource and forget it
    Destroy {
        /// Resource name in the state file
        name: String,
    },
    /// Print the stored state of a resource
    Show {
        /// Resource name in the state file
        name: String,
    },
    /// Look up one address, or list addresses (optionally by region)
    Lookup {
        /// Address to fetch
        #[arg(long, conflicts_with = "region")]
        address: Option<String>,
        /// Region to list
        #[arg(long)]
        region: Option<String>,
    },
}

/// What a command runs against
pub struct Runner<'a> {
    pub reconciler: &'a NetworkingIpReconciler,
    pub data_source: &'a NetworkingIpDataSource,
    pub store: &'a dyn StateStore,
    pub ctx: &'a OperationContext,
}

impl Runner<'_> {
    pub async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::Apply { name, config } => self.apply(&name, &config).await,
            Command::Refresh { name } => self.refresh(&name).await,
            Command::Destroy { name } => self.destroy(&name).await,
            Command::Show { name } => self.show(&name).await,
            Command::Lookup { address, region } => {
                let query = IpQuery { address, region };
                let result = self.data_source.read(self.ctx, &query).await?;
                print_json(&result)
            }
        }
    }

    async fn apply(&self, name: &str, path: &Path) -> Result<()> {
        let desired = read_config(path).await?;
        let state = self.reconcile(name, &desired).await?;
        print_json(&state)
    }

    /// Converge the stored resource `name` on `desired` and persist the result
    async fn reconcile(&self, name: &str, desired: &IpResourceConfig) -> Result<IpResourceState> {
        let state = match self.store.get(name).await? {
            None => {
                let created = self.reconciler.create(self.ctx, desired).await;
                self.persist_partial(name, created).await?
            }
            Some(prior) => {
                let reasons = desired.replacement_reasons(&prior);
                if reasons.is_empty() {
                    let plan = desired.plan(&prior);
                    let updated = self.reconciler.update(self.ctx, &plan, &prior).await;
                    self.persist_partial(name, updated).await?
                } else {
                    info!(
                        name,
                        address = %prior.address,
                        reasons = ?reasons,
                        "configuration change requires replacement"
                    );
                    self.reconciler.delete(self.ctx, &prior).await?;
                    self.store.remove(name).await?;
                    let created = self.reconciler.create(self.ctx, desired).await;
                    self.persist_partial(name, created).await?
                }
            }
        };

        self.store.put(name, &state).await?;
        Ok(state)
    }

    /// Pass `result` through, storing the state of a partially applied change first
    async fn persist_partial(
        &self,
        name: &str,
        result: linode_ip_core::Result<IpResourceState>,
    ) -> Result<IpResourceState> {
        match result {
            Err(Error::PartialFailure {
                state,
                step,
                source,
            }) => {
                self.store.put(name, &state).await?;
                warn!(name, address = %state.address, step = %step, "stored partially applied resource");
                Err(Error::PartialFailure {
                    state,
                    step,
                    source,
                }
                .into())
            }
            other => Ok(other?),
        }
    }

    async fn refresh(&self, name: &str) -> Result<()> {
        let state = self.stored(name).await?;

        match self.reconciler.read(self.ctx, &state).await? {
            ReadOutcome::Present { state, diagnostics } => {
                diagnostics.iter().for_each(log_diagnostic);
                self.store.put(name, &state).await?;
                print_json(&state)
            }
            ReadOutcome::Removed => {
                self.store.remove(name).await?;
                info!(name, address = %state.address, "resource no longer exists, removed from state");
                Ok(())
            }
        }
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        let Some(state) = self.store.get(name).await? else {
            info!(name, "no state stored, nothing to destroy");
            return Ok(());
        };

        self.reconciler.delete(self.ctx, &state).await?;
        self.store.remove(name).await?;
        Ok(())
    }

    async fn show(&self, name: &str) -> Result<()> {
        let state = self.stored(name).await?;
        print_json(&state)
    }

    async fn stored(&self, name: &str) -> Result<IpResourceState> {
        self.store
            .get(name)
            .await?
            .with_context(|| format!("no state stored for '{}'", name))
    }
}

async fn read_config(path: &Path) -> Result<IpResourceConfig> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

pub fn log_diagnostic(diagnostic: &Diagnostic) {
    let detail = diagnostic.detail.as_deref().unwrap_or_default();
    match diagnostic.attribute.as_deref() {
        Some(attribute) if diagnostic.is_error() => {
            tracing::error!(attribute, "{}: {}", diagnostic.summary, detail)
        }
        Some(attribute) => warn!(attribute, "{}: {}", diagnostic.summary, detail),
        None if diagnostic.is_error() => tracing::error!("{}: {}", diagnostic.summary, detail),
        None => warn!("{}: {}", diagnostic.summary, detail),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
