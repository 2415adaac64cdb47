//! Reconciler for the `networking_ip` resource
//!
//! The NetworkingIpReconciler is responsible for:
//! - Resolving a desired configuration into one creation mode
//! - Calling the Linode API for create, read, update and delete
//! - Folding API responses back into [`IpResourceState`]
//! - Reporting drift and lifecycle transitions
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ IpResourceConfig │─── creation_request() ───┐
//! └──────────────────┘                          │
//!                                               ▼
//!                                 ┌──────────────────────────┐
//!                                 │ NetworkingIpReconciler   │
//!                                 └──────────────────────────┘
//!                                               │
//!         ┌─────────────────────────────────────┼───────────────────────┐
//!         │                                     │                       │
//!         ▼                                     ▼                       ▼
//! ┌─────────────────┐                 ┌──────────────────┐     ┌─────────────┐
//! │ LinodeApi       │                 │ IpResourceState  │     │   Events    │
//! │ (one call each) │                 │ (fold responses) │     │  (notify)   │
//! └─────────────────┘                 └──────────────────┘     └─────────────┘
//! ```
//!
//! ## Statelessness
//!
//! The reconciler holds no per-resource state. Callers pass the prior state
//! in and persist whatever comes back. Operations on one resource must be
//! sequential; distinct resources may be reconciled concurrently through the
//! same reconciler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ReconcilerConfig;
use crate::context::OperationContext;
use crate::diagnostics::Diagnostic;
use crate::error::{Error, Result};
use crate::model::{CreationRequest, IpResourceConfig, IpResourceState, ResourceKind};
use crate::traits::{AssignIpsOptions, IpAddressRecord, IpAddressUpdateOptions, LinodeApi};

/// Events emitted by the NetworkingIpReconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// A resource was created
    Created {
        address: String,
        kind: ResourceKind,
    },

    /// State was refreshed from the API
    Refreshed {
        address: String,
    },

    /// The resource no longer exists remotely
    Removed {
        address: String,
    },

    /// A resource was updated in place
    Updated {
        address: String,
    },

    /// A resource was deleted (or was already gone)
    Deleted {
        address: String,
    },

    /// An assigned address is bound to a different linode than tracked
    DriftDetected {
        address: String,
        expected_linode_id: u64,
        actual_linode_id: Option<u64>,
    },

    /// A lifecycle operation failed
    OperationFailed {
        operation: &'static str,
        error: String,
    },
}

/// Result of refreshing a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The resource exists; `state` is the refreshed state
    Present {
        state: IpResourceState,
        diagnostics: Vec<Diagnostic>,
    },

    /// The resource is gone and should be dropped from state
    Removed,
}

/// Reconciler for `networking_ip` resources
///
/// ## Lifecycle
///
/// 1. Create with [`NetworkingIpReconciler::new()`]
/// 2. Call [`create`](Self::create), [`read`](Self::read),
///    [`update`](Self::update) or [`delete`](Self::delete) per resource
/// 3. Drain the event receiver for monitoring (optional)
///
/// ## Threading
///
/// The reconciler is `Send + Sync`; the API handle is shared read-only.
///
/// ## No Retries
///
/// Each operation makes at most one attempt per API call. Transient failures
/// are returned to the caller.
pub struct NetworkingIpReconciler {
    /// Linode API facade
    api: Arc<dyn LinodeApi>,

    /// Deadline applied on top of the caller's context
    operation_timeout: Option<Duration>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ReconcileEvent>,
}

impl NetworkingIpReconciler {
    /// Create a new reconciler
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver) where event_receiver yields
    /// reconcile events. Dropping the receiver is fine; events are then
    /// discarded.
    pub fn new(
        api: Arc<dyn LinodeApi>,
        config: ReconcilerConfig,
    ) -> (Self, mpsc::Receiver<ReconcileEvent>) {
        let (tx, rx) = mpsc::channel(config.event_channel_capacity.max(1));

        let reconciler = Self {
            api,
            operation_timeout: config.operation_timeout(),
            event_tx: tx,
        };

        (reconciler, rx)
    }

    /// Create the resource described by `desired`
    ///
    /// Configuration errors are reported before any API call. When the
    /// address is created but setting its reverse DNS fails, the result is
    /// [`Error::PartialFailure`] carrying the created state; nothing is
    /// rolled back.
    pub async fn create(
        &self,
        ctx: &OperationContext,
        desired: &IpResourceConfig,
    ) -> Result<IpResourceState> {
        let result = self.create_inner(&self.scope(ctx), desired).await;
        self.report("create", result)
    }

    async fn create_inner(
        &self,
        ctx: &OperationContext,
        desired: &IpResourceConfig,
    ) -> Result<IpResourceState> {
        let request = desired.creation_request()?;

        let mut state = match &request {
            CreationRequest::Assignment(opts) => {
                debug!(
                    region = %opts.region,
                    count = opts.assignments.len(),
                    "assigning IP addresses"
                );
                ctx.run("assign_ips", self.api.assign_ips(opts))
                    .await
                    .map_err(|e| e.context(format!("assigning IP addresses in {}", opts.region)))?;

                IpResourceState::from_assignment(opts, desired.public.unwrap_or(true))?
            }
            single => {
                let opts = single.allocate_options().ok_or_else(|| {
                    Error::invalid_state("single-address request without an allocation body")
                })?;
                let target = allocation_target(single);
                debug!(
                    kind = %single.kind(),
                    public = opts.public,
                    linode_id = ?opts.linode_id,
                    region = ?opts.region,
                    "allocating IP address"
                );

                let record = ctx
                    .run("allocate_reserve_ip", self.api.allocate_reserve_ip(&opts))
                    .await
                    .map_err(|e| e.context(format!("allocating IP address {}", target)))?;

                IpResourceState::from_record(single.kind(), &record)
            }
        };

        if let Some(rdns) = &desired.rdns {
            debug!(address = %state.address, rdns = %rdns, "setting reverse DNS");
            let opts = IpAddressUpdateOptions {
                rdns: Some(rdns.clone()),
            };
            match ctx
                .run("update_ip_address", self.api.update_ip_address(&state.address, &opts))
                .await
            {
                Ok(record) => state.absorb(&record),
                Err(source) => {
                    let source = source.context(format!("updating IP address {}", state.address));
                    return Err(Error::PartialFailure {
                        state: Box::new(state),
                        step: "set rdns".to_string(),
                        source: Box::new(source),
                    });
                }
            }
        }

        info!(address = %state.address, kind = %state.kind, "created IP address");
        self.emit_event(ReconcileEvent::Created {
            address: state.address.clone(),
            kind: state.kind,
        });

        Ok(state)
    }

    /// Refresh `state` from the API
    ///
    /// A 404 on any tracked address yields [`ReadOutcome::Removed`]. For
    /// assigned resources a linode binding that differs from the tracked one
    /// is reported as a warning and left as is.
    pub async fn read(&self, ctx: &OperationContext, state: &IpResourceState) -> Result<ReadOutcome> {
        let result = self.read_inner(&self.scope(ctx), state).await;
        self.report("read", result)
    }

    async fn read_inner(
        &self,
        ctx: &OperationContext,
        state: &IpResourceState,
    ) -> Result<ReadOutcome> {
        debug!(address = %state.address, kind = %state.kind, "reading IP address");

        let mut diagnostics = Vec::new();

        let identity = match state.kind {
            ResourceKind::Assigned => {
                if state.assignments.is_empty() {
                    return Err(Error::invalid_state(format!(
                        "assigned resource {} tracks no assignments",
                        state.address
                    )));
                }

                let mut identity = None;
                for (index, assignment) in state.assignments.iter().enumerate() {
                    let Some(record) = self.fetch(ctx, &assignment.address).await? else {
                        return Ok(self.removed(&assignment.address));
                    };

                    let actual = record.bound_linode();
                    if actual != Some(assignment.linode_id) {
                        warn!(
                            address = %assignment.address,
                            expected = assignment.linode_id,
                            actual = ?actual,
                            "assigned IP address is bound to a different linode"
                        );
                        diagnostics.push(drift_diagnostic(index, assignment.linode_id, &record));
                        self.emit_event(ReconcileEvent::DriftDetected {
                            address: assignment.address.clone(),
                            expected_linode_id: assignment.linode_id,
                            actual_linode_id: actual,
                        });
                    }

                    if identity.is_none() {
                        identity = Some(record);
                    }
                }
                identity
            }
            ResourceKind::Reserved | ResourceKind::InstanceBound => {
                self.fetch(ctx, &state.address).await?
            }
        };

        let Some(record) = identity else {
            return Ok(self.removed(&state.address));
        };

        let mut next = state.clone();
        next.absorb(&record);

        self.emit_event(ReconcileEvent::Refreshed {
            address: next.address.clone(),
        });

        Ok(ReadOutcome::Present {
            state: next,
            diagnostics,
        })
    }

    /// Apply `plan` to an existing resource in place
    ///
    /// `plan` should come from [`IpResourceConfig::plan`]. Assignments are
    /// re-issued in full when set, reverse DNS is updated when it differs,
    /// and the identity address is always re-fetched at the end. A failure
    /// after the assignments were re-issued is [`Error::PartialFailure`]
    /// carrying the re-tracked state.
    pub async fn update(
        &self,
        ctx: &OperationContext,
        plan: &IpResourceConfig,
        state: &IpResourceState,
    ) -> Result<IpResourceState> {
        let result = self.update_inner(&self.scope(ctx), plan, state).await;
        self.report("update", result)
    }

    async fn update_inner(
        &self,
        ctx: &OperationContext,
        plan: &IpResourceConfig,
        state: &IpResourceState,
    ) -> Result<IpResourceState> {
        let reasons = plan.replacement_reasons(state);
        if !reasons.is_empty() {
            return Err(Error::config(format!(
                "changing {} requires replacing IP address {}",
                reasons.join(", "),
                state.address
            )));
        }

        debug!(address = %state.address, kind = %state.kind, "updating IP address");

        let mut next = state.clone();
        let mut reassigned = false;

        if !plan.assignments.is_empty() {
            let region = plan
                .region
                .clone()
                .or_else(|| state.region.clone())
                .ok_or_else(|| Error::config("region is required when assignments are set"))?;
            let opts = AssignIpsOptions {
                region,
                assignments: plan.assignments.clone(),
            };

            ctx.run("assign_ips", self.api.assign_ips(&opts))
                .await
                .map_err(|e| e.context(format!("assigning IP addresses in {}", opts.region)))?;

            next.retrack(&opts);
            reassigned = true;
        }

        if plan.rdns != state.rdns {
            debug!(address = %next.address, rdns = ?plan.rdns, "updating reverse DNS");
            let opts = IpAddressUpdateOptions {
                rdns: plan.rdns.clone(),
            };
            let result = ctx
                .run("update_ip_address", self.api.update_ip_address(&next.address, &opts))
                .await
                .map_err(|e| e.context(format!("updating IP address {}", next.address)));
            match result {
                Ok(record) => next.absorb(&record),
                Err(e) => return Err(after_reassign(reassigned, next, "set rdns", e)),
            }
        }

        let result = ctx
            .run("get_ip_address", self.api.get_ip_address(&next.address))
            .await
            .map_err(|e| e.context(format!("reading IP address {}", next.address)));
        match result {
            Ok(record) => next.absorb(&record),
            Err(e) => return Err(after_reassign(reassigned, next, "refresh", e)),
        }

        info!(address = %next.address, "updated IP address");
        self.emit_event(ReconcileEvent::Updated {
            address: next.address.clone(),
        });

        Ok(next)
    }

    /// Delete the resource tracked by `state`
    ///
    /// Dispatches on the stored [`ResourceKind`]. A 404 from the API counts
    /// as success. For assigned resources every pair is attempted and the
    /// failures are returned together as [`Error::AggregatedDelete`].
    pub async fn delete(&self, ctx: &OperationContext, state: &IpResourceState) -> Result<()> {
        let result = self.delete_inner(&self.scope(ctx), state).await;
        self.report("delete", result)
    }

    async fn delete_inner(&self, ctx: &OperationContext, state: &IpResourceState) -> Result<()> {
        debug!(address = %state.address, kind = %state.kind, "deleting IP address");

        match state.kind {
            ResourceKind::Assigned => {
                if state.assignments.is_empty() {
                    return Err(Error::invalid_state(format!(
                        "assigned resource {} tracks no assignments",
                        state.address
                    )));
                }

                let mut failures = Vec::new();
                for assignment in &state.assignments {
                    let result = ctx
                        .run(
                            "delete_instance_ip_address",
                            self.api
                                .delete_instance_ip_address(assignment.linode_id, &assignment.address),
                        )
                        .await;

                    match result {
                        Ok(()) => {}
                        Err(e) if e.is_not_found() => {
                            debug!(address = %assignment.address, "already unassigned");
                        }
                        Err(e) if e.is_interrupted() => return Err(e),
                        Err(e) => failures.push(e.context(format!(
                            "unassigning {} from linode {}",
                            assignment.address, assignment.linode_id
                        ))),
                    }
                }

                if !failures.is_empty() {
                    return Err(Error::AggregatedDelete(failures));
                }
            }
            ResourceKind::InstanceBound => {
                let linode_id = state.linode_id.ok_or_else(|| {
                    Error::invalid_state(format!(
                        "instance-bound IP address {} has no linode_id",
                        state.address
                    ))
                })?;

                let result = ctx
                    .run(
                        "delete_instance_ip_address",
                        self.api.delete_instance_ip_address(linode_id, &state.address),
                    )
                    .await;
                absorb_not_found(result).map_err(|e| {
                    e.context(format!(
                        "deleting IP address {} from linode {}",
                        state.address, linode_id
                    ))
                })?;
            }
            ResourceKind::Reserved => {
                let result = ctx
                    .run(
                        "delete_reserved_ip_address",
                        self.api.delete_reserved_ip_address(&state.address),
                    )
                    .await;
                absorb_not_found(result)
                    .map_err(|e| e.context(format!("deleting reserved IP address {}", state.address)))?;
            }
        }

        info!(address = %state.address, "deleted IP address");
        self.emit_event(ReconcileEvent::Deleted {
            address: state.address.clone(),
        });

        Ok(())
    }

    /// Get an address, mapping 404 to `None`
    async fn fetch(&self, ctx: &OperationContext, address: &str) -> Result<Option<IpAddressRecord>> {
        match ctx.run("get_ip_address", self.api.get_ip_address(address)).await {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.context(format!("reading IP address {}", address))),
        }
    }

    fn removed(&self, address: &str) -> ReadOutcome {
        info!(address = %address, "IP address no longer exists, removing from state");
        self.emit_event(ReconcileEvent::Removed {
            address: address.to_string(),
        });
        ReadOutcome::Removed
    }

    /// Narrow the caller's context with the configured operation timeout
    fn scope(&self, ctx: &OperationContext) -> OperationContext {
        let Some(timeout) = self.operation_timeout else {
            return ctx.clone();
        };
        let deadline = Instant::now() + timeout;
        match ctx.deadline() {
            Some(existing) if existing <= deadline => ctx.clone(),
            _ => ctx.clone().with_deadline(deadline),
        }
    }

    fn report<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!(operation, "operation failed: {}", e);
            self.emit_event(ReconcileEvent::OperationFailed {
                operation,
                error: e.to_string(),
            });
        }
        result
    }

    /// Emit a reconcile event
    ///
    /// A full channel drops the event with a warning.
    fn emit_event(&self, event: ReconcileEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    ?event,
                    "Event channel full, dropping event. Consider increasing event_channel_capacity."
                );
            }
        }
    }
}

/// Failure of a step that ran after assignments were re-issued
///
/// The new assignment set already exists remotely, so it travels with the
/// error as [`Error::PartialFailure`].
fn after_reassign(reassigned: bool, state: IpResourceState, step: &str, source: Error) -> Error {
    if !reassigned {
        return source;
    }
    Error::PartialFailure {
        state: Box::new(state),
        step: step.to_string(),
        source: Box::new(source),
    }
}

fn allocation_target(request: &CreationRequest) -> String {
    match request {
        CreationRequest::Reservation {
            region: Some(region),
            ..
        } => format!("in region {}", region),
        CreationRequest::Reservation {
            linode_id: Some(linode_id),
            ..
        }
        | CreationRequest::InstanceBinding { linode_id, .. } => {
            format!("for linode {}", linode_id)
        }
        _ => String::new(),
    }
}

fn drift_diagnostic(index: usize, expected: u64, record: &IpAddressRecord) -> Diagnostic {
    let actual = record
        .bound_linode()
        .map(|id| format!("linode {}", id))
        .unwrap_or_else(|| "no linode".to_string());

    Diagnostic::warning("Assigned IP Address Drifted")
        .with_detail(format!(
            "IP address {} is assigned to {}, but linode {} is tracked. \
             Re-apply the resource to restore the assignment.",
            record.address, actual, expected
        ))
        .with_attribute(format!("assignments[{}].linode_id", index))
}

fn absorb_not_found(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => {
            debug!("IP address already deleted");
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_event_clone() {
        let event = ReconcileEvent::DriftDetected {
            address: "192.0.2.10".to_string(),
            expected_linode_id: 1,
            actual_linode_id: Some(2),
        };
        assert_eq!(event.clone(), event);
    }

    #[test]
    fn allocation_target_names_anchor() {
        let reserve = CreationRequest::Reservation {
            public: true,
            region: Some("us-east".into()),
            linode_id: None,
        };
        assert_eq!(allocation_target(&reserve), "in region us-east");

        let bind = CreationRequest::InstanceBinding {
            public: true,
            linode_id: 123,
        };
        assert_eq!(allocation_target(&bind), "for linode 123");
    }

    #[test]
    fn drift_diagnostic_points_at_assignment() {
        let record = IpAddressRecord {
            address: "192.0.2.10".into(),
            gateway: None,
            subnet_mask: None,
            prefix: None,
            ip_type: "ipv4".into(),
            public: true,
            rdns: None,
            linode_id: Some(2),
            region: Some("us-east".into()),
            reserved: false,
        };
        let diag = drift_diagnostic(1, 1, &record);
        assert!(!diag.is_error());
        assert_eq!(diag.attribute.as_deref(), Some("assignments[1].linode_id"));
        assert!(diag.detail.unwrap().contains("linode 2"));
    }
}
