// # linode-ip-core
//
// Core library for managing Linode networking IP addresses declaratively.
//
// ## Architecture Overview
//
// This library provides the reconciliation logic for a `networking_ip`
// resource:
// - **LinodeApi**: Trait facade over the Linode REST API
// - **NetworkingIpReconciler**: create / read / update / delete, folding API
//   responses back into state
// - **NetworkingIpDataSource**: read-only lookup by address or region
// - **StateStore**: Trait for persisting resource state between runs
// - **OperationContext**: Deadline and cancellation for each operation
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Reconciliation is separate from HTTP
// 2. **Resolve Once**: The creation mode is decided at create and stored
// 3. **Library-First**: All core functionality can be used as a library
// 4. **Idempotency**: Delete of a missing address succeeds

pub mod config;
pub mod context;
pub mod datasource;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod reconciler;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{LinodeIpConfig, ProviderConfig, ReconcilerConfig, StateStoreConfig};
pub use context::OperationContext;
pub use datasource::{IpAddressView, IpDataSourceResult, IpQuery, NetworkingIpDataSource};
pub use diagnostics::{Diagnostic, Severity};
pub use error::{Error, Result};
pub use model::{Assignment, CreationRequest, IpResourceConfig, IpResourceState, ResourceKind};
pub use reconciler::{NetworkingIpReconciler, ReadOutcome, ReconcileEvent};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{LinodeApi, StateStore};
