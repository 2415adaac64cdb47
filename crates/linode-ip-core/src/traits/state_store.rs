// # State Store Trait
//
// Defines the interface for persisting resource state between runs.
//
// ## Purpose
//
// The reconciler itself is stateless: it takes a prior state and returns the
// next one. A state store keeps those records keyed by resource name so a
// later run can refresh, update or destroy what an earlier run created.
//
// ## Implementations
//
// - File-based: JSON file with atomic writes and backup recovery
// - In-memory: tests and one-shot runs
//
// ## Usage
//
// ```rust,ignore
// use linode_ip_core::StateStore;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* StateStore implementation */;
//
//     if let Some(state) = store.get("web_ip").await? {
//         println!("web_ip is {}", state.address);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::model::IpResourceState;

/// Trait for state store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Ownership
///
/// The store only persists what it is given. Deciding what to write (and
/// when a resource is gone) belongs to the caller driving the reconciler.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the state of a resource
    ///
    /// # Returns
    ///
    /// - `Ok(Some(IpResourceState))`: The stored state
    /// - `Ok(None)`: Resource is not managed
    /// - `Err(Error)`: Storage error
    async fn get(&self, name: &str) -> Result<Option<IpResourceState>, crate::Error>;

    /// Create or replace the state of a resource
    async fn put(&self, name: &str, state: &IpResourceState) -> Result<(), crate::Error>;

    /// Forget a resource
    ///
    /// Removing a name that is not stored is not an error.
    async fn remove(&self, name: &str) -> Result<(), crate::Error>;

    /// List all resource names in the store
    async fn list(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
