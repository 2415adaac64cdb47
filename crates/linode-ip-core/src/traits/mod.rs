//! Core traits for the Linode IP reconciler
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`LinodeApi`]: Facade over the Linode REST API
//! - [`StateStore`]: Persistence of resource state between runs

pub mod linode_api;
pub mod state_store;

pub use linode_api::{
    AllocateReserveIpOptions, AssignIpsOptions, IpAddressRecord, IpAddressUpdateOptions,
    LinodeApi, ListFilter,
};
pub use state_store::StateStore;
