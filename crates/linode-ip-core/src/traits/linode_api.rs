// # Linode API Facade
//
// Defines the interface the reconciler uses to talk to the Linode API.
//
// ## Implementations
//
// - REST: `linode-ip-client` crate
// - Tests: recording mocks in `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use linode_ip_core::LinodeApi;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let api = /* LinodeApi implementation */;
//
//     let ip = api.get_ip_address("192.0.2.10").await?;
//     println!("{} -> gateway {:?}", ip.address, ip.gateway);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::Assignment;

/// IP address type used for allocation requests
pub const IPV4: &str = "ipv4";

/// An IP address object as returned by the Linode API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddressRecord {
    /// The address itself
    pub address: String,
    /// Default gateway for this address
    #[serde(default)]
    pub gateway: Option<String>,
    /// Subnet mask for this address
    #[serde(default)]
    pub subnet_mask: Option<String>,
    /// Number of bits set in the subnet mask
    #[serde(default)]
    pub prefix: Option<u32>,
    /// Address type (`ipv4`, `ipv6`, `ipv6/pool`, ...)
    #[serde(rename = "type")]
    pub ip_type: String,
    /// Whether the address is publicly routable
    #[serde(default)]
    pub public: bool,
    /// Reverse DNS record
    #[serde(default)]
    pub rdns: Option<String>,
    /// Linode the address is bound to, if any
    #[serde(default)]
    pub linode_id: Option<u64>,
    /// Region the address lives in
    #[serde(default)]
    pub region: Option<String>,
    /// Whether the address is a reservation
    #[serde(default)]
    pub reserved: bool,
}

impl IpAddressRecord {
    /// Linode binding with the API's "0 means unbound" convention normalized away
    pub fn bound_linode(&self) -> Option<u64> {
        self.linode_id.filter(|id| *id != 0)
    }
}

/// Request body for allocating or reserving an IPv4 address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateReserveIpOptions {
    /// Always `ipv4`
    #[serde(rename = "type")]
    pub ip_type: String,
    /// Public or private address
    pub public: bool,
    /// Linode to allocate the address to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linode_id: Option<u64>,
    /// Whether to create a reservation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved: Option<bool>,
    /// Region for an unbound reservation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Request body for updating an IP address
///
/// `rdns` is always sent; `null` resets the record to the Linode default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddressUpdateOptions {
    /// New reverse DNS value
    pub rdns: Option<String>,
}

/// Request body for bulk-assigning addresses to linodes within a region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignIpsOptions {
    /// Region all addresses and linodes belong to
    pub region: String,
    /// Address → linode pairs
    pub assignments: Vec<Assignment>,
}

/// Filter for listing IP addresses (sent as the `X-Filter` header)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    /// Only return addresses in this region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl ListFilter {
    /// Filter by region
    pub fn region(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
        }
    }

    /// Whether the filter constrains anything
    pub fn is_empty(&self) -> bool {
        self.region.is_none()
    }

    /// JSON encoding for the `X-Filter` header
    pub fn to_header_value(&self) -> Result<String, crate::Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Trait for Linode API implementations
///
/// This is the facade the reconciler consumes. Implementations perform
/// authenticated HTTP calls and return structured records or typed errors.
///
/// # Error Contract
///
/// - A missing object MUST surface as [`crate::Error::Api`] with `code == 404`
///   (see [`crate::Error::is_not_found`]). The reconciler relies on this to
///   drop state on read and to treat delete as already done.
/// - Any other failure propagates as-is; the upstream text must be kept in
///   the message.
///
/// # Thread Safety
///
/// A single handle is shared by every reconciler, so implementations must be
/// `Send + Sync` and must not mutate shared state after construction.
///
/// # No Retries
///
/// Implementations make one request per call (pagination aside). Deadlines
/// and cancellation are applied by the caller around each call.
#[async_trait]
pub trait LinodeApi: Send + Sync {
    /// Allocate an instance-bound address or create a reservation
    ///
    /// `POST /networking/ips`
    async fn allocate_reserve_ip(
        &self,
        opts: &AllocateReserveIpOptions,
    ) -> Result<IpAddressRecord, crate::Error>;

    /// Fetch a single address
    ///
    /// `GET /networking/ips/{address}`
    async fn get_ip_address(&self, address: &str) -> Result<IpAddressRecord, crate::Error>;

    /// Update mutable fields of an address (reverse DNS)
    ///
    /// `PUT /networking/ips/{address}`
    async fn update_ip_address(
        &self,
        address: &str,
        opts: &IpAddressUpdateOptions,
    ) -> Result<IpAddressRecord, crate::Error>;

    /// Remove an address from a linode
    ///
    /// `DELETE /linode/instances/{linode_id}/ips/{address}`
    async fn delete_instance_ip_address(
        &self,
        linode_id: u64,
        address: &str,
    ) -> Result<(), crate::Error>;

    /// Delete a standalone reservation
    ///
    /// `DELETE /networking/reserved/ips/{address}`
    async fn delete_reserved_ip_address(&self, address: &str) -> Result<(), crate::Error>;

    /// Assign addresses to linodes within a region
    ///
    /// `POST /networking/ips/assign`
    async fn assign_ips(&self, opts: &AssignIpsOptions) -> Result<(), crate::Error>;

    /// List addresses visible to the account, following every page
    ///
    /// `GET /networking/ips`
    async fn list_ip_addresses(
        &self,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<IpAddressRecord>, crate::Error>;

    /// Name of the implementation (for logging/debugging)
    fn api_name(&self) -> &'static str;
}
