//! Read-only lookup of IP addresses
//!
//! Either fetches one address, or lists the addresses visible to the account
//! (optionally restricted to a region).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::OperationContext;
use crate::error::Result;
use crate::traits::{IpAddressRecord, LinodeApi, ListFilter};

/// Lookup parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpQuery {
    /// Fetch exactly this address (takes precedence over `region`)
    #[serde(default)]
    pub address: Option<String>,
    /// Restrict a listing to this region
    #[serde(default)]
    pub region: Option<String>,
}

impl IpQuery {
    pub fn address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            region: None,
        }
    }

    pub fn region(region: impl Into<String>) -> Self {
        Self {
            address: None,
            region: Some(region.into()),
        }
    }
}

/// One address as exposed by the lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddressView {
    /// JSON encoding of the API record
    pub id: String,
    pub address: String,
    pub gateway: Option<String>,
    pub subnet_mask: Option<String>,
    pub prefix: Option<u32>,
    #[serde(rename = "type")]
    pub ip_type: String,
    pub public: bool,
    pub rdns: Option<String>,
    pub linode_id: Option<u64>,
    pub region: Option<String>,
    pub reserved: bool,
}

impl IpAddressView {
    fn from_record(record: &IpAddressRecord) -> Result<Self> {
        Ok(Self {
            id: serde_json::to_string(record)?,
            address: record.address.clone(),
            gateway: record.gateway.clone(),
            subnet_mask: record.subnet_mask.clone(),
            prefix: record.prefix,
            ip_type: record.ip_type.clone(),
            public: record.public,
            rdns: record.rdns.clone(),
            linode_id: record.bound_linode(),
            region: record.region.clone(),
            reserved: record.reserved,
        })
    }
}

/// Outcome of a lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IpDataSourceResult {
    /// A single address was requested
    Single { ip: IpAddressView },
    /// A (possibly filtered) listing
    List { ip_addresses: Vec<IpAddressView> },
}

impl IpDataSourceResult {
    /// Every address in the result
    pub fn addresses(&self) -> &[IpAddressView] {
        match self {
            IpDataSourceResult::Single { ip } => std::slice::from_ref(ip),
            IpDataSourceResult::List { ip_addresses } => ip_addresses,
        }
    }
}

/// Lookup over the Linode API
pub struct NetworkingIpDataSource {
    api: Arc<dyn LinodeApi>,
}

impl NetworkingIpDataSource {
    pub fn new(api: Arc<dyn LinodeApi>) -> Self {
        Self { api }
    }

    /// Run a lookup
    ///
    /// A missing address is an error here, unlike a resource read.
    pub async fn read(&self, ctx: &OperationContext, query: &IpQuery) -> Result<IpDataSourceResult> {
        if let Some(address) = &query.address {
            debug!(address = %address, "looking up IP address");
            let record = ctx
                .run("get_ip_address", self.api.get_ip_address(address))
                .await
                .map_err(|e| e.context(format!("Unable to get IP Address {}", address)))?;

            return Ok(IpDataSourceResult::Single {
                ip: IpAddressView::from_record(&record)?,
            });
        }

        let filter = query.region.as_ref().map(ListFilter::region);
        debug!(region = ?query.region, "listing IP addresses");

        let records = ctx
            .run("list_ip_addresses", self.api.list_ip_addresses(filter.as_ref()))
            .await
            .map_err(|e| e.context("Unable to list IP Addresses"))?;

        let ip_addresses = records
            .iter()
            .map(IpAddressView::from_record)
            .collect::<Result<Vec<_>>>()?;

        Ok(IpDataSourceResult::List { ip_addresses })
    }
}
