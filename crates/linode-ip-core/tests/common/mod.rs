//! Test doubles and common utilities for reconciler contract tests
//!
//! `MockLinodeApi` is a small in-memory stand-in for the Linode API: it keeps
//! a table of addresses, records every call, and can be told to fail or hang
//! on a given method.

#![allow(dead_code)]

use linode_ip_core::error::{Error, Result};
use linode_ip_core::traits::{
    AllocateReserveIpOptions, AssignIpsOptions, IpAddressRecord, IpAddressUpdateOptions,
    LinodeApi, ListFilter,
};
use linode_ip_core::{NetworkingIpReconciler, ReconcileEvent, ReconcilerConfig};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

pub const DEFAULT_REGION: &str = "us-east";

/// One recorded facade call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    AllocateReserveIp(AllocateReserveIpOptions),
    GetIpAddress(String),
    UpdateIpAddress(String, Option<String>),
    DeleteInstanceIpAddress(u64, String),
    DeleteReservedIpAddress(String),
    AssignIps(AssignIpsOptions),
    ListIpAddresses(Option<ListFilter>),
}

impl ApiCall {
    pub fn method(&self) -> &'static str {
        match self {
            ApiCall::AllocateReserveIp(_) => "allocate_reserve_ip",
            ApiCall::GetIpAddress(_) => "get_ip_address",
            ApiCall::UpdateIpAddress(..) => "update_ip_address",
            ApiCall::DeleteInstanceIpAddress(..) => "delete_instance_ip_address",
            ApiCall::DeleteReservedIpAddress(_) => "delete_reserved_ip_address",
            ApiCall::AssignIps(_) => "assign_ips",
            ApiCall::ListIpAddresses(_) => "list_ip_addresses",
        }
    }

    fn address(&self) -> Option<&str> {
        match self {
            ApiCall::GetIpAddress(a)
            | ApiCall::UpdateIpAddress(a, _)
            | ApiCall::DeleteInstanceIpAddress(_, a)
            | ApiCall::DeleteReservedIpAddress(a) => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Failure {
    method: &'static str,
    address: Option<String>,
    code: u16,
    message: String,
}

#[derive(Debug, Default)]
struct Remote {
    ips: BTreeMap<String, IpAddressRecord>,
    calls: Vec<ApiCall>,
    failures: Vec<Failure>,
    hanging: HashSet<&'static str>,
    next_host: u8,
}

/// A recording, in-memory LinodeApi
#[derive(Debug, Clone, Default)]
pub struct MockLinodeApi {
    remote: Arc<Mutex<Remote>>,
    /// Call counter across all methods
    call_count: Arc<AtomicUsize>,
}

impl MockLinodeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an address into the remote table
    pub fn seed(&self, record: IpAddressRecord) {
        self.remote
            .lock()
            .unwrap()
            .ips
            .insert(record.address.clone(), record);
    }

    /// Drop an address from the remote table, as if deleted out of band
    pub fn forget(&self, address: &str) {
        self.remote.lock().unwrap().ips.remove(address);
    }

    /// Current remote record for an address
    pub fn remote(&self, address: &str) -> Option<IpAddressRecord> {
        self.remote.lock().unwrap().ips.get(address).cloned()
    }

    /// Rebind an address out of band
    pub fn rebind(&self, address: &str, linode_id: Option<u64>) {
        if let Some(record) = self.remote.lock().unwrap().ips.get_mut(address) {
            record.linode_id = linode_id;
        }
    }

    /// Make every call to `method` fail with an API error
    pub fn fail(&self, method: &'static str, code: u16, message: &str) {
        self.remote.lock().unwrap().failures.push(Failure {
            method,
            address: None,
            code,
            message: message.to_string(),
        });
    }

    /// Make calls to `method` about `address` fail with an API error
    pub fn fail_for(&self, method: &'static str, address: &str, code: u16, message: &str) {
        self.remote.lock().unwrap().failures.push(Failure {
            method,
            address: Some(address.to_string()),
            code,
            message: message.to_string(),
        });
    }

    /// Make every call to `method` wait forever
    pub fn hang(&self, method: &'static str) {
        self.remote.lock().unwrap().hanging.insert(method);
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<ApiCall> {
        self.remote.lock().unwrap().calls.clone()
    }

    /// Number of calls made to `method`
    pub fn calls_to(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| c.method() == method).count()
    }

    /// Get the total number of facade calls
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Record the call; returns (injected failure, should hang)
    fn enter(&self, call: ApiCall) -> (Option<Error>, bool) {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut remote = self.remote.lock().unwrap();

        let failure = remote
            .failures
            .iter()
            .find(|f| {
                f.method == call.method()
                    && f.address
                        .as_deref()
                        .is_none_or(|address| call.address() == Some(address))
            })
            .map(|f| Error::api(f.code, f.message.clone()));
        let hang = remote.hanging.contains(call.method());

        remote.calls.push(call);
        (failure, hang)
    }

    async fn gate(&self, call: ApiCall) -> Result<()> {
        let (failure, hang) = self.enter(call);
        if hang {
            std::future::pending::<()>().await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn not_found() -> Error {
    Error::not_found("Not found")
}

pub fn default_rdns(address: &str) -> String {
    format!("{}.ip.linodeusercontent.com", address.replace('.', "-"))
}

/// An instance-bound public IPv4 record
pub fn ipv4_record(address: &str, linode_id: Option<u64>) -> IpAddressRecord {
    IpAddressRecord {
        address: address.to_string(),
        gateway: Some("192.0.2.1".to_string()),
        subnet_mask: Some("255.255.255.0".to_string()),
        prefix: Some(24),
        ip_type: "ipv4".to_string(),
        public: true,
        rdns: Some(default_rdns(address)),
        linode_id,
        region: Some(DEFAULT_REGION.to_string()),
        reserved: false,
    }
}

#[async_trait::async_trait]
impl LinodeApi for MockLinodeApi {
    async fn allocate_reserve_ip(
        &self,
        opts: &AllocateReserveIpOptions,
    ) -> Result<IpAddressRecord> {
        self.gate(ApiCall::AllocateReserveIp(opts.clone())).await?;

        let mut remote = self.remote.lock().unwrap();
        remote.next_host += 1;
        let address = format!("192.0.2.{}", 9 + remote.next_host);

        let mut record = ipv4_record(&address, opts.linode_id);
        record.public = opts.public;
        record.reserved = opts.reserved.unwrap_or(false);
        if let Some(region) = &opts.region {
            record.region = Some(region.clone());
        }

        remote.ips.insert(address, record.clone());
        Ok(record)
    }

    async fn get_ip_address(&self, address: &str) -> Result<IpAddressRecord> {
        self.gate(ApiCall::GetIpAddress(address.to_string())).await?;
        self.remote(address).ok_or_else(not_found)
    }

    async fn update_ip_address(
        &self,
        address: &str,
        opts: &IpAddressUpdateOptions,
    ) -> Result<IpAddressRecord> {
        self.gate(ApiCall::UpdateIpAddress(
            address.to_string(),
            opts.rdns.clone(),
        ))
        .await?;

        let mut remote = self.remote.lock().unwrap();
        let record = remote.ips.get_mut(address).ok_or_else(not_found)?;
        record.rdns = Some(opts.rdns.clone().unwrap_or_else(|| default_rdns(address)));
        Ok(record.clone())
    }

    async fn delete_instance_ip_address(&self, linode_id: u64, address: &str) -> Result<()> {
        self.gate(ApiCall::DeleteInstanceIpAddress(
            linode_id,
            address.to_string(),
        ))
        .await?;

        let mut remote = self.remote.lock().unwrap();
        match remote.ips.get(address) {
            Some(record) if record.linode_id == Some(linode_id) => {
                remote.ips.remove(address);
                Ok(())
            }
            _ => Err(not_found()),
        }
    }

    async fn delete_reserved_ip_address(&self, address: &str) -> Result<()> {
        self.gate(ApiCall::DeleteReservedIpAddress(address.to_string()))
            .await?;

        let mut remote = self.remote.lock().unwrap();
        remote.ips.remove(address).map(|_| ()).ok_or_else(not_found)
    }

    async fn assign_ips(&self, opts: &AssignIpsOptions) -> Result<()> {
        self.gate(ApiCall::AssignIps(opts.clone())).await?;

        let mut remote = self.remote.lock().unwrap();
        for assignment in &opts.assignments {
            let record = remote.ips.get_mut(&assignment.address).ok_or_else(|| {
                Error::api(400, format!("Invalid IP address {}", assignment.address))
            })?;
            record.linode_id = Some(assignment.linode_id);
            record.region = Some(opts.region.clone());
        }
        Ok(())
    }

    async fn list_ip_addresses(&self, filter: Option<&ListFilter>) -> Result<Vec<IpAddressRecord>> {
        self.gate(ApiCall::ListIpAddresses(filter.cloned())).await?;

        let region = filter.and_then(|f| f.region.clone());
        let remote = self.remote.lock().unwrap();
        Ok(remote
            .ips
            .values()
            .filter(|r| region.is_none() || r.region == region)
            .cloned()
            .collect())
    }

    fn api_name(&self) -> &'static str {
        "mock"
    }
}

/// Reconciler over `api` with default settings
pub fn reconciler(api: &MockLinodeApi) -> (NetworkingIpReconciler, mpsc::Receiver<ReconcileEvent>) {
    NetworkingIpReconciler::new(Arc::new(api.clone()), ReconcilerConfig::default())
}

/// Every event emitted so far
///
/// Call after the reconciler is dropped so the stream terminates.
pub async fn drain_events(rx: mpsc::Receiver<ReconcileEvent>) -> Vec<ReconcileEvent> {
    ReceiverStream::new(rx).collect().await
}
