//! Data model for the `networking_ip` resource
//!
//! - [`IpResourceConfig`]: what the user declared
//! - [`CreationRequest`]: the creation mode resolved from a config, once
//! - [`IpResourceState`]: what is persisted between runs
//!
//! The creation mode is stored in state as a [`ResourceKind`], so read,
//! update and delete dispatch on it instead of re-inferring intent from
//! which fields happen to be set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::traits::linode_api::{AllocateReserveIpOptions, AssignIpsOptions, IpAddressRecord, IPV4};

/// One address → linode pair of a bulk assignment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    /// Address being assigned
    pub address: String,
    /// Linode receiving the address
    pub linode_id: u64,
}

impl Assignment {
    /// Create an assignment pair
    pub fn new(address: impl Into<String>, linode_id: u64) -> Self {
        Self {
            address: address.into(),
            linode_id,
        }
    }
}

/// How a managed address came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Existing addresses assigned to linodes in bulk
    Assigned,
    /// A reservation, optionally bound to a linode
    Reserved,
    /// An address allocated directly to a linode
    InstanceBound,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceKind::Assigned => "assigned",
            ResourceKind::Reserved => "reserved",
            ResourceKind::InstanceBound => "instance_bound",
        };
        f.write_str(name)
    }
}

/// Creation mode resolved from a validated [`IpResourceConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationRequest {
    /// Bulk assignment of existing addresses
    Assignment(AssignIpsOptions),
    /// Reservation in a region, or reservation bound to a linode
    Reservation {
        /// Public or private address
        public: bool,
        /// Region of an unbound reservation
        region: Option<String>,
        /// Linode the reservation is bound to
        linode_id: Option<u64>,
    },
    /// Address allocated directly to a linode
    InstanceBinding {
        /// Public or private address
        public: bool,
        /// Linode receiving the address
        linode_id: u64,
    },
}

impl CreationRequest {
    /// Kind recorded in state for resources created by this request
    pub fn kind(&self) -> ResourceKind {
        match self {
            CreationRequest::Assignment(_) => ResourceKind::Assigned,
            CreationRequest::Reservation { .. } => ResourceKind::Reserved,
            CreationRequest::InstanceBinding { .. } => ResourceKind::InstanceBound,
        }
    }

    /// Allocation body for the single-resource modes
    pub fn allocate_options(&self) -> Option<AllocateReserveIpOptions> {
        match self {
            CreationRequest::Assignment(_) => None,
            CreationRequest::Reservation {
                public,
                region,
                linode_id,
            } => Some(AllocateReserveIpOptions {
                ip_type: IPV4.to_string(),
                public: *public,
                linode_id: *linode_id,
                reserved: Some(true),
                region: region.clone(),
            }),
            CreationRequest::InstanceBinding { public, linode_id } => {
                Some(AllocateReserveIpOptions {
                    ip_type: IPV4.to_string(),
                    public: *public,
                    linode_id: Some(*linode_id),
                    reserved: None,
                    region: None,
                })
            }
        }
    }
}

fn default_public() -> Option<bool> {
    Some(true)
}

/// Desired configuration of a `networking_ip` resource
///
/// `public` defaults to `true` when the key is absent. An explicit `null`
/// leaves it unset, which is rejected at create time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpResourceConfig {
    /// Linode to allocate to (required unless reserving in a region)
    #[serde(default)]
    pub linode_id: Option<u64>,

    /// Region for reservations and bulk assignments
    #[serde(default)]
    pub region: Option<String>,

    /// Public or private address
    #[serde(default = "default_public")]
    pub public: Option<bool>,

    /// Whether the address should be a reservation
    #[serde(default)]
    pub reserved: bool,

    /// Reverse DNS to apply after creation
    #[serde(default)]
    pub rdns: Option<String>,

    /// Bulk assignments (exclusive with the single-resource fields)
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

impl Default for IpResourceConfig {
    fn default() -> Self {
        Self {
            linode_id: None,
            region: None,
            public: default_public(),
            reserved: false,
            rdns: None,
            assignments: Vec::new(),
        }
    }
}

impl IpResourceConfig {
    /// Instance-bound address on a linode
    pub fn instance(linode_id: u64) -> Self {
        Self {
            linode_id: Some(linode_id),
            ..Self::default()
        }
    }

    /// Unbound reservation in a region
    pub fn reserved_in(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            reserved: true,
            ..Self::default()
        }
    }

    /// Bulk assignment within a region
    pub fn assign(region: impl Into<String>, assignments: Vec<Assignment>) -> Self {
        Self {
            region: Some(region.into()),
            assignments,
            ..Self::default()
        }
    }

    /// Set the reverse DNS
    pub fn with_rdns(mut self, rdns: impl Into<String>) -> Self {
        self.rdns = Some(rdns.into());
        self
    }

    /// Validate the config and resolve its creation mode
    pub fn creation_request(&self) -> Result<CreationRequest> {
        if !self.assignments.is_empty() {
            if self.reserved || self.linode_id.is_some() {
                return Err(Error::config(
                    "assignments cannot be combined with reserved or linode_id",
                ));
            }
            let region = self
                .region
                .clone()
                .ok_or_else(|| Error::config("region is required when assignments are set"))?;
            return Ok(CreationRequest::Assignment(AssignIpsOptions {
                region,
                assignments: self.assignments.clone(),
            }));
        }

        let public = self
            .public
            .ok_or_else(|| Error::config("public must be set unless assignments are used"))?;

        if self.reserved {
            return match (&self.region, self.linode_id) {
                (Some(_), Some(_)) => Err(Error::config(
                    "when reserved is true, set either region or linode_id, not both",
                )),
                (None, None) => Err(Error::config(
                    "when reserved is true, either region or linode_id must be set",
                )),
                (region, linode_id) => Ok(CreationRequest::Reservation {
                    public,
                    region: region.clone(),
                    linode_id,
                }),
            };
        }

        let linode_id = self
            .linode_id
            .ok_or_else(|| Error::config("when reserved is false or not set, linode_id is required"))?;

        Ok(CreationRequest::InstanceBinding { public, linode_id })
    }

    /// Planned configuration for an update against `prior`
    ///
    /// `rdns` is optional and computed: leaving it unset keeps whatever the
    /// API last reported.
    pub fn plan(&self, prior: &IpResourceState) -> Self {
        let mut planned = self.clone();
        if planned.rdns.is_none() {
            planned.rdns = prior.rdns.clone();
        }
        planned
    }

    /// Attributes whose change cannot be applied in place
    pub fn replacement_reasons(&self, prior: &IpResourceState) -> Vec<&'static str> {
        let mut reasons = Vec::new();
        let assigned = !self.assignments.is_empty();

        if assigned != (prior.kind == ResourceKind::Assigned) {
            reasons.push("assignments");
            return reasons;
        }

        if assigned {
            if self.region != prior.region {
                reasons.push("region");
            }
            return reasons;
        }

        if self.reserved != (prior.kind == ResourceKind::Reserved) {
            reasons.push("reserved");
        }
        if self.public.is_some_and(|public| public != prior.public) {
            reasons.push("public");
        }
        if self.linode_id.is_some() && self.linode_id != prior.linode_id {
            reasons.push("linode_id");
        }
        if self.region.is_some() && self.region != prior.region {
            reasons.push("region");
        }
        reasons
    }
}

/// Persisted state of a managed `networking_ip` resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpResourceState {
    /// Resource identifier (the address)
    pub id: String,
    /// Creation mode, resolved once at create
    pub kind: ResourceKind,
    /// Tracked address
    pub address: String,
    /// Linode binding
    pub linode_id: Option<u64>,
    /// Region
    pub region: Option<String>,
    /// Public or private
    pub public: bool,
    /// Whether the API reports the address as reserved
    pub reserved: bool,
    /// Default gateway (from the API)
    pub gateway: Option<String>,
    /// Subnet mask (from the API)
    pub subnet_mask: Option<String>,
    /// Prefix length (from the API)
    pub prefix: Option<u32>,
    /// Address type (from the API)
    #[serde(rename = "type")]
    pub ip_type: Option<String>,
    /// Reverse DNS
    pub rdns: Option<String>,
    /// Bulk assignments, first entry is the tracked identity
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    /// Time of the last fold from the API
    pub last_reconciled: DateTime<Utc>,
}

impl IpResourceState {
    /// State for a single address as returned by the API
    pub fn from_record(kind: ResourceKind, record: &IpAddressRecord) -> Self {
        let mut state = Self {
            id: record.address.clone(),
            kind,
            address: record.address.clone(),
            linode_id: None,
            region: None,
            public: record.public,
            reserved: record.reserved,
            gateway: None,
            subnet_mask: None,
            prefix: None,
            ip_type: None,
            rdns: None,
            assignments: Vec::new(),
            last_reconciled: Utc::now(),
        };
        state.absorb(record);
        state
    }

    /// State for a bulk assignment; identity is the first pair
    pub fn from_assignment(opts: &AssignIpsOptions, public: bool) -> Result<Self> {
        let first = opts
            .assignments
            .first()
            .ok_or_else(|| Error::config("at least one assignment is required"))?;

        Ok(Self {
            id: first.address.clone(),
            kind: ResourceKind::Assigned,
            address: first.address.clone(),
            linode_id: Some(first.linode_id),
            region: Some(opts.region.clone()),
            public,
            reserved: false,
            gateway: None,
            subnet_mask: None,
            prefix: None,
            ip_type: None,
            rdns: None,
            assignments: opts.assignments.clone(),
            last_reconciled: Utc::now(),
        })
    }

    /// Re-point the identity of an assigned resource at a new assignment set
    pub(crate) fn retrack(&mut self, opts: &AssignIpsOptions) {
        if let Some(first) = opts.assignments.first() {
            self.id = first.address.clone();
            self.address = first.address.clone();
            self.linode_id = Some(first.linode_id);
        }
        self.region = Some(opts.region.clone());
        self.assignments = opts.assignments.clone();
    }

    /// Fold an API response into this state
    ///
    /// Derived fields are always overwritten. For assigned resources the
    /// tracked identity (address, linode, region, assignments) is left alone;
    /// binding drift is reported by the reconciler instead.
    pub fn absorb(&mut self, record: &IpAddressRecord) {
        if self.kind != ResourceKind::Assigned {
            self.id = record.address.clone();
            self.address = record.address.clone();
            self.linode_id = record.bound_linode();
            self.region = record.region.clone();
        }
        self.public = record.public;
        self.reserved = record.reserved;
        self.gateway = record.gateway.clone();
        self.subnet_mask = record.subnet_mask.clone();
        self.prefix = record.prefix;
        self.ip_type = Some(record.ip_type.clone());
        self.rdns = record.rdns.clone();
        self.last_reconciled = Utc::now();
    }
}
