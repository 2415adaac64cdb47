// # Linode API Client
//
// This crate provides the HTTP implementation of `LinodeApi` on top of
// reqwest.
//
// ## Behavior
//
// - One HTTP request per facade call (list calls follow pagination)
// - Bearer token authentication
// - Request timeout from `ProviderConfig`
// - Non-success statuses become `Error::Api { code, message }`, with the
//   message taken from the Linode error envelope
// - NO retry logic (callers decide)
// - NO caching
// - NO background tasks
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - Client construction fails fast if the token is empty
//
// ## API Reference
//
// - Allocate / reserve: POST `/networking/ips`
// - Get address: GET `/networking/ips/:address`
// - Update address: PUT `/networking/ips/:address`
// - Remove from linode: DELETE `/linode/instances/:linode_id/ips/:address`
// - Delete reservation: DELETE `/networking/reserved/ips/:address`
// - Assign: POST `/networking/ips/assign`
// - List: GET `/networking/ips?page=N&page_size=500` with `X-Filter`

use async_trait::async_trait;
use linode_ip_core::config::ProviderConfig;
use linode_ip_core::traits::{
    AllocateReserveIpOptions, AssignIpsOptions, IpAddressRecord, IpAddressUpdateOptions,
    LinodeApi, ListFilter,
};
use linode_ip_core::{Error, Result};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// User-Agent sent with every request (an optional prefix is prepended)
pub const DEFAULT_USER_AGENT: &str = concat!("linode-ipctl/", env!("CARGO_PKG_VERSION"));

/// Largest page size the API accepts
const PAGE_SIZE: u32 = 500;

/// Header carrying list filters
const FILTER_HEADER: &str = "X-Filter";

/// Linode API error envelope
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ErrorReason {
    reason: String,
    #[serde(default)]
    field: Option<String>,
}

/// One page of a list endpoint
#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
    #[serde(default = "first_page")]
    page: u32,
    #[serde(default = "first_page")]
    pages: u32,
}

fn first_page() -> u32 {
    1
}

/// HTTP client for the Linode REST API
///
/// Stateless apart from the connection pool; one instance is shared by
/// every reconciler through `Arc<dyn LinodeApi>`.
pub struct LinodeClient {
    /// API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Base URL including the version segment
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for LinodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinodeClient")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl LinodeClient {
    /// Create a client from provider settings
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the settings do not validate (empty token, bad URL)
    /// - `Error::Http` if the underlying HTTP client cannot be built
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;

        let user_agent = match config.ua_prefix.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => format!("{} {}", prefix, DEFAULT_USER_AGENT),
            _ => DEFAULT_USER_AGENT.to_string(),
        };

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        tracing::debug!(base_url = %config.base_url(), "Linode client configured");

        Ok(Self {
            api_token: config.api_token.clone(),
            base_url: config.base_url(),
            client,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Send a request and map non-success statuses to `Error::Api`
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::http(format!("HTTP request failed: {}", e.without_url())))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        tracing::debug!(status = status.as_u16(), "Linode API request failed");
        Err(Error::api(status.as_u16(), error_message(status, &body)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| Error::http(format!("Failed to parse response: {}", e.without_url())))
    }
}

/// Message for a failed request: the envelope's reasons, else the raw body
fn error_message(status: StatusCode, body: &str) -> String {
    let reasons = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| {
            envelope
                .errors
                .into_iter()
                .map(|e| match e.field {
                    Some(field) if !field.is_empty() => format!("[{}] {}", field, e.reason),
                    _ => e.reason,
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if !reasons.is_empty() {
        return reasons.join("; ");
    }

    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    } else {
        body.to_string()
    }
}

#[async_trait]
impl LinodeApi for LinodeClient {
    async fn allocate_reserve_ip(&self, opts: &AllocateReserveIpOptions) -> Result<IpAddressRecord> {
        tracing::debug!(
            public = opts.public,
            linode_id = ?opts.linode_id,
            region = ?opts.region,
            reserved = ?opts.reserved,
            "POST /networking/ips"
        );
        self.send_json(self.request(Method::POST, "/networking/ips").json(opts))
            .await
    }

    async fn get_ip_address(&self, address: &str) -> Result<IpAddressRecord> {
        tracing::debug!(address, "GET /networking/ips/:address");
        self.send_json(self.request(Method::GET, &format!("/networking/ips/{}", address)))
            .await
    }

    async fn update_ip_address(
        &self,
        address: &str,
        opts: &IpAddressUpdateOptions,
    ) -> Result<IpAddressRecord> {
        tracing::debug!(address, rdns = ?opts.rdns, "PUT /networking/ips/:address");
        self.send_json(
            self.request(Method::PUT, &format!("/networking/ips/{}", address))
                .json(opts),
        )
        .await
    }

    async fn delete_instance_ip_address(&self, linode_id: u64, address: &str) -> Result<()> {
        tracing::debug!(linode_id, address, "DELETE /linode/instances/:id/ips/:address");
        self.send(self.request(
            Method::DELETE,
            &format!("/linode/instances/{}/ips/{}", linode_id, address),
        ))
        .await?;
        Ok(())
    }

    async fn delete_reserved_ip_address(&self, address: &str) -> Result<()> {
        tracing::debug!(address, "DELETE /networking/reserved/ips/:address");
        self.send(self.request(
            Method::DELETE,
            &format!("/networking/reserved/ips/{}", address),
        ))
        .await?;
        Ok(())
    }

    async fn assign_ips(&self, opts: &AssignIpsOptions) -> Result<()> {
        tracing::debug!(
            region = %opts.region,
            count = opts.assignments.len(),
            "POST /networking/ips/assign"
        );
        self.send(self.request(Method::POST, "/networking/ips/assign").json(opts))
            .await?;
        Ok(())
    }

    async fn list_ip_addresses(&self, filter: Option<&ListFilter>) -> Result<Vec<IpAddressRecord>> {
        let filter = match filter {
            Some(f) if !f.is_empty() => Some(f.to_header_value()?),
            _ => None,
        };

        let mut records = Vec::new();
        let mut page = 1;
        loop {
            tracing::debug!(page, filter = ?filter, "GET /networking/ips");

            let mut request = self
                .request(Method::GET, "/networking/ips")
                .query(&[("page", page), ("page_size", PAGE_SIZE)]);
            if let Some(filter) = &filter {
                request = request.header(FILTER_HEADER, filter);
            }

            let body: Page<IpAddressRecord> = self.send_json(request).await?;
            records.extend(body.data);

            if body.page >= body.pages {
                break;
            }
            page = body.page + 1;
        }

        Ok(records)
    }

    fn api_name(&self) -> &'static str {
        "linode"
    }
}
