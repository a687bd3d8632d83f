// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! BIND9 driver using the bindcar HTTP API.
//!
//! Zones are added as secondaries of the target's masters, so BIND9 pulls
//! content by zone transfer. After a successful create or update a DNS NOTIFY
//! is sent to the server so the transfer starts immediately.
//!
//! # Options
//!
//! | key | required | meaning |
//! |---|---|---|
//! | `api_endpoint` | yes | bindcar address, `host:port` or URL |
//! | `api_token` | no | bearer token |
//! | `host` | yes | DNS address of the server (NOTIFY destination) |
//! | `port` | no | DNS port, default 53 |

use super::registry::BackendSettings;
use super::Backend;
use crate::constants::DNS_PORT;
use crate::context::RequestContext;
use crate::dns::{DnsQuerier, HickoryDnsClient};
use crate::errors::BackendError;
use crate::model::{Domain, Master, PoolTarget};
use crate::retry::{http_backoff, is_retryable_http_status};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Zone type string bindcar expects for secondaries.
const ZONE_TYPE_SECONDARY: &str = "secondary";

/// HTTP error with status code for retry logic.
///
/// Preserves the HTTP status code so retryability is decided without
/// parsing error strings.
#[derive(Debug)]
struct HttpError {
    status: StatusCode,
    message: String,
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}

/// Body of `POST /api/v1/zones`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateZoneRequest<'a> {
    zone_name: &'a str,
    zone_type: &'static str,
    zone_config: ZoneConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ZoneConfig {
    ttl: u32,
    soa: SoaRecord,
    name_servers: Vec<String>,
    primaries: Vec<String>,
}

/// Secondary zones take their SOA from the master; bindcar still wants one.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SoaRecord {
    primary_ns: String,
    admin_email: String,
    serial: u32,
    refresh: u32,
    retry: u32,
    expire: u32,
    negative_ttl: u32,
}

/// Driver for one BIND9 server fronted by bindcar.
#[derive(Debug, Clone)]
pub struct Bind9Backend {
    target_id: Uuid,
    api_base: String,
    api_token: Option<String>,
    dns_server: SocketAddr,
    masters: Vec<Master>,
    http: HttpClient,
    querier: Arc<dyn DnsQuerier>,
    dns_timeout: Duration,
    retry_max_elapsed: Duration,
}

impl Bind9Backend {
    /// Registry tag.
    pub const TYPE: &'static str = "bind9";

    /// Build the driver from a target's options.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidConfiguration`] if `api_endpoint` or
    /// `host` is missing, or `host`/`port` do not form a socket address.
    pub fn from_target(
        target: &PoolTarget,
        settings: &BackendSettings,
    ) -> Result<Self, BackendError> {
        let describe = format!("{}({})", Self::TYPE, target.id);
        let invalid = |reason: String| BackendError::InvalidConfiguration {
            target: describe.clone(),
            reason,
        };

        let api_endpoint = target
            .option("api_endpoint")
            .ok_or_else(|| invalid("missing option 'api_endpoint'".to_string()))?;
        let dns_server = dns_server_option(target).map_err(invalid)?;

        Ok(Self {
            target_id: target.id,
            api_base: build_api_url(api_endpoint),
            api_token: target.option("api_token").map(str::to_string),
            dns_server,
            masters: target.masters.clone(),
            http: settings.http_client.clone(),
            querier: Arc::new(HickoryDnsClient::new(settings.transport)),
            dns_timeout: settings.dns_timeout,
            retry_max_elapsed: settings.http_retry_max_elapsed,
        })
    }

    /// Replace the DNS client used for NOTIFY.
    #[must_use]
    pub fn with_querier(mut self, querier: Arc<dyn DnsQuerier>) -> Self {
        self.querier = querier;
        self
    }

    /// bindcar base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Masters in random order, formatted for a BIND9 `primaries` clause.
    fn shuffled_primaries(&self) -> Vec<String> {
        let mut masters = self.masters.clone();
        masters.shuffle(&mut rand::rng());
        masters
            .iter()
            .map(|m| format!("{} port {}", m.host, m.port))
            .collect()
    }

    async fn notify(&self, zone: &Domain) -> Result<(), BackendError> {
        self.querier
            .send_notify(self.dns_server, &zone.name, self.dns_timeout)
            .await
            .map_err(|e| BackendError::Unavailable {
                target: self.describe(),
                reason: e.to_string(),
            })
    }
}

fn dns_server_option(target: &PoolTarget) -> std::result::Result<SocketAddr, String> {
    let host = target
        .option("host")
        .ok_or_else(|| "missing option 'host'".to_string())?;
    let ip: IpAddr = host
        .parse()
        .map_err(|e| format!("option 'host' is not an IP address: {e}"))?;
    let port = match target.option("port") {
        Some(port) => port
            .parse::<u16>()
            .map_err(|e| format!("option 'port' is not a port number: {e}"))?,
        None => DNS_PORT,
    };
    Ok(SocketAddr::new(ip, port))
}

/// Build the API base URL from a server address
///
/// Converts `"10.0.0.5:8080"` to `<http://10.0.0.5:8080>` and leaves URLs with a scheme untouched.
pub(crate) fn build_api_url(server: &str) -> String {
    if server.starts_with("http://") || server.starts_with("https://") {
        server.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", server.trim_end_matches('/'))
    }
}

/// Name bindcar expects: no trailing dot.
fn api_zone_name(zone: &Domain) -> &str {
    zone.name.trim_end_matches('.')
}

#[async_trait]
impl Backend for Bind9Backend {
    fn backend_type(&self) -> &'static str {
        Self::TYPE
    }

    fn describe(&self) -> String {
        format!("{}({})", Self::TYPE, self.api_base)
    }

    async fn create_zone(&self, ctx: &RequestContext, zone: &Domain) -> Result<(), BackendError> {
        let zone_name = api_zone_name(zone);
        let url = format!("{}/api/v1/zones", self.api_base);
        let primaries = self.shuffled_primaries();

        let request = CreateZoneRequest {
            zone_name,
            zone_type: ZONE_TYPE_SECONDARY,
            zone_config: ZoneConfig {
                ttl: zone.ttl,
                soa: SoaRecord {
                    primary_ns: "placeholder.invalid.".to_string(),
                    admin_email: "hostmaster.invalid.".to_string(),
                    serial: 1,
                    refresh: 3600,
                    retry: 600,
                    expire: 604_800,
                    negative_ttl: 300,
                },
                name_servers: vec![],
                primaries,
            },
        };

        match bindcar_request(
            &self.http,
            self.api_token.as_deref(),
            "POST",
            &url,
            Some(&request),
            self.retry_max_elapsed,
        )
        .await
        {
            Ok(_) => {
                info!(
                    zone = %zone.name,
                    target = %self.describe(),
                    primaries = ?request.zone_config.primaries,
                    request_id = %ctx.request_id,
                    "Added secondary zone"
                );
            }
            Err(e) => {
                let is_conflict = e
                    .downcast_ref::<HttpError>()
                    .is_some_and(|http_err| http_err.status == StatusCode::CONFLICT);

                let err_msg = e.to_string().to_lowercase();
                // BIND9 reports duplicates as "already exists", "already serves
                // the given zone" or "duplicate zone"
                if is_conflict
                    || err_msg.contains("already exists")
                    || err_msg.contains("already serves")
                    || err_msg.contains("duplicate zone")
                {
                    return Err(BackendError::ZoneAlreadyExists {
                        zone: zone.name.clone(),
                        target: self.describe(),
                    });
                }
                return Err(self.classify(&e, zone));
            }
        }

        if let Err(e) = self.notify(zone).await {
            warn!(
                zone = %zone.name,
                target = %self.describe(),
                error = %e,
                "NOTIFY after zone creation failed, the server will transfer on its own schedule"
            );
        }
        Ok(())
    }

    async fn update_zone(&self, ctx: &RequestContext, zone: &Domain) -> Result<(), BackendError> {
        self.notify(zone).await?;
        debug!(
            zone = %zone.name,
            target = %self.describe(),
            request_id = %ctx.request_id,
            "Sent NOTIFY for zone update"
        );
        Ok(())
    }

    async fn delete_zone(&self, ctx: &RequestContext, zone: &Domain) -> Result<(), BackendError> {
        let url = format!("{}/api/v1/zones/{}", self.api_base, api_zone_name(zone));

        match bindcar_request(
            &self.http,
            self.api_token.as_deref(),
            "DELETE",
            &url,
            None::<&()>,
            self.retry_max_elapsed,
        )
        .await
        {
            Ok(_) => {
                info!(
                    zone = %zone.name,
                    target = %self.describe(),
                    request_id = %ctx.request_id,
                    "Deleted zone"
                );
                Ok(())
            }
            Err(e) => {
                let is_not_found = e
                    .downcast_ref::<HttpError>()
                    .is_some_and(|http_err| http_err.status == StatusCode::NOT_FOUND);

                if is_not_found || e.to_string().to_lowercase().contains("not found") {
                    Err(BackendError::ZoneNotFound {
                        zone: zone.name.clone(),
                        target: self.describe(),
                    })
                } else {
                    Err(self.classify(&e, zone))
                }
            }
        }
    }
}

impl Bind9Backend {
    fn classify(&self, e: &anyhow::Error, zone: &Domain) -> BackendError {
        match e.downcast_ref::<HttpError>() {
            Some(http_err) if !is_retryable_http_status(http_err.status) => {
                BackendError::Rejected {
                    target: self.describe(),
                    zone: zone.name.clone(),
                    reason: http_err.to_string(),
                }
            }
            _ => BackendError::Unavailable {
                target: self.describe(),
                reason: format!("{e:#}"),
            },
        }
    }
}

/// Execute a request to the bindcar API with automatic retry.
///
/// # Retry Behavior
/// - Retries on HTTP 429, 500, 502, 503, 504 and connection failures
/// - Fails immediately on other 4xx errors
/// - Gives up after `max_elapsed`
///
/// # Errors
///
/// Returns an error if the HTTP request fails after all retries or encounters a non-retryable error.
async fn bindcar_request<T: Serialize + std::fmt::Debug>(
    client: &HttpClient,
    token: Option<&str>,
    method: &str,
    url: &str,
    body: Option<&T>,
    max_elapsed: Duration,
) -> Result<String> {
    let mut backoff = http_backoff(max_elapsed);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let e = match bindcar_request_internal(client, token, method, url, body).await {
            Ok(response) => {
                if attempt > 1 {
                    debug!(
                        method = %method,
                        url = %url,
                        attempt = attempt,
                        elapsed = ?backoff.elapsed(),
                        "HTTP API call succeeded after retries"
                    );
                }
                return Ok(response);
            }
            Err(e) => e,
        };

        let is_retryable = match e.downcast_ref::<HttpError>() {
            Some(http_err) => is_retryable_http_status(http_err.status),
            None => {
                let error_msg = e.to_string();
                error_msg.contains("Failed to send") || error_msg.contains("connection")
            }
        };

        if !is_retryable {
            debug!(
                method = %method,
                url = %url,
                error = %e,
                "Non-retryable HTTP API error, failing immediately"
            );
            return Err(e);
        }

        match backoff.next_backoff() {
            Some(duration) => {
                warn!(
                    method = %method,
                    url = %url,
                    attempt = attempt,
                    retry_after = ?duration,
                    error = %e,
                    "Retryable HTTP API error, will retry"
                );
                tokio::time::sleep(duration).await;
            }
            None => {
                error!(
                    method = %method,
                    url = %url,
                    attempt = attempt,
                    elapsed = ?backoff.elapsed(),
                    error = %e,
                    "Backoff exhausted, giving up"
                );
                return Err(e.context(format!("Backoff exhausted after {attempt} attempts")));
            }
        }
    }
}

/// One bindcar request without retry.
async fn bindcar_request_internal<T: Serialize + std::fmt::Debug>(
    client: &HttpClient,
    token: Option<&str>,
    method: &str,
    url: &str,
    body: Option<&T>,
) -> Result<String> {
    debug!(
        method = %method,
        url = %url,
        body = ?body,
        auth_enabled = token.is_some(),
        "HTTP API request to bindcar"
    );

    let mut request = match method {
        "GET" => client.get(url),
        "POST" => {
            let mut req = client.post(url);
            if let Some(body_data) = body {
                req = req.json(body_data);
            }
            req
        }
        "DELETE" => client.delete(url),
        _ => anyhow::bail!("Unsupported HTTP method: {method}"),
    };

    if let Some(token_value) = token {
        request = request.header("Authorization", format!("Bearer {token_value}"));
    }

    let response = request
        .send()
        .await
        .context(format!("Failed to send HTTP request to {url}"))?;

    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(HttpError {
            status,
            message: error_text,
        }
        .into());
    }

    let text = response
        .text()
        .await
        .context("Failed to read response body")?;

    debug!(
        method = %method,
        url = %url,
        status = %status,
        response_len = text.len(),
        "HTTP API request successful"
    );

    Ok(text)
}

#[cfg(test)]
#[path = "bind9_tests.rs"]
mod bind9_tests;
