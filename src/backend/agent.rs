// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zone agent driver.
//!
//! Create and delete are private-OPCODE DNS messages (see [`crate::dns::opcode`]);
//! the agent then pulls content from its own configured masters. Update is a
//! plain NOTIFY, also sent after a successful create.
//!
//! # Options
//!
//! | key | required | meaning |
//! |---|---|---|
//! | `host` | yes | agent IP address |
//! | `port` | no | agent port, default 5358 |

use super::registry::BackendSettings;
use super::Backend;
use crate::constants::DEFAULT_AGENT_PORT;
use crate::context::RequestContext;
use crate::dns::client::duration_millis;
use crate::dns::opcode::{send_agent_command, AgentCommand};
use crate::dns::{DnsQuerier, HickoryDnsClient, Transport};
use crate::errors::{BackendError, QueryError};
use crate::model::{Domain, PoolTarget};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// rcode an agent returns when asked to create a zone it already serves
const RCODE_YXDOMAIN: &str = "6";

/// rcode an agent returns when asked to delete a zone it does not serve
const RCODE_NXDOMAIN: &str = "3";

/// Driver for one zone agent.
#[derive(Debug, Clone)]
pub struct AgentBackend {
    target_id: Uuid,
    agent: SocketAddr,
    transport: Transport,
    timeout: Duration,
    querier: Arc<dyn DnsQuerier>,
}

impl AgentBackend {
    /// Registry tag.
    pub const TYPE: &'static str = "agent";

    /// Build the driver from a target's options.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidConfiguration`] if `host` is missing or
    /// `host`/`port` do not form a socket address.
    pub fn from_target(
        target: &PoolTarget,
        settings: &BackendSettings,
    ) -> Result<Self, BackendError> {
        let invalid = |reason: String| BackendError::InvalidConfiguration {
            target: format!("{}({})", Self::TYPE, target.id),
            reason,
        };

        let host: IpAddr = target
            .option("host")
            .ok_or_else(|| invalid("missing option 'host'".to_string()))?
            .parse()
            .map_err(|e| invalid(format!("option 'host' is not an IP address: {e}")))?;
        let port = match target.option("port") {
            Some(port) => port
                .parse::<u16>()
                .map_err(|e| invalid(format!("option 'port' is not a port number: {e}")))?,
            None => DEFAULT_AGENT_PORT,
        };

        Ok(Self {
            target_id: target.id,
            agent: SocketAddr::new(host, port),
            transport: settings.transport,
            timeout: settings.dns_timeout,
            querier: Arc::new(HickoryDnsClient::new(settings.transport)),
        })
    }

    /// Replace the DNS client used for NOTIFY.
    #[must_use]
    pub fn with_querier(mut self, querier: Arc<dyn DnsQuerier>) -> Self {
        self.querier = querier;
        self
    }

    async fn command(&self, zone: &Domain, command: AgentCommand) -> Result<(), BackendError> {
        send_agent_command(self.transport, self.agent, &zone.name, command, self.timeout)
            .await
            .map_err(|e| self.map_query_error(e, zone, command))
    }

    fn map_query_error(&self, e: QueryError, zone: &Domain, command: AgentCommand) -> BackendError {
        match e {
            QueryError::NotAuthoritative { ref rcode, .. }
                if command == AgentCommand::Create && rcode == RCODE_YXDOMAIN =>
            {
                BackendError::ZoneAlreadyExists {
                    zone: zone.name.clone(),
                    target: self.describe(),
                }
            }
            QueryError::NotAuthoritative { ref rcode, .. }
                if command == AgentCommand::Delete && rcode == RCODE_NXDOMAIN =>
            {
                BackendError::ZoneNotFound {
                    zone: zone.name.clone(),
                    target: self.describe(),
                }
            }
            QueryError::NotAuthoritative { .. } | QueryError::InvalidName { .. } => {
                BackendError::Rejected {
                    target: self.describe(),
                    zone: zone.name.clone(),
                    reason: e.to_string(),
                }
            }
            QueryError::Timeout { .. } => BackendError::Timeout {
                target: self.describe(),
                timeout_ms: duration_millis(self.timeout),
            },
            QueryError::BadResponse { .. } | QueryError::Connection { .. } => {
                BackendError::Unavailable {
                    target: self.describe(),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn notify(&self, zone: &Domain) -> Result<(), BackendError> {
        self.querier
            .send_notify(self.agent, &zone.name, self.timeout)
            .await
            .map_err(|e| BackendError::Unavailable {
                target: self.describe(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Backend for AgentBackend {
    fn backend_type(&self) -> &'static str {
        Self::TYPE
    }

    fn describe(&self) -> String {
        format!("{}({})", Self::TYPE, self.agent)
    }

    async fn create_zone(&self, ctx: &RequestContext, zone: &Domain) -> Result<(), BackendError> {
        self.command(zone, AgentCommand::Create).await?;
        info!(
            zone = %zone.name,
            target = %self.describe(),
            target_id = %self.target_id,
            request_id = %ctx.request_id,
            "Agent created zone"
        );

        if let Err(e) = self.notify(zone).await {
            warn!(zone = %zone.name, target = %self.describe(), error = %e, "NOTIFY after agent create failed");
        }
        Ok(())
    }

    async fn update_zone(&self, _ctx: &RequestContext, zone: &Domain) -> Result<(), BackendError> {
        self.notify(zone).await
    }

    async fn delete_zone(&self, ctx: &RequestContext, zone: &Domain) -> Result<(), BackendError> {
        self.command(zone, AgentCommand::Delete).await?;
        info!(
            zone = %zone.name,
            target = %self.describe(),
            request_id = %ctx.request_id,
            "Agent deleted zone"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod agent_tests;
