//! Delivery of audit events to configured SIEM endpoints.
//!
//! One call delivers one event to every enabled, matching integration,
//! sequentially and without retries. Each attempt produces a
//! [`DeliveryRecord`]; persistent failures surface through per-integration
//! health counters rather than blocking the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;

use crate::egress::EgressClient;
use crate::secrets::{ResolveOptions, SecretResolver};
use crate::validation::{UrlValidationOptions, validate_external_url};

use super::{AuditEvent, SiemAuthType, SiemFormat, SiemIntegration, format_event};

const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub integration_id: String,
    pub integration_name: String,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationHealth {
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
}

struct DeliveryFailure {
    status: Option<u16>,
    reason: String,
}

impl DeliveryFailure {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            status: None,
            reason: reason.into(),
        }
    }
}

pub struct SiemForwarder {
    egress: Arc<EgressClient>,
    secrets: Arc<SecretResolver>,
    allow_local: bool,
    geo_lookup_enabled: bool,
    health: DashMap<String, IntegrationHealth>,
}

impl SiemForwarder {
    pub fn new(
        egress: Arc<EgressClient>,
        secrets: Arc<SecretResolver>,
        allow_local: bool,
        geo_lookup_enabled: bool,
    ) -> Self {
        Self {
            egress,
            secrets,
            allow_local,
            geo_lookup_enabled,
            health: DashMap::new(),
        }
    }

    /// Deliver one event to every enabled, matching integration, in order.
    pub async fn forward_event(
        &self,
        event: &AuditEvent,
        integrations: &[SiemIntegration],
    ) -> Vec<DeliveryRecord> {
        let mut event = event.clone();
        if !self.geo_lookup_enabled {
            event.geo = None;
        }

        let mut records = Vec::new();
        for integration in integrations {
            if !integration.enabled {
                continue;
            }
            if !matches_filters(&event, integration) {
                continue;
            }
            records.push(self.deliver(&event, integration).await);
        }
        records
    }

    pub fn health(&self, integration_id: &str) -> Option<IntegrationHealth> {
        self.health.get(integration_id).map(|h| h.clone())
    }

    async fn deliver(&self, event: &AuditEvent, integration: &SiemIntegration) -> DeliveryRecord {
        let started = Instant::now();
        let outcome = self.try_deliver(event, integration).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(status) => {
                self.mark_success(&integration.id);
                tracing::info!(
                    integration = %integration.name,
                    status,
                    latency_ms,
                    "audit event forwarded"
                );
                DeliveryRecord {
                    integration_id: integration.id.clone(),
                    integration_name: integration.name.clone(),
                    success: true,
                    latency_ms,
                    response_status: Some(status),
                    error: None,
                }
            }
            Err(failure) => {
                let consecutive_failures = self.mark_failure(&integration.id);
                tracing::warn!(
                    integration = %integration.name,
                    error = %failure.reason,
                    consecutive_failures,
                    latency_ms,
                    "audit event delivery failed"
                );
                DeliveryRecord {
                    integration_id: integration.id.clone(),
                    integration_name: integration.name.clone(),
                    success: false,
                    latency_ms,
                    response_status: failure.status,
                    error: Some(failure.reason),
                }
            }
        }
    }

    async fn try_deliver(
        &self,
        event: &AuditEvent,
        integration: &SiemIntegration,
    ) -> Result<u16, DeliveryFailure> {
        let target = validate_external_url(
            &integration.endpoint_url,
            UrlValidationOptions {
                allow_local: self.allow_local,
            },
        )
        .map_err(|err| DeliveryFailure::new(format!("endpoint rejected: {err}")))?;

        let body = format_event(event, integration);
        let http = self
            .egress
            .client_for(&target)
            .map_err(|err| DeliveryFailure::new(err.to_string()))?;

        let content_type = match integration.format {
            SiemFormat::Json => "application/json",
            _ => "text/plain",
        };
        let mut request = http
            .post(target.as_str())
            .timeout(FORWARD_TIMEOUT)
            .header(CONTENT_TYPE, content_type);
        request = self.apply_auth(request, integration).await?;

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|err| DeliveryFailure::new(err.to_string()))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            Ok(status)
        } else {
            Err(DeliveryFailure {
                status: Some(status),
                reason: format!("endpoint returned {status}"),
            })
        }
    }

    async fn apply_auth(
        &self,
        request: reqwest::RequestBuilder,
        integration: &SiemIntegration,
    ) -> Result<reqwest::RequestBuilder, DeliveryFailure> {
        if integration.auth_type == SiemAuthType::None {
            return Ok(request);
        }

        let secret = self
            .secrets
            .resolve(integration.auth_secret_ref.as_deref(), ResolveOptions::default())
            .await
            .ok_or_else(|| DeliveryFailure::new("auth secret unavailable"))?;

        Ok(match integration.auth_type {
            SiemAuthType::Bearer => request.header(AUTHORIZATION, format!("Bearer {secret}")),
            SiemAuthType::Basic => request.header(AUTHORIZATION, format!("Basic {secret}")),
            SiemAuthType::ApiKey => {
                let header = integration
                    .auth_header
                    .as_deref()
                    .filter(|h| !h.trim().is_empty())
                    .unwrap_or(DEFAULT_API_KEY_HEADER);
                request.header(header, secret)
            }
            SiemAuthType::None => request,
        })
    }

    fn mark_success(&self, integration_id: &str) {
        let mut health = self.health.entry(integration_id.to_string()).or_default();
        health.consecutive_failures = 0;
        health.last_success = Some(Utc::now());
    }

    fn mark_failure(&self, integration_id: &str) -> u32 {
        let mut health = self.health.entry(integration_id.to_string()).or_default();
        health.consecutive_failures += 1;
        health.last_failure = Some(Utc::now());
        health.consecutive_failures
    }
}

fn matches_filters(event: &AuditEvent, integration: &SiemIntegration) -> bool {
    let entity_ok = integration
        .entity_filter
        .as_ref()
        .is_none_or(|allowed| allowed.is_empty() || allowed.contains(&event.entity_type));
    let action_ok = integration
        .action_filter
        .as_ref()
        .is_none_or(|allowed| allowed.is_empty() || allowed.contains(&event.action));
    entity_ok && action_ok
}
