// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Endpoint discovery and selection.
//!
//! ```text
//! discovery URL ──► discover ──► normalize loopback hosts ──► select ──► judge certificate
//!                  (bounded)                                (opc.tcp, by security level)
//! ```

use std::sync::Arc;
use std::time::Duration;

use super::transport::{EndpointCandidate, OpcUaTransport};
use super::trust::CertificateGate;
use crate::error::{ConnectionError, OpcUaResult, Stage, StageContext, StageError, TimeoutError};
use crate::types::{url_host, TransportProfile};

/// Host names that refer to the discovery machine itself.
const LOOPBACK_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];

/// Retrieves candidate endpoints and picks one.
pub struct EndpointResolver<T: OpcUaTransport> {
    transport: Arc<T>,
    discovery_timeout: Duration,
    gate: CertificateGate,
}

impl<T: OpcUaTransport> EndpointResolver<T> {
    /// Creates a resolver.
    pub fn new(transport: Arc<T>, discovery_timeout: Duration, gate: CertificateGate) -> Self {
        Self {
            transport,
            discovery_timeout,
            gate,
        }
    }

    /// Lists the endpoints served at `discovery_url`.
    ///
    /// Loopback hosts in the response are rewritten to the host that was dialed.
    pub async fn discover(&self, discovery_url: &str) -> OpcUaResult<Vec<EndpointCandidate>> {
        tracing::debug!(url = discovery_url, timeout = ?self.discovery_timeout, "Discovering endpoints");

        let candidates = tokio::time::timeout(
            self.discovery_timeout,
            self.transport.discover(discovery_url),
        )
        .await
        .map_err(|_| TimeoutError::discovery(self.discovery_timeout))??;

        let dialed_host = url_host(discovery_url).unwrap_or_default();
        let candidates: Vec<_> = candidates
            .into_iter()
            .enumerate()
            .map(|(index, mut candidate)| {
                candidate.discovery_index = index;
                candidate.endpoint_url = normalize_url(&candidate.endpoint_url, dialed_host);
                for url in candidate.server.discovery_urls.iter_mut() {
                    *url = normalize_url(url, dialed_host);
                }
                candidate
            })
            .collect();

        tracing::debug!(url = discovery_url, count = candidates.len(), "Endpoints discovered");
        Ok(candidates)
    }

    /// Picks the endpoint to use. See [`select_endpoint`].
    pub fn select(
        &self,
        discovery_url: &str,
        candidates: Vec<EndpointCandidate>,
        have_local_certificate: bool,
    ) -> OpcUaResult<EndpointCandidate> {
        select_endpoint(discovery_url, candidates, have_local_certificate)
    }

    /// Discovers, selects and judges the selected endpoint's certificate.
    pub async fn resolve(
        &self,
        discovery_url: &str,
        have_local_certificate: bool,
    ) -> Result<EndpointCandidate, StageError> {
        let candidates = self
            .discover(discovery_url)
            .await
            .at_stage(Stage::Discovery, discovery_url)?;

        let selected = select_endpoint(discovery_url, candidates, have_local_certificate)
            .at_stage(Stage::EndpointSelection, discovery_url)?;

        tracing::info!(
            endpoint = %selected.endpoint_url,
            security_mode = %selected.security_mode,
            security_policy = %selected.security_policy,
            security_level = selected.security_level,
            "Selected endpoint"
        );

        if let Some(cert) = &selected.server_certificate {
            self.gate
                .judge(cert)
                .at_stage(Stage::Trust, &selected.endpoint_url)?;
        }

        Ok(selected)
    }
}

impl<T: OpcUaTransport> std::fmt::Debug for EndpointResolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointResolver")
            .field("discovery_timeout", &self.discovery_timeout)
            .finish_non_exhaustive()
    }
}

/// Picks the endpoint to use.
///
/// Only opc.tcp endpoints qualify. With a local certificate the highest
/// security level wins, without one the lowest. Ties keep discovery order.
pub fn select_endpoint(
    discovery_url: &str,
    candidates: Vec<EndpointCandidate>,
    have_local_certificate: bool,
) -> OpcUaResult<EndpointCandidate> {
    let mut best: Option<EndpointCandidate> = None;

    for candidate in candidates
        .into_iter()
        .filter(|c| c.transport_profile.is_ua_tcp())
    {
        let better = match &best {
            None => true,
            Some(current) if have_local_certificate => {
                candidate.security_level > current.security_level
            }
            Some(current) => candidate.security_level < current.security_level,
        };
        if better {
            best = Some(candidate);
        }
    }

    best.ok_or_else(|| {
        ConnectionError::endpoint_not_found(discovery_url, TransportProfile::UA_TCP_URI).into()
    })
}

/// Rewrites a loopback host in `url` to `dialed_host`, keeping scheme, port and path.
pub fn normalize_url(url: &str, dialed_host: &str) -> String {
    if dialed_host.is_empty() {
        return url.to_string();
    }
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };

    let (authority, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };

    let (host, port) = if authority.starts_with('[') {
        match authority.find(']') {
            Some(end) => authority.split_at(end + 1),
            None => (authority, ""),
        }
    } else {
        match authority.find(':') {
            Some(i) => authority.split_at(i),
            None => (authority, ""),
        }
    };

    if !LOOPBACK_HOSTS.iter().any(|h| h.eq_ignore_ascii_case(host)) {
        return url.to_string();
    }

    let replacement = if dialed_host.contains(':') {
        format!("[{}]", dialed_host)
    } else {
        dialed_host.to_string()
    };
    format!("{}://{}{}{}", scheme, replacement, port, path)
}

// =============================================================================
// Tests
// =============================================================================
