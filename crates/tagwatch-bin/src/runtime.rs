// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client runtime orchestration.
//!
//! ```text
//! params file ──► ClientConfig ──► SessionManager::open
//!                                        │
//!                               Subscription::create
//!                               add_item (per tag) ──► bind
//!                                        │
//!                  ┌─────────────────────┴─────────────────────┐
//!                  ▼                                           ▼
//!           shutdown signal                             delivery fault
//!                  │                                           │
//!                  └──────► close subscription, close session ◄┘
//! ```
//!
//! The runtime owns the session handle for the whole run, so a failed bind
//! or a delivery fault still closes the session before the error is reported.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use tagwatch_config::{load_params, TelemetryConfig};
use tagwatch_opcua::{
    ClientConfig, NodeId, NotificationSink, OpcUaTransport, SessionHandle, SessionManager, Stage,
    StageContext, StageError, Subscription, SubscriptionSettings,
};

use crate::cli::RunArgs;
use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// TelemetryRuntime
// =============================================================================

/// Runs one session with one subscription until shutdown or fault.
pub struct TelemetryRuntime {
    params: TelemetryConfig,
    client: ClientConfig,
    shutdown: ShutdownCoordinator,
}

impl TelemetryRuntime {
    /// Creates a runtime for `params` using `client` settings.
    pub fn new(params: TelemetryConfig, client: ClientConfig) -> Self {
        Self {
            params,
            client,
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Returns the parameter file contents.
    pub fn params(&self) -> &TelemetryConfig {
        &self.params
    }

    /// Returns the client settings.
    pub fn client_config(&self) -> &ClientConfig {
        &self.client
    }

    /// Returns a handle that stops the run when triggered.
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Connects over opc.tcp and prints values to stdout.
    #[cfg(feature = "real-transport")]
    pub async fn run(self) -> BinResult<()> {
        let transport = Arc::new(tagwatch_opcua::UaTcpTransport::new(&self.client)?);
        self.run_with(transport, Arc::new(tagwatch_opcua::ConsoleSink::stdout()))
            .await
    }

    /// Always fails: the binary was built without an OPC UA stack.
    #[cfg(not(feature = "real-transport"))]
    pub async fn run(self) -> BinResult<()> {
        Err(BinError::runtime(
            "built without the 'real-transport' feature; no OPC UA stack available",
        ))
    }

    /// Runs against `transport`, delivering every value to `sink`.
    pub async fn run_with<T: OpcUaTransport>(
        &self,
        transport: Arc<T>,
        sink: Arc<dyn NotificationSink>,
    ) -> BinResult<()> {
        info!(
            version = crate::VERSION,
            server = %self.client.discovery_url,
            tags = self.params.tags.len(),
            "Starting tagwatch"
        );

        let manager = SessionManager::new(self.client.clone(), transport);
        let session = manager.open().await?;
        let endpoint = session.endpoint_url().to_string();

        let streamed = self.stream(&session, &endpoint, sink).await;
        let closed = manager.close(session).await.at_stage(Stage::Close, &endpoint);

        match (streamed, closed) {
            (Err(e), Err(close_error)) => {
                warn!(error = %close_error, "Session close failed after error");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), closed) => {
                closed?;
                info!(
                    opens = manager.stats().opens(),
                    faults = manager.stats().faults(),
                    "tagwatch stopped"
                );
                Ok(())
            }
        }
    }

    /// Binds every tag and streams until shutdown or a delivery fault.
    async fn stream<T: OpcUaTransport>(
        &self,
        session: &SessionHandle<T>,
        endpoint: &str,
        sink: Arc<dyn NotificationSink>,
    ) -> BinResult<()> {
        let mut subscription = Subscription::create(session, self.client.subscription.clone())
            .await
            .at_stage(Stage::Subscribe, endpoint)?;

        for tag in &self.params.tags {
            subscription
                .add_item(&tag.name, &tag.node_address)
                .at_stage(Stage::Bind, endpoint)?;
        }
        subscription.set_default_handler(sink);

        if let Err(e) = subscription.bind().await {
            let error = StageError::new(Stage::Bind, endpoint, e);
            if let Err(close_error) = subscription.close().await {
                warn!(error = %close_error, "Subscription close failed after bind error");
            }
            return Err(error.into());
        }
        info!(
            items = self.params.tags.len(),
            interval = ?self.client.subscription.publishing_interval,
            "Streaming tag values"
        );

        let outcome = tokio::select! {
            _ = self.shutdown.wait_for_shutdown() => Ok(()),
            fault = subscription.delivery_fault() => Err(StageError::new(Stage::Delivery, endpoint, fault)),
        };

        if let Err(e) = subscription.close().await {
            warn!(error = %e, "Subscription close failed");
        }
        outcome.map_err(BinError::from)
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the runtime from CLI input.
pub struct RuntimeBuilder {
    params_path: Option<PathBuf>,
    params: Option<TelemetryConfig>,
    args: RunArgs,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            params_path: None,
            params: None,
            args: RunArgs::default(),
        }
    }

    /// Sets the parameter file path.
    pub fn params_path(mut self, path: impl AsRef<Path>) -> Self {
        self.params_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the parameters directly.
    pub fn params(mut self, params: TelemetryConfig) -> Self {
        self.params = Some(params);
        self
    }

    /// Applies `run` command overrides.
    pub fn run_args(mut self, args: RunArgs) -> Self {
        self.args = args;
        self
    }

    /// Builds the runtime.
    ///
    /// Every node address is parsed here, before any connection is made.
    pub fn build(self) -> BinResult<TelemetryRuntime> {
        let params = match self.params {
            Some(params) => params,
            None => {
                let path = self
                    .params_path
                    .ok_or_else(|| BinError::runtime("No parameter file provided"))?;
                load_params(&path)?
            }
        };

        check_node_addresses(&params)?;
        let client = client_config(&params, &self.args)?;
        Ok(TelemetryRuntime::new(params, client))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fails on the first tag whose node address does not parse.
pub fn check_node_addresses(params: &TelemetryConfig) -> BinResult<()> {
    for tag in &params.tags {
        tag.node_address
            .parse::<NodeId>()
            .map_err(|e| BinError::from(e).with_context(format!("tag '{}'", tag.name)))?;
    }
    Ok(())
}

/// Maps parameters and `run` overrides to client settings.
pub fn client_config(params: &TelemetryConfig, args: &RunArgs) -> BinResult<ClientConfig> {
    let mut builder = ClientConfig::builder()
        .discovery_url(params.discovery_url())
        .auto_accept_untrusted(args.auto_accept_untrusted)
        .generate_certificate(args.generate_certificate);

    if let Some(dir) = &args.pki_dir {
        builder = builder.pki_dir(dir.clone());
    }
    if let Some(interval) = args.publishing_interval {
        builder = builder.subscription(SubscriptionSettings::with_interval(interval));
    }
    if let Some(timeout) = args.session_timeout {
        builder = builder.session_timeout(timeout);
    }
    if let Some(timeout) = args.operation_timeout {
        builder = builder.operation_timeout(timeout);
    }
    if let Some(timeout) = args.discovery_timeout {
        builder = builder.discovery_timeout(timeout);
    }

    Ok(builder.build()?)
}

// =============================================================================
// Tests
// =============================================================================
