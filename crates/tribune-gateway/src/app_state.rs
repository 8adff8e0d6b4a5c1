//! Shared application state for the relay gateway.

use std::sync::Arc;

use tribune_core::error::Result;

use crate::collab::Collaborators;
use crate::config::GatewayConfig;
use crate::obs::RelayMetrics;
use crate::realtime::{ConnectionRegistry, MessageRelay, RelaySettings};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    collab: Collaborators,
    registry: Arc<ConnectionRegistry>,
    relay: Arc<MessageRelay>,
    metrics: Arc<RelayMetrics>,
}

impl AppState {
    /// Build state with collaborators chosen by config.
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        let collab = Collaborators::from_config(&cfg.auth, &cfg.directory)?;
        Self::with_collaborators(cfg, collab)
    }

    /// Build state around caller-supplied collaborators.
    pub fn with_collaborators(cfg: GatewayConfig, collab: Collaborators) -> Result<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(RelayMetrics::default());

        let settings = RelaySettings {
            echo: cfg.relay.echo,
            typing_window: cfg.relay.typing_timeout(),
            write_timeout: cfg.gateway.write_timeout(),
        };
        let relay = Arc::new(MessageRelay::new(
            Arc::clone(&registry),
            &collab,
            settings,
            Arc::clone(&metrics),
        )?);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                collab,
                registry,
                relay,
                metrics,
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.inner.collab
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn relay(&self) -> Arc<MessageRelay> {
        Arc::clone(&self.inner.relay)
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.inner.metrics)
    }
}
