//! Health check system for production monitoring
//!
//! Component checks for the message bus and the store. The HTTP probe
//! routes in `observability::health` aggregate them.

use crate::storage::DnaStore;
use crate::transport::Publisher;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Health check result
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub component: String,
    pub healthy: bool,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
}

/// Trait for components that can be health checked
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Perform health check on this component
    async fn health_check(&self) -> HealthCheckResult;

    /// Get the component name for reporting
    fn component_name(&self) -> &str;
}

/// Message bus health check
pub struct BusHealthCheck {
    publisher: Arc<dyn Publisher>,
}

impl BusHealthCheck {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl HealthCheck for BusHealthCheck {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let healthy = self.publisher.is_connected();
        let response_time_ms = start.elapsed().as_millis() as u64;

        let message = if healthy {
            format!("{} bus connected", self.publisher.name())
        } else {
            format!("{} bus not connected", self.publisher.name())
        };

        debug!(
            "Bus health check: healthy={}, bus={}, response_time={}ms",
            healthy,
            self.publisher.name(),
            response_time_ms
        );

        HealthCheckResult {
            component: self.component_name().to_string(),
            healthy,
            message: Some(message),
            response_time_ms: Some(response_time_ms),
        }
    }

    fn component_name(&self) -> &str {
        "message_bus"
    }
}

/// Store health check, backed by [`DnaStore::ping`]
pub struct StoreHealthCheck {
    store: Arc<dyn DnaStore>,
}

impl StoreHealthCheck {
    pub fn new(store: Arc<dyn DnaStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthCheck for StoreHealthCheck {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let component = self.component_name().to_string();
        let backend = self.store.backend_name().to_string();

        match self.store.ping().await {
            Ok(()) => {
                let response_time_ms = start.elapsed().as_millis() as u64;
                debug!(
                    "Store health check: healthy=true, backend={}, response_time={}ms",
                    backend, response_time_ms
                );

                HealthCheckResult {
                    component,
                    healthy: true,
                    message: Some(format!("{backend} store healthy")),
                    response_time_ms: Some(response_time_ms),
                }
            }
            Err(e) => {
                let response_time_ms = start.elapsed().as_millis() as u64;
                warn!(
                    "Store health check failed: backend={}, error={}, response_time={}ms",
                    backend, e, response_time_ms
                );

                HealthCheckResult {
                    component,
                    healthy: false,
                    message: Some(format!("{backend} store error: {e}")),
                    response_time_ms: Some(response_time_ms),
                }
            }
        }
    }

    fn component_name(&self) -> &str {
        "store"
    }
}

/// Aggregated health check manager
pub struct HealthCheckManager {
    health_checks: Vec<Box<dyn HealthCheck>>,
}

impl HealthCheckManager {
    pub fn new() -> Self {
        Self {
            health_checks: Vec::new(),
        }
    }

    /// Add a health check to the manager
    pub fn add_health_check(&mut self, health_check: Box<dyn HealthCheck>) {
        self.health_checks.push(health_check);
    }

    pub fn len(&self) -> usize {
        self.health_checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.health_checks.is_empty()
    }

    /// Run all health checks and return aggregated results
    pub async fn run_health_checks(&self) -> Vec<HealthCheckResult> {
        let mut results = Vec::with_capacity(self.health_checks.len());

        for health_check in &self.health_checks {
            results.push(health_check.health_check().await);
        }

        results
    }

    /// True when every component is healthy
    pub async fn calculate_overall_health(&self) -> bool {
        let results = self.run_health_checks().await;

        if results.is_empty() {
            debug!("No component health checks configured - assuming healthy");
            return true;
        }

        let healthy_count = results.iter().filter(|r| r.healthy).count();
        let total_count = results.len();
        let overall_healthy = healthy_count == total_count;

        debug!(
            "Overall health check: {}/{} components healthy, overall={}",
            healthy_count, total_count, overall_healthy
        );

        overall_healthy
    }
}

impl Default for HealthCheckManager {
    fn default() -> Self {
        Self::new()
    }
}
