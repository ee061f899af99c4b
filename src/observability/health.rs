//! Health check HTTP routes for container orchestration
//!
//! `/health`, `/ready`, `/live`, `/metrics` and `/` are served next to the
//! detection API on the same listener. [`HealthServer::routes`] returns a
//! warp filter so the HTTP layer can combine it with the API routes.

use crate::health::HealthCheckManager;
use crate::observability::metrics::metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// No request for this long reports the service as idle (not unhealthy).
const REQUEST_IDLE_THRESHOLD_SECONDS: u64 = 300;

/// Health, readiness and liveness probes
pub struct HealthServer {
    service_id: String,
    checks: HealthCheckManager,
}

impl HealthServer {
    pub fn new(service_id: impl Into<String>, checks: HealthCheckManager) -> Self {
        Self {
            service_id: service_id.into(),
            checks,
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Probe routes as a warp filter
    pub fn routes(
        self: &Arc<Self>,
    ) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let health_server = self.clone();
        let ready_server = self.clone();

        // GET /health - component checks plus request activity
        let health_route = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let server = health_server.clone();
                async move {
                    let status = server.get_health_status().await;
                    let code = if status.status == "healthy" {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&status), code))
                }
            });

        // GET /metrics - complete metrics export
        let metrics_route = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| warp::reply::json(&metrics().get_metrics()));

        // GET /ready - every component check passes
        let ready_route = warp::path("ready")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let server = ready_server.clone();
                async move {
                    let ready = server.checks.calculate_overall_health().await;
                    let response = ReadinessResponse {
                        ready,
                        timestamp: current_timestamp(),
                    };
                    let code = if ready {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(
                        warp::reply::json(&response),
                        code,
                    ))
                }
            });

        // GET /live - the process answers
        let live_route = warp::path("live")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| {
                warp::reply::json(&LivenessResponse {
                    alive: true,
                    timestamp: current_timestamp(),
                })
            });

        // GET / - endpoint index
        let root_route = warp::path::end().and(warp::get()).map(|| {
            let mut endpoints = HashMap::new();
            endpoints.insert("/mutant", "POST a DNA grid for classification");
            endpoints.insert("/stats", "Mutant and human counts with their ratio");
            endpoints.insert("/health", "Overall health status with detailed checks");
            endpoints.insert("/metrics", "Detection, persistence and bus metrics");
            endpoints.insert("/ready", "Readiness probe for Kubernetes");
            endpoints.insert("/live", "Liveness probe for Kubernetes");
            warp::reply::json(&ApiDocumentationResponse { endpoints })
        });

        health_route
            .or(metrics_route)
            .or(ready_route)
            .or(live_route)
            .or(root_route)
    }

    async fn get_health_status(&self) -> HealthStatus {
        let now = current_timestamp();
        let mut checks = HashMap::new();

        for result in self.checks.run_health_checks().await {
            checks.insert(
                result.component,
                HealthCheck {
                    status: if result.healthy { "healthy" } else { "unhealthy" }.to_string(),
                    message: result.message,
                    last_check: now,
                },
            );
        }

        checks.insert(
            "request_activity".to_string(),
            request_activity_check(metrics().seconds_since_last_request(), now),
        );

        // Idle is informational; only failing components degrade the service
        let overall_healthy = checks.values().all(|check| check.status != "unhealthy");
        metrics().update_health_status(overall_healthy);

        HealthStatus {
            status: if overall_healthy { "healthy" } else { "degraded" }.to_string(),
            timestamp: now,
            service_id: self.service_id.clone(),
            uptime_seconds: metrics().get_metrics().lifecycle.uptime_seconds,
            checks,
        }
    }
}

fn request_activity_check(seconds_since_last_request: Option<u64>, now: u64) -> HealthCheck {
    match seconds_since_last_request {
        None => HealthCheck {
            status: "healthy".to_string(),
            message: Some("No requests received yet".to_string()),
            last_check: now,
        },
        Some(idle) if idle > REQUEST_IDLE_THRESHOLD_SECONDS => HealthCheck {
            status: "idle".to_string(),
            message: Some(format!("No requests for {idle} seconds")),
            last_check: now,
        },
        Some(_) => HealthCheck {
            status: "healthy".to_string(),
            message: Some("Recent request activity".to_string()),
            last_check: now,
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub last_check: u64,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: String,
    timestamp: u64,
    service_id: String,
    uptime_seconds: u64,
    checks: HashMap<String, HealthCheck>,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct ApiDocumentationResponse {
    endpoints: HashMap<&'static str, &'static str>,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{BusHealthCheck, StoreHealthCheck};
    use crate::testing::mocks::{MockPublisher, MockStore};

    fn server_with(publisher: Arc<MockPublisher>, store: Arc<MockStore>) -> Arc<HealthServer> {
        let mut checks = HealthCheckManager::new();
        checks.add_health_check(Box::new(BusHealthCheck::new(publisher)));
        checks.add_health_check(Box::new(StoreHealthCheck::new(store)));
        Arc::new(HealthServer::new("test-detector", checks))
    }

    #[test]
    fn test_request_activity_check() {
        let now = current_timestamp();

        assert_eq!(request_activity_check(None, now).status, "healthy");
        assert_eq!(request_activity_check(Some(10), now).status, "healthy");

        let idle = request_activity_check(Some(600), now);
        assert_eq!(idle.status, "idle");
        assert_eq!(idle.message.as_deref(), Some("No requests for 600 seconds"));
    }

    #[tokio::test]
    async fn test_overall_health_status() {
        let publisher = Arc::new(MockPublisher::new());
        let server = server_with(publisher.clone(), Arc::new(MockStore::new()));

        let status = server.get_health_status().await;
        assert_eq!(status.status, "healthy");
        assert_eq!(status.service_id, "test-detector");
        assert!(status.checks.contains_key("message_bus"));
        assert!(status.checks.contains_key("store"));
        assert!(status.checks.contains_key("request_activity"));

        publisher.set_connected(false);
        let status = server.get_health_status().await;
        assert_eq!(status.status, "degraded");
        assert_eq!(status.checks["message_bus"].status, "unhealthy");
    }

    #[tokio::test]
    async fn test_health_route_status_codes() {
        let publisher = Arc::new(MockPublisher::new());
        let server = server_with(publisher.clone(), Arc::new(MockStore::new()));
        let routes = server.routes();

        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        publisher.set_connected(false);
        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_ready_follows_component_checks() {
        let store = Arc::new(MockStore::new());
        let server = server_with(Arc::new(MockPublisher::new()), store.clone());
        let routes = server.routes();

        let response = warp::test::request().path("/ready").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);

        store.set_failing(true);
        let response = warp::test::request().path("/ready").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["ready"], false);
    }

    #[tokio::test]
    async fn test_live_metrics_and_index() {
        let server = Arc::new(HealthServer::new("test-detector", HealthCheckManager::new()));
        let routes = server.routes();

        let response = warp::test::request().path("/live").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["alive"], true);

        let response = warp::test::request().path("/metrics").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert!(body.get("detection").is_some());
        assert!(body.get("persistence").is_some());

        let response = warp::test::request().path("/").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert!(body["endpoints"].get("/mutant").is_some());
    }
}
