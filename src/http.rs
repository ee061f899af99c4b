//! HTTP API
//!
//! `POST /mutant` answers 200 for a mutant and 403 for a human, `GET /stats`
//! answers the counters as JSON. Error responses carry only the status
//! reason phrase; details go to the log. The probe routes from
//! [`HealthServer`] are served on the same listener.

use crate::dna::DnaKind;
use crate::error::{DetectorError, DetectorResult};
use crate::observability::health::HealthServer;
use crate::observability::metrics::metrics;
use crate::service::{DetectionService, StatsService};
use bytes::Bytes;
use serde::Deserialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// Largest accepted `POST /mutant` body
const MAX_BODY_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct MutantRequest {
    dna: Vec<String>,
}

pub struct HttpServer {
    detection: DetectionService,
    stats: StatsService,
    health: Arc<HealthServer>,
}

impl HttpServer {
    pub fn new(detection: DetectionService, stats: StatsService, health: Arc<HealthServer>) -> Self {
        Self {
            detection,
            stats,
            health,
        }
    }

    /// API and probe routes
    pub fn routes(
        self: &Arc<Self>,
    ) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let mutant_server = self.clone();
        let stats_server = self.clone();

        // POST /mutant - classify one sample
        let mutant_route = warp::path("mutant")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::header::optional::<String>("content-type"))
            .and(warp::body::content_length_limit(MAX_BODY_BYTES))
            .and(warp::body::bytes())
            .and_then(move |content_type: Option<String>, body: Bytes| {
                let server = mutant_server.clone();
                async move {
                    let span = crate::request_span!(method = "POST", path = "/mutant");
                    let status = server
                        .handle_mutant(content_type.as_deref(), &body)
                        .instrument(span)
                        .await;
                    Ok::<_, Infallible>(reason_reply(status))
                }
            })
            .recover(recover_body_rejection)
            .unify();

        // GET /stats - counters and ratio
        let stats_route = warp::path("stats")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let server = stats_server.clone();
                async move {
                    let span = crate::request_span!(method = "GET", path = "/stats");
                    let reply: Box<dyn Reply> = match server.stats.stats().instrument(span).await {
                        Ok(stat) => Box::new(warp::reply::json(&stat)),
                        Err(_) => Box::new(reason_reply(StatusCode::INTERNAL_SERVER_ERROR)),
                    };
                    Ok::<_, Infallible>(reply)
                }
            });

        mutant_route
            .or(stats_route)
            .or(self.health.routes())
            .with(warp::cors().allow_any_origin())
    }

    /// Bind `addr` and serve until `shutdown` resolves
    pub async fn run<F>(self: Arc<Self>, addr: SocketAddr, shutdown: F) -> DetectorResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let routes = self.routes();
        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .map_err(|e| DetectorError::internal(format!("Failed to bind {addr}: {e}")))?;

        info!("HTTP server listening on {}", bound);
        server.await;
        info!("HTTP server stopped");
        Ok(())
    }

    async fn handle_mutant(&self, content_type: Option<&str>, body: &[u8]) -> StatusCode {
        if !is_json_content_type(content_type) {
            let collector = metrics();
            collector.request_received();
            collector.request_rejected();
            debug!(content_type = ?content_type, "Rejected non-JSON request");
            return StatusCode::NOT_ACCEPTABLE;
        }

        let dna = match parse_mutant_request(body) {
            Ok(dna) => dna,
            Err(e) => {
                let collector = metrics();
                collector.request_received();
                collector.request_rejected();
                debug!(error = %e, "Rejected malformed request body");
                return StatusCode::BAD_REQUEST;
            }
        };

        match self.detection.detect(dna).await {
            Ok(kind) => kind_status(kind),
            Err(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Err(e) => {
                warn!(error = %e.sanitized(), "Detection failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// `application/json`, with or without parameters such as `charset`
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

fn parse_mutant_request(body: &[u8]) -> DetectorResult<Vec<String>> {
    serde_json::from_slice::<MutantRequest>(body)
        .map(|request| request.dna)
        .map_err(|e| DetectorError::invalid_input(e.to_string()))
}

pub fn kind_status(kind: DnaKind) -> StatusCode {
    match kind {
        DnaKind::Mutant => StatusCode::OK,
        DnaKind::Human => StatusCode::FORBIDDEN,
    }
}

/// Missing or oversized `Content-Length` answers 400 like any other bad body
async fn recover_body_rejection(
    rejection: Rejection,
) -> Result<warp::reply::WithStatus<String>, Rejection> {
    if rejection.find::<warp::reject::LengthRequired>().is_some()
        || rejection.find::<warp::reject::PayloadTooLarge>().is_some()
    {
        let collector = metrics();
        collector.request_received();
        collector.request_rejected();
        debug!("Rejected request body without an acceptable length");
        return Ok(reason_reply(StatusCode::BAD_REQUEST));
    }
    Err(rejection)
}

fn reason_reply(status: StatusCode) -> warp::reply::WithStatus<String> {
    let reason = status.canonical_reason().unwrap_or_default().to_string();
    warp::reply::with_status(reason, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dna::SequenceClassifier;
    use crate::health::HealthCheckManager;
    use crate::service::Dispatcher;
    use crate::testing::mocks::MockStore;

    fn server(store: Arc<MockStore>) -> Arc<HttpServer> {
        let detection = DetectionService::new(
            SequenceClassifier::default(),
            Dispatcher::Direct(store.clone()),
        );
        let stats = StatsService::new(store);
        let health = Arc::new(HealthServer::new("test-detector", HealthCheckManager::new()));
        Arc::new(HttpServer::new(detection, stats, health))
    }

    #[test]
    fn test_json_content_type() {
        assert!(is_json_content_type(Some("application/json")));
        assert!(is_json_content_type(Some("application/json; charset=utf-8")));
        assert!(is_json_content_type(Some("Application/JSON")));
        assert!(!is_json_content_type(Some("text/plain")));
        assert!(!is_json_content_type(Some("application/jsonp")));
        assert!(!is_json_content_type(None));
    }

    #[test]
    fn test_reason_reply_body() {
        let response = reason_reply(StatusCode::FORBIDDEN).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_parse_mutant_request() {
        let dna = parse_mutant_request(br#"{"dna": ["ACGT", "TGCA"]}"#).unwrap();
        assert_eq!(dna, vec!["ACGT", "TGCA"]);

        assert!(parse_mutant_request(b"{").is_err());
        assert!(parse_mutant_request(br#"{"sequence": []}"#).is_err());
        assert!(parse_mutant_request(br#"{"dna": "ACGT"}"#).is_err());
    }

    #[tokio::test]
    async fn test_mutant_route_statuses() {
        let routes = server(Arc::new(MockStore::new())).routes();

        let response = warp::test::request()
            .method("POST")
            .path("/mutant")
            .header("content-type", "application/json")
            .body(r#"{"dna":["ATGCGA","CAGTGC","TTATGT","AGAAGG","CCCCTA","TCACTG"]}"#)
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "OK");

        let response = warp::test::request()
            .method("POST")
            .path("/mutant")
            .header("content-type", "application/json")
            .body(r#"{"dna":["ATGCGA","CAGTGC","TTATTT","AGACGG","GCGTCA","TCACTG"]}"#)
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.body(), "Forbidden");
    }

    #[tokio::test]
    async fn test_mutant_body_without_length_is_bad_request() {
        let store = Arc::new(MockStore::new());
        let routes = server(store.clone()).routes();

        // No body means no Content-Length header, as with a chunked upload
        let response = warp::test::request()
            .method("POST")
            .path("/mutant")
            .header("content-type", "application/json")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), "Bad Request");

        let oversized = vec![b'A'; MAX_BODY_BYTES as usize + 1];
        let response = warp::test::request()
            .method("POST")
            .path("/mutant")
            .header("content-type", "application/json")
            .body(oversized)
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), "Bad Request");
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_other_routes_unaffected_by_body_recovery() {
        let routes = server(Arc::new(MockStore::new())).routes();

        let response = warp::test::request()
            .method("GET")
            .path("/stats")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = warp::test::request().path("/nowhere").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stats_route_failure_is_reason_phrase() {
        let routes = server(Arc::new(MockStore::with_failure())).routes();

        let response = warp::test::request()
            .method("GET")
            .path("/stats")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), "Internal Server Error");
    }
}
