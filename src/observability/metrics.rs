//! Thread-safe metrics collection
//!
//! Atomic counters for the hot paths (requests, classifications, bus
//! traffic, persistence) and a bounded, mutex-protected window of request
//! processing times for latency percentiles.

use crate::dna::DnaKind;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Processing-time samples kept for percentiles
const PROCESSING_WINDOW: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

pub struct MetricsCollector {
    // Detection
    requests_received: AtomicU64,
    mutants_detected: AtomicU64,
    humans_detected: AtomicU64,
    requests_rejected: AtomicU64,
    requests_failed: AtomicU64,
    last_request_at: AtomicU64,

    // Persistence
    records_persisted: AtomicU64,
    duplicates_skipped: AtomicU64,
    persist_failures: AtomicU64,

    // MQTT
    mqtt_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
    messages_received: AtomicU64,
    connection_start_time: AtomicU64,

    processing_times: Mutex<VecDeque<u64>>, // microseconds

    // Lifecycle
    uptime_start: AtomicU64,
    health_status: AtomicBool,
    last_health_check: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let now = current_timestamp();
        Self {
            requests_received: AtomicU64::new(0),
            mutants_detected: AtomicU64::new(0),
            humans_detected: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            last_request_at: AtomicU64::new(0),
            records_persisted: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            mqtt_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            processing_times: Mutex::new(VecDeque::with_capacity(PROCESSING_WINDOW)),
            uptime_start: AtomicU64::new(now),
            health_status: AtomicBool::new(true),
            last_health_check: AtomicU64::new(now),
        }
    }

    // Detection metrics
    pub fn request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
        self.last_request_at
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn classification_completed(&self, kind: DnaKind, duration: Duration) {
        let counter = match kind {
            DnaKind::Mutant => &self.mutants_detected,
            DnaKind::Human => &self.humans_detected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(duration);
    }

    /// Client error: wrong content type, bad JSON, bad alphabet
    pub fn request_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Server-side failure after classification (dispatch or store)
    pub fn request_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_processing_time(&self, duration: Duration) {
        if let Ok(mut times) = self.processing_times.lock() {
            if times.len() == PROCESSING_WINDOW {
                times.pop_front();
            }
            times.push_back(duration.as_micros() as u64);
        }
    }

    /// Seconds since the last request, None if there has been none
    pub fn seconds_since_last_request(&self) -> Option<u64> {
        match self.last_request_at.load(Ordering::Relaxed) {
            0 => None,
            at => Some(current_timestamp().saturating_sub(at)),
        }
    }

    // Persistence metrics
    pub fn record_persisted(&self) {
        self.records_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate_skipped(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn persist_failed(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    // MQTT metrics
    pub fn mqtt_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn mqtt_connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connection_lost();
    }

    pub fn mqtt_connection_lost(&self) {
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn mqtt_message_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_health_status(&self, healthy: bool) {
        self.health_status.store(healthy, Ordering::Relaxed);
        self.last_health_check
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Reset everything (tests)
    pub fn reset(&self) {
        for counter in [
            &self.requests_received,
            &self.mutants_detected,
            &self.humans_detected,
            &self.requests_rejected,
            &self.requests_failed,
            &self.last_request_at,
            &self.records_persisted,
            &self.duplicates_skipped,
            &self.persist_failures,
            &self.connection_attempts,
            &self.connections_established,
            &self.connection_failures,
            &self.messages_published,
            &self.publish_failures,
            &self.messages_received,
            &self.connection_start_time,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.mqtt_connected.store(false, Ordering::Relaxed);

        let now = current_timestamp();
        self.uptime_start.store(now, Ordering::Relaxed);
        self.health_status.store(true, Ordering::Relaxed);
        self.last_health_check.store(now, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.lock() {
            times.clear();
        }
    }

    /// (avg, p50, p95, p99) in milliseconds
    fn processing_time_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.processing_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted: Vec<u64> = times.iter().copied().collect();
        sorted.sort_unstable();
        let to_ms = |micros: f64| micros / 1000.0;

        let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
        (
            to_ms(avg),
            to_ms(percentile(&sorted, 50.0)),
            to_ms(percentile(&sorted, 95.0)),
            to_ms(percentile(&sorted, 99.0)),
        )
    }

    fn connection_duration(&self, now: u64) -> u64 {
        if !self.mqtt_connected.load(Ordering::Relaxed) {
            return 0;
        }
        match self.connection_start_time.load(Ordering::Relaxed) {
            0 => 0,
            start => now.saturating_sub(start),
        }
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg, p50, p95, p99) = self.processing_time_statistics();

        MetricsSnapshot {
            detection: DetectionMetrics {
                requests_received: self.requests_received.load(Ordering::Relaxed),
                mutants_detected: self.mutants_detected.load(Ordering::Relaxed),
                humans_detected: self.humans_detected.load(Ordering::Relaxed),
                requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
                requests_failed: self.requests_failed.load(Ordering::Relaxed),
                avg_processing_time_ms: avg,
                processing_time_p50_ms: p50,
                processing_time_p95_ms: p95,
                processing_time_p99_ms: p99,
            },
            persistence: PersistenceMetrics {
                records_persisted: self.records_persisted.load(Ordering::Relaxed),
                duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
                persist_failures: self.persist_failures.load(Ordering::Relaxed),
            },
            mqtt: MqttMetrics {
                connected: self.mqtt_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                messages_published: self.messages_published.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
                messages_received: self.messages_received.load(Ordering::Relaxed),
                connection_duration_seconds: self.connection_duration(now),
            },
            lifecycle: LifecycleMetrics {
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
                healthy: self.health_status.load(Ordering::Relaxed),
                last_health_check: self.last_health_check.load(Ordering::Relaxed),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub detection: DetectionMetrics,
    pub persistence: PersistenceMetrics,
    pub mqtt: MqttMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct DetectionMetrics {
    pub requests_received: u64,
    pub mutants_detected: u64,
    pub humans_detected: u64,
    pub requests_rejected: u64,
    pub requests_failed: u64,
    pub avg_processing_time_ms: f64,
    pub processing_time_p50_ms: f64,
    pub processing_time_p95_ms: f64,
    pub processing_time_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct PersistenceMetrics {
    pub records_persisted: u64,
    pub duplicates_skipped: u64,
    pub persist_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct MqttMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub messages_received: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub uptime_seconds: u64,
    pub healthy: bool,
    pub last_health_check: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = sorted_data[index.floor() as usize] as f64;
    let upper = sorted_data[index.ceil() as usize] as f64;
    lower + (upper - lower) * index.fract()
}
