//! Health checks
//!
//! Liveness is unconditional. Readiness probes the metadata database (when
//! configured) and the blob store, with results cached for a short while.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use attic_attachments::BlobStore;
use attic_db::Database;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Blob id probed for readiness; it never has to exist
const PROBE_BLOB_ID: &str = "health-probe";

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }

    fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

/// Individual component health
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Overall health report
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: Vec<ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    pub fn http_status(&self) -> StatusCode {
        match self.status {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Health checker configuration
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Timeout for individual health checks
    pub check_timeout: Duration,
    /// Cache duration for health results
    pub cache_duration: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(5),
            cache_duration: Duration::from_secs(10),
        }
    }
}

struct CachedHealth {
    report: HealthReport,
    cached_at: Instant,
}

/// Health checker service
pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
    cache: RwLock<Option<CachedHealth>>,
    database: Option<Database>,
    blobs: Option<Arc<dyn BlobStore>>,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            cache: RwLock::new(None),
            database: None,
            blobs: None,
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Get cached health or perform checks
    pub async fn check(&self) -> HealthReport {
        {
            let cache = self.cache.read().await;
            if let Some(ref cached) = *cache {
                if cached.cached_at.elapsed() < self.config.cache_duration {
                    debug!("Returning cached health report");
                    return cached.report.clone();
                }
            }
        }

        let report = self.perform_checks().await;

        let mut cache = self.cache.write().await;
        *cache = Some(CachedHealth {
            report: report.clone(),
            cached_at: Instant::now(),
        });

        report
    }

    async fn perform_checks(&self) -> HealthReport {
        let mut components = Vec::new();

        if let Some(ref database) = self.database {
            components.push(self.check_database(database).await);
        }
        if let Some(ref blobs) = self.blobs {
            components.push(self.check_blob_store(blobs.as_ref()).await);
        }

        let status = components
            .iter()
            .fold(HealthStatus::Healthy, |acc, c| acc.worst(c.status));
        if !status.is_healthy() {
            warn!(?components, "Health check failed");
        }

        HealthReport {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            components,
            timestamp: chrono::Utc::now(),
        }
    }

    async fn check_database(&self, database: &Database) -> ComponentHealth {
        let stats = database.stats();
        let details = serde_json::json!({
            "type": "postgresql",
            "pool_size": stats.size,
            "idle_connections": stats.idle,
        });
        self.probe("database", Some(details), database.ping()).await
    }

    async fn check_blob_store(&self, blobs: &dyn BlobStore) -> ComponentHealth {
        let details = serde_json::json!({ "backend": blobs.name() });
        self.probe("blob_store", Some(details), blobs.exists(PROBE_BLOB_ID))
            .await
    }

    async fn probe<T, E, F>(
        &self,
        name: &str,
        details: Option<serde_json::Value>,
        check: F,
    ) -> ComponentHealth
    where
        E: std::fmt::Display,
        F: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let (status, message) = match tokio::time::timeout(self.config.check_timeout, check).await
        {
            Ok(Ok(_)) => (HealthStatus::Healthy, None),
            Ok(Err(e)) => (HealthStatus::Unhealthy, Some(e.to_string())),
            Err(_) => (HealthStatus::Unhealthy, Some("check timed out".to_string())),
        };

        ComponentHealth {
            name: name.to_string(),
            status,
            message,
            response_time_ms: start.elapsed().as_millis() as u64,
            details,
        }
    }
}

/// Simple liveness check
pub async fn liveness() -> &'static str {
    "OK"
}

/// Readiness check
pub async fn readiness(
    State(health): State<Arc<HealthChecker>>,
) -> (StatusCode, Json<HealthReport>) {
    let report = health.check().await;
    (report.http_status(), Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use attic_attachments::MemoryBlobStore;

    fn report(status: HealthStatus) -> HealthReport {
        HealthReport {
            status,
            version: "1.0".to_string(),
            uptime_seconds: 100,
            components: vec![],
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_blob_store_check() {
        let checker = HealthChecker::new(HealthConfig::default())
            .with_blob_store(Arc::new(MemoryBlobStore::new()));
        let report = checker.check().await;

        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.components.len(), 1);
        assert_eq!(report.components[0].name, "blob_store");
        assert_eq!(report.components[0].details.as_ref().unwrap()["backend"], "memory");
    }

    #[tokio::test]
    async fn test_health_cache() {
        let checker = HealthChecker::new(HealthConfig {
            cache_duration: Duration::from_secs(60),
            ..Default::default()
        });

        let report1 = checker.check().await;
        let report2 = checker.check().await;

        assert_eq!(report1.timestamp, report2.timestamp);
    }

    #[tokio::test]
    async fn test_failed_probe_is_unhealthy() {
        let checker = HealthChecker::new(HealthConfig::default());
        let component = checker
            .probe("flaky", None, async { Err::<(), _>("connection refused") })
            .await;

        assert_eq!(component.status, HealthStatus::Unhealthy);
        assert_eq!(component.message.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_worst_status() {
        assert_eq!(
            HealthStatus::Healthy.worst(HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Degraded.worst(HealthStatus::Unhealthy),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthStatus::Healthy.worst(HealthStatus::Healthy),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn test_health_status_http() {
        assert_eq!(report(HealthStatus::Healthy).http_status(), StatusCode::OK);
        assert_eq!(report(HealthStatus::Degraded).http_status(), StatusCode::OK);
        assert_eq!(
            report(HealthStatus::Unhealthy).http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
