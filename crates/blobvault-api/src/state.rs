//! Application state

use blobvault_auth::CredentialResolver;
use blobvault_core::BlobService;
use blobvault_db::Database;
use std::sync::Arc;

/// Type alias for the Prometheus metrics handle
pub type MetricsHandle = metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub service: Arc<BlobService>,
    pub resolver: Arc<dyn CredentialResolver>,
}

impl AppState {
    pub fn new(
        db: Database,
        service: Arc<BlobService>,
        resolver: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            db,
            service,
            resolver,
        }
    }
}
