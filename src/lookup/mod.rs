//! Car brand lookup collaborators.
//!
//! The dispatcher only sees the [`Lookup`] trait. Two backends exist:
//! - `table`: an in-process brand table, usable offline
//! - `car_api`: an HTTP car information API

pub mod car_api;
pub mod table;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::{LookupBackend, LookupSettings};

pub use car_api::CarApi;
pub use table::BrandTable;

/// Resolves a brand name to one line of descriptive text.
///
/// Implementations hold no connection state and are called concurrently
/// from every session.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn resolve(&self, brand: &str) -> Result<String, LookupError>;
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("car api returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("lookup backend not configured: {0}")]
    NotConfigured(&'static str),
}

/// Build the configured lookup backend.
pub fn from_settings(settings: &LookupSettings) -> Result<Arc<dyn Lookup>, LookupError> {
    match settings.backend {
        LookupBackend::Table => {
            let table = if settings.brands.is_empty() {
                BrandTable::builtin()
            } else {
                BrandTable::from_entries(settings.brands.iter())
            };
            info!(brands = table.len(), "Using brand table lookup");
            Ok(Arc::new(table))
        }
        LookupBackend::CarApi => {
            info!(url = %settings.url, timeout = ?settings.timeout, "Using car API lookup");
            Ok(Arc::new(CarApi::new(settings)?))
        }
    }
}

/// Text returned when a backend knows nothing about `brand`.
pub(crate) fn no_data(brand: &str) -> String {
    format!("ERROR NoCarDataFound for brand: {brand}")
}
