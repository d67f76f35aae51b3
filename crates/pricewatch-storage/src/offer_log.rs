//! Ledger of open-box listings already observed, used for novelty checks.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::csv_file::{append_rows, ensure_with_header, read_rows};

pub const OFFER_COLUMNS: [&str; 6] = ["timestamp", "product_id", "product_name", "store", "url", "price"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenBoxObservation {
    pub timestamp: DateTime<Utc>,
    pub product_id: String,
    pub product_name: String,
    pub store: String,
    pub url: String,
    pub price: Option<f64>,
}

#[derive(Debug)]
pub struct OfferLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl OfferLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, observation: &OpenBoxObservation) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        ensure_with_header(&self.path, &OFFER_COLUMNS).await?;
        append_rows(&self.path, std::slice::from_ref(observation)).await
    }

    /// Whether this exact listing url was observed before.
    pub async fn seen(&self, url: &str) -> anyhow::Result<bool> {
        let rows: Vec<OpenBoxObservation> = read_rows(&self.path).await?;
        Ok(rows.iter().any(|row| row.url == url))
    }
}
