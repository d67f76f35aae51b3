//! Append-only alert log backing the cooldown checks.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pricewatch_core::{AlertRecord, AlertSubject};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::csv_file::{append_rows, ensure_with_header, parse_flag, read_rows};

pub const ALERT_COLUMNS: [&str; 8] = [
    "timestamp",
    "product_id",
    "product_name",
    "store",
    "current_price",
    "previous_price",
    "reduction_percent",
    "alert_sent",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AlertRow {
    timestamp: DateTime<Utc>,
    product_id: String,
    product_name: String,
    store: String,
    current_price: f64,
    previous_price: Option<f64>,
    reduction_percent: Option<f64>,
    alert_sent: Option<String>,
}

impl From<&AlertRecord> for AlertRow {
    fn from(record: &AlertRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            product_id: record.product_id.clone(),
            product_name: record.product_name.clone(),
            store: record.store.clone(),
            current_price: record.current_price,
            previous_price: record.previous_price,
            reduction_percent: Some(record.reduction_percent),
            alert_sent: Some(record.alert_sent.to_string()),
        }
    }
}

impl From<AlertRow> for AlertRecord {
    fn from(row: AlertRow) -> Self {
        AlertRecord {
            timestamp: row.timestamp,
            product_id: row.product_id,
            product_name: row.product_name,
            store: row.store,
            current_price: row.current_price,
            previous_price: row.previous_price.filter(|p| p.is_finite()),
            reduction_percent: row.reduction_percent.unwrap_or(0.0),
            alert_sent: parse_flag(row.alert_sent.as_deref()).unwrap_or(false),
        }
    }
}

#[derive(Debug)]
pub struct AlertLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl AlertLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn ensure_file(&self) -> anyhow::Result<()> {
        ensure_with_header(&self.path, &ALERT_COLUMNS).await
    }

    pub async fn append(&self, record: &AlertRecord) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.ensure_file().await?;
        append_rows(&self.path, &[AlertRow::from(record)]).await
    }

    pub async fn load_all(&self) -> anyhow::Result<Vec<AlertRecord>> {
        let rows: Vec<AlertRow> = read_rows(&self.path).await?;
        Ok(rows.into_iter().map(AlertRecord::from).collect())
    }

    /// Timestamp of the latest delivered alert for `subject`, if any.
    pub async fn last_delivered(
        &self,
        subject: &AlertSubject,
    ) -> anyhow::Result<Option<DateTime<Utc>>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .filter(|r| r.alert_sent && r.subject() == *subject)
            .map(|r| r.timestamp)
            .max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn record(id: &str, store: &str, at: DateTime<Utc>, sent: bool) -> AlertRecord {
        AlertRecord {
            timestamp: at,
            product_id: id.into(),
            product_name: "GPU".into(),
            store: store.into(),
            current_price: 2400.0,
            previous_price: Some(2600.0),
            reduction_percent: 7.69,
            alert_sent: sent,
        }
    }

    #[tokio::test]
    async fn last_delivered_ignores_failed_and_other_subjects() {
        let dir = tempdir().expect("tempdir");
        let log = AlertLog::new(dir.path().join("alert_history.csv"));
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).single().unwrap();

        log.append(&record("gpu", "kabum", t0, true)).await.expect("append");
        log.append(&record("gpu", "kabum", t0 + Duration::hours(2), false))
            .await
            .expect("append");
        log.append(&record("gpu", "pichau", t0 + Duration::hours(3), true))
            .await
            .expect("append");
        log.append(&record("gpu-openbox", "kabum", t0 + Duration::hours(4), true))
            .await
            .expect("append");

        let last = log
            .last_delivered(&AlertSubject::product("gpu", "kabum"))
            .await
            .expect("query");
        assert_eq!(last, Some(t0));

        let open_box = log
            .last_delivered(&AlertSubject::open_box("gpu", "kabum"))
            .await
            .expect("query");
        assert_eq!(open_box, Some(t0 + Duration::hours(4)));

        assert_eq!(log.load_all().await.expect("load").len(), 4);
    }

    #[tokio::test]
    async fn empty_log_has_no_delivery() {
        let dir = tempdir().expect("tempdir");
        let log = AlertLog::new(dir.path().join("alerts.csv"));
        let last = log
            .last_delivered(&AlertSubject::product("gpu", "kabum"))
            .await
            .expect("query");
        assert_eq!(last, None);
    }
}
