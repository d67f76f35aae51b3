//! Append-only price history log.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pricewatch_core::{Snapshot, StockStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::csv_file::{append_rows, ensure_with_header, format_flag, parse_flag, read_rows};

pub const HISTORY_COLUMNS: [&str; 11] = [
    "timestamp",
    "product_id",
    "product_name",
    "category",
    "store",
    "url",
    "price",
    "currency",
    "in_stock",
    "raw_price",
    "error",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryRow {
    timestamp: DateTime<Utc>,
    product_id: String,
    product_name: String,
    #[serde(default)]
    category: String,
    store: String,
    url: String,
    price: Option<f64>,
    #[serde(default)]
    currency: String,
    in_stock: Option<String>,
    raw_price: Option<String>,
    error: Option<String>,
}

impl From<&Snapshot> for HistoryRow {
    fn from(snap: &Snapshot) -> Self {
        Self {
            timestamp: snap.fetched_at,
            product_id: snap.product_id.clone(),
            product_name: snap.product_name.clone(),
            category: snap.category.clone(),
            store: snap.store.clone(),
            url: snap.url.clone(),
            price: snap.price,
            currency: snap.currency.clone(),
            in_stock: format_flag(snap.in_stock.as_bool()),
            raw_price: snap.raw_price.clone(),
            error: snap.error.clone(),
        }
    }
}

impl From<HistoryRow> for Snapshot {
    fn from(row: HistoryRow) -> Self {
        let in_stock = StockStatus::from(parse_flag(row.in_stock.as_deref()));
        Snapshot {
            product_id: row.product_id,
            product_name: row.product_name,
            category: row.category,
            store: row.store,
            url: row.url,
            price: row.price.filter(|p| p.is_finite()),
            raw_price: row.raw_price.filter(|s| !s.is_empty()),
            currency: row.currency,
            in_stock,
            fetched_at: row.timestamp,
            error: row.error.filter(|s| !s.is_empty()),
            target_price: None,
            alternate_offer: None,
        }
    }
}

/// Most recent trusted price per (product, store), derived from history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorPrices {
    prices: HashMap<(String, String), f64>,
}

impl PriorPrices {
    pub fn get(&self, product_id: &str, store: &str) -> Option<f64> {
        self.prices
            .get(&(product_id.to_string(), store.to_string()))
            .copied()
    }

    pub fn insert(&mut self, product_id: &str, store: &str, price: f64) {
        self.prices
            .insert((product_id.to_string(), store.to_string()), price);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Fold snapshots given oldest-first; later trusted prices win.
    pub fn from_ordered(snapshots: &[Snapshot]) -> Self {
        let mut prior = Self::default();
        for snap in snapshots.iter().filter(|s| s.is_priced()) {
            if let Some(price) = snap.price {
                prior.insert(&snap.product_id, &snap.store, price);
            }
        }
        prior
    }
}

/// CSV-backed history of every snapshot ever collected.
///
/// "Latest per (product, store)" is recomputed from the full log on every call.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryStore {
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
        ensure_with_header(&self.path, &HISTORY_COLUMNS).await
    }

    pub async fn append(&self, snapshots: &[Snapshot]) -> anyhow::Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }
        let rows: Vec<HistoryRow> = snapshots.iter().map(HistoryRow::from).collect();
        let _guard = self.write_lock.lock().await;
        self.ensure_file().await?;
        append_rows(&self.path, &rows).await?;
        debug!(path = %self.path.display(), rows = rows.len(), "appended history rows");
        Ok(())
    }

    /// Every snapshot, oldest first. Rows sharing a timestamp keep file order.
    pub async fn load_all(&self) -> anyhow::Result<Vec<Snapshot>> {
        let rows: Vec<HistoryRow> = read_rows(&self.path).await?;
        let mut snapshots: Vec<Snapshot> = rows.into_iter().map(Snapshot::from).collect();
        snapshots.sort_by_key(|s| s.fetched_at);
        Ok(snapshots)
    }

    pub async fn latest_by_product_store(
        &self,
    ) -> anyhow::Result<BTreeMap<(String, String), Snapshot>> {
        let mut latest = BTreeMap::new();
        for snap in self.load_all().await? {
            latest.insert(snap.pair_key(), snap);
        }
        Ok(latest)
    }

    pub async fn prior_prices(&self) -> anyhow::Result<PriorPrices> {
        Ok(PriorPrices::from_ordered(&self.load_all().await?))
    }
}
