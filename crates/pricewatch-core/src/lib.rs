//! Core domain model for pricewatch: products, price snapshots and alert records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "pricewatch-core";

pub const DEFAULT_CURRENCY: &str = "BRL";

/// One configured (store, url) pair of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreUrl {
    pub store: String,
    pub url: String,
}

/// A monitored product as described by configuration.
///
/// The pipeline only reads products; edits happen in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default, alias = "desired_price")]
    pub target_price: Option<f64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub urls: Vec<StoreUrl>,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

fn default_category() -> String {
    "misc".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Product {
    pub fn has_url(&self, url: &str) -> bool {
        self.urls.iter().any(|u| u.url == url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StockStatus {
    InStock,
    OutOfStock,
    #[default]
    Unknown,
}

impl StockStatus {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            StockStatus::InStock => Some(true),
            StockStatus::OutOfStock => Some(false),
            StockStatus::Unknown => None,
        }
    }
}

impl From<Option<bool>> for StockStatus {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => StockStatus::InStock,
            Some(false) => StockStatus::OutOfStock,
            None => StockStatus::Unknown,
        }
    }
}

/// A discounted secondary listing (open box, showroom unit) found next to the main offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternateOffer {
    pub url: String,
    pub price: Option<f64>,
}

/// One fetch result for one (product, store, url) at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub store: String,
    pub url: String,
    pub price: Option<f64>,
    pub raw_price: Option<String>,
    pub currency: String,
    pub in_stock: StockStatus,
    pub fetched_at: DateTime<Utc>,
    pub error: Option<String>,
    /// Attached from the product configuration after validation; never persisted.
    #[serde(skip)]
    pub target_price: Option<f64>,
    #[serde(skip)]
    pub alternate_offer: Option<AlternateOffer>,
}

impl Snapshot {
    /// Snapshot for `product` at `target` with nothing filled in yet.
    pub fn for_target(product: &Product, target: &StoreUrl, fetched_at: DateTime<Utc>) -> Self {
        Self {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            category: product.category.clone(),
            store: target.store.clone(),
            url: target.url.clone(),
            price: None,
            raw_price: None,
            currency: DEFAULT_CURRENCY.to_string(),
            in_stock: StockStatus::Unknown,
            fetched_at,
            error: None,
            target_price: None,
            alternate_offer: None,
        }
    }

    /// True when the snapshot carries a trusted price.
    pub fn is_priced(&self) -> bool {
        self.price.is_some() && self.error.is_none()
    }

    /// Null out the price and tag the snapshot with `reason`.
    pub fn reject(&mut self, reason: impl Into<String>) {
        self.price = None;
        self.error = Some(reason.into());
    }

    pub fn is_below_target(&self) -> Option<bool> {
        match (self.price, self.target_price) {
            (Some(price), Some(target)) => Some(price <= target),
            _ => None,
        }
    }

    pub fn pair_key(&self) -> (String, String) {
        (self.product_id.clone(), self.store.clone())
    }
}

/// Identifies what an alert is about: a product at a store, or a derived
/// open-box subject for the same product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertSubject {
    pub id: String,
    pub store: String,
}

impl AlertSubject {
    pub fn product(product_id: &str, store: &str) -> Self {
        Self {
            id: product_id.to_string(),
            store: store.to_string(),
        }
    }

    pub fn open_box(product_id: &str, store: &str) -> Self {
        Self {
            id: format!("{product_id}-openbox"),
            store: store.to_string(),
        }
    }
}

/// One line of the alert log. `alert_sent` records the delivery outcome, so
/// cooldowns are measured from attempts that reached the transport successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub timestamp: DateTime<Utc>,
    pub product_id: String,
    pub product_name: String,
    pub store: String,
    pub current_price: f64,
    pub previous_price: Option<f64>,
    pub reduction_percent: f64,
    pub alert_sent: bool,
}

impl AlertRecord {
    pub fn subject(&self) -> AlertSubject {
        AlertSubject {
            id: self.product_id.clone(),
            store: self.store.clone(),
        }
    }
}

/// Percentage drop from `previous` to `current`; positive means cheaper.
pub fn reduction_percent(previous: f64, current: f64) -> f64 {
    if previous <= 0.0 {
        return 0.0;
    }
    (previous - current) / previous * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn product() -> Product {
        Product {
            id: "ram-32gb".into(),
            name: "RAM 32GB".into(),
            category: "memory".into(),
            target_price: Some(600.0),
            enabled: true,
            urls: vec![StoreUrl {
                store: "kabum".into(),
                url: "https://example.test/ram".into(),
            }],
            alternatives: vec![],
        }
    }

    #[test]
    fn reject_clears_price_and_sets_reason() {
        let p = product();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).single().unwrap();
        let mut snap = Snapshot::for_target(&p, &p.urls[0], at);
        snap.price = Some(10.0);
        assert!(snap.is_priced());

        snap.reject("price_below_category_minimum");
        assert_eq!(snap.price, None);
        assert_eq!(snap.error.as_deref(), Some("price_below_category_minimum"));
        assert!(!snap.is_priced());
    }

    #[test]
    fn product_yaml_accepts_desired_price_alias_and_defaults() {
        let yaml = "id: gpu\nname: GPU\ndesired_price: 2500\nurls:\n  - store: pichau\n    url: https://example.test/gpu\n";
        let p: Product = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(p.target_price, Some(2500.0));
        assert_eq!(p.category, "misc");
        assert!(p.enabled);
        assert!(p.has_url("https://example.test/gpu"));
        assert!(!p.has_url("https://example.test/other"));
    }

    #[test]
    fn open_box_subject_is_derived_from_product_id() {
        let subject = AlertSubject::open_box("ram-32gb", "kabum");
        assert_eq!(subject.id, "ram-32gb-openbox");
        assert_eq!(subject.store, "kabum");
    }

    #[test]
    fn reduction_percent_handles_zero_previous() {
        assert_eq!(reduction_percent(0.0, 10.0), 0.0);
        assert!((reduction_percent(1000.0, 975.0) - 2.5).abs() < 1e-9);
    }
}
