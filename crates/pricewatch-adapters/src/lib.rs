//! Store scraper contract, scraper registry and the selector-driven HTML scraper.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use pricewatch_core::{AlternateOffer, StockStatus};
use pricewatch_storage::HttpFetcher;
use thiserror::Error;

pub mod antibot;
pub mod currency;
pub mod selector;

pub use selector::{SelectorScraper, StoreProfile};

pub const CRATE_NAME: &str = "pricewatch-adapters";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network error, timeout or unexpected HTTP status.
    Transport,
    /// Anti-bot challenge or refusal.
    Blocked,
    /// The page loaded but no price could be found.
    ParseMiss,
}

impl FailureKind {
    pub fn code(self) -> &'static str {
        match self {
            FailureKind::Transport => "transport_error",
            FailureKind::Blocked => "blocked_by_antibot",
            FailureKind::ParseMiss => "price_not_found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl ScrapeFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Reason string stored in `Snapshot::error`.
    pub fn reason(&self) -> String {
        if self.detail.is_empty() {
            self.kind.code().to_string()
        } else {
            format!("{}: {}", self.kind.code(), self.detail)
        }
    }
}

impl fmt::Display for ScrapeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceReading {
    pub price: f64,
    pub raw_price: Option<String>,
    pub currency: String,
    pub in_stock: StockStatus,
    pub alternate_offer: Option<AlternateOffer>,
}

impl PriceReading {
    pub fn new(price: f64, currency: impl Into<String>) -> Self {
        Self {
            price,
            raw_price: None,
            currency: currency.into(),
            in_stock: StockStatus::Unknown,
            alternate_offer: None,
        }
    }
}

/// Result of one fetch attempt. Scrapers never panic or error out of `fetch`;
/// every failure mode is folded into [`ScrapeOutcome::Failed`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    Priced(PriceReading),
    Failed(ScrapeFailure),
}

impl ScrapeOutcome {
    pub fn failed(kind: FailureKind, detail: impl Into<String>) -> Self {
        ScrapeOutcome::Failed(ScrapeFailure::new(kind, detail))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ScrapeOutcome::Failed(_))
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("store {store}: invalid selector `{selector}`: {message}")]
    InvalidSelector {
        store: String,
        selector: String,
        message: String,
    },
    #[error("store {0} has no price selectors and JSON-LD lookup is disabled")]
    NoPriceSource(String),
    #[error("{0}")]
    Message(String),
}

#[async_trait]
pub trait StoreScraper: Send + Sync {
    fn store_id(&self) -> &str;

    async fn fetch(&self, url: &str) -> ScrapeOutcome;
}

/// Explicit store → scraper map, owned by whoever drives collection.
#[derive(Clone, Default)]
pub struct ScraperRegistry {
    scrapers: BTreeMap<String, Arc<dyn StoreScraper>>,
}

impl fmt::Debug for ScraperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScraperRegistry")
            .field("stores", &self.scrapers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one [`SelectorScraper`] per profile, all sharing `http`.
    pub fn from_profiles(
        profiles: &[StoreProfile],
        http: Arc<HttpFetcher>,
    ) -> Result<Self, AdapterError> {
        let mut registry = Self::new();
        for profile in profiles {
            let scraper = SelectorScraper::new(profile.clone(), Arc::clone(&http))?;
            registry.register(Arc::new(scraper));
        }
        Ok(registry)
    }

    /// Register `scraper` under its store id, replacing any previous one.
    pub fn register(&mut self, scraper: Arc<dyn StoreScraper>) -> Option<Arc<dyn StoreScraper>> {
        self.scrapers.insert(scraper.store_id().to_string(), scraper)
    }

    pub fn with(mut self, scraper: Arc<dyn StoreScraper>) -> Self {
        self.register(scraper);
        self
    }

    pub fn get(&self, store: &str) -> Option<Arc<dyn StoreScraper>> {
        self.scrapers.get(store).cloned()
    }

    pub fn stores(&self) -> impl Iterator<Item = &str> {
        self.scrapers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.scrapers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedScraper {
        store: &'static str,
        price: f64,
    }

    #[async_trait]
    impl StoreScraper for FixedScraper {
        fn store_id(&self) -> &str {
            self.store
        }

        async fn fetch(&self, _url: &str) -> ScrapeOutcome {
            ScrapeOutcome::Priced(PriceReading::new(self.price, "BRL"))
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_store_and_replaces_duplicates() {
        let mut registry = ScraperRegistry::new()
            .with(Arc::new(FixedScraper { store: "kabum", price: 10.0 }))
            .with(Arc::new(FixedScraper { store: "pichau", price: 20.0 }));

        let replaced = registry.register(Arc::new(FixedScraper { store: "kabum", price: 11.0 }));
        assert!(replaced.is_some());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.stores().collect::<Vec<_>>(), vec!["kabum", "pichau"]);

        let kabum = registry.get("kabum").expect("registered");
        match kabum.fetch("https://kabum.example.test/x").await {
            ScrapeOutcome::Priced(reading) => assert_eq!(reading.price, 11.0),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(registry.get("amazon").is_none());
    }

    #[test]
    fn failure_reason_includes_kind_code() {
        let failure = ScrapeFailure::new(FailureKind::Blocked, "http status 403");
        assert_eq!(failure.reason(), "blocked_by_antibot: http status 403");
        assert_eq!(
            ScrapeFailure::new(FailureKind::ParseMiss, "").reason(),
            "price_not_found"
        );
    }
}
