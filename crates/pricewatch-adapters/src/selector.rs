//! Configurable HTML scraper: CSS selectors for the price, text markers for stock,
//! and an optional selector for an alternate (open-box) offer link.

use std::sync::Arc;

use async_trait::async_trait;
use pricewatch_core::{AlternateOffer, StockStatus, DEFAULT_CURRENCY};
use pricewatch_storage::HttpFetcher;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use url::Url;

use crate::antibot::is_challenge_page;
use crate::currency::parse_price_text;
use crate::{AdapterError, FailureKind, PriceReading, ScrapeOutcome, StoreScraper};

const JSON_LD_SELECTOR: &str = r#"script[type="application/ld+json"]"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreProfile {
    pub store: String,
    #[serde(default)]
    pub price_selectors: Vec<String>,
    /// Read the price from this attribute instead of the element text.
    #[serde(default)]
    pub price_attribute: Option<String>,
    #[serde(default = "default_true")]
    pub json_ld: bool,
    #[serde(default)]
    pub out_of_stock_markers: Vec<String>,
    #[serde(default)]
    pub alternate_offer_selector: Option<String>,
    #[serde(default)]
    pub alternate_offer_price_selector: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_true() -> bool {
    true
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl StoreProfile {
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            price_selectors: Vec::new(),
            price_attribute: None,
            json_ld: true,
            out_of_stock_markers: Vec::new(),
            alternate_offer_selector: None,
            alternate_offer_price_selector: None,
            currency: default_currency(),
        }
    }
}

#[derive(Debug)]
pub struct SelectorScraper {
    profile: StoreProfile,
    price_selectors: Vec<Selector>,
    json_ld: Option<Selector>,
    alternate_offer: Option<Selector>,
    alternate_offer_price: Option<Selector>,
    http: Arc<HttpFetcher>,
}

fn compile(store: &str, selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::InvalidSelector {
        store: store.to_string(),
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    text_or_none(element.text().collect::<String>())
}

/// Resolve `href` against the page it was found on.
fn absolutize(base_url: &str, href: &str) -> Option<String> {
    Url::parse(base_url)
        .and_then(|base| base.join(href))
        .map(String::from)
        .ok()
}

fn json_price(value: &JsonValue) -> Option<(f64, String)> {
    match value {
        JsonValue::Array(items) => items.iter().find_map(json_price),
        JsonValue::Object(map) => {
            for key in ["price", "lowPrice"] {
                let found = match map.get(key) {
                    Some(JsonValue::Number(n)) => n.as_f64().map(|p| (p, n.to_string())),
                    Some(JsonValue::String(s)) => s
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .or_else(|| parse_price_text(s))
                        .map(|p| (p, s.clone())),
                    _ => None,
                };
                if let Some((price, raw)) = found.filter(|(p, _)| p.is_finite() && *p > 0.0) {
                    return Some((price, raw));
                }
            }
            ["offers", "@graph", "mainEntity"]
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(json_price)
        }
        _ => None,
    }
}

impl SelectorScraper {
    pub fn new(profile: StoreProfile, http: Arc<HttpFetcher>) -> Result<Self, AdapterError> {
        if profile.store.trim().is_empty() {
            return Err(AdapterError::Message("store profile without a store id".into()));
        }
        if profile.price_selectors.is_empty() && !profile.json_ld {
            return Err(AdapterError::NoPriceSource(profile.store.clone()));
        }

        let store = profile.store.as_str();
        let price_selectors = profile
            .price_selectors
            .iter()
            .map(|s| compile(store, s))
            .collect::<Result<Vec<_>, _>>()?;
        let json_ld = if profile.json_ld {
            Some(compile(store, JSON_LD_SELECTOR)?)
        } else {
            None
        };
        let alternate_offer = profile
            .alternate_offer_selector
            .as_deref()
            .map(|s| compile(store, s))
            .transpose()?;
        let alternate_offer_price = profile
            .alternate_offer_price_selector
            .as_deref()
            .map(|s| compile(store, s))
            .transpose()?;

        Ok(Self {
            price_selectors,
            json_ld,
            alternate_offer,
            alternate_offer_price,
            profile,
            http,
        })
    }

    pub fn profile(&self) -> &StoreProfile {
        &self.profile
    }

    /// Turn a fetched page body into an outcome. Never guesses a price.
    pub fn parse_page(&self, url: &str, body: &str) -> ScrapeOutcome {
        if is_challenge_page(body) {
            return ScrapeOutcome::failed(FailureKind::Blocked, "challenge page served");
        }

        let document = Html::parse_document(body);
        let Some((price, raw_price)) = self
            .price_from_selectors(&document)
            .or_else(|| self.price_from_json_ld(&document))
        else {
            return ScrapeOutcome::failed(FailureKind::ParseMiss, format!("no price found at {url}"));
        };

        let alternate_offer = self.find_alternate_offer(&document, url);
        if let Some(offer) = &alternate_offer {
            debug!(store = %self.profile.store, offer_url = %offer.url, "alternate offer detected");
        }

        ScrapeOutcome::Priced(PriceReading {
            price,
            raw_price: Some(raw_price),
            currency: self.profile.currency.clone(),
            in_stock: self.stock_status(&document),
            alternate_offer,
        })
    }

    fn price_from_selectors(&self, document: &Html) -> Option<(f64, String)> {
        for selector in &self.price_selectors {
            for element in document.select(selector) {
                let raw = match self.profile.price_attribute.as_deref() {
                    Some(attr) => element.value().attr(attr).and_then(|s| text_or_none(s.to_string())),
                    None => element_text(element),
                };
                if let Some(raw) = raw {
                    if let Some(price) = parse_price_text(&raw) {
                        return Some((price, raw));
                    }
                }
            }
        }
        None
    }

    fn price_from_json_ld(&self, document: &Html) -> Option<(f64, String)> {
        let selector = self.json_ld.as_ref()?;
        document.select(selector).find_map(|script| {
            let text = script.text().collect::<String>();
            serde_json::from_str::<JsonValue>(&text)
                .ok()
                .and_then(|value| json_price(&value))
        })
    }

    fn stock_status(&self, document: &Html) -> StockStatus {
        if self.profile.out_of_stock_markers.is_empty() {
            return StockStatus::Unknown;
        }
        let text = document.root_element().text().collect::<String>().to_lowercase();
        let sold_out = self
            .profile
            .out_of_stock_markers
            .iter()
            .any(|marker| text.contains(&marker.to_lowercase()));
        if sold_out {
            StockStatus::OutOfStock
        } else {
            StockStatus::InStock
        }
    }

    fn find_alternate_offer(&self, document: &Html, page_url: &str) -> Option<AlternateOffer> {
        let selector = self.alternate_offer.as_ref()?;
        let link = document.select(selector).find_map(|el| el.value().attr("href"))?;
        let price = self.alternate_offer_price.as_ref().and_then(|sel| {
            document
                .select(sel)
                .find_map(element_text)
                .and_then(|raw| parse_price_text(&raw))
        });
        let Some(url) = absolutize(page_url, link.trim()) else {
            debug!(page_url, link, "alternate offer link could not be resolved");
            return None;
        };
        Some(AlternateOffer { url, price })
    }
}

#[async_trait]
impl StoreScraper for SelectorScraper {
    fn store_id(&self) -> &str {
        &self.profile.store
    }

    async fn fetch(&self, url: &str) -> ScrapeOutcome {
        match self.http.fetch_page(&self.profile.store, url).await {
            Ok(page) => self.parse_page(url, &page.body),
            Err(err) if err.is_blocked() => {
                warn!(store = %self.profile.store, url, error = %err, "store refused request");
                ScrapeOutcome::failed(FailureKind::Blocked, err.to_string())
            }
            Err(err) => {
                warn!(store = %self.profile.store, url, error = %err, "fetch failed");
                ScrapeOutcome::failed(FailureKind::Transport, err.to_string())
            }
        }
    }
}
