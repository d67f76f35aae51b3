//! Configuration: product catalog, alert rules, validation thresholds and
//! runtime knobs read from the environment.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use pricewatch_adapters::StoreProfile;
use pricewatch_core::Product;
use pricewatch_storage::{HttpClientConfig, RetryPolicy};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_PRODUCTS_PATH: &str = "config/products.yaml";
pub const DEFAULT_ALERTS_PATH: &str = "config/alerts.yaml";
pub const DEFAULT_HISTORY_PATH: &str = "data/price_history.csv";
pub const DEFAULT_ALERT_LOG_PATH: &str = "data/alert_history.csv";
pub const DEFAULT_OFFER_LOG_PATH: &str = "data/openbox_history.csv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("product `{0}` is defined more than once")]
    DuplicateProduct(String),
    #[error("product `{0}` has an entry with an empty store or url")]
    EmptyTarget(String),
    #[error("store profile `{0}` is defined more than once")]
    DuplicateStore(String),
}

/// Products plus the selector profiles of the stores they are sold at.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductCatalog {
    #[serde(default, alias = "products")]
    pub items: Vec<Product>,
    #[serde(default)]
    pub stores: Vec<StoreProfile>,
    #[serde(default)]
    pub validation: ValidationSettings,
}

impl ProductCatalog {
    pub fn from_yaml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let catalog: Self = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        catalog.check()?;
        Ok(catalog)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_yaml_str(&text, path)
    }

    fn check(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for product in &self.items {
            if !ids.insert(product.id.as_str()) {
                return Err(ConfigError::DuplicateProduct(product.id.clone()));
            }
            if product
                .urls
                .iter()
                .any(|u| u.store.trim().is_empty() || u.url.trim().is_empty())
            {
                return Err(ConfigError::EmptyTarget(product.id.clone()));
            }
        }
        let mut stores = HashSet::new();
        for profile in &self.stores {
            if !stores.insert(profile.store.as_str()) {
                return Err(ConfigError::DuplicateStore(profile.store.clone()));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Product> {
        self.items.iter().find(|p| p.id == id)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Product> {
        self.items.iter().filter(|p| p.enabled)
    }
}

/// Where the orchestrator gets the product catalog from. Read once before
/// collecting and again before alerting, so edits made mid-run are honoured.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load(&self) -> anyhow::Result<ProductCatalog>;
}

#[derive(Debug, Clone)]
pub struct YamlCatalogSource {
    path: PathBuf,
}

impl YamlCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CatalogSource for YamlCatalogSource {
    async fn load(&self) -> anyhow::Result<ProductCatalog> {
        Ok(ProductCatalog::load(&self.path).await?)
    }
}

#[async_trait]
impl CatalogSource for ProductCatalog {
    async fn load(&self) -> anyhow::Result<ProductCatalog> {
        Ok(self.clone())
    }
}

/// Thresholds of the sanity rules applied to every freshly collected batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub max_price: f64,
    pub cap_exempt_categories: Vec<String>,
    pub spike_floor: f64,
    pub spike_factor: f64,
    /// Fraction of the prior price; `0.80` means an 80% drop.
    pub max_drop_fraction: f64,
    pub drop_guard_max_prior: f64,
    pub category_minimums: BTreeMap<String, f64>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_price: 50_000.0,
            cap_exempt_categories: vec!["cruise".to_string()],
            spike_floor: 2_000.0,
            spike_factor: 2.5,
            max_drop_fraction: 0.80,
            drop_guard_max_prior: 10_000.0,
            category_minimums: BTreeMap::from([
                ("motherboard".to_string(), 500.0),
                ("memory".to_string(), 200.0),
                ("cpu".to_string(), 300.0),
                ("gpu".to_string(), 1_000.0),
                ("storage".to_string(), 100.0),
            ]),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub recipient: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertRules {
    pub cooldown_hours: f64,
    pub price_drop_threshold: f64,
    pub priority_threshold: f64,
    pub priority_products: Vec<String>,
    #[serde(alias = "below_desired_price")]
    pub below_target_price: bool,
    pub suspicious_drop_percent: f64,
    pub suspicious_drop_max_previous: f64,
    pub target_gap_factor: f64,
    pub target_gap_max_price: f64,
}

impl Default for AlertRules {
    fn default() -> Self {
        Self {
            cooldown_hours: 6.0,
            price_drop_threshold: 5.0,
            priority_threshold: 2.0,
            priority_products: Vec::new(),
            below_target_price: true,
            suspicious_drop_percent: 80.0,
            suspicious_drop_max_previous: 10_000.0,
            target_gap_factor: 5.0,
            target_gap_max_price: 500.0,
        }
    }
}

impl AlertRules {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds((self.cooldown_hours * 3600.0).round() as i64)
    }

    pub fn threshold_for(&self, product_id: &str) -> f64 {
        if self.priority_products.iter().any(|p| p == product_id) {
            self.priority_threshold
        } else {
            self.price_drop_threshold
        }
    }
}

/// Message templates. Placeholders: `{product_name}`, `{store}`,
/// `{current_price}`, `{previous_price}`, `{reduction_percent}`,
/// `{target_price}`, `{url}`, `{timestamp}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    pub subject_template: String,
    pub body_template: String,
    pub open_box_subject_template: String,
    pub open_box_body_template: String,
    pub utc_offset_hours: i32,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            subject_template: "ALERTA DE PREÇO: {product_name}".to_string(),
            body_template: "Produto: {product_name}\nLoja: {store}\nPreço: R$ {current_price}\n\
                            Anterior: R$ {previous_price}\nRedução: {reduction_percent}\n\
                            Preço desejado: R$ {target_price}\n{url}\n{timestamp}"
                .to_string(),
            open_box_subject_template: "OPEN BOX DISPONÍVEL: {product_name}".to_string(),
            open_box_body_template: "Produto: {product_name}\nLoja: {store}\n\
                                     Preço normal: R$ {previous_price}\nPreço open box: R$ {current_price}\n\
                                     Economia: {reduction_percent}\n{url}\n{timestamp}"
                .to_string(),
            utc_offset_hours: -3,
        }
    }
}

/// Everything the alert engine reads from `alerts.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    #[serde(alias = "email")]
    pub notifications: NotificationSettings,
    pub alerts: AlertRules,
    pub messages: MessageTemplates,
}

impl AlertSettings {
    pub fn from_yaml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// A missing file yields the defaults with notifications disabled.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::from_yaml_str(&text, path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "alert configuration not found; notifications disabled");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Runtime knobs of the collection pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub products_path: PathBuf,
    pub alerts_config_path: PathBuf,
    pub history_path: PathBuf,
    pub alert_log_path: PathBuf,
    pub offer_log_path: PathBuf,
    pub cache_ttl: Duration,
    pub retry: RetryPolicy,
    pub request_delay: Duration,
    pub request_jitter: Duration,
    pub http: HttpClientConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            products_path: PathBuf::from(DEFAULT_PRODUCTS_PATH),
            alerts_config_path: PathBuf::from(DEFAULT_ALERTS_PATH),
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
            alert_log_path: PathBuf::from(DEFAULT_ALERT_LOG_PATH),
            offer_log_path: PathBuf::from(DEFAULT_OFFER_LOG_PATH),
            cache_ttl: Duration::from_secs(30 * 60),
            retry: RetryPolicy::default(),
            request_delay: Duration::from_secs(2),
            request_jitter: Duration::from_secs(3),
            http: HttpClientConfig::default(),
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl PipelineSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            products_path: env_path("PRICEWATCH_CONFIG", DEFAULT_PRODUCTS_PATH),
            alerts_config_path: env_path("PRICEWATCH_ALERTS_CONFIG", DEFAULT_ALERTS_PATH),
            history_path: env_path("PRICEWATCH_HISTORY", DEFAULT_HISTORY_PATH),
            alert_log_path: env_path("PRICEWATCH_ALERT_LOG", DEFAULT_ALERT_LOG_PATH),
            offer_log_path: env_path("PRICEWATCH_OPENBOX_LOG", DEFAULT_OFFER_LOG_PATH),
            cache_ttl: env_u64("PRICEWATCH_CACHE_TTL_MINUTES")
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.cache_ttl),
            retry: RetryPolicy {
                max_attempts: env_u64("PRICEWATCH_MAX_ATTEMPTS")
                    .map(|n| n.clamp(1, 10) as u32)
                    .unwrap_or(defaults.retry.max_attempts),
                base_delay: env_u64("PRICEWATCH_RETRY_DELAY_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.retry.base_delay),
            },
            request_delay: env_u64("PRICEWATCH_REQUEST_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_delay),
            request_jitter: env_u64("PRICEWATCH_REQUEST_JITTER_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_jitter),
            http: HttpClientConfig {
                timeout: env_u64("PRICEWATCH_HTTP_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.http.timeout),
                user_agent: std::env::var("PRICEWATCH_USER_AGENT")
                    .ok()
                    .or(defaults.http.user_agent),
                ..defaults.http
            },
        }
    }
}
