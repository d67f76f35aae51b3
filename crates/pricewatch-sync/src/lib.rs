//! Collection orchestration for pricewatch: cache, sanity validation, alerting
//! and the periodic run loop.

pub mod alerts;
pub mod cache;
pub mod config;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod validator;

pub use alerts::{AlertEngine, AlertOutcome, DisabledNotifier, LogNotifier, Notifier, SuppressReason};
pub use cache::{CacheEntry, SnapshotCache};
pub use config::{
    AlertRules, AlertSettings, CatalogSource, ConfigError, MessageTemplates, NotificationSettings,
    PipelineSettings, ProductCatalog, ValidationSettings, YamlCatalogSource,
};
pub use pipeline::{CollectionPipeline, CollectionSummary};
pub use report::latest_report;
pub use runner::{run_loop, MIN_INTERVAL};
pub use validator::{RejectionReason, SanityRule, SanityValidator};

pub const CRATE_NAME: &str = "pricewatch-sync";
