//! Append-only flat-file logs and HTTP fetch utilities for pricewatch.

mod csv_file;
pub mod alert_log;
pub mod fetch;
pub mod history;
pub mod offer_log;

pub use alert_log::AlertLog;
pub use fetch::{
    classify_status, FetchError, FetchedPage, HttpClientConfig, HttpFetcher, RequestPacer,
    RetryPolicy, StatusClass,
};
pub use history::{HistoryStore, PriorPrices};
pub use offer_log::{OfferLog, OpenBoxObservation};

pub const CRATE_NAME: &str = "pricewatch-storage";
