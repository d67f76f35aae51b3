//! Sanity rules that null out implausible prices before they are trusted.

use std::fmt;

use pricewatch_core::Snapshot;
use pricewatch_storage::PriorPrices;
use tracing::warn;

use crate::config::ValidationSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    AboveCap,
    OutlierIncrease,
    SuspiciousDrop,
    BelowCategoryMinimum,
}

impl RejectionReason {
    pub fn code(self) -> &'static str {
        match self {
            RejectionReason::AboveCap => "suspicious_price_above_cap",
            RejectionReason::OutlierIncrease => "outlier_increase_vs_previous",
            RejectionReason::SuspiciousDrop => "suspicious_price_drop",
            RejectionReason::BelowCategoryMinimum => "price_below_category_minimum",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Evaluated in declaration order; the first rule that matches wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanityRule {
    AbsoluteCap,
    UpwardSpike,
    SuspiciousDrop,
    CategoryFloor,
}

impl SanityRule {
    pub const CHAIN: [SanityRule; 4] = [
        SanityRule::AbsoluteCap,
        SanityRule::UpwardSpike,
        SanityRule::SuspiciousDrop,
        SanityRule::CategoryFloor,
    ];

    pub fn check(
        self,
        settings: &ValidationSettings,
        category: &str,
        price: f64,
        prior: Option<f64>,
    ) -> Option<RejectionReason> {
        match self {
            SanityRule::AbsoluteCap => {
                let exempt = settings
                    .cap_exempt_categories
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(category));
                (!exempt && price > settings.max_price).then_some(RejectionReason::AboveCap)
            }
            SanityRule::UpwardSpike => {
                let prior = prior?;
                let limit = settings.spike_floor.max(prior * settings.spike_factor);
                (price > limit).then_some(RejectionReason::OutlierIncrease)
            }
            SanityRule::SuspiciousDrop => {
                let prior = prior.filter(|p| *p > 0.0)?;
                let drop = (prior - price) / prior;
                (prior < settings.drop_guard_max_prior && drop > settings.max_drop_fraction)
                    .then_some(RejectionReason::SuspiciousDrop)
            }
            SanityRule::CategoryFloor => {
                let minimum = settings
                    .category_minimums
                    .iter()
                    .find_map(|(c, min)| c.eq_ignore_ascii_case(category).then_some(min))?;
                (price < *minimum).then_some(RejectionReason::BelowCategoryMinimum)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SanityValidator {
    settings: ValidationSettings,
}

impl SanityValidator {
    pub fn new(settings: ValidationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// First matching rule for a single reading, if any.
    pub fn judge(&self, snapshot: &Snapshot, prior: &PriorPrices) -> Option<RejectionReason> {
        let price = snapshot.price?;
        let previous = prior.get(&snapshot.product_id, &snapshot.store);
        let category = snapshot.category.trim();
        SanityRule::CHAIN
            .iter()
            .find_map(|rule| rule.check(&self.settings, category, price, previous))
    }

    /// Snapshots without a price, or already carrying an error, pass through untouched.
    pub fn validate(&self, mut snapshots: Vec<Snapshot>, prior: &PriorPrices) -> Vec<Snapshot> {
        for snapshot in snapshots.iter_mut().filter(|s| s.is_priced()) {
            if let Some(reason) = self.judge(snapshot, prior) {
                warn!(
                    product = %snapshot.product_id,
                    store = %snapshot.store,
                    price = snapshot.price.unwrap_or_default(),
                    previous = prior.get(&snapshot.product_id, &snapshot.store),
                    %reason,
                    "rejected implausible price"
                );
                snapshot.reject(reason.code());
            }
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pricewatch_core::StockStatus;

    fn snap(category: &str, price: Option<f64>) -> Snapshot {
        Snapshot {
            product_id: "p1".into(),
            product_name: "Product".into(),
            category: category.into(),
            store: "kabum".into(),
            url: "https://kabum.example.test/p1".into(),
            price,
            raw_price: None,
            currency: "BRL".into(),
            in_stock: StockStatus::InStock,
            fetched_at: Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).single().unwrap(),
            error: None,
            target_price: None,
            alternate_offer: None,
        }
    }

    fn prior(price: f64) -> PriorPrices {
        let mut prior = PriorPrices::default();
        prior.insert("p1", "kabum", price);
        prior
    }

    fn run_one(s: Snapshot, prior: &PriorPrices) -> Snapshot {
        SanityValidator::default()
            .validate(vec![s], prior)
            .pop()
            .unwrap()
    }

    #[test]
    fn cap_rejects_except_exempt_categories() {
        let out = run_one(snap("gpu", Some(60_000.0)), &PriorPrices::default());
        assert_eq!(out.price, None);
        assert_eq!(out.error.as_deref(), Some("suspicious_price_above_cap"));

        let cruise = run_one(snap("cruise", Some(60_000.0)), &PriorPrices::default());
        assert_eq!(cruise.price, Some(60_000.0));
        assert!(cruise.error.is_none());
    }

    #[test]
    fn upward_spike_against_prior() {
        let out = run_one(snap("misc", Some(3_000.0)), &prior(1_000.0));
        assert_eq!(out.error.as_deref(), Some("outlier_increase_vs_previous"));

        // Below the 2000 floor even though 2.5x the prior.
        let ok = run_one(snap("misc", Some(1_900.0)), &prior(500.0));
        assert_eq!(ok.price, Some(1_900.0));
    }

    #[test]
    fn suspicious_drop_against_prior() {
        let out = run_one(snap("misc", Some(150.0)), &prior(1_000.0));
        assert_eq!(out.price, None);
        assert_eq!(out.error.as_deref(), Some("suspicious_price_drop"));

        let expensive_prior = run_one(snap("misc", Some(1_500.0)), &prior(12_000.0));
        assert_eq!(expensive_prior.price, Some(1_500.0));
    }

    #[test]
    fn spike_limit_scales_with_prior_above_the_floor() {
        let ok = run_one(snap("misc", Some(2_400.0)), &prior(1_000.0));
        assert_eq!(ok.price, Some(2_400.0));
        assert!(ok.error.is_none());

        let spiked = run_one(snap("misc", Some(3_000.0)), &prior(1_000.0));
        assert_eq!(spiked.price, None);
        assert_eq!(spiked.error.as_deref(), Some("outlier_increase_vs_previous"));
    }

    #[test]
    fn drops_up_to_eighty_percent_are_trusted() {
        let crashed = run_one(snap("misc", Some(500.0)), &prior(5_000.0));
        assert_eq!(crashed.error.as_deref(), Some("suspicious_price_drop"));

        let sale = run_one(snap("misc", Some(2_600.0)), &prior(5_000.0));
        assert_eq!(sale.price, Some(2_600.0));
        assert!(sale.error.is_none());
    }

    #[test]
    fn category_floor() {
        let out = run_one(snap("memory", Some(150.0)), &PriorPrices::default());
        assert_eq!(out.price, None);
        assert_eq!(out.error.as_deref(), Some("price_below_category_minimum"));

        let ok = run_one(snap("memory", Some(450.0)), &PriorPrices::default());
        assert_eq!(ok.price, Some(450.0));

        let above_floor = run_one(snap("memory", Some(250.0)), &PriorPrices::default());
        assert_eq!(above_floor.price, Some(250.0));
    }

    #[test]
    fn category_matching_ignores_case() {
        let floor = run_one(snap("Memory", Some(150.0)), &PriorPrices::default());
        assert_eq!(floor.error.as_deref(), Some("price_below_category_minimum"));

        let exempt = run_one(snap("CRUISE", Some(60_000.0)), &PriorPrices::default());
        assert_eq!(exempt.price, Some(60_000.0));
    }

    #[test]
    fn first_matching_rule_wins() {
        // 80_000 is both above the cap and a spike; the cap is reported.
        let out = run_one(snap("gpu", Some(80_000.0)), &prior(1_000.0));
        assert_eq!(out.error.as_deref(), Some("suspicious_price_above_cap"));
    }

    #[test]
    fn unpriced_and_errored_snapshots_pass_through() {
        let mut failed = snap("memory", None);
        failed.error = Some("price_not_found".into());
        let out = run_one(failed.clone(), &PriorPrices::default());
        assert_eq!(out, failed);
    }
}
