//! Alert engine: cooldown, guards, target and percentage triggers, delivery and
//! the open-box novelty path.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use pricewatch_core::{reduction_percent, AlertRecord, AlertSubject, AlternateOffer, Snapshot};
use pricewatch_storage::{AlertLog, OfferLog, OpenBoxObservation};
use tracing::{info, warn};

use crate::config::{AlertSettings, MessageTemplates};

/// Outbound notification transport. Returns whether delivery succeeded.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str, recipient: Option<&str>) -> bool;
}

/// Writes notifications to the log instead of a mail server.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str, recipient: Option<&str>) -> bool {
        info!(recipient = recipient.unwrap_or("-"), subject, body, "notification");
        true
    }
}

#[derive(Debug, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, subject: &str, _body: &str, _recipient: Option<&str>) -> bool {
        info!(subject, "notifications disabled; alert not delivered");
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    NotPriced,
    Cooldown,
    SuspiciousDrop,
    TargetGap,
    NoTrigger,
    AlreadySeen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Delivered,
    DeliveryFailed,
    Suppressed(SuppressReason),
}

impl AlertOutcome {
    pub fn fired(self) -> bool {
        !matches!(self, AlertOutcome::Suppressed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    BelowTarget,
    PercentDrop,
}

struct MessageFields<'a> {
    product_name: &'a str,
    store: &'a str,
    url: &'a str,
    current_price: Option<f64>,
    previous_price: Option<f64>,
    reduction_percent: Option<f64>,
    target_price: Option<f64>,
    timestamp: String,
}

fn money(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_else(|| "N/A".to_string())
}

fn render(template: &str, fields: &MessageFields<'_>) -> String {
    template
        .replace("{product_name}", fields.product_name)
        .replace("{store}", &fields.store.to_uppercase())
        .replace("{current_price}", &money(fields.current_price))
        .replace("{previous_price}", &money(fields.previous_price))
        .replace(
            "{reduction_percent}",
            &fields
                .reduction_percent
                .map(|r| format!("{r:.1}%"))
                .unwrap_or_else(|| "N/A".to_string()),
        )
        .replace("{target_price}", &money(fields.target_price))
        .replace("{url}", fields.url)
        .replace("{timestamp}", &fields.timestamp)
}

fn display_time(messages: &MessageTemplates, now: DateTime<Utc>) -> String {
    let offset = FixedOffset::east_opt(messages.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
    now.with_timezone(&offset).format("%d/%m/%Y %H:%M:%S").to_string()
}

pub struct AlertEngine {
    settings: AlertSettings,
    log: AlertLog,
    offers: OfferLog,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("settings", &self.settings)
            .field("log", &self.log.path())
            .field("offers", &self.offers.path())
            .finish()
    }
}

impl AlertEngine {
    pub fn new(settings: AlertSettings, log: AlertLog, offers: OfferLog, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            settings,
            log,
            offers,
            notifier,
        }
    }

    pub fn settings(&self) -> &AlertSettings {
        &self.settings
    }

    pub fn log(&self) -> &AlertLog {
        &self.log
    }

    async fn in_cooldown(&self, subject: &AlertSubject, now: DateTime<Utc>) -> Result<bool> {
        let last = self.log.last_delivered(subject).await?;
        Ok(last.is_some_and(|at| now - at < self.settings.alerts.cooldown()))
    }

    /// Decide whether `snapshot` deserves a notification, given the previous
    /// trusted price for the same (product, store).
    pub async fn evaluate(
        &self,
        snapshot: &Snapshot,
        previous: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<AlertOutcome> {
        let Some(current) = snapshot.price.filter(|_| snapshot.is_priced()) else {
            return Ok(AlertOutcome::Suppressed(SuppressReason::NotPriced));
        };
        let rules = &self.settings.alerts;
        let subject = AlertSubject::product(&snapshot.product_id, &snapshot.store);

        if self.in_cooldown(&subject, now).await? {
            info!(product = %snapshot.product_id, store = %snapshot.store, "alert cooldown active");
            return Ok(AlertOutcome::Suppressed(SuppressReason::Cooldown));
        }

        let previous = previous.filter(|p| *p > 0.0);
        let reduction = previous.map(|p| reduction_percent(p, current));

        if let (Some(prev), Some(red)) = (previous, reduction) {
            if red > rules.suspicious_drop_percent && prev < rules.suspicious_drop_max_previous {
                warn!(
                    product = %snapshot.product_id,
                    store = %snapshot.store,
                    current,
                    previous = prev,
                    reduction = red,
                    "suspicious price drop; alert withheld"
                );
                return Ok(AlertOutcome::Suppressed(SuppressReason::SuspiciousDrop));
            }
        }

        let target = snapshot.target_price.filter(|_| rules.below_target_price);
        let trigger = match target {
            Some(target) if current <= target => {
                if target > current * rules.target_gap_factor && current < rules.target_gap_max_price {
                    warn!(
                        product = %snapshot.product_id,
                        store = %snapshot.store,
                        current,
                        target,
                        "price far below target looks like a scraping error; alert withheld"
                    );
                    return Ok(AlertOutcome::Suppressed(SuppressReason::TargetGap));
                }
                Some(Trigger::BelowTarget)
            }
            _ => match (previous, reduction) {
                (Some(prev), Some(red))
                    if current < prev && red >= rules.threshold_for(&snapshot.product_id) =>
                {
                    Some(Trigger::PercentDrop)
                }
                _ => None,
            },
        };

        let Some(trigger) = trigger else {
            return Ok(AlertOutcome::Suppressed(SuppressReason::NoTrigger));
        };
        info!(product = %snapshot.product_id, store = %snapshot.store, current, ?trigger, "alert triggered");

        let messages = &self.settings.messages;
        let fields = MessageFields {
            product_name: &snapshot.product_name,
            store: &snapshot.store,
            url: &snapshot.url,
            current_price: Some(current),
            previous_price: previous,
            reduction_percent: reduction,
            target_price: snapshot.target_price,
            timestamp: display_time(messages, now),
        };
        let record = AlertRecord {
            timestamp: now,
            product_id: subject.id,
            product_name: snapshot.product_name.clone(),
            store: snapshot.store.clone(),
            current_price: current,
            previous_price: previous,
            reduction_percent: reduction.unwrap_or(0.0),
            alert_sent: false,
        };
        self.deliver(
            record,
            render(&messages.subject_template, &fields),
            render(&messages.body_template, &fields),
        )
        .await
    }

    /// Open-box path: fires only the first time a listing url is observed.
    pub async fn alert_open_box(
        &self,
        snapshot: &Snapshot,
        offer: &AlternateOffer,
        now: DateTime<Utc>,
    ) -> Result<AlertOutcome> {
        let novel = !self.offers.seen(&offer.url).await?;
        self.offers
            .record(&OpenBoxObservation {
                timestamp: now,
                product_id: snapshot.product_id.clone(),
                product_name: snapshot.product_name.clone(),
                store: snapshot.store.clone(),
                url: offer.url.clone(),
                price: offer.price,
            })
            .await?;
        if !novel {
            return Ok(AlertOutcome::Suppressed(SuppressReason::AlreadySeen));
        }

        let subject = AlertSubject::open_box(&snapshot.product_id, &snapshot.store);
        if self.in_cooldown(&subject, now).await? {
            info!(subject = %subject.id, store = %subject.store, "open-box cooldown active");
            return Ok(AlertOutcome::Suppressed(SuppressReason::Cooldown));
        }

        let regular = snapshot.price;
        let reduction = match (regular, offer.price) {
            (Some(regular), Some(open_box)) => Some(reduction_percent(regular, open_box)),
            _ => None,
        };
        info!(product = %snapshot.product_id, store = %snapshot.store, url = %offer.url, "new open-box listing");

        let messages = &self.settings.messages;
        let fields = MessageFields {
            product_name: &snapshot.product_name,
            store: &snapshot.store,
            url: &offer.url,
            current_price: offer.price,
            previous_price: regular,
            reduction_percent: reduction,
            target_price: snapshot.target_price,
            timestamp: display_time(messages, now),
        };
        let record = AlertRecord {
            timestamp: now,
            product_id: subject.id,
            product_name: format!("{} (Open Box)", snapshot.product_name),
            store: snapshot.store.clone(),
            current_price: offer.price.unwrap_or(0.0),
            previous_price: regular,
            reduction_percent: reduction.unwrap_or(0.0),
            alert_sent: false,
        };
        self.deliver(
            record,
            render(&messages.open_box_subject_template, &fields),
            render(&messages.open_box_body_template, &fields),
        )
        .await
    }

    async fn deliver(&self, mut record: AlertRecord, subject: String, body: String) -> Result<AlertOutcome> {
        let recipient = self.settings.notifications.recipient.as_deref();
        record.alert_sent = self.notifier.send(&subject, &body, recipient).await;
        self.log.append(&record).await?;
        if record.alert_sent {
            Ok(AlertOutcome::Delivered)
        } else {
            warn!(subject = %record.product_id, store = %record.store, "alert delivery failed");
            Ok(AlertOutcome::DeliveryFailed)
        }
    }
}
