//! Collection orchestration: cache, retries, validation, history and alerts.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pricewatch_adapters::{PriceReading, ScrapeFailure, ScrapeOutcome, ScraperRegistry, StoreScraper};
use pricewatch_core::{Product, Snapshot, StoreUrl};
use pricewatch_storage::{AlertLog, HistoryStore, HttpFetcher, OfferLog, PriorPrices, RequestPacer};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::alerts::{AlertEngine, AlertOutcome, DisabledNotifier, LogNotifier, Notifier};
use crate::cache::SnapshotCache;
use crate::config::{AlertSettings, CatalogSource, PipelineSettings, ProductCatalog, YamlCatalogSource};
use crate::validator::SanityValidator;

#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub products: usize,
    pub pairs: usize,
    pub cache_hits: usize,
    pub priced: usize,
    pub failed: usize,
    pub rejected: usize,
    pub alerts_fired: usize,
    pub alerts_delivered: usize,
    pub open_box_alerts: usize,
    pub cancelled: bool,
}

impl CollectionSummary {
    fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            products: 0,
            pairs: 0,
            cache_hits: 0,
            priced: 0,
            failed: 0,
            rejected: 0,
            alerts_fired: 0,
            alerts_delivered: 0,
            open_box_alerts: 0,
            cancelled: false,
        }
    }

    fn count_alert(&mut self, outcome: AlertOutcome) {
        if outcome.fired() {
            self.alerts_fired += 1;
        }
        if outcome == AlertOutcome::Delivered {
            self.alerts_delivered += 1;
        }
    }
}

struct PairResult {
    snapshot: Snapshot,
    from_cache: bool,
    interrupted: bool,
}

fn priced_snapshot(product: &Product, target: &StoreUrl, reading: PriceReading, at: DateTime<Utc>) -> Snapshot {
    let mut snapshot = Snapshot::for_target(product, target, at);
    snapshot.price = Some(reading.price);
    snapshot.raw_price = reading.raw_price;
    snapshot.currency = reading.currency;
    snapshot.in_stock = reading.in_stock;
    snapshot.alternate_offer = reading.alternate_offer;
    snapshot
}

fn failed_snapshot(product: &Product, target: &StoreUrl, failure: Option<ScrapeFailure>, at: DateTime<Utc>) -> Snapshot {
    let mut snapshot = Snapshot::for_target(product, target, at);
    snapshot.error = Some(
        failure
            .map(|f| f.reason())
            .unwrap_or_else(|| "transport_error".to_string()),
    );
    snapshot
}

pub struct CollectionPipeline {
    settings: PipelineSettings,
    catalog: Arc<dyn CatalogSource>,
    scrapers: ScraperRegistry,
    cache: SnapshotCache,
    history: HistoryStore,
    alerts: AlertEngine,
    pacer: RequestPacer,
}

impl CollectionPipeline {
    pub fn new(
        settings: PipelineSettings,
        catalog: Arc<dyn CatalogSource>,
        scrapers: ScraperRegistry,
        alerts: AlertEngine,
    ) -> Self {
        let history = HistoryStore::new(settings.history_path.clone());
        let pacer = RequestPacer::new(settings.request_delay, settings.request_jitter);
        Self {
            settings,
            catalog,
            scrapers,
            cache: SnapshotCache::new(),
            history,
            alerts,
            pacer,
        }
    }

    /// Wire the production pipeline from files. Fails on unreadable
    /// configuration or an unwritable history file.
    pub async fn from_settings(settings: PipelineSettings) -> Result<Self> {
        let catalog = ProductCatalog::load(&settings.products_path).await?;
        let http = Arc::new(HttpFetcher::new(settings.http.clone())?);
        let scrapers = ScraperRegistry::from_profiles(&catalog.stores, http)
            .context("building store scrapers")?;
        if scrapers.is_empty() {
            warn!(path = %settings.products_path.display(), "no store profiles configured; nothing will be fetched");
        }

        let alert_settings = AlertSettings::load(&settings.alerts_config_path).await?;
        let notifier: Arc<dyn Notifier> = if alert_settings.notifications.enabled {
            Arc::new(LogNotifier)
        } else {
            Arc::new(DisabledNotifier)
        };
        let alerts = AlertEngine::new(
            alert_settings,
            AlertLog::new(settings.alert_log_path.clone()),
            OfferLog::new(settings.offer_log_path.clone()),
            notifier,
        );

        let source = Arc::new(YamlCatalogSource::new(settings.products_path.clone()));
        let pipeline = Self::new(settings, source, scrapers, alerts);
        pipeline
            .history
            .ensure_file()
            .await
            .with_context(|| format!("preparing history file {}", pipeline.history.path().display()))?;
        pipeline
            .alerts
            .log()
            .ensure_file()
            .await
            .context("preparing alert log")?;

        info!(
            products = catalog.items.len(),
            stores = pipeline.scrapers.len(),
            history = %pipeline.history.path().display(),
            "collection pipeline ready"
        );
        Ok(pipeline)
    }

    pub fn with_pacer(mut self, pacer: RequestPacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// One pass over every enabled product (or only `product_filter`, when non-empty).
    pub async fn run_once(&self, product_filter: &[String], cancel: &CancellationToken) -> Result<CollectionSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("collection_run", %run_id);
        self.collect(run_id, product_filter, cancel).instrument(span).await
    }

    async fn collect(&self, run_id: Uuid, product_filter: &[String], cancel: &CancellationToken) -> Result<CollectionSummary> {
        let mut summary = CollectionSummary::new(run_id, Utc::now());

        let swept = self.cache.clear_expired(summary.started_at);
        if swept > 0 {
            debug!(swept, "dropped stale cache entries");
        }

        let catalog = self.catalog.load().await.context("loading product catalog")?;
        let prior = self.history.prior_prices().await.context("reading price history")?;
        let products = select_products(&catalog, product_filter);
        summary.products = products.len();
        info!(products = products.len(), "collection started");

        let mut batch = Vec::new();
        'products: for product in products {
            for target in &product.urls {
                if cancel.is_cancelled() {
                    summary.cancelled = true;
                    break 'products;
                }
                let Some(scraper) = self.scrapers.get(&target.store) else {
                    warn!(product = %product.id, store = %target.store, "no scraper registered for store; skipping");
                    continue;
                };

                summary.pairs += 1;
                let result = self.collect_pair(product, target, scraper.as_ref(), cancel).await;
                if result.from_cache {
                    summary.cache_hits += 1;
                }
                if let Some(offer) = result.snapshot.alternate_offer.as_ref() {
                    match self.alerts.alert_open_box(&result.snapshot, offer, Utc::now()).await {
                        Ok(outcome) => {
                            if outcome.fired() {
                                summary.open_box_alerts += 1;
                            }
                            summary.count_alert(outcome);
                        }
                        Err(err) => warn!(product = %product.id, error = %format!("{err:#}"), "open-box alert failed"),
                    }
                }
                batch.push(result.snapshot);
                if result.interrupted {
                    summary.cancelled = true;
                    break 'products;
                }
            }
        }

        let batch = self.persist(batch, &catalog, &prior, &mut summary).await?;

        if summary.cancelled {
            info!(persisted = batch.len(), "collection cancelled; alerts skipped");
        } else {
            self.evaluate_alerts(&batch, &prior, &mut summary).await;
        }

        summary.finished_at = Utc::now();
        info!(
            pairs = summary.pairs,
            priced = summary.priced,
            failed = summary.failed,
            rejected = summary.rejected,
            alerts = summary.alerts_fired,
            "collection finished"
        );
        Ok(summary)
    }

    async fn collect_pair(
        &self,
        product: &Product,
        target: &StoreUrl,
        scraper: &dyn StoreScraper,
        cancel: &CancellationToken,
    ) -> PairResult {
        let now = Utc::now();
        if let Some(entry) = self.cache.get(&product.id, &target.store, &target.url, now) {
            debug!(product = %product.id, store = %target.store, "cache hit");
            let mut snapshot = Snapshot::for_target(product, target, now);
            snapshot.price = Some(entry.price);
            snapshot.raw_price = entry.raw_price;
            return PairResult {
                snapshot,
                from_cache: true,
                interrupted: false,
            };
        }

        let policy = self.settings.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut last_failure = None;
        let mut interrupted = false;

        for attempt in 1..=max_attempts {
            self.pacer.wait_turn(&target.store).await;
            match scraper.fetch(&target.url).await {
                ScrapeOutcome::Priced(reading) => {
                    let fetched_at = Utc::now();
                    self.cache.set(
                        &product.id,
                        &target.store,
                        &target.url,
                        reading.price,
                        reading.raw_price.clone(),
                        self.settings.cache_ttl,
                        fetched_at,
                    );
                    debug!(product = %product.id, store = %target.store, price = reading.price, attempt, "price collected");
                    return PairResult {
                        snapshot: priced_snapshot(product, target, reading, fetched_at),
                        from_cache: false,
                        interrupted: false,
                    };
                }
                ScrapeOutcome::Failed(failure) => {
                    warn!(
                        product = %product.id,
                        store = %target.store,
                        attempt,
                        max_attempts,
                        reason = %failure,
                        "scrape attempt failed"
                    );
                    last_failure = Some(failure);
                    if attempt < max_attempts {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                interrupted = true;
                                break;
                            }
                            _ = tokio::time::sleep(policy.delay_after_attempt(attempt)) => {}
                        }
                    }
                }
            }
        }

        PairResult {
            snapshot: failed_snapshot(product, target, last_failure, Utc::now()),
            from_cache: false,
            interrupted,
        }
    }

    async fn persist(
        &self,
        batch: Vec<Snapshot>,
        catalog: &ProductCatalog,
        prior: &PriorPrices,
        summary: &mut CollectionSummary,
    ) -> Result<Vec<Snapshot>> {
        let priced_before = batch.iter().filter(|s| s.is_priced()).count();
        let mut batch = SanityValidator::new(catalog.validation.clone()).validate(batch, prior);
        for snapshot in &mut batch {
            snapshot.target_price = catalog.get(&snapshot.product_id).and_then(|p| p.target_price);
        }

        summary.priced = batch.iter().filter(|s| s.is_priced()).count();
        summary.rejected = priced_before - summary.priced;
        summary.failed = batch.len() - summary.priced;

        self.history
            .append(&batch)
            .await
            .with_context(|| format!("appending to {}", self.history.path().display()))?;
        Ok(batch)
    }

    async fn evaluate_alerts(&self, batch: &[Snapshot], prior: &PriorPrices, summary: &mut CollectionSummary) {
        let current = match self.catalog.load().await {
            Ok(catalog) => catalog,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "reloading product catalog failed; alerts skipped");
                return;
            }
        };

        for snapshot in batch.iter().filter(|s| s.is_priced()) {
            let configured = current
                .get(&snapshot.product_id)
                .is_some_and(|p| p.has_url(&snapshot.url));
            if !configured {
                info!(product = %snapshot.product_id, url = %snapshot.url, "url no longer configured; alert skipped");
                continue;
            }

            let previous = prior.get(&snapshot.product_id, &snapshot.store);
            match self.alerts.evaluate(snapshot, previous, Utc::now()).await {
                Ok(outcome) => summary.count_alert(outcome),
                Err(err) => warn!(
                    product = %snapshot.product_id,
                    store = %snapshot.store,
                    error = %format!("{err:#}"),
                    "alert evaluation failed"
                ),
            }
        }
    }
}

fn select_products<'a>(catalog: &'a ProductCatalog, filter: &[String]) -> Vec<&'a Product> {
    if filter.is_empty() {
        return catalog.enabled().collect();
    }
    filter
        .iter()
        .filter_map(|id| match catalog.get(id) {
            Some(product) if product.enabled => Some(product),
            Some(_) => {
                warn!(product = %id, "product is disabled; skipping");
                None
            }
            None => {
                warn!(product = %id, "product not found in catalog; skipping");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use pricewatch_adapters::FailureKind;
    use pricewatch_core::AlternateOffer;
    use pricewatch_storage::RetryPolicy;
    use tempfile::{tempdir, TempDir};

    struct ScriptedScraper {
        store: &'static str,
        outcomes: Mutex<VecDeque<ScrapeOutcome>>,
        calls: AtomicUsize,
        cancel_on_fetch: Option<CancellationToken>,
    }

    impl ScriptedScraper {
        fn new(store: &'static str, outcomes: Vec<ScrapeOutcome>) -> Self {
            Self {
                store,
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
                cancel_on_fetch: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StoreScraper for ScriptedScraper {
        fn store_id(&self) -> &str {
            self.store
        }

        async fn fetch(&self, _url: &str) -> ScrapeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = &self.cancel_on_fetch {
                token.cancel();
            }
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ScrapeOutcome::failed(FailureKind::Transport, "connection reset"))
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        subjects: Mutex<Vec<String>>,
    }

    impl CountingNotifier {
        fn subjects(&self) -> Vec<String> {
            self.subjects.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send(&self, subject: &str, _body: &str, _recipient: Option<&str>) -> bool {
            self.subjects.lock().unwrap().push(subject.to_string());
            true
        }
    }

    /// Hands out the queued catalogs in order, then keeps returning the last one.
    struct SequenceCatalog {
        queue: Mutex<VecDeque<ProductCatalog>>,
        last: Mutex<ProductCatalog>,
    }

    impl SequenceCatalog {
        fn new(catalogs: Vec<ProductCatalog>) -> Self {
            let last = catalogs.last().cloned().unwrap_or_default();
            Self {
                queue: Mutex::new(catalogs.into()),
                last: Mutex::new(last),
            }
        }
    }

    #[async_trait]
    impl CatalogSource for SequenceCatalog {
        async fn load(&self) -> Result<ProductCatalog> {
            let next = self.queue.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| self.last.lock().unwrap().clone()))
        }
    }

    fn catalog(yaml: &str) -> ProductCatalog {
        ProductCatalog::from_yaml_str(yaml, Path::new("test.yaml")).unwrap()
    }

    const ONE_GPU: &str = r#"
items:
  - id: gpu
    name: Placa de vídeo
    category: gpu
    desired_price: 2500
    urls:
      - store: kabum
        url: https://kabum.example.test/gpu
"#;

    fn priced(price: f64) -> ScrapeOutcome {
        ScrapeOutcome::Priced(PriceReading::new(price, "BRL"))
    }

    fn build(
        dir: &TempDir,
        source: Arc<dyn CatalogSource>,
        scraper: Arc<ScriptedScraper>,
        notifier: Arc<CountingNotifier>,
    ) -> CollectionPipeline {
        let settings = PipelineSettings {
            history_path: dir.path().join("history.csv"),
            alert_log_path: dir.path().join("alerts.csv"),
            offer_log_path: dir.path().join("openbox.csv"),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
            },
            request_delay: Duration::ZERO,
            request_jitter: Duration::ZERO,
            ..Default::default()
        };
        let alerts = AlertEngine::new(
            AlertSettings::default(),
            AlertLog::new(dir.path().join("alerts.csv")),
            OfferLog::new(dir.path().join("openbox.csv")),
            notifier,
        );
        CollectionPipeline::new(settings, source, ScraperRegistry::new().with(scraper), alerts)
            .with_pacer(RequestPacer::disabled())
    }

    #[tokio::test]
    async fn exhausted_retries_keep_the_error_snapshot() {
        let dir = tempdir().unwrap();
        let scraper = Arc::new(ScriptedScraper::new("kabum", vec![]));
        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = build(&dir, Arc::new(catalog(ONE_GPU)), Arc::clone(&scraper), notifier);

        let summary = pipeline.run_once(&[], &CancellationToken::new()).await.unwrap();
        assert_eq!(scraper.calls(), 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.priced, 0);

        let history = pipeline.history().load_all().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].price, None);
        assert!(history[0].error.as_deref().unwrap().starts_with("transport_error"));
    }

    #[tokio::test]
    async fn retry_recovers_after_transient_failure() {
        let dir = tempdir().unwrap();
        let scraper = Arc::new(ScriptedScraper::new(
            "kabum",
            vec![
                ScrapeOutcome::failed(FailureKind::Blocked, "http status 403"),
                priced(2_999.0),
            ],
        ));
        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = build(&dir, Arc::new(catalog(ONE_GPU)), Arc::clone(&scraper), notifier);

        let summary = pipeline.run_once(&[], &CancellationToken::new()).await.unwrap();
        assert_eq!(scraper.calls(), 2);
        assert_eq!(summary.priced, 1);
        let history = pipeline.history().load_all().await.unwrap();
        assert_eq!(history[0].price, Some(2_999.0));
        assert!(history[0].error.is_none());
    }

    #[tokio::test]
    async fn cached_price_skips_the_scraper() {
        let dir = tempdir().unwrap();
        let scraper = Arc::new(ScriptedScraper::new("kabum", vec![priced(2_999.0)]));
        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = build(&dir, Arc::new(catalog(ONE_GPU)), Arc::clone(&scraper), notifier);
        let cancel = CancellationToken::new();

        pipeline.run_once(&[], &cancel).await.unwrap();
        let second = pipeline.run_once(&[], &cancel).await.unwrap();

        assert_eq!(scraper.calls(), 1);
        assert_eq!(second.cache_hits, 1);
        assert_eq!(pipeline.cache().len(), 1);
        let history = pipeline.history().load_all().await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|s| s.price == Some(2_999.0)));
    }

    #[tokio::test]
    async fn below_target_price_alerts_once_per_cooldown() {
        let dir = tempdir().unwrap();
        let scraper = Arc::new(ScriptedScraper::new("kabum", vec![priced(2_400.0)]));
        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = build(&dir, Arc::new(catalog(ONE_GPU)), Arc::clone(&scraper), Arc::clone(&notifier));
        let cancel = CancellationToken::new();

        let first = pipeline.run_once(&[], &cancel).await.unwrap();
        let second = pipeline.run_once(&[], &cancel).await.unwrap();
        assert_eq!(first.alerts_delivered, 1);
        assert_eq!(second.alerts_fired, 0);
        assert_eq!(notifier.subjects().len(), 1);
    }

    #[tokio::test]
    async fn url_removed_during_run_does_not_alert() {
        let dir = tempdir().unwrap();
        let moved = ONE_GPU.replace("https://kabum.example.test/gpu", "https://kabum.example.test/gpu-v2");
        let source = Arc::new(SequenceCatalog::new(vec![catalog(ONE_GPU), catalog(&moved)]));
        let scraper = Arc::new(ScriptedScraper::new("kabum", vec![priced(2_400.0)]));
        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = build(&dir, source, scraper, Arc::clone(&notifier));

        let summary = pipeline.run_once(&[], &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.priced, 1);
        assert_eq!(summary.alerts_fired, 0);
        assert!(notifier.subjects().is_empty());
        assert_eq!(pipeline.history().load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn implausible_price_is_persisted_as_rejected() {
        let dir = tempdir().unwrap();
        let scraper = Arc::new(ScriptedScraper::new("kabum", vec![priced(99.0)]));
        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = build(&dir, Arc::new(catalog(ONE_GPU)), scraper, Arc::clone(&notifier));

        let summary = pipeline.run_once(&[], &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.rejected, 1);
        assert!(notifier.subjects().is_empty());
        let history = pipeline.history().load_all().await.unwrap();
        assert_eq!(history[0].price, None);
        assert_eq!(history[0].error.as_deref(), Some("price_below_category_minimum"));
    }

    #[tokio::test]
    async fn cancellation_persists_the_partial_batch() {
        let dir = tempdir().unwrap();
        let yaml = r#"
items:
  - id: gpu
    name: GPU
    urls:
      - {store: kabum, url: "https://kabum.example.test/gpu"}
  - id: cpu
    name: CPU
    urls:
      - {store: kabum, url: "https://kabum.example.test/cpu"}
"#;
        let cancel = CancellationToken::new();
        let mut scripted = ScriptedScraper::new("kabum", vec![priced(1_999.0), priced(1_499.0)]);
        scripted.cancel_on_fetch = Some(cancel.clone());
        let scraper = Arc::new(scripted);
        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = build(&dir, Arc::new(catalog(yaml)), Arc::clone(&scraper), notifier);

        let summary = pipeline.run_once(&[], &cancel).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(scraper.calls(), 1);
        let history = pipeline.history().load_all().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].product_id, "gpu");
    }

    #[tokio::test]
    async fn alternate_offer_goes_to_the_open_box_path() {
        let dir = tempdir().unwrap();
        let mut reading = PriceReading::new(3_200.0, "BRL");
        reading.alternate_offer = Some(AlternateOffer {
            url: "https://kabum.example.test/gpu/openbox".into(),
            price: Some(2_700.0),
        });
        let scraper = Arc::new(ScriptedScraper::new("kabum", vec![ScrapeOutcome::Priced(reading)]));
        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = build(&dir, Arc::new(catalog(ONE_GPU)), scraper, Arc::clone(&notifier));

        let summary = pipeline.run_once(&[], &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.open_box_alerts, 1);
        let subjects = notifier.subjects();
        assert_eq!(subjects.len(), 1);
        assert!(subjects[0].contains("OPEN BOX"));
    }

    #[tokio::test]
    async fn unknown_products_and_stores_are_skipped() {
        let dir = tempdir().unwrap();
        let yaml = r#"
items:
  - id: cruise
    name: Cruzeiro
    category: cruise
    urls:
      - {store: royalcaribbean, url: "https://rc.example.test/cruise"}
"#;
        let scraper = Arc::new(ScriptedScraper::new("kabum", vec![]));
        let notifier = Arc::new(CountingNotifier::default());
        let pipeline = build(&dir, Arc::new(catalog(yaml)), Arc::clone(&scraper), notifier);
        let cancel = CancellationToken::new();

        let all = pipeline.run_once(&[], &cancel).await.unwrap();
        assert_eq!(all.products, 1);
        assert_eq!(all.pairs, 0);

        let filtered = pipeline.run_once(&["missing".to_string()], &cancel).await.unwrap();
        assert_eq!(filtered.products, 0);
        assert_eq!(scraper.calls(), 0);
    }
}
