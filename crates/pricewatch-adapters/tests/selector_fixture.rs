use std::sync::Arc;

use pricewatch_adapters::{ScrapeOutcome, ScraperRegistry, SelectorScraper, StoreProfile};
use pricewatch_core::{AlternateOffer, StockStatus};
use pricewatch_storage::{HttpClientConfig, HttpFetcher};

const PAGE: &str = include_str!("fixtures/kabum_product.html");
const URL: &str = "https://www.kabum.com.br/produto/466376";

fn kabum_profile() -> StoreProfile {
    serde_yaml::from_str(
        r#"
store: kabum
price_selectors: ["h4.finalPrice", "[itemprop=price]"]
out_of_stock_markers: ["Produto indisponível"]
alternate_offer_selector: "a[href*='openbox']"
alternate_offer_price_selector: ".openbox-price"
"#,
    )
    .expect("profile yaml")
}

fn http() -> Arc<HttpFetcher> {
    Arc::new(HttpFetcher::new(HttpClientConfig::default()).expect("http client"))
}

#[test]
fn kabum_fixture_parses_final_price_and_open_box() {
    let scraper = SelectorScraper::new(kabum_profile(), http()).expect("scraper");
    let ScrapeOutcome::Priced(reading) = scraper.parse_page(URL, PAGE) else {
        panic!("fixture should yield a price");
    };

    assert_eq!(reading.price, 749.99);
    assert_eq!(reading.raw_price.as_deref(), Some("R$ 749,99"));
    assert_eq!(reading.in_stock, StockStatus::InStock);
    assert_eq!(
        reading.alternate_offer,
        Some(AlternateOffer {
            url: "https://www.kabum.com.br/produto/466376/openbox?ref=pdp".to_string(),
            price: Some(612.90),
        })
    );
}

#[test]
fn json_ld_is_used_when_selectors_miss() {
    let profile = StoreProfile {
        price_selectors: vec![".does-not-exist".to_string()],
        ..kabum_profile()
    };
    let scraper = SelectorScraper::new(profile, http()).expect("scraper");
    let ScrapeOutcome::Priced(reading) = scraper.parse_page(URL, PAGE) else {
        panic!("json-ld fallback should yield a price");
    };
    assert_eq!(reading.price, 749.99);
}

#[test]
fn registry_builds_one_scraper_per_profile() {
    let profiles = vec![kabum_profile(), StoreProfile::new("pichau")];
    let registry = ScraperRegistry::from_profiles(&profiles, http()).expect("registry");
    assert_eq!(registry.stores().collect::<Vec<_>>(), vec!["kabum", "pichau"]);
}
