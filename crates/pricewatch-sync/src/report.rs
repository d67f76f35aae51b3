//! Plain-text report of the latest snapshot per (product, store).

use anyhow::Result;
use pricewatch_adapters::currency::format_brl;
use pricewatch_core::{Snapshot, StockStatus};
use pricewatch_storage::HistoryStore;

fn stock_label(status: StockStatus) -> &'static str {
    match status {
        StockStatus::InStock => "in stock",
        StockStatus::OutOfStock => "out of stock",
        StockStatus::Unknown => "-",
    }
}

fn render_row(snapshot: &Snapshot) -> String {
    let price = match (snapshot.price, snapshot.error.as_deref()) {
        (Some(price), None) => format_brl(price),
        (_, Some(error)) => format!("error: {error}"),
        (None, None) => "-".to_string(),
    };
    format!(
        "- {} [{}] {} | {} | {}",
        snapshot.product_name,
        snapshot.store,
        price,
        stock_label(snapshot.in_stock),
        snapshot.fetched_at.format("%Y-%m-%d %H:%M UTC"),
    )
}

pub async fn latest_report(history: &HistoryStore) -> Result<String> {
    let latest = history.latest_by_product_store().await?;
    if latest.is_empty() {
        return Ok(format!("no price history in {}", history.path().display()));
    }

    let mut lines = vec![format!("# Latest prices ({} entries)", latest.len()), String::new()];
    let mut current_product = None;
    for ((product_id, _store), snapshot) in &latest {
        if current_product != Some(product_id) {
            if current_product.is_some() {
                lines.push(String::new());
            }
            lines.push(format!("## {product_id}"));
            current_product = Some(product_id);
        }
        lines.push(render_row(snapshot));
    }
    Ok(lines.join("\n"))
}
