use std::sync::Arc;

use storehelper::{models::transaction::Transaction, Config, SandboxAuthority, StoreService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,storehelper=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;

    tracing::info!(
        "Loaded configuration - tracking {} products",
        config.store.product_ids.len()
    );

    let authority = Arc::new(SandboxAuthority::new(&config.sandbox));
    let service = StoreService::new(authority, &config);

    service
        .start_listener(|transaction: &Transaction| {
            tracing::info!(
                transaction_id = transaction.id,
                product_id = %transaction.product_id,
                "Entitlement update"
            );
        })
        .await?;

    let products = service.fetch_products(&[]).await;
    for product in &products {
        tracing::info!(
            product_id = %product.id,
            product_type = product.product_type().as_str(),
            price = %product.display_price,
            "Catalog entry"
        );
    }

    if let Some(product) = products.first() {
        let result = service.purchase_default(product).await?;
        tracing::info!(result = result.as_str(), "Demo purchase finished");
    }

    match service.restore().await? {
        Some(transaction) => tracing::info!(
            product_id = %transaction.product_id,
            "Restored entitlement"
        ),
        None => tracing::info!("Nothing to restore"),
    }

    let snapshot = service.current_entitlements().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    service.shutdown().await;
    Ok(())
}
