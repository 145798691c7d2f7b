//! Verifies the configured ServiceM8 credential and prints what it can see.

use rust_sm8_sync::config::{mask_credential, Config};
use rust_sm8_sync::handlers::connection_error_message;
use rust_sm8_sync::sm8_client::ServiceM8Client;

/// Lists one company and the badge catalogue with the credential from the
/// environment (`SM8_API_KEY`, `SM8_BASE_URL`).
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let api_key = &config.settings.api_key;
    if api_key.is_empty() {
        anyhow::bail!("SM8_API_KEY is not set");
    }

    println!(
        "Checking {} with key {}",
        config.base_url,
        mask_credential(api_key)
    );
    let client = ServiceM8Client::new(config.base_url.clone(), api_key.clone())?;

    match client.list_companies(1, 0).await {
        Ok(companies) => {
            println!("✅ Connection successful!");
            if let Some(company) = companies.first() {
                println!("  Company: {}", company.name.as_deref().unwrap_or("Unknown"));
            }
        }
        Err(e) => {
            println!("❌ {}", connection_error_message(&e));
            return Err(e.into());
        }
    }

    let badges = client.list_badges().await?;
    println!("Found {} badge(s):", badges.len());
    for badge in &badges {
        println!(
            "  - {} ({})",
            badge.name.as_deref().unwrap_or("(unnamed)"),
            badge.uuid
        );
    }

    Ok(())
}
