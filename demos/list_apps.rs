//! List apps example.
//!
//! This example authenticates with an API key from the environment, walks
//! every page of the apps list, and prints one line per app.
//!
//! Run with: cargo run --example list_apps
//!
//! Required environment variables:
//! - ASC_KEY_ID: Key identifier
//! - ASC_ISSUER_ID: Issuer identifier
//! - ASC_PRIVATE_KEY_PATH: Path to the `.p8` private key (or ASC_PRIVATE_KEY with the PEM text)

use connect_core::client::DEFAULT_MAX_PAGES;
use connect_core::{ConnectClient, Request};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct App {
    id: String,
    attributes: AppAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppAttributes {
    name: String,
    bundle_id: String,
}

#[tokio::main]
async fn main() -> connect_core::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let client = ConnectClient::from_env()?;

    let request = Request::get("/v1/apps")
        .query("fields[apps]", "name,bundleId")
        .query("limit", "200");
    let collected = client.collect_pages::<App>(request, DEFAULT_MAX_PAGES).await?;

    println!("Found {} app(s):", collected.items.len());
    for app in &collected.items {
        println!("  - {} {} ({})", app.id, app.attributes.name, app.attributes.bundle_id);
    }

    if !collected.is_complete() {
        println!(
            "\nStopped after {} pages; the service reports {:?} apps in total.",
            collected.pages_fetched, collected.total
        );
    }

    Ok(())
}
