//! Fetch and print the current wholesale market snapshot
//!
//! Usage: `cargo run --example market_snapshot [-- <latitude> <longitude>]`
//!
//! Set `AMBER_USERNAME` / `AMBER_PASSWORD` to also print the account price.

use amber_electric::logging::init_logging;
use amber_electric::{AmberClient, ClientConfig};
use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let latitude: f64 = args
        .next()
        .map(|s| s.parse())
        .transpose()
        .context("latitude must be a number")?
        .unwrap_or(-37.828690);
    let longitude: f64 = args
        .next()
        .map(|s| s.parse())
        .transpose()
        .context("longitude must be a number")?
        .unwrap_or(144.997460);

    let config = ClientConfig::new(latitude, longitude).with_env_credentials();
    init_logging(&config.logging)?;

    let client = AmberClient::new(config)?;
    let market = client.market().update().await?;

    println!(
        "{} ({})",
        market.address_label().unwrap_or("unknown address"),
        market.postcode
    );
    println!(
        "Network: {}",
        market.network_provider.as_deref().unwrap_or("unknown")
    );
    if let Some(period) = market.current_period() {
        println!(
            "Wholesale: {:.2} c/kWh in {} ({:.0}% renewables)",
            period.wholesale_kwh_price.unwrap_or_default(),
            period.region.as_deref().unwrap_or("?"),
            period.renewables_percentage.unwrap_or_default()
        );
    }
    for period in market.forecast().take(6) {
        if let (Some(start), Some(price)) = (period.period, period.wholesale_kwh_price) {
            println!("  {} {:>7.2} c/kWh", start.format("%H:%M"), price);
        }
    }

    if client.sessions().has_credentials() {
        client.authenticate().await?;
        let price = client.price().update().await?;
        println!(
            "Account price: {:.2} c/kWh {}",
            price.current.kwh.unwrap_or_default(),
            price.current.emoji()
        );
    }

    Ok(())
}
