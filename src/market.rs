//! Public wholesale market prices
//!
//! No session is involved. The configured location is resolved to a postcode
//! (or the configured postcode is used directly) and the price list for that
//! postcode replaces the held [`MarketSnapshot`].

use crate::config::Location;
use crate::error::Result;
use crate::geocode::{Address, Geocoder};
use crate::logging::StructuredLogger;
use crate::protocol::Protocol;
use crate::snapshot::SnapshotCell;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

pub mod types;

pub use types::{MarketSnapshot, StaticTariffs, TariffPrices, VariablePeriod};

/// Facade over the public price list endpoint
pub struct MarketFacade {
    protocol: Arc<Protocol>,
    geocoder: Geocoder,
    location: Location,
    postcode: Option<String>,
    cell: SnapshotCell<MarketSnapshot>,
    logger: StructuredLogger,
}

impl MarketFacade {
    pub fn new(
        protocol: Arc<Protocol>,
        location: Location,
        postcode: Option<String>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            geocoder: Geocoder::new(protocol.clone()),
            protocol,
            location,
            postcode: postcode.map(|p| p.trim().to_string()),
            cell: SnapshotCell::new(),
            logger,
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    /// Last successful snapshot, `None` before the first update
    pub fn snapshot(&self) -> Option<Arc<MarketSnapshot>> {
        self.cell.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<MarketSnapshot>>> {
        self.cell.subscribe()
    }

    /// Fetch the price list and replace the held snapshot
    pub async fn update(&self) -> Result<Arc<MarketSnapshot>> {
        self.logger.debug(&format!(
            "Updating market prices for {:.5},{:.5}",
            self.location.latitude, self.location.longitude
        ));
        let started = Instant::now();
        let result = self.fetch().await;
        self.logger
            .outcome("market update", started.elapsed(), &result);
        Ok(self.cell.replace(result?))
    }

    async fn fetch(&self) -> Result<MarketSnapshot> {
        let (postcode, address) = self.resolve_postcode().await?;
        let url = &self.protocol.api_config().market_url;
        let body = self
            .protocol
            .raw_post(url, serde_json::json!({ "postcode": postcode }))
            .await?;
        MarketSnapshot::from_response(body, postcode, address)
    }

    async fn resolve_postcode(&self) -> Result<(String, Option<Address>)> {
        if let Some(postcode) = &self.postcode {
            return Ok((postcode.clone(), None));
        }
        let address = self.geocoder.reverse(&self.location).await?;
        let postcode = address.market_postcode()?.to_string();
        Ok((postcode, Some(address.as_ref().clone())))
    }
}
