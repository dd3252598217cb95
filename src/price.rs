//! Personalized account pricing
//!
//! Requires an active session. The upstream list carries the price in effect
//! now plus a forecast of upcoming intervals.

use crate::decode;
use crate::error::{AmberError, Result};
use crate::logging::StructuredLogger;
use crate::protocol::{Protocol, data_member, empty_headers_body};
use crate::session::SessionManager;
use crate::snapshot::SnapshotCell;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

const PRICE_LIST_PATH: &str = "Price/GetPriceList";

/// Price for one interval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceReading {
    /// c/kWh
    #[serde(default, rename = "priceKWH", deserialize_with = "decode::opt_f64")]
    pub kwh: Option<f64>,
    /// Percentage of renewables in the grid
    #[serde(default, rename = "renewableInGrid", deserialize_with = "decode::opt_f64")]
    pub renewable: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub color: Option<String>,
    /// Interval start
    #[serde(default, deserialize_with = "decode::opt_utc")]
    pub period: Option<DateTime<Utc>>,
}

impl PriceReading {
    /// Renewable share as a fraction in `0.0..=1.0`
    pub fn renewable_fraction(&self) -> Option<f64> {
        self.renewable.map(|r| r / 100.0)
    }

    pub fn color_name(&self) -> Option<String> {
        self.color.as_ref().map(|c| c.to_lowercase())
    }

    pub fn emoji(&self) -> &'static str {
        match self.color_name().as_deref() {
            Some("red") => "🔴",
            Some("yellow") => "🟡",
            Some("green") => "🟢",
            _ => "🤷",
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceListData {
    #[serde(default, rename = "currentPriceKWH", deserialize_with = "decode::opt_f64")]
    current_price_kwh: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_f64")]
    current_renewable_in_grid: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    current_price_color: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_utc")]
    current_price_period: Option<DateTime<Utc>>,
    #[serde(default)]
    forecast_prices: Option<Vec<PriceReading>>,
}

/// Account price state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSnapshot {
    pub current: PriceReading,
    /// Sorted by interval start
    pub forecast: Vec<PriceReading>,
    pub fetched_at: DateTime<Utc>,
}

impl PriceSnapshot {
    pub fn from_response(body: serde_json::Value) -> Result<Self> {
        let data = data_member(body, "price list")?;
        let data: PriceListData = serde_json::from_value(data)
            .map_err(|e| AmberError::protocol(format!("Malformed price list: {}", e)))?;

        let mut forecast = data.forecast_prices.unwrap_or_default();
        forecast.sort_by_key(|r| r.period);

        Ok(Self {
            current: PriceReading {
                kwh: data.current_price_kwh,
                renewable: data.current_renewable_in_grid,
                color: data.current_price_color,
                period: data.current_price_period,
            },
            forecast,
            fetched_at: Utc::now(),
        })
    }

    /// Current price in c/kWh
    pub fn price(&self) -> Option<f64> {
        self.current.kwh
    }

    /// Cheapest upcoming interval
    pub fn cheapest_forecast(&self) -> Option<&PriceReading> {
        self.forecast
            .iter()
            .filter(|r| r.kwh.is_some())
            .min_by(|a, b| a.kwh.partial_cmp(&b.kwh).unwrap_or(std::cmp::Ordering::Equal))
    }
}

/// Facade over the account price list
pub struct PriceFacade {
    protocol: Arc<Protocol>,
    sessions: Arc<SessionManager>,
    cell: SnapshotCell<PriceSnapshot>,
    logger: StructuredLogger,
}

impl PriceFacade {
    pub fn new(
        protocol: Arc<Protocol>,
        sessions: Arc<SessionManager>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            protocol,
            sessions,
            cell: SnapshotCell::new(),
            logger,
        }
    }

    pub fn snapshot(&self) -> Option<Arc<PriceSnapshot>> {
        self.cell.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<PriceSnapshot>>> {
        self.cell.subscribe()
    }

    /// Fetch the account price list and replace the held snapshot
    ///
    /// Fails with `SessionRequired` before any I/O when not authenticated. A
    /// 401/403 drops the session that was used.
    pub async fn update(&self) -> Result<Arc<PriceSnapshot>> {
        let session = self.sessions.require("price update")?;
        self.logger.debug("Updating account prices");

        let started = Instant::now();
        let result = async {
            let body = self
                .protocol
                .api_post(PRICE_LIST_PATH, empty_headers_body(), Some(session.as_ref()))
                .await?;
            PriceSnapshot::from_response(body)
        }
        .await;
        self.logger
            .outcome("price update", started.elapsed(), &result);

        if let Err(AmberError::Auth { .. }) = &result {
            self.sessions.invalidate_if_current(&session);
        }
        Ok(self.cell.replace(result?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_current_and_sorted_forecast() {
        let body = json!({
            "data": {
                "currentPriceKWH": 21.5,
                "currentRenewableInGrid": "38",
                "currentPriceColor": "YELLOW",
                "currentPricePeriod": "2021-03-01T10:30:00Z",
                "forecastPrices": [
                    {"priceKWH": 30.1, "renewableInGrid": 20, "color": "red", "period": "2021-03-01T11:30:00Z"},
                    {"priceKWH": 14.0, "renewableInGrid": 55, "color": "green", "period": "2021-03-01T11:00:00Z"}
                ]
            }
        });
        let snapshot = PriceSnapshot::from_response(body).unwrap();
        assert_eq!(snapshot.price(), Some(21.5));
        assert_eq!(snapshot.current.renewable_fraction(), Some(0.38));
        assert_eq!(snapshot.current.color_name().as_deref(), Some("yellow"));
        assert_eq!(snapshot.current.emoji(), "🟡");
        assert_eq!(snapshot.forecast[0].kwh, Some(14.0));
        assert_eq!(snapshot.cheapest_forecast().unwrap().emoji(), "🟢");
    }

    #[test]
    fn unknown_color_gets_shrug() {
        let reading = PriceReading {
            color: Some("purple".into()),
            ..Default::default()
        };
        assert_eq!(reading.emoji(), "🤷");
        assert_eq!(PriceReading::default().emoji(), "🤷");
    }

    #[test]
    fn missing_data_is_protocol_error() {
        let err = PriceSnapshot::from_response(json!({"message": "nope"})).unwrap_err();
        assert!(matches!(err, AmberError::Protocol { .. }));
    }
}
