//! Shared fixtures for integration tests
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use amber_electric::error::{AmberError, Result};
use amber_electric::protocol::{ApiRequest, ApiResponse, Transport};
use amber_electric::{AmberClient, ClientConfig};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const LATITUDE: f64 = -37.828690;
pub const LONGITUDE: f64 = 144.997460;

pub const SIGN_IN: &str = "Authentication/SignIn";
pub const PRICE: &str = "Price/GetPriceList";
pub const USAGE: &str = "UsageHub/GetUsageForHub";
pub const MARKET: &str = "prices/listprices";
pub const GEOCODE: &str = "nominatim";

/// Canned upstream behaviour for one request
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    Fail(String),
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn json(body: Value) -> Self {
        Reply::Status(200, body.to_string())
    }

    pub fn status(status: u16, body: &str) -> Self {
        Reply::Status(status, body.to_string())
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Reply::Delayed(delay, Box::new(self))
    }
}

struct Route {
    pattern: String,
    replies: VecDeque<Reply>,
}

/// In-memory transport routing by URL substring
///
/// Each route serves its replies in order; the last one is repeated.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, pattern: &str, reply: Reply) -> &Self {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|r| r.pattern == pattern) {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                pattern: pattern.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.url.contains(pattern))
            .count()
    }

    pub fn last_call_to(&self, pattern: &str) -> Option<ApiRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.url.contains(pattern))
            .cloned()
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap();
        let route = routes.iter_mut().find(|r| url.contains(&r.pattern))?;
        if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        }
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = request.url.clone();
        self.calls.lock().unwrap().push(request);
        let mut reply = self
            .next_reply(&url)
            .ok_or_else(|| AmberError::fetch(format!("connection refused: {}", url)))?;
        loop {
            match reply {
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                Reply::Status(status, body) => return Ok(ApiResponse::new(status, body)),
                Reply::Fail(message) => return Err(AmberError::fetch(message)),
            }
        }
    }
}

pub fn config() -> ClientConfig {
    ClientConfig::new(LATITUDE, LONGITUDE)
}

pub fn config_with_credentials() -> ClientConfig {
    config().with_credentials("family@example.com", "secret")
}

pub fn client(config: ClientConfig, transport: &Arc<MockTransport>) -> AmberClient {
    AmberClient::with_transport(config, transport.clone()).unwrap()
}

pub fn sign_in_body() -> Value {
    json!({
        "serviceResponseType": 1,
        "data": {
            "name": "Family",
            "firstName": "Pat",
            "lastName": "Doe",
            "postcode": "3121",
            "email": "family@example.com",
            "idToken": "id-token-1",
            "refreshToken": "refresh-token-1"
        }
    })
}

pub fn price_body(current: f64) -> Value {
    json!({
        "serviceResponseType": 1,
        "data": {
            "currentPriceKWH": current,
            "currentRenewableInGrid": 42.0,
            "currentPriceColor": "GREEN",
            "currentPricePeriod": "2021-03-01T10:30:00Z",
            "forecastPrices": [
                {"priceKWH": 25.0, "renewableInGrid": 30.0, "color": "yellow", "period": "2021-03-01T11:30:00Z"},
                {"priceKWH": 19.5, "renewableInGrid": 35.0, "color": "green", "period": "2021-03-01T11:00:00Z"}
            ]
        }
    })
}

pub fn usage_body() -> Value {
    json!({
        "serviceResponseType": 1,
        "data": {
            "hubId": 77,
            "totalKWH": "14.2",
            "channels": [{"identifier": "E1", "kwh": 14.2}]
        }
    })
}

pub fn market_body(price: f64, provider: &str) -> Value {
    json!({
        "serviceResponseType": 1,
        "data": {
            "currentNEMtime": "2021-03-01T10:32:00",
            "networkProvider": provider,
            "staticPrices": {
                "E1": {"dataAvailable": true, "totalDailyPrice": 98.5, "networkKWHPrice": 7.1}
            },
            "variablePricesAndRenewables": [
                {"periodType": "ACTUAL", "period": "2021-03-01T10:00:00", "wholesaleKWHPrice": price - 1.0, "region": "VIC1"},
                {"periodType": "ACTUAL", "period": "2021-03-01T10:30:00", "wholesaleKWHPrice": price, "region": "VIC1", "renewablesPercentage": 41.2},
                {"periodType": "FORECAST", "period": "2021-03-01T11:00:00", "wholesaleKWHPrice": price + 2.0, "region": "VIC1"}
            ]
        }
    })
}

pub fn geocode_body(country: &str, postcode: Option<&str>) -> Value {
    json!({
        "type": "FeatureCollection",
        "geocoding": {"attribution": "Data © OpenStreetMap contributors, ODbL 1.0", "query": "-37.82869,144.99746"},
        "features": [{
            "type": "Feature",
            "properties": {"geocoding": {
                "place_id": 1234,
                "osm_type": "way",
                "osm_id": 5678,
                "type": "house",
                "label": "1 Example Street, Richmond, Melbourne, Victoria, 3121, Australia",
                "country": country,
                "postcode": postcode,
                "state": "Victoria",
                "city": "Melbourne",
                "district": "Richmond",
                "street": "Example Street"
            }}
        }]
    })
}

/// Transport answering every endpoint successfully
pub fn happy_transport() -> Arc<MockTransport> {
    let transport = MockTransport::new();
    transport
        .on(GEOCODE, Reply::json(geocode_body("Australia", Some("3121"))))
        .on(MARKET, Reply::json(market_body(6.5, "CitiPower")))
        .on(SIGN_IN, Reply::json(sign_in_body()))
        .on(PRICE, Reply::json(price_body(21.5)))
        .on(USAGE, Reply::json(usage_body()));
    transport
}
