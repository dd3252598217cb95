//! Reverse geocoding of the configured location
//!
//! The public market endpoint is keyed by postcode, so a latitude/longitude
//! pair is turned into an address through a Nominatim-compatible service.
//! Results are cached per point for the lifetime of the geocoder.

use crate::config::Location;
use crate::decode;
use crate::error::{AmberError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::protocol::Protocol;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Country an address must resolve to before it can be used for market data
pub const SUPPORTED_COUNTRY: &str = "Australia";

/// Address resolved for a location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub place_id: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub osm_type: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub osm_id: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "decode::opt_string")]
    pub location_type: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_f64")]
    pub accuracy: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub postcode: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub district: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub street: Option<String>,
    /// Attribution string the geocoder asks consumers to display
    #[serde(skip_deserializing)]
    pub attribution: Option<String>,
}

impl Address {
    /// Decode a `geocodejson` reverse lookup response
    pub fn from_geocodejson(body: &serde_json::Value) -> Result<Self> {
        let feature_geocoding = body
            .get("features")
            .and_then(|f| f.as_array())
            .and_then(|features| features.first())
            .and_then(|feature| feature.get("properties"))
            .and_then(|props| props.get("geocoding"))
            .ok_or_else(|| AmberError::location("Geocoder returned no address for location"))?;

        let mut address: Address = serde_json::from_value(feature_geocoding.clone())
            .map_err(|e| AmberError::protocol(format!("Malformed geocoder response: {}", e)))?;
        address.attribution = body
            .get("geocoding")
            .and_then(|g| g.get("attribution"))
            .and_then(|a| a.as_str())
            .map(str::to_string);
        Ok(address)
    }

    /// Postcode usable for Australian market data
    pub fn market_postcode(&self) -> Result<&str> {
        match (self.postcode.as_deref(), self.country.as_deref()) {
            (Some(postcode), Some(SUPPORTED_COUNTRY)) if !postcode.trim().is_empty() => {
                Ok(postcode.trim())
            }
            (_, country) => Err(AmberError::location(format!(
                "Address unsuitable for market data (country: {}, postcode: {})",
                country.unwrap_or("unknown"),
                self.postcode.as_deref().unwrap_or("none")
            ))),
        }
    }
}

/// Reverse geocoder with a per-point cache
pub struct Geocoder {
    protocol: Arc<Protocol>,
    cache: Mutex<HashMap<String, Arc<Address>>>,
    logger: StructuredLogger,
}

impl Geocoder {
    pub fn new(protocol: Arc<Protocol>) -> Self {
        Self {
            protocol,
            cache: Mutex::new(HashMap::new()),
            logger: get_logger("geocode"),
        }
    }

    /// Address for a location, served from cache when already resolved
    pub async fn reverse(&self, location: &Location) -> Result<Arc<Address>> {
        let key = location.cache_key();
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        let api = self.protocol.api_config();
        let mut query = vec![
            ("lat".to_string(), location.latitude.to_string()),
            ("lon".to_string(), location.longitude.to_string()),
            ("format".to_string(), "geocodejson".to_string()),
            ("addressdetails".to_string(), "1".to_string()),
        ];
        if let Some(email) = &api.contact_email {
            query.push(("email".to_string(), email.clone()));
        }

        let started = Instant::now();
        let result = async {
            let body = self.protocol.get_json(&api.geocode_url, query).await?;
            Address::from_geocodejson(&body)
        }
        .await;
        self.logger
            .outcome("reverse geocode", started.elapsed(), &result);

        let address = Arc::new(result?);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, address.clone());
        Ok(address)
    }

    fn cached(&self, key: &str) -> Option<Arc<Address>> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}
