use crate::decode;
use crate::error::{AmberError, Result};
use crate::geocode::Address;
use crate::protocol::data_member;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Period type the market endpoint uses for settled intervals
pub const ACTUAL_PERIOD: &str = "ACTUAL";

/// One interval of the variable (wholesale) price curve
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablePeriod {
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub period_type: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_f64")]
    pub semi_scheduled_generation: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_f64")]
    pub operational_demand: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_f64")]
    pub rooftop_solar: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_nem")]
    pub created_at: Option<DateTime<FixedOffset>>,
    #[serde(
        default,
        rename = "wholesaleKWHPrice",
        deserialize_with = "decode::opt_f64"
    )]
    pub wholesale_kwh_price: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub region: Option<String>,
    /// Interval start in NEM time
    #[serde(default, deserialize_with = "decode::opt_nem")]
    pub period: Option<DateTime<FixedOffset>>,
    #[serde(default, deserialize_with = "decode::opt_f64")]
    pub renewables_percentage: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    pub period_source: Option<String>,
    #[serde(default, deserialize_with = "decode::opt_f64")]
    pub percentile_rank: Option<f64>,
}

impl VariablePeriod {
    pub fn is_actual(&self) -> bool {
        self.period_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(ACTUAL_PERIOD))
    }
}

/// Fixed tariff components for one meter type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffPrices {
    #[serde(default)]
    pub data_available: Option<bool>,
    #[serde(default, deserialize_with = "decode::opt_f64")]
    pub network_daily_price: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_f64")]
    pub basic_meter_daily_price: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_f64")]
    pub additional_smart_meter_daily_price: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_f64")]
    pub amber_daily_price: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_f64")]
    pub total_daily_price: Option<f64>,
    #[serde(default, rename = "networkKWHPrice", deserialize_with = "decode::opt_f64")]
    pub network_kwh_price: Option<f64>,
    #[serde(default, rename = "marketKWHPrice", deserialize_with = "decode::opt_f64")]
    pub market_kwh_price: Option<f64>,
    #[serde(default, rename = "greenKWHPrice", deserialize_with = "decode::opt_f64")]
    pub green_kwh_price: Option<f64>,
    #[serde(
        default,
        rename = "carbonNeutralKWHPrice",
        deserialize_with = "decode::opt_f64"
    )]
    pub carbon_neutral_kwh_price: Option<f64>,
    #[serde(default, deserialize_with = "decode::opt_f64")]
    pub loss_factor: Option<f64>,
    #[serde(default, rename = "offsetKWHPrice", deserialize_with = "decode::opt_f64")]
    pub offset_kwh_price: Option<f64>,
    #[serde(
        default,
        rename = "totalfixedKWHPrice",
        deserialize_with = "decode::opt_f64"
    )]
    pub total_fixed_kwh_price: Option<f64>,
    #[serde(
        default,
        rename = "totalBlackPeakFixedKWHPrice",
        deserialize_with = "decode::opt_f64"
    )]
    pub total_black_peak_fixed_kwh_price: Option<f64>,
    #[serde(
        default,
        rename = "totalBlackShoulderFixedKWHPrice",
        deserialize_with = "decode::opt_f64"
    )]
    pub total_black_shoulder_fixed_kwh_price: Option<f64>,
    #[serde(
        default,
        rename = "totalBlackOffpeakFixedKWHPrice",
        deserialize_with = "decode::opt_f64"
    )]
    pub total_black_offpeak_fixed_kwh_price: Option<f64>,
}

/// Static tariffs keyed by meter configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticTariffs {
    #[serde(default, rename = "E1")]
    pub e1: Option<TariffPrices>,
    #[serde(default, rename = "E2")]
    pub e2: Option<TariffPrices>,
    #[serde(default, rename = "B1")]
    pub b1: Option<TariffPrices>,
    #[serde(default, rename = "E1TOU")]
    pub e1_tou: Option<TariffPrices>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketData {
    #[serde(default, rename = "currentNEMtime", deserialize_with = "decode::opt_nem")]
    current_nem_time: Option<DateTime<FixedOffset>>,
    #[serde(default, deserialize_with = "decode::opt_string")]
    network_provider: Option<String>,
    #[serde(default)]
    static_prices: Option<StaticTariffs>,
    #[serde(default)]
    variable_prices_and_renewables: Option<Vec<VariablePeriod>>,
}

/// Wholesale market state for one postcode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub nem_time: Option<DateTime<FixedOffset>>,
    pub network_provider: Option<String>,
    /// Sorted by interval start; intervals without a start sort first
    pub periods: Vec<VariablePeriod>,
    pub static_prices: StaticTariffs,
    pub postcode: String,
    pub address: Option<Address>,
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Decode a price list response for `postcode`
    pub fn from_response(
        body: serde_json::Value,
        postcode: String,
        address: Option<Address>,
    ) -> Result<Self> {
        let data = data_member(body, "market")?;
        let data: MarketData = serde_json::from_value(data)
            .map_err(|e| AmberError::protocol(format!("Malformed market response: {}", e)))?;

        let mut periods = data.variable_prices_and_renewables.unwrap_or_default();
        periods.sort_by_key(|p| p.period);

        Ok(Self {
            nem_time: data.current_nem_time,
            network_provider: data.network_provider,
            periods,
            static_prices: data.static_prices.unwrap_or_default(),
            postcode,
            address,
            fetched_at: Utc::now(),
        })
    }

    /// Interval covering the current NEM time
    ///
    /// Falls back to the latest settled interval, then to the first one, when
    /// the response carries no usable clock.
    pub fn current_period(&self) -> Option<&VariablePeriod> {
        let started = self.nem_time.and_then(|now| {
            self.periods
                .iter()
                .rev()
                .find(|p| p.period.is_some_and(|start| start <= now))
        });
        started
            .or_else(|| self.periods.iter().rev().find(|p| p.is_actual()))
            .or_else(|| self.periods.first())
    }

    /// Current wholesale price in c/kWh
    pub fn price(&self) -> Option<f64> {
        self.current_period().and_then(|p| p.wholesale_kwh_price)
    }

    /// NEM region of the current interval
    pub fn region(&self) -> Option<&str> {
        self.current_period().and_then(|p| p.region.as_deref())
    }

    pub fn renewables_percentage(&self) -> Option<f64> {
        self.current_period().and_then(|p| p.renewables_percentage)
    }

    pub fn address_label(&self) -> Option<&str> {
        self.address.as_ref().and_then(|a| a.label.as_deref())
    }

    /// Intervals starting after the current one
    pub fn forecast(&self) -> impl Iterator<Item = &VariablePeriod> {
        let current = self.current_period().and_then(|p| p.period);
        self.periods
            .iter()
            .filter(move |p| match (current, p.period) {
                (Some(now), Some(start)) => start > now,
                _ => false,
            })
    }
}
