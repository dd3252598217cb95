//! # amber-electric - Async client for the Amber Electric APIs
//!
//! Reads three data domains from Amber Electric:
//!
//! - **Market**: public wholesale prices for a location, no account needed
//! - **Price**: the account's current personalized price and forecast
//! - **Usage**: the account's usage, exposed as a loosely typed record
//!
//! ## Architecture
//!
//! - `config`: Configuration loading and validation
//! - `logging`: Structured logging and tracing
//! - `protocol`: Request building, timeouts and status classification over a
//!   pluggable `Transport`
//! - `session`: Credential exchange and session lifecycle
//! - `geocode`: Location to postcode resolution for market data
//! - `market`, `price`, `usage`: Facades holding the last fetched snapshot
//! - `client`: Top-level `AmberClient` and background polling
//!
//! ```no_run
//! use amber_electric::{AmberClient, ClientConfig};
//!
//! # async fn run() -> amber_electric::Result<()> {
//! let client = AmberClient::new(ClientConfig::new(-37.828690, 144.997460))?;
//! let market = client.market().update().await?;
//! println!("{:?} c/kWh in {:?}", market.price(), market.region());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod geocode;
pub mod logging;
pub mod market;
pub mod price;
pub mod protocol;
pub mod session;
pub mod snapshot;
pub mod usage;

// Re-export commonly used types
pub use client::{AmberClient, PollEvent, PollFailure};
pub use config::{ClientConfig, Credentials, Location};
pub use error::{AmberError, Result};
pub use market::{MarketFacade, MarketSnapshot};
pub use price::{PriceFacade, PriceReading, PriceSnapshot};
pub use protocol::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
pub use session::{Session, SessionManager};
pub use usage::{Field, PartialRecord, UsageFacade, UsageSnapshot};
