//! Top-level client wiring the session and the three facades together

use crate::config::ClientConfig;
use crate::error::{AmberError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::market::{MarketFacade, MarketSnapshot};
use crate::price::{PriceFacade, PriceSnapshot};
use crate::protocol::{Protocol, ReqwestTransport, Transport};
use crate::session::{Session, SessionManager};
use crate::usage::{UsageFacade, UsageSnapshot};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

const POLL_CHANNEL_CAPACITY: usize = 16;

/// Value of the active poller generation while no poller should run
const NO_POLLER: u64 = 0;

/// A domain that failed during one polling round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFailure {
    pub domain: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl PollFailure {
    fn new(domain: &'static str, error: &AmberError) -> Self {
        Self {
            domain,
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Result of one polling round, broadcast to subscribers
#[derive(Debug, Clone)]
pub struct PollEvent {
    pub timestamp: DateTime<Utc>,
    pub postcode: Option<String>,
    pub address: Option<String>,
    pub market: Option<Arc<MarketSnapshot>>,
    pub price: Option<Arc<PriceSnapshot>>,
    pub usage: Option<Arc<UsageSnapshot>>,
    pub failures: Vec<PollFailure>,
}

impl PollEvent {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Amber Electric client
///
/// Market data is available straight away. Price and usage need credentials
/// in the config and a successful [`AmberClient::authenticate`] call first.
pub struct AmberClient {
    config: ClientConfig,
    client_id: Uuid,
    sessions: Arc<SessionManager>,
    market: MarketFacade,
    price: PriceFacade,
    usage: UsageFacade,
    last_generation: AtomicU64,
    /// Generation of the poller allowed to run, [`NO_POLLER`] when stopped
    active_poller: watch::Sender<u64>,
    poll_tx: broadcast::Sender<PollEvent>,
    logger: StructuredLogger,
}

impl AmberClient {
    /// Create a client using the reqwest transport
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config.api)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client over a caller-supplied transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let client_id = Uuid::new_v4();
        let logger_for = |component: &str| {
            get_logger_with_context(
                LogContext::new(component).with_client_id(client_id.to_string()),
            )
        };

        let protocol = Arc::new(Protocol::new(config.api.clone(), transport));
        let sessions = Arc::new(
            SessionManager::new(protocol.clone(), config.credentials.clone())
                .with_logger(logger_for("session")),
        );
        let market = MarketFacade::new(
            protocol.clone(),
            config.location,
            config.postcode.clone(),
            logger_for("market"),
        );
        let price = PriceFacade::new(protocol.clone(), sessions.clone(), logger_for("price"));
        let usage = UsageFacade::new(protocol, sessions.clone(), logger_for("usage"));

        let (active_poller, _active_rx) = watch::channel(NO_POLLER);
        let (poll_tx, _poll_rx) = broadcast::channel(POLL_CHANNEL_CAPACITY);

        let logger = logger_for("client");
        logger.info(&format!(
            "Client created for {:.5},{:.5} (credentials: {})",
            config.location.latitude,
            config.location.longitude,
            if sessions.has_credentials() { "yes" } else { "no" }
        ));

        Ok(Self {
            config,
            client_id,
            sessions,
            market,
            price,
            usage,
            last_generation: AtomicU64::new(NO_POLLER),
            active_poller,
            poll_tx,
            logger,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn market(&self) -> &MarketFacade {
        &self.market
    }

    pub fn price(&self) -> &PriceFacade {
        &self.price
    }

    pub fn usage(&self) -> &UsageFacade {
        &self.usage
    }

    /// Shorthand for `sessions().authenticate()`
    pub async fn authenticate(&self) -> Result<Arc<Session>> {
        self.sessions.authenticate().await
    }

    /// Refresh every available domain, stopping at the first failure
    ///
    /// Price and usage are only attempted when credentials are configured.
    pub async fn update(&self) -> Result<()> {
        if self.sessions.has_credentials() {
            self.price.update().await?;
            self.usage.update().await?;
        }
        self.market.update().await?;
        Ok(())
    }

    /// Postcode of the last market snapshot, or the configured one
    pub fn postcode(&self) -> Option<String> {
        self.market
            .snapshot()
            .map(|s| s.postcode.clone())
            .or_else(|| self.config.postcode.clone())
    }

    /// Address label of the last market snapshot
    pub fn address(&self) -> Option<String> {
        self.market
            .snapshot()
            .and_then(|s| s.address_label().map(str::to_string))
    }

    /// Run one round of updates, collecting failures instead of stopping
    pub async fn poll_once(&self) -> PollEvent {
        let mut failures = Vec::new();
        if self.sessions.has_credentials() {
            if let Err(e) = self.price.update().await {
                failures.push(PollFailure::new("price", &e));
            }
            if let Err(e) = self.usage.update().await {
                failures.push(PollFailure::new("usage", &e));
            }
        }
        if let Err(e) = self.market.update().await {
            failures.push(PollFailure::new("market", &e));
        }

        PollEvent {
            timestamp: Utc::now(),
            postcode: self.postcode(),
            address: self.address(),
            market: self.market.snapshot(),
            price: self.price.snapshot(),
            usage: self.usage.snapshot(),
            failures,
        }
    }

    /// Receiver for events produced by [`AmberClient::poll_for_updates`]
    pub fn subscribe_polls(&self) -> broadcast::Receiver<PollEvent> {
        self.poll_tx.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        *self.active_poller.borrow() != NO_POLLER
    }

    /// Start refreshing every `interval` in a background task
    ///
    /// Returns `None` when a poller is already running. The task holds only a
    /// weak reference and ends when the client is dropped or
    /// [`AmberClient::stop_polling`] is called. A new poller may be started
    /// right after `stop_polling`, before the old task has finished.
    pub fn poll_for_updates(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            self.logger.warn("Polling interval must be greater than zero");
            return None;
        }
        let generation = self.last_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let claimed = self.active_poller.send_if_modified(|active| {
            if *active != NO_POLLER {
                return false;
            }
            *active = generation;
            true
        });
        if !claimed {
            self.logger
                .warn("Already polling for updates. Not starting another poller.");
            return None;
        }

        let active_rx = self.active_poller.subscribe();
        self.logger
            .info(&format!("Polling for updates every {:?}", interval));

        Some(tokio::spawn(poll_loop(
            Arc::downgrade(self),
            interval,
            generation,
            active_rx,
        )))
    }

    /// Ask a running poller to stop after its current round
    ///
    /// [`AmberClient::is_polling`] reports `false` as soon as this returns.
    pub fn stop_polling(&self) {
        self.active_poller.send_replace(NO_POLLER);
    }
}

async fn poll_loop(
    client: Weak<AmberClient>,
    interval: Duration,
    generation: u64,
    mut active_rx: watch::Receiver<u64>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *active_rx.borrow() != generation {
                    break;
                }
                let Some(client) = client.upgrade() else { break };
                let event = client.poll_once().await;
                if !event.is_clean() {
                    client.logger.debug(&format!(
                        "Poll round finished with {} failure(s)",
                        event.failures.len()
                    ));
                }
                // No subscribers is not an error
                let _ = client.poll_tx.send(event);
            }
            changed = active_rx.changed() => {
                if changed.is_err() || *active_rx.borrow() != generation {
                    break;
                }
            }
        }
    }

    if let Some(client) = client.upgrade() {
        client
            .logger
            .info(&format!("Stopped poller generation {}", generation));
    }
}
