//! Account usage
//!
//! The upstream usage hub has not settled on a schema, so the response is kept
//! as a [`PartialRecord`]: the raw `data` value with typed accessors that
//! report [`Field::Unknown`] instead of failing on absent or mistyped fields.

use crate::decode;
use crate::error::{AmberError, Result};
use crate::logging::StructuredLogger;
use crate::protocol::{Protocol, data_member, empty_headers_body};
use crate::session::SessionManager;
use crate::snapshot::SnapshotCell;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

const USAGE_HUB_PATH: &str = "UsageHub/GetUsageForHub";

/// A field read from a loosely typed record
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Present(T),
    Unknown,
}

impl<T> Field<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Field::Present(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Present(v) => Some(v),
            Field::Unknown => None,
        }
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.into_option().unwrap_or(default)
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Field::Unknown, Field::Present)
    }
}

/// Loosely typed view over a JSON object
///
/// Paths are dot separated (`"hub.totalKWH"`); numeric segments index arrays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialRecord {
    raw: Value,
}

impl PartialRecord {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Value at `path`; `null` counts as unknown
    pub fn get(&self, path: &str) -> Field<&Value> {
        let mut node = &self.raw;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            let next = match node {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(v) => node = v,
                None => return Field::Unknown,
            }
        }
        if node.is_null() {
            Field::Unknown
        } else {
            Field::Present(node)
        }
    }

    /// Number at `path`; numeric strings are accepted
    pub fn get_f64(&self, path: &str) -> Field<f64> {
        self.get(path)
            .into_option()
            .and_then(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .into()
    }

    pub fn get_str(&self, path: &str) -> Field<&str> {
        self.get(path).into_option().and_then(Value::as_str).into()
    }

    pub fn get_bool(&self, path: &str) -> Field<bool> {
        self.get(path).into_option().and_then(Value::as_bool).into()
    }

    pub fn get_array(&self, path: &str) -> Field<&[Value]> {
        self.get(path)
            .into_option()
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .into()
    }

    /// Timestamp at `path` in account API format
    pub fn get_datetime(&self, path: &str) -> Field<DateTime<Utc>> {
        self.get_str(path)
            .into_option()
            .and_then(decode::parse_utc)
            .into()
    }

    /// Nested record at `path`
    pub fn record(&self, path: &str) -> Field<PartialRecord> {
        self.get(path)
            .into_option()
            .filter(|v| v.is_object())
            .map(|v| PartialRecord::new(v.clone()))
            .into()
    }

    /// Top-level keys, empty when the record is not an object
    pub fn keys(&self) -> Vec<&str> {
        match &self.raw {
            Value::Object(map) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// Account usage state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub record: PartialRecord,
    pub fetched_at: DateTime<Utc>,
}

impl UsageSnapshot {
    /// Only a body without a `data` member is rejected
    pub fn from_response(body: Value) -> Result<Self> {
        Ok(Self {
            record: PartialRecord::new(data_member(body, "usage")?),
            fetched_at: Utc::now(),
        })
    }
}

/// Facade over the account usage hub
pub struct UsageFacade {
    protocol: Arc<Protocol>,
    sessions: Arc<SessionManager>,
    cell: SnapshotCell<UsageSnapshot>,
    logger: StructuredLogger,
}

impl UsageFacade {
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

    pub fn snapshot(&self) -> Option<Arc<UsageSnapshot>> {
        self.cell.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<UsageSnapshot>>> {
        self.cell.subscribe()
    }

    pub async fn update(&self) -> Result<Arc<UsageSnapshot>> {
        let session = self.sessions.require("usage update")?;
        self.logger.debug("Updating account usage");

        let started = Instant::now();
        let result = async {
            let body = self
                .protocol
                .api_post(USAGE_HUB_PATH, empty_headers_body(), Some(session.as_ref()))
                .await?;
            UsageSnapshot::from_response(body)
        }
        .await;
        self.logger
            .outcome("usage update", started.elapsed(), &result);

        if let Err(AmberError::Auth { .. }) = &result {
            self.sessions.invalidate_if_current(&session);
        }
        Ok(self.cell.replace(result?))
    }
}
