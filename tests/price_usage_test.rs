#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use amber_electric::error::AmberError;
use amber_electric::usage::Field;
use common::*;
use serde_json::json;

#[tokio::test]
async fn price_snapshot_round_trips_reading_fields() {
    let transport = happy_transport();
    let client = client(config_with_credentials(), &transport);
    client.authenticate().await.unwrap();

    let snapshot = client.price().update().await.unwrap();
    let current = &snapshot.current;
    assert_eq!(current.kwh, Some(21.5));
    assert_eq!(current.renewable, Some(42.0));
    assert_eq!(current.color.as_deref(), Some("GREEN"));
    assert_eq!(
        current.period.unwrap().to_rfc3339(),
        "2021-03-01T10:30:00+00:00"
    );
    assert_eq!(current.emoji(), "🟢");

    let periods: Vec<_> = snapshot
        .forecast
        .iter()
        .map(|r| r.period.unwrap().format("%H:%M").to_string())
        .collect();
    assert_eq!(periods, vec!["11:00", "11:30"]);
}

#[tokio::test]
async fn price_request_carries_account_body() {
    let transport = happy_transport();
    let client = client(config_with_credentials(), &transport);
    client.authenticate().await.unwrap();
    client.price().update().await.unwrap();

    let call = transport.last_call_to(PRICE).unwrap();
    assert_eq!(call.body.as_ref().unwrap()["headers"]["lazyUpdate"], serde_json::Value::Null);
    assert_eq!(call.header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn usage_tolerates_unknown_shape() {
    let transport = happy_transport();
    let client = client(config_with_credentials(), &transport);
    client.authenticate().await.unwrap();

    let snapshot = client.usage().update().await.unwrap();
    let record = &snapshot.record;
    assert_eq!(record.get_f64("totalKWH"), Field::Present(14.2));
    assert_eq!(record.get_str("channels.0.identifier"), Field::Present("E1"));
    assert_eq!(record.get_f64("hubId"), Field::Present(77.0));
    assert_eq!(record.get_str("meterSerial"), Field::Unknown);
    assert_eq!(record.get_bool("totalKWH"), Field::Unknown);
}

#[tokio::test]
async fn usage_with_empty_data_still_succeeds() {
    let transport = MockTransport::new();
    transport
        .on(SIGN_IN, Reply::json(sign_in_body()))
        .on(USAGE, Reply::json(json!({"data": {}})));
    let client = client(config_with_credentials(), &transport);
    client.authenticate().await.unwrap();

    let snapshot = client.usage().update().await.unwrap();
    assert!(snapshot.record.keys().is_empty());
    assert_eq!(snapshot.record.get_f64("totalKWH"), Field::Unknown);
}

#[tokio::test]
async fn usage_without_data_is_protocol_error() {
    let transport = MockTransport::new();
    transport
        .on(SIGN_IN, Reply::json(sign_in_body()))
        .on(USAGE, Reply::json(json!({"serviceResponseType": 0})));
    let client = client(config_with_credentials(), &transport);
    client.authenticate().await.unwrap();

    let err = client.usage().update().await.unwrap_err();
    assert!(matches!(err, AmberError::Protocol { .. }));
    assert!(client.usage().snapshot().is_none());
    // A decoding fault is not a session problem
    assert!(client.sessions().is_active());
}

#[tokio::test]
async fn forbidden_usage_invalidates_session() {
    let transport = MockTransport::new();
    transport
        .on(SIGN_IN, Reply::json(sign_in_body()))
        .on(USAGE, Reply::status(403, ""));
    let client = client(config_with_credentials(), &transport);
    client.authenticate().await.unwrap();

    let err = client.usage().update().await.unwrap_err();
    assert!(matches!(err, AmberError::Auth { .. }));
    assert!(!client.sessions().is_active());
}

#[tokio::test]
async fn client_update_refreshes_every_domain() {
    let transport = happy_transport();
    let client = client(config_with_credentials(), &transport);
    client.authenticate().await.unwrap();

    client.update().await.unwrap();
    assert!(client.price().snapshot().is_some());
    assert!(client.usage().snapshot().is_some());
    assert!(client.market().snapshot().is_some());
}

#[tokio::test]
async fn client_update_without_credentials_only_touches_market() {
    let transport = happy_transport();
    let client = client(config(), &transport);

    client.update().await.unwrap();
    assert!(client.market().snapshot().is_some());
    assert_eq!(transport.calls_to(PRICE), 0);
    assert_eq!(transport.calls_to(USAGE), 0);
}

#[tokio::test]
async fn client_update_propagates_first_failure() {
    let transport = happy_transport();
    let client = client(config_with_credentials(), &transport);

    let err = client.update().await.unwrap_err();
    assert!(matches!(err, AmberError::SessionRequired { .. }));
    assert!(client.market().snapshot().is_none());
}
