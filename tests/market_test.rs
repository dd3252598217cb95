#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use amber_electric::error::AmberError;
use common::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn market_update_needs_no_credentials() {
    let transport = happy_transport();
    let client = client(config(), &transport);
    assert!(client.market().snapshot().is_none());

    let snapshot = client.market().update().await.unwrap();
    assert_eq!(snapshot.price(), Some(6.5));
    assert_eq!(snapshot.region(), Some("VIC1"));
    assert_eq!(snapshot.postcode, "3121");
    assert_eq!(snapshot.network_provider.as_deref(), Some("CitiPower"));
    assert!(snapshot.address_label().unwrap().contains("Richmond"));

    assert_eq!(transport.calls_to(SIGN_IN), 0);
    let call = transport.last_call_to(MARKET).unwrap();
    assert!(call.header("authorization").is_none());
    assert_eq!(call.body.unwrap()["postcode"], "3121");

    assert_eq!(client.postcode().as_deref(), Some("3121"));
    assert!(client.address().is_some());
}

#[tokio::test]
async fn snapshot_mirrors_response_fields() {
    let transport = happy_transport();
    let client = client(config(), &transport);

    let snapshot = client.market().update().await.unwrap();
    assert_eq!(snapshot.periods.len(), 3);
    let wholesale: Vec<_> = snapshot
        .periods
        .iter()
        .map(|p| p.wholesale_kwh_price.unwrap())
        .collect();
    assert_eq!(wholesale, vec![5.5, 6.5, 8.5]);
    assert_eq!(snapshot.periods[1].renewables_percentage, Some(41.2));
    assert_eq!(snapshot.periods[2].period_type.as_deref(), Some("FORECAST"));

    let e1 = snapshot.static_prices.e1.as_ref().unwrap();
    assert_eq!(e1.total_daily_price, Some(98.5));
    assert_eq!(e1.network_kwh_price, Some(7.1));
}

#[tokio::test]
async fn geocoder_receives_location_and_is_cached() {
    let transport = happy_transport();
    let client = client(config(), &transport);

    client.market().update().await.unwrap();
    client.market().update().await.unwrap();

    assert_eq!(transport.calls_to(GEOCODE), 1);
    assert_eq!(transport.calls_to(MARKET), 2);

    let lookup = transport.last_call_to(GEOCODE).unwrap();
    assert_eq!(lookup.query_param("lat"), Some("-37.82869"));
    assert_eq!(lookup.query_param("lon"), Some("144.99746"));
    assert_eq!(lookup.query_param("format"), Some("geocodejson"));
}

#[tokio::test]
async fn configured_postcode_skips_geocoding() {
    // The location geocodes to 3121; the configured postcode still wins
    let transport = happy_transport();
    let client = client(config().with_postcode("2000"), &transport);

    let snapshot = client.market().update().await.unwrap();
    assert_eq!(snapshot.postcode, "2000");
    assert!(snapshot.address.is_none());
    assert_eq!(transport.calls_to(GEOCODE), 0);
    assert_eq!(
        transport.last_call_to(MARKET).unwrap().body.unwrap()["postcode"],
        "2000"
    );
    assert_eq!(client.postcode().as_deref(), Some("2000"));
}

#[tokio::test]
async fn location_outside_australia_is_location_error() {
    let transport = MockTransport::new();
    transport
        .on(GEOCODE, Reply::json(geocode_body("New Zealand", Some("6011"))))
        .on(MARKET, Reply::json(market_body(6.5, "CitiPower")));
    let client = client(config(), &transport);

    let err = client.market().update().await.unwrap_err();
    assert!(matches!(err, AmberError::Location { .. }));
    assert_eq!(transport.calls_to(MARKET), 0);
    assert!(client.market().snapshot().is_none());
}

#[tokio::test(start_paused = true)]
async fn timeout_keeps_previous_snapshot() {
    let transport = MockTransport::new();
    transport
        .on(MARKET, Reply::json(market_body(6.5, "CitiPower")))
        .on(
            MARKET,
            Reply::json(market_body(9.0, "Jemena")).delayed(Duration::from_secs(30)),
        );
    let client = client(config().with_postcode("3121").with_request_timeout_ms(500), &transport);

    let first = client.market().update().await.unwrap();

    let err = client.market().update().await.unwrap_err();
    assert!(matches!(err, AmberError::Fetch { .. }));
    assert!(err.is_retryable());
    assert!(err.to_string().contains("timed out"));

    let held = client.market().snapshot().unwrap();
    assert!(Arc::ptr_eq(&first, &held));
    assert_eq!(held.price(), Some(6.5));
}

#[tokio::test]
async fn upstream_error_status_is_fetch_error() {
    let transport = MockTransport::new();
    transport.on(MARKET, Reply::status(503, "maintenance"));
    let client = client(config().with_postcode("3121"), &transport);

    let err = client.market().update().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn forbidden_market_list_is_retryable_fetch_error() {
    let transport = MockTransport::new();
    transport.on(MARKET, Reply::status(403, "forbidden"));
    let client = client(config().with_postcode("3121"), &transport);

    let err = client.market().update().await.unwrap_err();
    assert!(matches!(err, AmberError::Fetch { .. }));
    assert_eq!(err.status(), Some(403));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn forbidden_geocoder_is_fetch_error() {
    let transport = MockTransport::new();
    transport
        .on(GEOCODE, Reply::status(403, "blocked"))
        .on(MARKET, Reply::json(market_body(6.5, "CitiPower")));
    let client = client(config(), &transport);

    let err = client.market().update().await.unwrap_err();
    assert!(matches!(err, AmberError::Fetch { .. }));
    assert_eq!(err.status(), Some(403));
    assert_eq!(transport.calls_to(MARKET), 0);
}

#[tokio::test]
async fn undecodable_body_is_protocol_error() {
    let transport = MockTransport::new();
    transport.on(MARKET, Reply::status(200, "<html>oops</html>"));
    let client = client(config().with_postcode("3121"), &transport);

    let err = client.market().update().await.unwrap_err();
    assert!(matches!(err, AmberError::Protocol { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn cancelled_update_leaves_snapshot_unchanged() {
    let transport = MockTransport::new();
    transport
        .on(MARKET, Reply::json(market_body(6.5, "CitiPower")))
        .on(
            MARKET,
            Reply::json(market_body(9.0, "Jemena")).delayed(Duration::from_secs(5)),
        );
    let client = client(config().with_postcode("3121"), &transport);

    let first = client.market().update().await.unwrap();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(100), client.market().update()).await;
    assert!(cancelled.is_err());
    assert!(Arc::ptr_eq(&first, &client.market().snapshot().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn readers_never_see_mixed_snapshots() {
    let transport = MockTransport::new();
    transport
        .on(MARKET, Reply::json(market_body(6.5, "CitiPower")))
        .on(
            MARKET,
            Reply::json(market_body(9.0, "Jemena")).delayed(Duration::from_millis(300)),
        );
    let client = Arc::new(client(config().with_postcode("3121"), &transport));
    client.market().update().await.unwrap();

    let reader = {
        let client = client.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..20 {
                let snap = client.market().snapshot().unwrap();
                seen.push((snap.price(), snap.network_provider.clone()));
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            seen
        })
    };

    client.market().update().await.unwrap();
    let seen = reader.await.unwrap();

    for (price, provider) in &seen {
        match provider.as_deref() {
            Some("CitiPower") => assert_eq!(*price, Some(6.5)),
            Some("Jemena") => assert_eq!(*price, Some(9.0)),
            other => panic!("unexpected provider {:?}", other),
        }
    }
    assert!(seen.iter().any(|(_, p)| p.as_deref() == Some("CitiPower")));
    assert!(seen.iter().any(|(_, p)| p.as_deref() == Some("Jemena")));
}

#[tokio::test]
async fn subscribers_are_notified_of_new_snapshots() {
    let transport = happy_transport();
    let client = client(config(), &transport);
    let mut rx = client.market().subscribe();

    client.market().update().await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().as_ref().unwrap().price(), Some(6.5));
}
