use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use testbed_control::config::ControllerConfig;
use testbed_control::framework::{
    ControlError, CreateOptions, LifecycleState, ResourceId, TypeRegistry,
};
use testbed_control::garage::{self, ENGINE, GARAGE};
use testbed_control::lifecycle::Testbed;
use tokio::time::sleep;

fn start() -> Testbed {
    let mut registry = TypeRegistry::new();
    garage::register(&mut registry);
    Testbed::start(Arc::new(registry), &ControllerConfig::default())
}

/// Full throttle: rpm climbs 4750 per tick until a request for it fails, then release
/// shuts the engine down.
#[tokio::test(start_paused = true)]
async fn test_engine_over_revs_and_shuts_down_on_release() {
    let testbed = start();
    let client = testbed.client();

    // Step 1: Build a garage with one engine at full throttle
    let garage = client
        .create_root(GARAGE, CreateOptions::new().with_uid("garage-1"))
        .await
        .expect("Failed to create garage");
    let engine = client
        .create_child(
            &garage,
            ENGINE,
            CreateOptions::new()
                .with_uid("engine-1")
                .with_property("throttle", 1.0),
        )
        .await
        .expect("Failed to create engine");
    assert_eq!(client.request(&engine, "rpm").await.unwrap(), json!(1000.0));

    // Step 2: One tick
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(client.request(&engine, "rpm").await.unwrap(), json!(5750.0));

    // Step 3: Two more ticks push rpm past max_rpm
    sleep(Duration::from_secs(1)).await;
    assert_eq!(client.request(&engine, "rpm").await.unwrap(), json!(10500.0));
    sleep(Duration::from_secs(1)).await;
    let err = client.request(&engine, "rpm").await.unwrap_err();
    assert!(matches!(err, ControlError::OperationFailed(ref msg) if msg.contains("over-revved")));

    // The simulation value is kept, only the request refuses it
    let snapshot = client.snapshot(&engine).await.unwrap();
    assert_eq!(snapshot.property("rpm"), Some(&json!(15250.0)));

    // Step 4: Release stops the engine
    client.release(&garage).await.expect("Failed to release garage");
    let snapshot = client.snapshot(&engine).await.unwrap();
    assert_eq!(snapshot.state, LifecycleState::Released);
    assert_eq!(snapshot.property("throttle"), Some(&json!(0.0)));
    assert_eq!(snapshot.property("rpm"), Some(&json!(0.0)));

    // No more ticks once released
    sleep(Duration::from_secs(3)).await;
    let snapshot = client.snapshot(&engine).await.unwrap();
    assert_eq!(snapshot.property("rpm"), Some(&json!(0.0)));

    testbed.shutdown().await.expect("Shutdown failed");
}

#[tokio::test(start_paused = true)]
async fn test_idle_engine_spins_down_to_zero() {
    let testbed = start();
    let client = testbed.client();

    let garage = client.create_root(GARAGE, CreateOptions::new()).await.unwrap();
    let engine = client.create_child(&garage, ENGINE, CreateOptions::new()).await.unwrap();

    // 1000 rpm losing 250 per tick, floored at zero
    sleep(Duration::from_millis(6500)).await;
    assert_eq!(client.request(&engine, "rpm").await.unwrap(), json!(0.0));

    testbed.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_garage_tracks_installed_engines() {
    let testbed = start();
    let client = testbed.client();

    let garage = client
        .create_root(GARAGE, CreateOptions::new().with_uid("garage-1"))
        .await
        .unwrap();
    for uid in ["e1", "e2"] {
        client
            .create_child(&garage, ENGINE, CreateOptions::new().with_uid(uid))
            .await
            .unwrap();
    }

    let snapshot = client.snapshot(&garage).await.unwrap();
    assert_eq!(snapshot.property("engines"), Some(&json!(2)));
    assert_eq!(snapshot.children, vec![ResourceId::from("e1"), ResourceId::from("e2")]);

    // Default capacity is two
    let err = client
        .create_child(&garage, ENGINE, CreateOptions::new().with_uid("e3"))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::CreationAborted(_)));

    // An engine's creator must be a garage
    let err = client.create_root(ENGINE, CreateOptions::new()).await.unwrap_err();
    assert!(matches!(err, ControlError::CreationDenied { .. }));

    let listing = client.request(&"e1".into(), "properties").await.unwrap();
    assert_eq!(listing["max_rpm"], json!(12500.0));
    assert_eq!(listing["throttle"], json!(0.0));

    testbed.shutdown().await.unwrap();
}
