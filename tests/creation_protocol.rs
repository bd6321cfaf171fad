use serde_json::json;
use std::sync::{Arc, Mutex};
use testbed_control::config::ControllerConfig;
use testbed_control::framework::{
    ControlError, CreateOptions, HookPoint, LifecycleState, PropertyDef, ResourceId,
    TypeDescriptor, TypeRegistry,
};
use testbed_control::lifecycle::Testbed;

type Log = Arc<Mutex<Vec<String>>>;

/// A rack may hold nodes; a node may hold nics. A node named "bad" fails in
/// `before_ready`; a nic refuses a `mtu` above 9000.
fn registry(log: &Log) -> TypeRegistry {
    let mut registry = TypeRegistry::new();

    let hooks = Arc::clone(log);
    registry.register(
        TypeDescriptor::builder("rack")
            .hook(HookPoint::BeforeCreate, move |ctx, args, _| {
                hooks
                    .lock()
                    .unwrap()
                    .push(format!("{}:before_create {:?}", ctx.id(), args.child_type()));
                if let Some(options) = args.options_mut() {
                    options.properties.insert("zone".into(), json!("eu-1"));
                }
                Ok(())
            })
            .build(),
    );

    let hooks = Arc::clone(log);
    registry.register(
        TypeDescriptor::builder("node")
            .created_by(["rack"])
            .property(PropertyDef::new("zone", "none"))
            .property(PropertyDef::new("cpu", 2))
            .hook(HookPoint::BeforeReady, |ctx, _, _| {
                if ctx.id().as_str() == "bad" {
                    return Err(ControlError::failed("bad node"));
                }
                Ok(())
            })
            .hook(HookPoint::BeforeRelease, move |ctx, _, _| {
                hooks.lock().unwrap().push(format!("{}:before_release", ctx.id()));
                Ok(())
            })
            .build(),
    );

    registry.register(
        TypeDescriptor::builder("nic")
            .created_by(["node"])
            .property(PropertyDef::new("mtu", 1500))
            .extend_configure("mtu")
            .configure("mtu", |ctx, args, base| {
                if args.as_u64().is_some_and(|mtu| mtu > 9000) {
                    return Err(ControlError::failed(format!("mtu {args} too large")));
                }
                base.call(ctx, args)
            })
            .build(),
    );
    registry
}

fn start(log: &Log) -> Testbed {
    Testbed::start(Arc::new(registry(log)), &ControllerConfig::default())
}

#[tokio::test]
async fn test_create_and_inspect_tree() {
    let log = Log::default();
    let testbed = start(&log);
    let client = testbed.client();

    let rack = client
        .create_root("rack", CreateOptions::new().with_uid("rack-1"))
        .await
        .expect("Failed to create rack");
    let node = client
        .create_child(&rack, "node", CreateOptions::new().with_uid("node-1"))
        .await
        .expect("Failed to create node");

    let snapshot = client.snapshot(&node).await.expect("Failed to snapshot");
    assert_eq!(snapshot.type_name, "node");
    assert_eq!(snapshot.state, LifecycleState::Ready);
    assert_eq!(snapshot.parent, Some(rack.clone()));
    // before_create on the rack injected the zone
    assert_eq!(snapshot.property("zone"), Some(&json!("eu-1")));
    assert_eq!(snapshot.property("cpu"), Some(&json!(2)));

    assert_eq!(client.request(&node, "uid").await.unwrap(), json!("node-1"));
    assert_eq!(client.request(&node, "type").await.unwrap(), json!("node"));
    assert_eq!(client.request(&node, "state").await.unwrap(), json!("ready"));
    assert_eq!(client.request(&node, "parent").await.unwrap(), json!("rack-1"));
    assert_eq!(
        client.request(&rack, "child_resources").await.unwrap(),
        json!(["node-1"])
    );
    assert_eq!(client.children(&rack).await.unwrap(), vec![node]);
    assert_eq!(
        log.lock().unwrap().as_slice(),
        ["rack-1:before_create Some(\"node\")"]
    );

    testbed.shutdown().await.expect("Shutdown failed");
}

/// Creating a type under a parent not listed in `created_by` fails with nothing left behind.
#[tokio::test]
async fn test_created_by_violation_has_no_side_effects() {
    let log = Log::default();
    let testbed = start(&log);
    let client = testbed.client();

    let rack = client
        .create_root("rack", CreateOptions::new().with_uid("rack-1"))
        .await
        .unwrap();
    let err = client
        .create_child(&rack, "nic", CreateOptions::new().with_uid("nic-1"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ControlError::CreationDenied {
            parent: "rack".into(),
            child: "nic".into()
        }
    );
    // before_create never ran
    assert!(log.lock().unwrap().is_empty());
    assert!(client.children(&rack).await.unwrap().is_empty());
    assert_eq!(
        client.snapshot(&"nic-1".into()).await.unwrap_err(),
        ControlError::ResourceNotFound("nic-1".into())
    );

    testbed.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restricted_type_cannot_be_a_root() {
    let log = Log::default();
    let testbed = start(&log);
    let err = testbed
        .client()
        .create_root("node", CreateOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::CreationDenied { .. }));
    testbed.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_type() {
    let log = Log::default();
    let testbed = start(&log);
    let err = testbed
        .client()
        .create_root("toaster", CreateOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err, ControlError::UnknownType("toaster".into()));
    testbed.shutdown().await.unwrap();
}

/// A failure after instantiation rolls the resource back through release and reports
/// `CreationFailed` with the original error.
#[tokio::test]
async fn test_failed_creation_is_rolled_back() {
    let log = Log::default();
    let testbed = start(&log);
    let client = testbed.client();

    let rack = client
        .create_root("rack", CreateOptions::new().with_uid("rack-1"))
        .await
        .unwrap();
    let err = client
        .create_child(&rack, "node", CreateOptions::new().with_uid("bad"))
        .await
        .unwrap_err();

    match err {
        ControlError::CreationFailed { type_name, source } => {
            assert_eq!(type_name, "node");
            assert_eq!(*source, ControlError::failed("bad node"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // before_release ran best-effort during rollback
    assert!(log.lock().unwrap().contains(&"bad:before_release".to_string()));
    assert!(client.children(&rack).await.unwrap().is_empty());
    assert!(matches!(
        client.snapshot(&"bad".into()).await,
        Err(ControlError::ResourceNotFound(_))
    ));

    testbed.shutdown().await.unwrap();
}

/// Creation properties that need a configure handler go through it, so validation applies.
#[tokio::test]
async fn test_creation_properties_reach_configure_handlers() {
    let log = Log::default();
    let testbed = start(&log);
    let client = testbed.client();

    let rack = client.create_root("rack", CreateOptions::new()).await.unwrap();
    let node = client.create_child(&rack, "node", CreateOptions::new()).await.unwrap();

    let nic = client
        .create_child(&node, "nic", CreateOptions::new().with_property("mtu", 9000))
        .await
        .unwrap();
    assert_eq!(client.request(&nic, "mtu").await.unwrap(), json!(9000));

    let err = client
        .create_child(&node, "nic", CreateOptions::new().with_property("mtu", 65000))
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::CreationFailed { .. }));
    assert_eq!(client.children(&node).await.unwrap(), vec![nic]);

    testbed.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_released_resource_rejects_dispatch() {
    let log = Log::default();
    let testbed = start(&log);
    let client = testbed.client();

    let rack = client.create_root("rack", CreateOptions::new()).await.unwrap();
    let node = client
        .create_child(&rack, "node", CreateOptions::new().with_uid("node-1"))
        .await
        .unwrap();

    client.release(&rack).await.expect("Release failed");

    assert_eq!(
        client.request(&node, "cpu").await.unwrap_err(),
        ControlError::InstanceReleased(ResourceId::from("node-1"))
    );
    assert_eq!(
        client.snapshot(&node).await.unwrap().state,
        LifecycleState::Released
    );
    assert!(matches!(
        client.release(&rack).await,
        Err(ControlError::InstanceReleased(_))
    ));
    assert!(log
        .lock()
        .unwrap()
        .contains(&"node-1:before_release".to_string()));

    testbed.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_releases_everything() {
    let log = Log::default();
    let testbed = start(&log);
    let client = testbed.client().clone();

    for rack in ["a", "b"] {
        let rack = client
            .create_root("rack", CreateOptions::new().with_uid(rack))
            .await
            .unwrap();
        client
            .create_child(&rack, "node", CreateOptions::new().with_uid(format!("{rack}-node")))
            .await
            .unwrap();
    }
    drop(client);

    let released = testbed.shutdown().await.expect("Shutdown failed");
    assert_eq!(released, 2);
    assert_eq!(
        log.lock().unwrap().as_slice(),
        [
            "a:before_create Some(\"node\")",
            "b:before_create Some(\"node\")",
            "b-node:before_release",
            "a-node:before_release",
        ]
    );
}
