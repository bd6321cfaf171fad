use serde_json::{json, Value};
use std::sync::Arc;
use testbed_control::framework::{
    ControlError, CreateOptions, HookPoint, Operation, PropertyDef, ResourceTree, TypeBuilder,
    TypeDescriptor, TypeRegistry,
};

fn tree(descriptor: TypeDescriptor) -> ResourceTree {
    let mut registry = TypeRegistry::new();
    registry.register(descriptor);
    ResourceTree::new(Arc::new(registry))
}

fn base_light() -> TypeBuilder {
    TypeDescriptor::builder("light")
        .property(PropertyDef::new("level", 0))
        .configure("level", |ctx, args, _| {
            ctx.set("level", args.clone());
            ctx.set("trace", "base");
            Ok(args)
        })
}

/// Extending a handler keeps the displaced one callable from the new one.
#[test]
fn test_extended_handler_calls_its_base() {
    let descriptor = base_light()
        .extend_configure("level")
        .configure("level", |ctx, args, base| {
            let clamped = json!(args.as_i64().unwrap_or(0).clamp(0, 100));
            let result = base.call(ctx, clamped)?;
            let trace = format!("{}+dimmer", ctx.get("trace").and_then(Value::as_str).unwrap_or(""));
            ctx.set("trace", trace);
            Ok(result)
        })
        .build();
    let mut tree = tree(descriptor);
    let id = tree.create_root("light", CreateOptions::new()).unwrap();

    assert_eq!(tree.configure(&id, "level", json!(250)).unwrap(), json!(100));
    assert_eq!(tree.request(&id, "level").unwrap(), json!(100));
    assert_eq!(tree.snapshot(&id).unwrap().property("trace"), Some(&json!("base+dimmer")));
}

/// Installing without extending first replaces the handler outright.
#[test]
fn test_reinstall_without_extend_replaces() {
    let descriptor = base_light()
        .configure("level", |_, _, base| {
            assert!(base.is_empty());
            Ok(json!("replaced"))
        })
        .build();
    let mut tree = tree(descriptor);
    let id = tree.create_root("light", CreateOptions::new()).unwrap();

    assert_eq!(tree.configure(&id, "level", json!(5)).unwrap(), json!("replaced"));
    assert_eq!(tree.request(&id, "level").unwrap(), json!(0));
    assert_eq!(tree.snapshot(&id).unwrap().property("trace"), None);
}

/// Extending a declared property with no explicit handler wraps its default setter.
#[test]
fn test_extend_wraps_default_accessor() {
    let descriptor = TypeDescriptor::builder("light")
        .property(PropertyDef::new("color", "white"))
        .extend_configure("color")
        .configure("color", |ctx, args, base| {
            base.call(ctx, json!(args.as_str().unwrap_or("").to_uppercase()))
        })
        .extend_request("color")
        .request("color", |ctx, args, base| {
            let color = base.call(ctx, args)?;
            Ok(json!(format!("#{}", color.as_str().unwrap_or(""))))
        })
        .build();
    let mut tree = tree(descriptor);
    let id = tree.create_root("light", CreateOptions::new()).unwrap();

    tree.configure(&id, "color", json!("red")).unwrap();
    assert_eq!(tree.request(&id, "color").unwrap(), json!("#RED"));
}

/// An extended key with nothing underneath gets a base that does nothing and returns null.
#[test]
fn test_empty_base_returns_null() {
    let descriptor = TypeDescriptor::builder("light")
        .extend_request("ping")
        .request("ping", |ctx, args, base| {
            assert!(base.is_empty());
            base.call(ctx, args)
        })
        .build();
    let mut tree = tree(descriptor);
    let id = tree.create_root("light", CreateOptions::new()).unwrap();
    assert_eq!(tree.request(&id, "ping").unwrap(), Value::Null);
}

#[test]
fn test_unknown_and_inaccessible_properties() {
    let descriptor = TypeDescriptor::builder("light")
        .property(PropertyDef::new("serial", "L-1").read_only())
        .property(PropertyDef::new("secret", "hunter2").write_only())
        .build();
    let mut tree = tree(descriptor);
    let id = tree.create_root("light", CreateOptions::new()).unwrap();

    assert_eq!(
        tree.configure(&id, "wattage", json!(60)).unwrap_err(),
        ControlError::UnknownProperty {
            type_name: "light".into(),
            operation: Operation::Configure,
            property: "wattage".into(),
        }
    );
    assert!(tree.configure(&id, "serial", json!("L-2")).is_err());
    assert_eq!(tree.request(&id, "serial").unwrap(), json!("L-1"));
    assert!(tree.request(&id, "secret").is_err());
    assert_eq!(tree.configure(&id, "secret", json!("pw")).unwrap(), json!("pw"));
}

#[test]
fn test_builtin_requests_can_be_extended() {
    let descriptor = TypeDescriptor::builder("light")
        .extend_request("type")
        .request("type", |ctx, args, base| {
            Ok(json!(format!("{}/v2", base.call(ctx, args)?.as_str().unwrap_or(""))))
        })
        .build();
    let mut tree = tree(descriptor);
    let id = tree
        .create_root("light", CreateOptions::new().with_uid("l1"))
        .unwrap();

    assert_eq!(tree.request(&id, "type").unwrap(), json!("light/v2"));
    assert_eq!(tree.request(&id, "uid").unwrap(), json!("l1"));
    assert_eq!(tree.request(&id, "parent").unwrap(), Value::Null);
    assert_eq!(tree.request(&id, "child_resources").unwrap(), json!([]));
}

/// Extended hooks run the displaced hook when the new one asks for it.
#[test]
fn test_extended_hook_chains() {
    let descriptor = TypeDescriptor::builder("light")
        .hook(HookPoint::AfterInitialConfigured, |ctx, _, _| {
            ctx.set("boot", json!(["self-test"]));
            Ok(())
        })
        .extend_hook(HookPoint::AfterInitialConfigured)
        .hook(HookPoint::AfterInitialConfigured, |ctx, args, base| {
            base.call(ctx, args)?;
            let mut boot = ctx.get("boot").cloned().unwrap_or_else(|| json!([]));
            if let Some(steps) = boot.as_array_mut() {
                steps.push(json!("calibrate"));
            }
            ctx.set("boot", boot);
            Ok(())
        })
        .build();
    let mut tree = tree(descriptor);
    let id = tree.create_root("light", CreateOptions::new()).unwrap();
    assert_eq!(
        tree.snapshot(&id).unwrap().property("boot"),
        Some(&json!(["self-test", "calibrate"]))
    );
}

#[test]
fn test_work_routines() {
    let descriptor = TypeDescriptor::builder("light")
        .property(PropertyDef::new("level", 10))
        .work("double", |ctx, _, _| {
            let level = ctx.get_f64("level")? * 2.0;
            ctx.set("level", level);
            Ok(json!(level))
        })
        .configure("boost", |ctx, _, _| ctx.work("double", Value::Null))
        .configure("overdrive", |ctx, _, _| ctx.work("explode", Value::Null))
        .build();
    let mut tree = tree(descriptor);
    let id = tree.create_root("light", CreateOptions::new()).unwrap();

    assert_eq!(tree.configure(&id, "boost", Value::Null).unwrap(), json!(20.0));
    assert_eq!(
        tree.configure(&id, "overdrive", Value::Null).unwrap_err(),
        ControlError::UnknownWork {
            type_name: "light".into(),
            name: "explode".into(),
        }
    );
}
