//! Sample resource types: a garage that houses simulated engines.
//!
//! An engine's `rpm` follows its `throttle` once per second. Asking for `rpm` past
//! `max_rpm` fails, but the stored value is left where the simulation put it. Releasing
//! an engine shuts it down.

use crate::framework::{
    ControlError, HandlerBase, HookPoint, PropertyDef, ResourceCtx, Result, TypeDescriptor,
    TypeRegistry, PROPERTY_LISTING,
};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

pub const GARAGE: &str = "garage";
pub const ENGINE: &str = "engine";

const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub fn register(registry: &mut TypeRegistry) {
    registry.register(garage()).register(engine());
}

pub fn garage() -> TypeDescriptor {
    TypeDescriptor::builder(GARAGE)
        .include(&PROPERTY_LISTING)
        .property(PropertyDef::new("capacity", 2).describe("Engines the garage can hold"))
        .hook(HookPoint::BeforeCreate, |ctx, args, _| {
            if args.child_type() != Some(ENGINE) {
                return Ok(());
            }
            let capacity = ctx.get_f64("capacity")?;
            if ctx.children().len() as f64 >= capacity {
                return Err(ControlError::failed(format!(
                    "garage {} is full ({capacity} engines)",
                    ctx.id()
                )));
            }
            if let Some(options) = args.options_mut() {
                options.provider.get_or_insert_with(|| GARAGE.to_owned());
            }
            Ok(())
        })
        .hook(HookPoint::AfterCreate, |ctx, args, _| {
            if let Some(child) = args.child() {
                info!(garage = %ctx.id(), engine = %child, "Engine installed");
            }
            let installed = ctx.children().len();
            ctx.set("engines", installed);
            Ok(())
        })
        .build()
}

pub fn engine() -> TypeDescriptor {
    TypeDescriptor::builder(ENGINE)
        .created_by([GARAGE])
        .include(&PROPERTY_LISTING)
        .property(PropertyDef::new("max_rpm", 12500.0).read_only())
        .property(PropertyDef::new("throttle", 0.0).describe("Throttle position in [0, 1]"))
        .property(PropertyDef::new("rpm", 1000.0).read_only())
        .extend_configure("throttle")
        .configure("throttle", |ctx, args, base| {
            match args.as_f64() {
                Some(throttle) if (0.0..=1.0).contains(&throttle) => base.call(ctx, args),
                _ => Err(ControlError::failed(format!(
                    "throttle must be between 0.0 and 1.0, got {args}"
                ))),
            }
        })
        .request("rpm", |ctx, _, _| {
            let rpm = ctx.get_f64("rpm")?;
            let max_rpm = ctx.get_f64("max_rpm")?;
            if rpm > max_rpm {
                return Err(ControlError::failed(format!(
                    "engine {} over-revved: {rpm} rpm exceeds max_rpm {max_rpm}",
                    ctx.id()
                )));
            }
            Ok(json!(rpm))
        })
        .configure("exec", exec)
        .work("tick", |ctx, _, _| {
            let throttle = ctx.get_f64("throttle")?;
            let rpm = (ctx.get_f64("rpm")? + throttle * 5000.0 - 250.0).max(0.0);
            ctx.set("rpm", rpm);
            Ok(json!(rpm))
        })
        .hook(HookPoint::AfterInitialConfigured, |ctx, _, _| {
            ctx.every(TICK_INTERVAL, |ctx| ctx.work("tick", Value::Null).map(drop));
            Ok(())
        })
        .hook(HookPoint::BeforeRelease, |ctx, _, _| {
            ctx.set("throttle", 0.0);
            ctx.set("rpm", 0.0);
            Ok(())
        })
        .build()
}

/// Commands an engine accepts through `exec`.
fn exec(ctx: &mut ResourceCtx<'_>, args: Value, _: HandlerBase<'_>) -> Result<Value> {
    match args.as_str() {
        Some("stop") => ctx.configure("throttle", json!(0.0)),
        Some("status") => Ok(json!({
            "throttle": ctx.get("throttle"),
            "rpm": ctx.get("rpm"),
        })),
        _ => Err(ControlError::failed(format!("unknown engine command {args}"))),
    }
}
