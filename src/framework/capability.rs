//! Shared capability providers that resource types can include at registration.

use crate::framework::context::ResourceCtx;
use crate::framework::dispatch::HandlerBase;
use crate::framework::error::Result;
use crate::framework::registry::{Capability, TypeBuilder};
use serde_json::{Map, Value};

/// Adds a `properties` request that returns the whole property store as one object.
pub const PROPERTY_LISTING: Capability = Capability {
    name: "property_listing",
    install: install_property_listing,
};

fn install_property_listing(builder: TypeBuilder) -> TypeBuilder {
    builder.request("properties", list_properties)
}

fn list_properties(ctx: &mut ResourceCtx<'_>, _args: Value, _base: HandlerBase<'_>) -> Result<Value> {
    let map: Map<String, Value> = ctx
        .properties()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Ok(Value::Object(map))
}
