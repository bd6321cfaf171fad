//! # Type Registry
//!
//! Resource types are declared once at startup with a [`TypeBuilder`] and registered in a
//! [`TypeRegistry`]. The registry is handed to the controller behind an `Arc`, after
//! which nothing can mutate it: the startup phase ends when ownership does.
//!
//! ```
//! use serde_json::json;
//! use testbed_control::framework::{PropertyDef, TypeDescriptor, TypeRegistry};
//!
//! let mut registry = TypeRegistry::new();
//! registry.register(
//!     TypeDescriptor::builder("light")
//!         .property(PropertyDef::new("lumens", json!(800)))
//!         .build(),
//! );
//! assert!(registry.lookup("light").is_ok());
//! assert!(registry.lookup("fan").is_err());
//! ```

use crate::framework::chain::ChainTable;
use crate::framework::context::ResourceCtx;
use crate::framework::dispatch::{handler, Handler, HandlerBase, PropertyDef, PropertyDispatchTable};
use crate::framework::error::{ControlError, Result};
use crate::framework::hooks::{hook, HookArgs, HookBase, HookPoint, HookSequencer};
use crate::framework::message::Operation;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything the framework knows about one resource type.
pub struct TypeDescriptor {
    name: String,
    created_by: BTreeSet<String>,
    capabilities: Vec<&'static str>,
    dispatch: PropertyDispatchTable,
    hooks: HookSequencer,
    work: ChainTable<String, Handler>,
}

impl TypeDescriptor {
    pub fn builder(name: impl Into<String>) -> TypeBuilder {
        TypeBuilder::new(name.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Types allowed to create this one. Empty means any.
    pub fn created_by(&self) -> &BTreeSet<String> {
        &self.created_by
    }

    /// Whether a parent of type `creator` (or no parent at all) may create this type.
    pub fn permits(&self, creator: Option<&str>) -> bool {
        self.created_by.is_empty() || creator.is_some_and(|c| self.created_by.contains(c))
    }

    pub fn properties(&self) -> &[PropertyDef] {
        self.dispatch.properties()
    }

    pub fn capabilities(&self) -> &[&'static str] {
        &self.capabilities
    }

    pub fn dispatch_table(&self) -> &PropertyDispatchTable {
        &self.dispatch
    }

    pub fn hooks(&self) -> &HookSequencer {
        &self.hooks
    }

    pub(crate) fn work(&self, name: &str) -> Result<&Arc<Handler>> {
        self.work
            .get(&name.to_owned())
            .ok_or_else(|| ControlError::UnknownWork {
                type_name: self.name.clone(),
                name: name.to_owned(),
            })
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("created_by", &self.created_by)
            .field("capabilities", &self.capabilities)
            .field("properties", &self.dispatch.properties())
            .finish_non_exhaustive()
    }
}

/// A named bundle of declarations that several types can include.
///
/// Inclusion happens once, at registration time, by running `install` on the builder.
#[derive(Clone, Copy)]
pub struct Capability {
    pub name: &'static str,
    pub install: fn(TypeBuilder) -> TypeBuilder,
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability").field("name", &self.name).finish()
    }
}

/// Declarative builder for a [`TypeDescriptor`].
///
/// Every type starts with request handlers for `uid`, `type`, `state`, `parent` and
/// `child_resources`. Like any handler they can be replaced or extended.
pub struct TypeBuilder {
    descriptor: TypeDescriptor,
}

impl TypeBuilder {
    fn new(name: String) -> Self {
        let builder = Self {
            descriptor: TypeDescriptor {
                name,
                created_by: BTreeSet::new(),
                capabilities: Vec::new(),
                dispatch: PropertyDispatchTable::default(),
                hooks: HookSequencer::default(),
                work: ChainTable::default(),
            },
        };
        builder
            .request("uid", |ctx, _, _| Ok(json!(ctx.id().as_str())))
            .request("type", |ctx, _, _| Ok(json!(ctx.type_name())))
            .request("state", |ctx, _, _| Ok(json!(ctx.state().as_str())))
            .request("parent", |ctx, _, _| {
                Ok(ctx
                    .parent()
                    .map_or(Value::Null, |p| json!(p.as_str())))
            })
            .request("child_resources", |ctx, _, _| {
                Ok(json!(ctx
                    .children()
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()))
            })
    }

    /// Restricts which parent types may create this type.
    pub fn created_by<I, S>(mut self, creators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor
            .created_by
            .extend(creators.into_iter().map(Into::into));
        self
    }

    pub fn property(mut self, def: PropertyDef) -> Self {
        self.descriptor.dispatch.declare(def);
        self
    }

    pub fn configure<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&mut ResourceCtx<'_>, Value, HandlerBase<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.descriptor
            .dispatch
            .install(Operation::Configure, name, handler(body));
        self
    }

    pub fn request<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&mut ResourceCtx<'_>, Value, HandlerBase<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.descriptor
            .dispatch
            .install(Operation::Request, name, handler(body));
        self
    }

    pub fn hook<F>(mut self, point: HookPoint, body: F) -> Self
    where
        F: Fn(&mut ResourceCtx<'_>, &mut HookArgs<'_>, HookBase<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.descriptor.hooks.install(point, hook(body));
        self
    }

    /// Declares a helper routine callable from this type's handlers and hooks.
    pub fn work<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&mut ResourceCtx<'_>, Value, HandlerBase<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        let body = handler(body);
        self.descriptor
            .work
            .install(name.to_owned(), |base| Handler::new(body, base));
        self
    }

    pub fn extend_configure(mut self, name: &str) -> Self {
        self.descriptor.dispatch.extend(Operation::Configure, name);
        self
    }

    pub fn extend_request(mut self, name: &str) -> Self {
        self.descriptor.dispatch.extend(Operation::Request, name);
        self
    }

    pub fn extend_hook(mut self, point: HookPoint) -> Self {
        self.descriptor.hooks.extend(point);
        self
    }

    pub fn extend_work(mut self, name: &str) -> Self {
        self.descriptor.work.extend(name.to_owned(), None);
        self
    }

    pub fn include(mut self, capability: &Capability) -> Self {
        self.descriptor.capabilities.push(capability.name);
        (capability.install)(self)
    }

    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}

/// Type name to descriptor. Re-registering a name replaces the old descriptor entirely.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        let name = descriptor.name.clone();
        if self.types.insert(name.clone(), Arc::new(descriptor)).is_some() {
            warn!(type_name = %name, "Replacing registered type");
        } else {
            debug!(type_name = %name, "Registered type");
        }
        self
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<TypeDescriptor>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| ControlError::UnknownType(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
