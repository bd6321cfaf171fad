//! # Property Dispatch
//!
//! Resolves `(operation, property)` to behavior for one resource type:
//!
//! 1. an explicit handler installed with `configure`/`request`,
//! 2. else the default get/set of a declared property whose access allows the operation,
//! 3. else `UnknownProperty`.
//!
//! Handlers receive a [`HandlerBase`]. It is empty unless the key was extended before the
//! handler was installed, in which case it invokes the displaced handler (or the
//! property's default accessor when there was no explicit one).

use crate::framework::chain::ChainTable;
use crate::framework::context::ResourceCtx;
use crate::framework::error::{ControlError, Result};
use crate::framework::message::Operation;
use serde_json::Value;
use std::sync::Arc;

pub type HandlerBody = dyn Fn(&mut ResourceCtx<'_>, Value, HandlerBase<'_>) -> Result<Value> + Send + Sync;

/// A configure/request handler or work routine, with the entry it extends.
pub struct Handler {
    body: Box<HandlerBody>,
    base: Option<Arc<Handler>>,
}

impl Handler {
    pub(crate) fn new(body: Box<HandlerBody>, base: Option<Arc<Handler>>) -> Self {
        Self { body, base }
    }

    pub fn call(&self, ctx: &mut ResourceCtx<'_>, args: Value) -> Result<Value> {
        (self.body)(ctx, args, HandlerBase(self.base.as_deref()))
    }
}

/// The entry a handler extends. Calling an empty base does nothing and yields `null`.
#[derive(Clone, Copy)]
pub struct HandlerBase<'a>(Option<&'a Handler>);

impl HandlerBase<'_> {
    pub fn call(&self, ctx: &mut ResourceCtx<'_>, args: Value) -> Result<Value> {
        match self.0 {
            Some(handler) => handler.call(ctx, args),
            None => Ok(Value::Null),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

/// Boxes a closure as a handler body, fixing its signature for inference.
pub(crate) fn handler<F>(body: F) -> Box<HandlerBody>
where
    F: Fn(&mut ResourceCtx<'_>, Value, HandlerBase<'_>) -> Result<Value> + Send + Sync + 'static,
{
    Box::new(body)
}

/// A declared property: its default and which operations may reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    pub name: String,
    pub default: Value,
    pub configurable: bool,
    pub requestable: bool,
    pub description: Option<String>,
}

impl PropertyDef {
    /// A property open to both configure and request.
    pub fn new(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            configurable: true,
            requestable: true,
            description: None,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.configurable = false;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.requestable = false;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn allows(&self, operation: Operation) -> bool {
        match operation {
            Operation::Configure => self.configurable,
            Operation::Request => self.requestable,
        }
    }
}

pub(crate) enum Resolved<'a> {
    Handler(&'a Arc<Handler>),
    Default(&'a PropertyDef),
}

#[derive(Default)]
pub struct PropertyDispatchTable {
    handlers: ChainTable<(Operation, String), Handler>,
    properties: Vec<PropertyDef>,
}

impl PropertyDispatchTable {
    pub(crate) fn install(&mut self, operation: Operation, name: &str, body: Box<HandlerBody>) {
        self.handlers
            .install((operation, name.to_owned()), |base| Handler::new(body, base));
    }

    pub(crate) fn extend(&mut self, operation: Operation, name: &str) {
        let fallback = self
            .property(name)
            .filter(|def| def.allows(operation))
            .map(|def| Arc::new(default_accessor(operation, &def.name)));
        self.handlers.extend((operation, name.to_owned()), fallback);
    }

    /// Declares a property. Redeclaring a name replaces the earlier definition in place.
    pub(crate) fn declare(&mut self, def: PropertyDef) {
        match self.properties.iter_mut().find(|p| p.name == def.name) {
            Some(existing) => *existing = def,
            None => self.properties.push(def),
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Declared properties in declaration order.
    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    pub fn has_handler(&self, operation: Operation, name: &str) -> bool {
        self.handlers.contains(&(operation, name.to_owned()))
    }

    /// Names reachable with `operation`, explicit handlers and declared properties alike.
    pub fn names(&self, operation: Operation) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .keys()
            .filter(|(op, _)| *op == operation)
            .map(|(_, name)| name.clone())
            .chain(
                self.properties
                    .iter()
                    .filter(|p| p.allows(operation))
                    .map(|p| p.name.clone()),
            )
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub(crate) fn resolve(&self, operation: Operation, name: &str) -> Option<Resolved<'_>> {
        if let Some(handler) = self.handlers.get(&(operation, name.to_owned())) {
            return Some(Resolved::Handler(handler));
        }
        self.property(name)
            .filter(|def| def.allows(operation))
            .map(Resolved::Default)
    }
}

fn default_accessor(operation: Operation, name: &str) -> Handler {
    let name = name.to_owned();
    let body = match operation {
        Operation::Configure => handler(move |ctx, args, _| {
            ctx.set(&name, args.clone());
            Ok(args)
        }),
        Operation::Request => {
            handler(move |ctx, _, _| Ok(ctx.get(&name).cloned().unwrap_or(Value::Null)))
        }
    };
    Handler::new(body, None)
}

/// Runs `(operation, property)` against the resource behind `ctx`.
pub(crate) fn dispatch(
    ctx: &mut ResourceCtx<'_>,
    operation: Operation,
    property: &str,
    args: Value,
) -> Result<Value> {
    let descriptor = Arc::clone(ctx.descriptor());
    match descriptor.dispatch_table().resolve(operation, property) {
        Some(Resolved::Handler(handler)) => handler.call(ctx, args),
        Some(Resolved::Default(def)) => match operation {
            Operation::Configure => {
                ctx.set(&def.name, args.clone());
                Ok(args)
            }
            Operation::Request => Ok(ctx.get(&def.name).cloned().unwrap_or(Value::Null)),
        },
        None => Err(ControlError::UnknownProperty {
            type_name: descriptor.name().to_owned(),
            operation,
            property: property.to_owned(),
        }),
    }
}
