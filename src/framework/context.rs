//! The view a handler, hook, work routine or timer gets of the resource it runs on.

use crate::framework::dispatch;
use crate::framework::error::{ControlError, Result};
use crate::framework::message::Operation;
use crate::framework::registry::TypeDescriptor;
use crate::framework::resource::{LifecycleState, PropertyStore, ResourceId, ResourceInstance};
use crate::framework::scheduler::{Scheduler, TimerHandle};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub type TimerBody = dyn FnMut(&mut ResourceCtx<'_>) -> Result<()> + Send;

/// A timer scheduled by a resource. It dies with its owner.
pub struct ResourceTimer {
    pub(crate) owner: ResourceId,
    pub(crate) tick: Box<TimerBody>,
}

pub struct ResourceCtx<'a> {
    instance: &'a mut ResourceInstance,
    scheduler: &'a mut Scheduler<ResourceTimer>,
}

impl<'a> ResourceCtx<'a> {
    pub(crate) fn new(
        instance: &'a mut ResourceInstance,
        scheduler: &'a mut Scheduler<ResourceTimer>,
    ) -> Self {
        Self {
            instance,
            scheduler,
        }
    }

    pub fn id(&self) -> &ResourceId {
        self.instance.id()
    }

    pub fn type_name(&self) -> &str {
        self.instance.type_name()
    }

    pub fn state(&self) -> LifecycleState {
        self.instance.state()
    }

    pub fn parent(&self) -> Option<&ResourceId> {
        self.instance.parent()
    }

    pub fn children(&self) -> &[ResourceId] {
        self.instance.children()
    }

    pub fn properties(&self) -> &PropertyStore {
        self.instance.properties()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.instance.properties.get(name)
    }

    /// Reads a numeric property, failing with `OperationFailed` if it is absent or not a number.
    pub fn get_f64(&self, name: &str) -> Result<f64> {
        self.get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| ControlError::failed(format!("property '{name}' is not a number")))
    }

    /// Writes straight to the property store, bypassing handlers.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.instance.properties.insert(name.to_owned(), value.into());
    }

    /// Configures one of this resource's own properties through its dispatch table.
    pub fn configure(&mut self, name: &str, value: Value) -> Result<Value> {
        dispatch::dispatch(self, Operation::Configure, name, value)
    }

    pub fn request(&mut self, name: &str) -> Result<Value> {
        dispatch::dispatch(self, Operation::Request, name, Value::Null)
    }

    /// Runs a named work routine of this resource's type.
    pub fn work(&mut self, name: &str, args: Value) -> Result<Value> {
        let descriptor = Arc::clone(self.instance.descriptor());
        let routine = descriptor.work(name)?;
        routine.call(self, args)
    }

    /// Schedules `tick` every `interval` on the controller loop until cancelled or
    /// until this resource is released.
    pub fn every<F>(&mut self, interval: Duration, tick: F) -> TimerHandle
    where
        F: FnMut(&mut ResourceCtx<'_>) -> Result<()> + Send + 'static,
    {
        let timer = ResourceTimer {
            owner: self.instance.id().clone(),
            tick: Box::new(tick),
        };
        let handle = self.scheduler.every(interval, timer);
        self.instance.timers.push(handle);
        handle
    }

    pub fn after<F>(&mut self, delay: Duration, tick: F) -> TimerHandle
    where
        F: FnMut(&mut ResourceCtx<'_>) -> Result<()> + Send + 'static,
    {
        let timer = ResourceTimer {
            owner: self.instance.id().clone(),
            tick: Box::new(tick),
        };
        let handle = self.scheduler.after(delay, timer);
        self.instance.timers.push(handle);
        handle
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.instance.timers.retain(|h| *h != handle);
        self.scheduler.cancel(handle)
    }

    pub(crate) fn descriptor(&self) -> &Arc<TypeDescriptor> {
        self.instance.descriptor()
    }
}
