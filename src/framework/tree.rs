//! # Resource Tree
//!
//! All live instances, keyed by id, together with the timers they own. The tree is owned
//! by the controller loop and never shared, so nothing in it needs a lock.
//!
//! Released instances stay in the tree as tombstones: a later dispatch to one fails with
//! `InstanceReleased` rather than `ResourceNotFound`, and its final snapshot can still be
//! read. Only the most recent tombstones are kept whole; older ones shrink to their id.

use crate::framework::context::{ResourceCtx, ResourceTimer};
use crate::framework::dispatch;
use crate::framework::error::{ControlError, Result};
use crate::framework::hooks::{HookArgs, HookPoint};
use crate::framework::message::{Envelope, Operation};
use crate::framework::registry::TypeRegistry;
use crate::framework::resource::{LifecycleState, ResourceId, ResourceInstance, ResourceSnapshot};
use crate::framework::scheduler::{Scheduler, TimerHandle};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ResourceTree {
    registry: Arc<TypeRegistry>,
    pub(crate) instances: HashMap<ResourceId, ResourceInstance>,
    pub(crate) roots: Vec<ResourceId>,
    pub(crate) scheduler: Scheduler<ResourceTimer>,
    /// Released ids whose instance is still held, oldest first.
    tombstones: VecDeque<ResourceId>,
    tombstone_limit: usize,
    /// Released ids whose instance has been dropped.
    released: HashSet<ResourceId>,
}

/// How many released instances keep their final state by default.
pub const DEFAULT_TOMBSTONE_LIMIT: usize = 1024;

impl ResourceTree {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            instances: HashMap::new(),
            roots: Vec::new(),
            scheduler: Scheduler::new(),
            tombstones: VecDeque::new(),
            tombstone_limit: DEFAULT_TOMBSTONE_LIMIT,
            released: HashSet::new(),
        }
    }

    pub fn with_tombstone_limit(mut self, limit: usize) -> Self {
        self.tombstone_limit = limit;
        self
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn instance(&self, id: &ResourceId) -> Option<&ResourceInstance> {
        self.instances.get(id)
    }

    /// Top-level resources that have not been released, in creation order.
    pub fn roots(&self) -> &[ResourceId] {
        &self.roots
    }

    /// Number of live (not yet released) resources.
    pub fn live_count(&self) -> usize {
        self.instances
            .values()
            .filter(|i| i.state() != LifecycleState::Released)
            .count()
    }

    /// Number of released instances still held whole.
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    pub fn snapshot(&self, id: &ResourceId) -> Result<ResourceSnapshot> {
        self.instances
            .get(id)
            .map(ResourceInstance::snapshot)
            .ok_or_else(|| missing(&self.released, id))
    }

    pub fn children(&self, id: &ResourceId) -> Result<Vec<ResourceId>> {
        self.instances
            .get(id)
            .map(|i| i.children().to_vec())
            .ok_or_else(|| missing(&self.released, id))
    }

    /// Routes an inbound envelope to the resource's dispatch table.
    pub fn dispatch(&mut self, id: &ResourceId, envelope: Envelope) -> Result<Value> {
        let Envelope {
            operation,
            property,
            args,
        } = envelope;
        self.dispatch_op(id, operation, &property, args)
    }

    pub fn configure(&mut self, id: &ResourceId, property: &str, value: Value) -> Result<Value> {
        self.dispatch_op(id, Operation::Configure, property, value)
    }

    pub fn request(&mut self, id: &ResourceId, property: &str) -> Result<Value> {
        self.dispatch_op(id, Operation::Request, property, Value::Null)
    }

    pub(crate) fn dispatch_op(
        &mut self,
        id: &ResourceId,
        operation: Operation,
        property: &str,
        args: Value,
    ) -> Result<Value> {
        let instance = live_entry(&mut self.instances, &self.released, id)?;
        debug!(resource = %id, %operation, property, "Dispatch");
        let mut ctx = ResourceCtx::new(instance, &mut self.scheduler);
        dispatch::dispatch(&mut ctx, operation, property, args)
    }

    /// Runs the hook `point` of the resource's own type with the resource as context.
    pub(crate) fn run_hook(
        &mut self,
        id: &ResourceId,
        point: HookPoint,
        args: &mut HookArgs<'_>,
    ) -> Result<()> {
        let instance = self
            .instances
            .get_mut(id)
            .ok_or_else(|| ControlError::ResourceNotFound(id.clone()))?;
        let descriptor = Arc::clone(instance.descriptor());
        if !descriptor.hooks().is_set(point) {
            return Ok(());
        }
        debug!(resource = %id, hook = %point, "Running hook");
        let mut ctx = ResourceCtx::new(instance, &mut self.scheduler);
        descriptor.hooks().run(point, &mut ctx, args)
    }

    pub(crate) fn live(&self, id: &ResourceId) -> Result<&ResourceInstance> {
        let instance = self
            .instances
            .get(id)
            .ok_or_else(|| missing(&self.released, id))?;
        if !instance.state().accepts_dispatch() {
            return Err(ControlError::InstanceReleased(id.clone()));
        }
        Ok(instance)
    }

    pub(crate) fn live_mut(&mut self, id: &ResourceId) -> Result<&mut ResourceInstance> {
        live_entry(&mut self.instances, &self.released, id)
    }

    pub async fn next_timer(&mut self) -> Option<TimerHandle> {
        self.scheduler.next_due().await
    }

    /// Runs one due timer on its owner. Ticks for released owners are dropped.
    pub fn fire_timer(&mut self, handle: TimerHandle) {
        let Some(mut fired) = self.scheduler.begin(handle) else {
            return;
        };
        let owner = fired.callback.owner.clone();
        let Some(instance) = self
            .instances
            .get_mut(&owner)
            .filter(|i| i.state().accepts_dispatch())
        else {
            self.scheduler.discard(fired);
            return;
        };

        let mut ctx = ResourceCtx::new(instance, &mut self.scheduler);
        if let Err(error) = (fired.callback.tick)(&mut ctx) {
            warn!(resource = %owner, %error, "Timer callback failed");
        }
        self.scheduler.finish(fired);

        if !self.scheduler.contains(handle) {
            if let Some(instance) = self.instances.get_mut(&owner) {
                instance.timers.retain(|h| *h != handle);
            }
        }
    }

    /// Waits for the next timer and runs it.
    pub async fn tick(&mut self) -> bool {
        match self.next_timer().await {
            Some(handle) => {
                self.fire_timer(handle);
                true
            }
            None => false,
        }
    }

    /// Cancels owned timers and marks the instance released.
    pub(crate) fn teardown(&mut self, id: &ResourceId) {
        let Some(instance) = self.instances.get_mut(id) else {
            return;
        };
        for handle in instance.timers.drain(..) {
            self.scheduler.cancel(handle);
        }
        instance.transition(LifecycleState::Released);
    }

    /// Keeps a released instance as a tombstone, dropping the oldest ones past the limit.
    pub(crate) fn bury(&mut self, id: &ResourceId) {
        self.tombstones.push_back(id.clone());
        while self.tombstones.len() > self.tombstone_limit {
            let Some(oldest) = self.tombstones.pop_front() else {
                break;
            };
            debug!(resource = %oldest, "Dropping tombstone");
            self.instances.remove(&oldest);
            self.released.insert(oldest);
        }
    }

    /// Forgets that `id` was ever released, so the id can be used again.
    pub(crate) fn exhume(&mut self, id: &ResourceId) {
        self.tombstones.retain(|t| t != id);
        self.released.remove(id);
    }

    /// Unlinks `id` from its parent's children, or from the roots.
    pub(crate) fn detach(&mut self, parent: Option<&ResourceId>, id: &ResourceId) {
        match parent.and_then(|p| self.instances.get_mut(p)) {
            Some(parent) => parent.children.retain(|c| c != id),
            None => self.roots.retain(|r| r != id),
        }
    }
}

fn missing(released: &HashSet<ResourceId>, id: &ResourceId) -> ControlError {
    if released.contains(id) {
        ControlError::InstanceReleased(id.clone())
    } else {
        ControlError::ResourceNotFound(id.clone())
    }
}

fn live_entry<'a>(
    instances: &'a mut HashMap<ResourceId, ResourceInstance>,
    released: &HashSet<ResourceId>,
    id: &ResourceId,
) -> Result<&'a mut ResourceInstance> {
    let instance = instances
        .get_mut(id)
        .ok_or_else(|| missing(released, id))?;
    if !instance.state().accepts_dispatch() {
        return Err(ControlError::InstanceReleased(id.clone()));
    }
    Ok(instance)
}
