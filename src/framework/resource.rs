//! # Resource Instances
//!
//! The runtime object behind every created resource: identity, lifecycle state, a weak
//! (id-based) link to its parent, the children it owns, and its property store.

use crate::framework::registry::TypeDescriptor;
use crate::framework::scheduler::TimerHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Unique identifier of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random identifier, used when the creator supplies no `uid`.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Lifecycle states. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Configuring,
    Ready,
    Releasing,
    Released,
}

impl LifecycleState {
    /// Whether inbound configure/request calls are still accepted.
    pub fn accepts_dispatch(self) -> bool {
        !matches!(self, Self::Releasing | Self::Released)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Configuring => "configuring",
            Self::Ready => "ready",
            Self::Releasing => "releasing",
            Self::Released => "released",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type PropertyStore = BTreeMap<String, Value>;

pub struct ResourceInstance {
    id: ResourceId,
    descriptor: Arc<TypeDescriptor>,
    state: LifecycleState,
    parent: Option<ResourceId>,
    pub(crate) children: Vec<ResourceId>,
    pub(crate) properties: PropertyStore,
    pub(crate) timers: Vec<TimerHandle>,
}

impl ResourceInstance {
    pub(crate) fn new(
        id: ResourceId,
        descriptor: Arc<TypeDescriptor>,
        parent: Option<ResourceId>,
        properties: PropertyStore,
    ) -> Self {
        Self {
            id,
            descriptor,
            state: LifecycleState::Created,
            parent,
            children: Vec::new(),
            properties,
            timers: Vec::new(),
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn parent(&self) -> Option<&ResourceId> {
        self.parent.as_ref()
    }

    pub fn children(&self) -> &[ResourceId] {
        &self.children
    }

    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    pub(crate) fn transition(&mut self, next: LifecycleState) {
        debug!(resource = %self.id, from = %self.state, to = %next, "Transition");
        self.state = next;
    }

    /// Sets every declared property that has no value yet to its default.
    pub(crate) fn init_defaults(&mut self) {
        for def in self.descriptor.properties() {
            self.properties
                .entry(def.name.clone())
                .or_insert_with(|| def.default.clone());
        }
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            id: self.id.clone(),
            type_name: self.type_name().to_owned(),
            state: self.state,
            parent: self.parent.clone(),
            children: self.children.clone(),
            properties: self.properties.clone(),
        }
    }
}

impl fmt::Debug for ResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceInstance")
            .field("id", &self.id)
            .field("type", &self.type_name())
            .field("state", &self.state)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// Point-in-time copy of a resource, safe to hand out of the controller loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub id: ResourceId,
    #[serde(rename = "type")]
    pub type_name: String,
    pub state: LifecycleState,
    pub parent: Option<ResourceId>,
    pub children: Vec<ResourceId>,
    pub properties: PropertyStore,
}

impl ResourceSnapshot {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}
