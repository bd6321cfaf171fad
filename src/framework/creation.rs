//! # Creation Protocol
//!
//! Every resource comes into being through [`ResourceTree::create_root`] or
//! [`ResourceTree::create_child`], and leaves through [`ResourceTree::release`].
//!
//! Creation runs, in order: type lookup, the `created_by` check, the parent's
//! `before_create`, instantiation with seeded properties, default initialization,
//! `before_ready`, `Ready`, the parent's `after_create`, configure handlers for the
//! remaining creation properties, and `after_initial_configured`. Any failure after
//! instantiation forces the half-built resource through release and removes it.

use crate::framework::error::{ControlError, Result};
use crate::framework::hooks::{HookArgs, HookPoint};
use crate::framework::message::Operation;
use crate::framework::registry::TypeDescriptor;
use crate::framework::resource::{LifecycleState, PropertyStore, ResourceId, ResourceInstance};
use crate::framework::tree::ResourceTree;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Named creation options plus the free-form initial properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, rename = "property", skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

impl ResourceTree {
    /// Creates a top-level resource. Only types with no `created_by` restriction qualify.
    pub fn create_root(&mut self, type_name: &str, options: CreateOptions) -> Result<ResourceId> {
        let descriptor = self.registry().lookup(type_name)?;
        if !descriptor.permits(None) {
            return Err(ControlError::CreationDenied {
                parent: "<root>".to_owned(),
                child: type_name.to_owned(),
            });
        }
        self.instantiate(None, descriptor, options)
    }

    pub fn create_child(
        &mut self,
        parent: &ResourceId,
        type_name: &str,
        mut options: CreateOptions,
    ) -> Result<ResourceId> {
        let parent_type = self.live(parent)?.type_name().to_owned();
        let descriptor = self.registry().lookup(type_name)?;
        if !descriptor.permits(Some(&parent_type)) {
            warn!(parent = %parent, parent_type, type_name, "Creation denied");
            return Err(ControlError::CreationDenied {
                parent: parent_type,
                child: type_name.to_owned(),
            });
        }

        let mut args = HookArgs::Create {
            type_name,
            options: &mut options,
        };
        self.run_hook(parent, HookPoint::BeforeCreate, &mut args)
            .map_err(|error| {
                warn!(parent = %parent, type_name, %error, "Creation aborted");
                match error {
                    ControlError::OperationFailed(message) => ControlError::CreationAborted(message),
                    other => ControlError::CreationAborted(other.to_string()),
                }
            })?;

        self.instantiate(Some(parent.clone()), descriptor, options)
    }

    fn instantiate(
        &mut self,
        parent: Option<ResourceId>,
        descriptor: Arc<TypeDescriptor>,
        options: CreateOptions,
    ) -> Result<ResourceId> {
        let id = options
            .uid
            .map(ResourceId::from)
            .unwrap_or_else(ResourceId::generate);
        if self
            .instance(&id)
            .is_some_and(|i| i.state() != LifecycleState::Released)
        {
            return Err(ControlError::DuplicateResource(id));
        }

        // Declared properties without a custom configure handler are seeded directly.
        // Everything else must go through configure once the resource is ready.
        let table = descriptor.dispatch_table();
        let (seeded, remaining): (PropertyStore, PropertyStore) =
            options.properties.into_iter().partition(|(name, _)| {
                table.property(name).is_some()
                    && !table.has_handler(Operation::Configure, name)
            });

        let type_name = descriptor.name().to_owned();
        debug!(resource = %id, type_name, provider = ?options.provider, "Instantiating");
        self.exhume(&id);
        self.instances.insert(
            id.clone(),
            ResourceInstance::new(id.clone(), descriptor, parent.clone(), seeded),
        );

        match self.bring_up(&id, parent.as_ref(), remaining) {
            Ok(()) => {
                info!(resource = %id, type_name, parent = ?parent.as_ref().map(ResourceId::as_str), "Created");
                Ok(id)
            }
            Err(source) => {
                warn!(resource = %id, type_name, error = %source, "Creation failed, releasing");
                self.abandon(&id);
                Err(ControlError::CreationFailed {
                    type_name,
                    source: Box::new(source),
                })
            }
        }
    }

    fn bring_up(
        &mut self,
        id: &ResourceId,
        parent: Option<&ResourceId>,
        remaining: PropertyStore,
    ) -> Result<()> {
        self.live_mut(id)?.init_defaults();
        self.live_mut(id)?.transition(LifecycleState::Configuring);
        self.run_hook(id, HookPoint::BeforeReady, &mut HookArgs::Lifecycle)?;
        self.live_mut(id)?.transition(LifecycleState::Ready);

        match parent {
            Some(parent) => {
                self.live_mut(parent)?.children.push(id.clone());
                self.run_hook(parent, HookPoint::AfterCreate, &mut HookArgs::Created { child: id })?;
            }
            None => self.roots.push(id.clone()),
        }

        for (name, value) in remaining {
            self.dispatch_op(id, Operation::Configure, &name, value)?;
        }
        self.run_hook(id, HookPoint::AfterInitialConfigured, &mut HookArgs::Lifecycle)
    }

    /// Forced release of a resource whose creation failed. It leaves no trace.
    fn abandon(&mut self, id: &ResourceId) {
        if let Some(instance) = self.instances.get_mut(id) {
            instance.transition(LifecycleState::Releasing);
        }
        if let Err(error) = self.run_hook(id, HookPoint::BeforeRelease, &mut HookArgs::Lifecycle) {
            warn!(resource = %id, %error, "before_release failed during rollback");
        }
        self.teardown(id);
        if let Some(instance) = self.instances.remove(id) {
            self.detach(instance.parent(), id);
        }
    }

    /// Releases a resource and, before it, all of its children (last created first).
    pub fn release(&mut self, id: &ResourceId) -> Result<()> {
        let instance = self.live(id)?;
        let children = instance.children().to_vec();
        let parent = instance.parent().cloned();

        for child in children.iter().rev() {
            if let Err(error) = self.release(child) {
                warn!(resource = %child, %error, "Child release failed");
            }
        }

        self.live_mut(id)?.transition(LifecycleState::Releasing);
        if let Err(error) = self.run_hook(id, HookPoint::BeforeRelease, &mut HookArgs::Lifecycle) {
            warn!(resource = %id, %error, "before_release failed");
        }
        self.teardown(id);
        self.detach(parent.as_ref(), id);
        self.bury(id);
        info!(resource = %id, "Released");
        Ok(())
    }

    /// Releases every live top-level resource, newest first. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let roots = self.roots().to_vec();
        let mut released = 0;
        for id in roots.iter().rev() {
            match self.release(id) {
                Ok(()) => released += 1,
                Err(error) => warn!(resource = %id, %error, "Release failed"),
            }
        }
        released
    }
}
