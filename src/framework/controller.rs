//! # Resource Controller
//!
//! The single cooperative loop that owns every resource. It multiplexes two sources:
//! requests arriving on its mailbox and ticks of timers scheduled by resources. Each
//! message runs to completion before the next one is taken, so handlers, hooks and
//! timer callbacks never overlap and the tree needs no locking.
//!
//! When the last [`ResourceClient`] is dropped the mailbox closes; the loop then releases
//! every remaining resource before returning.

use crate::framework::client::ResourceClient;
use crate::framework::message::ControllerRequest;
use crate::framework::registry::TypeRegistry;
use crate::framework::tree::ResourceTree;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct ResourceController {
    receiver: mpsc::Receiver<ControllerRequest>,
    tree: ResourceTree,
}

impl ResourceController {
    pub fn new(registry: Arc<TypeRegistry>, buffer_size: usize) -> (Self, ResourceClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let controller = Self {
            receiver,
            tree: ResourceTree::new(registry),
        };
        (controller, ResourceClient::new(sender))
    }

    /// Caps how many released resources keep their final state.
    pub fn with_tombstone_limit(mut self, limit: usize) -> Self {
        self.tree = self.tree.with_tombstone_limit(limit);
        self
    }

    /// Runs the loop until the mailbox closes.
    pub async fn run(mut self) {
        info!(types = ?self.tree.registry().names(), "Controller started");

        loop {
            tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(msg) => self.handle(msg),
                    None => break,
                },
                Some(handle) = self.tree.next_timer() => self.tree.fire_timer(handle),
            }
        }

        let released = self.tree.release_all();
        info!(released, "Controller shutdown");
    }

    fn handle(&mut self, msg: ControllerRequest) {
        match msg {
            ControllerRequest::CreateRoot {
                request,
                respond_to,
            } => {
                debug!(?request, "CreateRoot");
                let result = self.tree.create_root(&request.type_name, request.options);
                if let Err(error) = &result {
                    warn!(type_name = %request.type_name, %error, "Create failed");
                }
                let _ = respond_to.send(result);
            }
            ControllerRequest::CreateChild {
                parent,
                request,
                respond_to,
            } => {
                debug!(%parent, ?request, "CreateChild");
                let result = self
                    .tree
                    .create_child(&parent, &request.type_name, request.options);
                if let Err(error) = &result {
                    warn!(%parent, type_name = %request.type_name, %error, "Create failed");
                }
                let _ = respond_to.send(result);
            }
            ControllerRequest::Dispatch {
                id,
                envelope,
                respond_to,
            } => {
                let operation = envelope.operation;
                let property = envelope.property.clone();
                let result = self.tree.dispatch(&id, envelope);
                match &result {
                    Ok(_) => debug!(resource = %id, %operation, property, "Dispatch ok"),
                    Err(error) => {
                        warn!(resource = %id, %operation, property, %error, "Dispatch failed")
                    }
                }
                let _ = respond_to.send(result);
            }
            ControllerRequest::Release { id, respond_to } => {
                debug!(resource = %id, "Release");
                let _ = respond_to.send(self.tree.release(&id));
            }
            ControllerRequest::ReleaseAll { respond_to } => {
                let released = self.tree.release_all();
                info!(released, "Released all top-level resources");
                let _ = respond_to.send(Ok(released));
            }
            ControllerRequest::Snapshot { id, respond_to } => {
                let _ = respond_to.send(self.tree.snapshot(&id));
            }
        }
    }
}
