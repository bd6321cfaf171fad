use crate::framework::creation::CreateOptions;
use crate::framework::error::{ControlError, Result};
use crate::framework::message::{ControllerRequest, CreateRequest, Envelope};
use crate::framework::resource::{ResourceId, ResourceSnapshot};
use crate::framework::transport::Transport;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Cloneable handle to a running [`ResourceController`](crate::framework::ResourceController).
#[derive(Clone)]
pub struct ResourceClient {
    sender: mpsc::Sender<ControllerRequest>,
}

impl ResourceClient {
    pub fn new(sender: mpsc::Sender<ControllerRequest>) -> Self {
        Self { sender }
    }

    pub async fn create_root(&self, type_name: &str, options: CreateOptions) -> Result<ResourceId> {
        let request = CreateRequest {
            type_name: type_name.to_owned(),
            options,
        };
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ControllerRequest::CreateRoot {
                request,
                respond_to,
            })
            .await
            .map_err(|_| ControlError::ActorClosed)?;
        response.await.map_err(|_| ControlError::ActorDropped)?
    }

    pub async fn create_child(
        &self,
        parent: &ResourceId,
        type_name: &str,
        options: CreateOptions,
    ) -> Result<ResourceId> {
        let request = CreateRequest {
            type_name: type_name.to_owned(),
            options,
        };
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ControllerRequest::CreateChild {
                parent: parent.clone(),
                request,
                respond_to,
            })
            .await
            .map_err(|_| ControlError::ActorClosed)?;
        response.await.map_err(|_| ControlError::ActorDropped)?
    }

    pub async fn dispatch(&self, id: &ResourceId, envelope: Envelope) -> Result<Value> {
        debug!(resource = %id, operation = %envelope.operation, property = %envelope.property, "Sending dispatch");
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ControllerRequest::Dispatch {
                id: id.clone(),
                envelope,
                respond_to,
            })
            .await
            .map_err(|_| ControlError::ActorClosed)?;
        response.await.map_err(|_| ControlError::ActorDropped)?
    }

    pub async fn configure(&self, id: &ResourceId, property: &str, value: Value) -> Result<Value> {
        self.dispatch(id, Envelope::configure(property, value)).await
    }

    pub async fn request(&self, id: &ResourceId, property: &str) -> Result<Value> {
        self.dispatch(id, Envelope::request(property)).await
    }

    pub async fn release(&self, id: &ResourceId) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ControllerRequest::Release {
                id: id.clone(),
                respond_to,
            })
            .await
            .map_err(|_| ControlError::ActorClosed)?;
        response.await.map_err(|_| ControlError::ActorDropped)?
    }

    pub async fn release_all(&self) -> Result<usize> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ControllerRequest::ReleaseAll { respond_to })
            .await
            .map_err(|_| ControlError::ActorClosed)?;
        response.await.map_err(|_| ControlError::ActorDropped)?
    }

    pub async fn snapshot(&self, id: &ResourceId) -> Result<ResourceSnapshot> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ControllerRequest::Snapshot {
                id: id.clone(),
                respond_to,
            })
            .await
            .map_err(|_| ControlError::ActorClosed)?;
        response.await.map_err(|_| ControlError::ActorDropped)?
    }

    pub async fn children(&self, id: &ResourceId) -> Result<Vec<ResourceId>> {
        Ok(self.snapshot(id).await?.children)
    }
}

#[async_trait]
impl Transport for ResourceClient {
    async fn deliver(&self, target: &ResourceId, envelope: Envelope) -> Result<Value> {
        self.dispatch(target, envelope).await
    }
}
