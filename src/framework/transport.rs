//! The seam between orchestration and resources.
//!
//! In a deployment this is the reply-correlated send over the pub/sub messaging layer.
//! In-process, [`ResourceClient`](crate::framework::ResourceClient) implements it directly.

use crate::framework::error::Result;
use crate::framework::message::Envelope;
use crate::framework::resource::ResourceId;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers `envelope` to `target` and waits for its reply.
    async fn deliver(&self, target: &ResourceId, envelope: Envelope) -> Result<Value>;
}
