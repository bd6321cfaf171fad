//! # Messages
//!
//! Wire-level envelopes exchanged with the external transport, and the internal request
//! enum carried over the controller's mailbox.

use crate::framework::creation::CreateOptions;
use crate::framework::error::{ControlError, Result};
use crate::framework::resource::{ResourceId, ResourceSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::oneshot;

/// The two property operations a resource answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Mutate a property.
    Configure,
    /// Read a property.
    Request,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configure => f.write_str("configure"),
            Self::Request => f.write_str("request"),
        }
    }
}

/// Inbound dispatch envelope delivered by the transport.
///
/// ```
/// use testbed_control::framework::{Envelope, Operation};
///
/// let env = Envelope::from_json(r#"{"operation":"configure","property":"throttle","args":0.5}"#).unwrap();
/// assert_eq!(env.operation, Operation::Configure);
/// assert_eq!(env.args, serde_json::json!(0.5));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub operation: Operation,
    pub property: String,
    #[serde(default)]
    pub args: Value,
}

impl Envelope {
    pub fn configure(property: impl Into<String>, args: Value) -> Self {
        Self {
            operation: Operation::Configure,
            property: property.into(),
            args,
        }
    }

    pub fn request(property: impl Into<String>) -> Self {
        Self {
            operation: Operation::Request,
            property: property.into(),
            args: Value::Null,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ControlError::Transport(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ControlError::Transport(e.to_string()))
    }
}

/// Creation call contract: `{type, provider?, property?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(flatten)]
    pub options: CreateOptions,
}

/// Type alias for the one-shot response channel used by the controller.
pub type Response<T> = oneshot::Sender<Result<T>>;

/// Internal message type sent to the [`ResourceController`](crate::framework::ResourceController).
///
/// Every variant carries its own responder, so a caller awaiting one reply is never
/// blocked behind another caller's request.
#[derive(Debug)]
pub enum ControllerRequest {
    CreateRoot {
        request: CreateRequest,
        respond_to: Response<ResourceId>,
    },
    CreateChild {
        parent: ResourceId,
        request: CreateRequest,
        respond_to: Response<ResourceId>,
    },
    Dispatch {
        id: ResourceId,
        envelope: Envelope,
        respond_to: Response<Value>,
    },
    Release {
        id: ResourceId,
        respond_to: Response<()>,
    },
    ReleaseAll {
        respond_to: Response<usize>,
    },
    Snapshot {
        id: ResourceId,
        respond_to: Response<ResourceSnapshot>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_args_default_to_null() {
        let env = Envelope::from_json(r#"{"operation":"request","property":"rpm"}"#).unwrap();
        assert_eq!(env, Envelope::request("rpm"));
    }

    #[test]
    fn unknown_operation_is_a_transport_error() {
        let err = Envelope::from_json(r#"{"operation":"delete","property":"rpm"}"#).unwrap_err();
        assert!(matches!(err, ControlError::Transport(_)));
    }

    #[test]
    fn create_request_reads_the_wire_contract() {
        let req: CreateRequest = serde_json::from_value(json!({
            "type": "engine",
            "provider": "sim",
            "property": { "throttle": 1.0 }
        }))
        .unwrap();
        assert_eq!(req.type_name, "engine");
        assert_eq!(req.options.provider.as_deref(), Some("sim"));
        assert_eq!(req.options.properties["throttle"], json!(1.0));
    }
}
