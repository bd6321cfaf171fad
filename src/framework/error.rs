//! # Control Errors
//!
//! This module defines the single error type shared by the resource controller and the
//! experiment layer. Keeping one enum means a group dispatch can report a member's
//! `OperationFailed` with exactly the same value the resource's handler returned.

use crate::framework::message::Operation;
use crate::framework::resource::ResourceId;

/// Errors raised by the control plane.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControlError {
    #[error("Unknown resource type: {0}")]
    UnknownType(String),
    #[error("A {parent} may not create a {child}")]
    CreationDenied { parent: String, child: String },
    #[error("Creation aborted: {0}")]
    CreationAborted(String),
    #[error("Creation of {type_name} failed: {source}")]
    CreationFailed {
        type_name: String,
        #[source]
        source: Box<ControlError>,
    },
    #[error("{type_name} has no {operation} handler for '{property}'")]
    UnknownProperty {
        type_name: String,
        operation: Operation,
        property: String,
    },
    #[error("Resource {0} has been released")]
    InstanceReleased(ResourceId),
    #[error("{0}")]
    OperationFailed(String),
    #[error("Group '{0}' references itself")]
    CyclicGroupReference(String),
    #[error("Group not found: {0}")]
    GroupNotFound(String),
    #[error("Event not found: {0}")]
    EventNotFound(String),
    #[error("Unsupported script scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Failed to load {uri}: {reason}")]
    ScriptLoadFailure { uri: String, reason: String },

    #[error("Resource not found: {0}")]
    ResourceNotFound(ResourceId),
    #[error("Resource {0} already exists")]
    DuplicateResource(ResourceId),
    #[error("{type_name} defines no work named '{name}'")]
    UnknownWork { type_name: String, name: String },
    #[error("Event name '{alias}' already belongs to {event}")]
    EventNameTaken { alias: String, event: String },
    #[error("Experiment property not found: {0}")]
    PropertyNotFound(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Controller closed")]
    ActorClosed,
    #[error("Controller dropped response channel")]
    ActorDropped,
}

impl ControlError {
    /// Shorthand for the error a handler or hook body returns on a domain failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::OperationFailed(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = ControlError> = std::result::Result<T, E>;
