//! Resource control framework.
//!
//! This module provides the building blocks for declaring resource types and running
//! their instances on a single controller loop.
//!
//! # Main Components
//!
//! - [`TypeRegistry`] / [`TypeBuilder`] - Declare types, properties, handlers and hooks
//! - [`ResourceController`] - The loop that owns every resource and its timers
//! - [`ResourceClient`] - Cloneable async handle to the controller
//! - [`ResourceCtx`] - What a handler, hook or timer sees of its resource
//! - [`ControlError`] - Error taxonomy shared with the experiment layer
//!
//! # Testing
//!
//! See the [`mock`] module for a scripted [`Transport`].

pub mod capability;
mod chain;
pub mod client;
pub mod context;
pub mod controller;
pub mod creation;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod message;
pub mod mock;
pub mod registry;
pub mod resource;
pub mod scheduler;
pub mod transport;
pub mod tree;

pub use capability::PROPERTY_LISTING;
pub use client::ResourceClient;
pub use context::{ResourceCtx, ResourceTimer};
pub use controller::ResourceController;
pub use creation::CreateOptions;
pub use dispatch::{Handler, HandlerBase, PropertyDef, PropertyDispatchTable};
pub use error::{ControlError, Result};
pub use hooks::{HookArgs, HookBase, HookPoint, HookSequencer};
pub use message::{ControllerRequest, CreateRequest, Envelope, Operation, Response};
pub use registry::{Capability, TypeBuilder, TypeDescriptor, TypeRegistry};
pub use resource::{LifecycleState, PropertyStore, ResourceId, ResourceInstance, ResourceSnapshot};
pub use scheduler::{Scheduler, TimerHandle};
pub use transport::Transport;
pub use tree::ResourceTree;
