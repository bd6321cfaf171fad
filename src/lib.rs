//! # Testbed Control
//!
//! A control plane for declaring and operating stateful testbed resources, and for
//! orchestrating many of them at once.
//!
//! ## Design
//!
//! ### One loop owns the resources
//! Every resource lives inside a single [`ResourceController`](framework::ResourceController)
//! task. Requests arrive on its mailbox, timers post back to it, and each message runs to
//! completion before the next. Handlers and hooks are plain synchronous closures over a
//! [`ResourceCtx`](framework::ResourceCtx), so a property store is never shared and never
//! locked.
//!
//! ### Types are tables, built once
//! A type is declared with a [`TypeBuilder`](framework::TypeBuilder): its allowed creators,
//! its properties with defaults and access, configure/request handlers, lifecycle hooks
//! and work routines. Installing under an occupied name replaces the entry; `extend_*`
//! first keeps the old entry as a base the new one may call. The finished
//! [`TypeRegistry`](framework::TypeRegistry) moves into the controller behind an `Arc`.
//!
//! ### Orchestration talks through a transport
//! An [`Experiment`](experiment::Experiment) never touches resources directly. Group
//! operations go through a [`Transport`](framework::Transport), one independent delivery
//! per member, and replies come back to the experiment's own loop.
//!
//! ## Module Tour
//!
//! - [`framework`] - types, dispatch, hooks, creation protocol, the controller and its client
//! - [`experiment`] - groups, events, experiment properties, script loading
//! - [`lifecycle`] - process start-up, signal handling, shutdown, tracing
//! - [`config`] - TOML configuration
//! - [`garage`] - sample garage and engine types
//!
//! ## Running the Demo
//!
//! ```bash
//! RUST_LOG=info cargo run -- testbed.toml
//! ```

pub mod config;
pub mod experiment;
pub mod framework;
pub mod garage;
pub mod lifecycle;
