//! Experiment orchestration.
//!
//! An [`Experiment`] addresses many resources at once through groups, reacts to events,
//! keeps script-scoped properties and loads scripts. It talks to resources only through a
//! [`Transport`](crate::framework::Transport).

pub mod event;
pub mod group;
pub mod loader;
pub mod property;
pub mod runtime;

pub use event::{EventEngine, EventHost, ObservedState, Trigger};
pub use group::GroupCoordinator;
pub use loader::{BuiltinModule, ScriptEvaluator, ScriptLoader, ScriptSource, ScriptUri};
pub use property::{ExperimentProperty, PropertyBook};
pub use runtime::{BatchId, Experiment, GroupHandle, MemberReply, ReplyCallback};
