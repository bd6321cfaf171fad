//! # Lifecycle Hooks
//!
//! Each type carries at most one hook per [`HookPoint`]. Installing a hook for an
//! occupied point replaces it; `extend_hook` first makes the current one available to
//! the new hook as its [`HookBase`], which the new hook may call at any point in its body.
//!
//! `before_create` and `after_create` run on the *parent's* type, with the parent as
//! context. The other points run on the resource itself.

use crate::framework::chain::ChainTable;
use crate::framework::context::ResourceCtx;
use crate::framework::creation::CreateOptions;
use crate::framework::error::Result;
use crate::framework::resource::ResourceId;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookPoint {
    BeforeCreate,
    BeforeReady,
    AfterCreate,
    AfterInitialConfigured,
    BeforeRelease,
}

impl HookPoint {
    /// Lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::BeforeCreate,
        Self::BeforeReady,
        Self::AfterCreate,
        Self::AfterInitialConfigured,
        Self::BeforeRelease,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeCreate => "before_create",
            Self::BeforeReady => "before_ready",
            Self::AfterCreate => "after_create",
            Self::AfterInitialConfigured => "after_initial_configured",
            Self::BeforeRelease => "before_release",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments a hook receives beyond its context.
pub enum HookArgs<'a> {
    /// `before_create`: the requested child type and its mutable creation options.
    Create {
        type_name: &'a str,
        options: &'a mut CreateOptions,
    },
    /// `after_create`: the child that was just created.
    Created { child: &'a ResourceId },
    Lifecycle,
}

impl HookArgs<'_> {
    pub fn child_type(&self) -> Option<&str> {
        match self {
            HookArgs::Create { type_name, .. } => Some(*type_name),
            _ => None,
        }
    }

    pub fn options_mut(&mut self) -> Option<&mut CreateOptions> {
        match self {
            HookArgs::Create { options, .. } => Some(&mut **options),
            _ => None,
        }
    }

    pub fn child(&self) -> Option<&ResourceId> {
        match self {
            HookArgs::Created { child } => Some(*child),
            _ => None,
        }
    }
}

pub type HookBody = dyn Fn(&mut ResourceCtx<'_>, &mut HookArgs<'_>, HookBase<'_>) -> Result<()> + Send + Sync;

pub struct Hook {
    body: Box<HookBody>,
    base: Option<Arc<Hook>>,
}

impl Hook {
    pub fn call(&self, ctx: &mut ResourceCtx<'_>, args: &mut HookArgs<'_>) -> Result<()> {
        (self.body)(ctx, args, HookBase(self.base.as_deref()))
    }
}

/// The hook an extended hook displaced. Calling an empty base is a no-op.
#[derive(Clone, Copy)]
pub struct HookBase<'a>(Option<&'a Hook>);

impl HookBase<'_> {
    pub fn call(&self, ctx: &mut ResourceCtx<'_>, args: &mut HookArgs<'_>) -> Result<()> {
        match self.0 {
            Some(hook) => hook.call(ctx, args),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

pub(crate) fn hook<F>(body: F) -> Box<HookBody>
where
    F: Fn(&mut ResourceCtx<'_>, &mut HookArgs<'_>, HookBase<'_>) -> Result<()> + Send + Sync + 'static,
{
    Box::new(body)
}

#[derive(Default)]
pub struct HookSequencer {
    hooks: ChainTable<HookPoint, Hook>,
}

impl HookSequencer {
    pub(crate) fn install(&mut self, point: HookPoint, body: Box<HookBody>) {
        self.hooks.install(point, |base| Hook { body, base });
    }

    pub(crate) fn extend(&mut self, point: HookPoint) {
        self.hooks.extend(point, None);
    }

    pub fn is_set(&self, point: HookPoint) -> bool {
        self.hooks.contains(&point)
    }

    /// Runs the hook installed at `point`, if any.
    pub fn run(
        &self,
        point: HookPoint,
        ctx: &mut ResourceCtx<'_>,
        args: &mut HookArgs<'_>,
    ) -> Result<()> {
        match self.hooks.get(&point) {
            Some(hook) => hook.call(ctx, args),
            None => Ok(()),
        }
    }
}
