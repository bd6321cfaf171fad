//! # Mock Transport
//!
//! A [`Transport`] for testing orchestration code without a running controller.
//!
//! Replies are scripted per target: queue one-off replies with [`MockTransport::expect`],
//! make a target fail every delivery with [`MockTransport::fail`], or slow it down with
//! [`MockTransport::delay`]. Targets with nothing scripted answer `null`. Every delivery
//! is recorded on arrival, before any delay, so a test can tell whether a slow or failing
//! member held up the others.
//!
//! ```ignore
//! let mock = MockTransport::new();
//! mock.expect("res1").return_ok(json!("done"));
//! mock.fail("res2", ControlError::failed("unreachable"));
//!
//! let transport: Arc<dyn Transport> = Arc::new(mock.clone());
//! // Drive the experiment...
//! assert_eq!(mock.delivered_to(), vec!["res1".into(), "res2".into()]);
//! ```

use crate::framework::error::{ControlError, Result};
use crate::framework::message::Envelope;
use crate::framework::resource::ResourceId;
use crate::framework::transport::Transport;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// One recorded delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub target: ResourceId,
    pub envelope: Envelope,
    pub at: Instant,
}

#[derive(Default)]
struct MockState {
    replies: HashMap<ResourceId, VecDeque<Result<Value>>>,
    failures: HashMap<ResourceId, ControlError>,
    delays: HashMap<ResourceId, Duration>,
    deliveries: Vec<Delivery>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for the next delivery to `target`.
    pub fn expect(&self, target: impl Into<ResourceId>) -> ReplyBuilder {
        ReplyBuilder {
            target: target.into(),
            state: Arc::clone(&self.state),
        }
    }

    /// Every delivery to `target` fails with `error`.
    pub fn fail(&self, target: impl Into<ResourceId>, error: ControlError) {
        self.state().failures.insert(target.into(), error);
    }

    /// Every reply from `target` arrives after `delay`.
    pub fn delay(&self, target: impl Into<ResourceId>, delay: Duration) {
        self.state().delays.insert(target.into(), delay);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.state().deliveries.clone()
    }

    /// Targets in delivery order.
    pub fn delivered_to(&self) -> Vec<ResourceId> {
        self.state()
            .deliveries
            .iter()
            .map(|d| d.target.clone())
            .collect()
    }

    /// Panics if queued replies were never consumed.
    pub fn verify(&self) {
        let state = self.state();
        let remaining: usize = state.replies.values().map(VecDeque::len).sum();
        if remaining > 0 {
            panic!("Not all expected replies were consumed. {remaining} remaining");
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn deliver(&self, target: &ResourceId, envelope: Envelope) -> Result<Value> {
        let (delay, reply) = {
            let mut state = self.state();
            state.deliveries.push(Delivery {
                target: target.clone(),
                envelope,
                at: Instant::now(),
            });
            let queued = state.replies.get_mut(target).and_then(VecDeque::pop_front);
            let reply = match (state.failures.get(target), queued) {
                (Some(error), _) => Err(error.clone()),
                (None, Some(reply)) => reply,
                (None, None) => Ok(Value::Null),
            };
            (state.delays.get(target).copied(), reply)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }
}

/// Builder for a queued reply.
pub struct ReplyBuilder {
    target: ResourceId,
    state: Arc<Mutex<MockState>>,
}

impl ReplyBuilder {
    pub fn return_ok(self, value: Value) {
        self.push(Ok(value));
    }

    pub fn return_err(self, error: ControlError) {
        self.push(Err(error));
    }

    fn push(self, reply: Result<Value>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.replies.entry(self.target).or_default().push_back(reply);
    }
}
