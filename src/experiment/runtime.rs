//! # Experiment Runtime
//!
//! The orchestration loop that sits above many resources. Like the resource controller it
//! is a single loop that owns all of its state (groups, events, properties, timers) and
//! runs one callback at a time. It multiplexes member replies coming back from the
//! transport and ticks of its own timers.
//!
//! Group dispatch never waits: each resolved member gets its own delivery task, and each
//! reply re-enters the loop as a message. A slow or failing member therefore holds up
//! nobody else.

use crate::config::ExperimentConfig;
use crate::experiment::event::{self, EventEngine, EventHost, ObservedState, Trigger};
use crate::experiment::group::GroupCoordinator;
use crate::experiment::loader::{ScriptLoader, ScriptSource, ScriptUri};
use crate::experiment::property::PropertyBook;
use crate::framework::{
    ControlError, Envelope, Operation, ResourceId, Result, Scheduler, TimerHandle, Transport,
};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub type ExperimentCallback = Box<dyn FnMut(&mut Experiment) + Send>;
pub type ReplyCallback = Box<dyn FnMut(&mut Experiment, &MemberReply) + Send>;

/// Identifies one group dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

/// One member's outcome of a group dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberReply {
    pub batch: BatchId,
    pub group: String,
    pub target: ResourceId,
    pub envelope: Envelope,
    pub result: Result<Value>,
}

struct Batch {
    group: String,
    envelope: Envelope,
    pending: BTreeSet<ResourceId>,
    on_reply: Option<ReplyCallback>,
    deadline: Option<TimerHandle>,
}

pub struct Experiment {
    name: String,
    transport: Arc<dyn Transport>,
    groups: GroupCoordinator,
    events: EventEngine<Experiment>,
    properties: PropertyBook,
    observed: ObservedState,
    scheduler: Scheduler<ExperimentCallback>,
    loader: ScriptLoader,
    replies_tx: mpsc::UnboundedSender<MemberReply>,
    replies_rx: mpsc::UnboundedReceiver<MemberReply>,
    batches: HashMap<BatchId, Batch>,
    next_batch: u64,
    in_flight: usize,
    reply_timeout: Option<Duration>,
}

impl Experiment {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            transport,
            groups: GroupCoordinator::new(),
            events: EventEngine::new(),
            properties: PropertyBook::new(),
            observed: ObservedState::default(),
            scheduler: Scheduler::new(),
            loader: ScriptLoader::new(),
            replies_tx,
            replies_rx,
            batches: HashMap::new(),
            next_batch: 1,
            in_flight: 0,
            reply_timeout: None,
        }
    }

    /// Builds an experiment from configuration: its name, initial properties and the
    /// default reply deadline for group dispatch.
    pub fn from_config(config: &ExperimentConfig, transport: Arc<dyn Transport>) -> Self {
        let mut experiment = Self::new(config.name.clone(), transport);
        experiment.reply_timeout = config.reply_timeout_ms.map(Duration::from_millis);
        for (name, value) in &config.properties {
            experiment.def_property(name, value.clone(), None);
        }
        experiment
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn loader_mut(&mut self) -> &mut ScriptLoader {
        &mut self.loader
    }

    pub fn observed(&self) -> &ObservedState {
        &self.observed
    }

    /// Replies not yet received across all group dispatches.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    // --- Groups ---

    pub fn def_group<I, S>(&mut self, name: &str, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.def_group(name, members);
    }

    pub fn add_to_group<I, S>(&mut self, name: &str, members: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.add_members(name, members)
    }

    pub fn groups(&self) -> &GroupCoordinator {
        &self.groups
    }

    pub fn all_groups(&self) -> Result<Vec<ResourceId>> {
        self.groups.all_groups()
    }

    /// Starts a group operation. Nothing is resolved until the operation is issued.
    pub fn group(&mut self, name: &str) -> GroupHandle<'_> {
        GroupHandle {
            deadline: self.reply_timeout,
            experiment: self,
            name: name.to_owned(),
            on_reply: None,
        }
    }

    /// `exec` on every member of a group, reporting members that have not answered
    /// within `timeout`.
    pub fn exec_with_deadline(
        &mut self,
        group: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<BatchId> {
        self.group(group).deadline(timeout).exec(command)
    }

    /// Resolves a group and spawns one delivery per member.
    pub fn dispatch_group(
        &mut self,
        name: &str,
        envelope: Envelope,
        on_reply: Option<ReplyCallback>,
        deadline: Option<Duration>,
    ) -> Result<BatchId> {
        let members = self.groups.resolve(name)?;
        let batch = BatchId(self.next_batch);
        self.next_batch += 1;
        info!(
            group = name,
            %batch,
            members = members.len(),
            operation = %envelope.operation,
            property = %envelope.property,
            "Group dispatch"
        );

        for target in &members {
            let transport = Arc::clone(&self.transport);
            let replies = self.replies_tx.clone();
            let reply = MemberReply {
                batch,
                group: name.to_owned(),
                target: target.clone(),
                envelope: envelope.clone(),
                result: Ok(Value::Null),
            };
            tokio::spawn(async move {
                let result = transport.deliver(&reply.target, reply.envelope.clone()).await;
                let _ = replies.send(MemberReply { result, ..reply });
            });
        }
        self.in_flight += members.len();

        if !members.is_empty() {
            let deadline =
                deadline.map(|timeout| self.after(timeout, move |exp| exp.expire_batch(batch)));
            self.batches.insert(
                batch,
                Batch {
                    group: name.to_owned(),
                    envelope,
                    pending: members.into_iter().collect(),
                    on_reply,
                    deadline,
                },
            );
        }
        Ok(batch)
    }

    fn handle_reply(&mut self, reply: MemberReply) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match &reply.result {
            Ok(value) => info!(
                group = %reply.group,
                resource = %reply.target,
                property = %reply.envelope.property,
                %value,
                "Member replied"
            ),
            Err(error) => warn!(
                group = %reply.group,
                resource = %reply.target,
                property = %reply.envelope.property,
                %error,
                "Member failed"
            ),
        }

        if reply.envelope.operation == Operation::Request {
            if let Ok(value) = &reply.result {
                self.observe(&reply.target, &reply.envelope.property, value.clone());
            }
        }

        let Some(mut batch) = self.batches.remove(&reply.batch) else {
            debug!(batch = %reply.batch, resource = %reply.target, "Reply for a closed batch");
            return;
        };
        batch.pending.remove(&reply.target);
        if let Some(callback) = batch.on_reply.as_mut() {
            callback(self, &reply);
        }
        if batch.pending.is_empty() {
            if let Some(handle) = batch.deadline {
                self.scheduler.cancel(handle);
            }
            debug!(batch = %reply.batch, group = %batch.group, "Batch complete");
        } else {
            self.batches.insert(reply.batch, batch);
        }
    }

    /// Closes a batch whose deadline passed. Every member still pending is reported to
    /// the batch's reply callback as failed; later replies are only logged.
    fn expire_batch(&mut self, id: BatchId) {
        let Some(mut batch) = self.batches.remove(&id) else {
            return;
        };
        for target in std::mem::take(&mut batch.pending) {
            warn!(group = %batch.group, resource = %target, batch = %id, "No reply before deadline");
            if let Some(callback) = batch.on_reply.as_mut() {
                let reply = MemberReply {
                    batch: id,
                    group: batch.group.clone(),
                    target,
                    envelope: batch.envelope.clone(),
                    result: Err(ControlError::Transport("no reply before deadline".into())),
                };
                callback(self, &reply);
            }
        }
    }

    // --- Events ---

    pub fn def_event(&mut self, name: &str, trigger: Trigger) {
        self.events.def_event(name, trigger);
    }

    pub fn alias_event(&mut self, alias: &str, existing: &str) -> Result<()> {
        self.events.alias_event(alias, existing)
    }

    pub fn on_event<F>(&mut self, name: &str, consume_once: bool, callback: F) -> Result<()>
    where
        F: FnMut(&mut Experiment) + Send + 'static,
    {
        self.events.on_event(name, consume_once, callback)
    }

    pub fn fire_event(&mut self, name: &str) -> Result<usize> {
        event::fire(self, name)
    }

    pub fn event_fired(&self, name: &str) -> Result<u64> {
        self.events.fired(name)
    }

    /// Records an observed property value and fires every condition event it makes true.
    pub fn observe(&mut self, resource: &ResourceId, property: &str, value: Value) {
        self.observed.record(resource, property, value);
        for index in self.events.rising_conditions(&self.observed) {
            event::fire_record(self, index);
        }
    }

    // --- Timers ---

    pub fn after<F>(&mut self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnMut(&mut Experiment) + Send + 'static,
    {
        self.scheduler.after(delay, Box::new(callback))
    }

    pub fn every<F>(&mut self, interval: Duration, callback: F) -> TimerHandle
    where
        F: FnMut(&mut Experiment) + Send + 'static,
    {
        self.scheduler.every(interval, Box::new(callback))
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.scheduler.cancel(handle)
    }

    fn fire_timer(&mut self, handle: TimerHandle) {
        let Some(mut fired) = self.scheduler.begin(handle) else {
            return;
        };
        (fired.callback)(self);
        self.scheduler.finish(fired);
    }

    // --- Properties ---

    pub fn def_property(&mut self, name: &str, default: Value, description: Option<&str>) {
        self.properties
            .def_property(name, default, description.map(str::to_owned));
    }

    pub fn property(&self, name: &str) -> Result<&Value> {
        self.properties.value(name)
    }

    pub fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        self.properties.set(name, value)
    }

    pub fn properties(&self) -> &PropertyBook {
        &self.properties
    }

    // --- Loading ---

    /// Loads a script. Once the script is fetched, `opts` become experiment properties
    /// and then the script runs. A script that cannot be fetched leaves nothing behind.
    pub async fn load<I>(&mut self, uri: &str, opts: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let parsed = ScriptUri::parse(uri)?;
        let opts: Vec<(String, Value)> = opts.into_iter().collect();

        let failure = |reason: String| ControlError::ScriptLoadFailure {
            uri: uri.to_owned(),
            reason,
        };
        let source = self.loader.fetch(&parsed).await.map_err(failure)?;

        for (name, value) in opts {
            self.properties.def_property(&name, value.clone(), None);
            self.properties.set(&name, value)?;
        }
        info!(%uri, "Loading script");
        let outcome = match source {
            ScriptSource::Builtin(module) => module(self),
            ScriptSource::Text(text) => {
                let evaluator = self
                    .loader
                    .evaluator()
                    .ok_or_else(|| failure("no script evaluator configured".into()))?;
                evaluator.evaluate(self, uri, &text)
            }
        };
        outcome.map_err(|error| match error {
            ControlError::ScriptLoadFailure { .. } => error,
            other => failure(other.to_string()),
        })
    }

    /// Like [`load`](Self::load), but a failure is logged and skipped.
    pub async fn load_or_skip<I>(&mut self, uri: &str, opts: I) -> bool
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        match self.load(uri, opts).await {
            Ok(()) => true,
            Err(error) => {
                warn!(%uri, %error, "Script load skipped");
                false
            }
        }
    }

    // --- Loop ---

    /// Handles the next reply or timer tick.
    pub async fn step(&mut self) -> bool {
        tokio::select! {
            Some(reply) = self.replies_rx.recv() => {
                self.handle_reply(reply);
                true
            }
            Some(handle) = self.scheduler.next_due() => {
                self.fire_timer(handle);
                true
            }
            else => false,
        }
    }

    /// Runs until every dispatched member has replied.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            if !self.step().await {
                break;
            }
        }
    }

    /// Runs the loop for `duration`.
    pub async fn run_for(&mut self, duration: Duration) {
        let deadline = tokio::time::sleep_until(Instant::now() + duration);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                running = self.step() => if !running { break },
            }
        }
    }

    /// Runs the loop until the surrounding task stops polling it.
    pub async fn run(&mut self) {
        info!(experiment = %self.name, "Experiment started");
        while self.step().await {}
        info!(experiment = %self.name, "Experiment finished");
    }
}

impl EventHost for Experiment {
    fn events(&mut self) -> &mut EventEngine<Self> {
        &mut self.events
    }
}

/// A pending operation on one group.
pub struct GroupHandle<'a> {
    experiment: &'a mut Experiment,
    name: String,
    on_reply: Option<ReplyCallback>,
    deadline: Option<Duration>,
}

impl GroupHandle<'_> {
    pub fn members(&self) -> Result<Vec<ResourceId>> {
        self.experiment.groups.resolve(&self.name)
    }

    /// Called once per member reply, on the experiment loop.
    pub fn on_reply<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut Experiment, &MemberReply) + Send + 'static,
    {
        self.on_reply = Some(Box::new(callback));
        self
    }

    pub fn deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Some(timeout);
        self
    }

    /// Asks every member to run `command`.
    pub fn exec(self, command: &str) -> Result<BatchId> {
        self.send(Envelope::configure("exec", json!(command)))
    }

    pub fn configure(self, property: &str, value: Value) -> Result<BatchId> {
        self.send(Envelope::configure(property, value))
    }

    pub fn request(self, property: &str) -> Result<BatchId> {
        self.send(Envelope::request(property))
    }

    pub fn send(self, envelope: Envelope) -> Result<BatchId> {
        self.experiment
            .dispatch_group(&self.name, envelope, self.on_reply, self.deadline)
    }
}
