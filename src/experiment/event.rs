//! # Events
//!
//! Named, triggerable events with aliases and one-shot or persistent callbacks.
//!
//! The engine keeps the bookkeeping only. Callbacks take the *host* (the experiment that
//! owns the engine) mutably, so firing goes through the free function [`fire`], which
//! lifts the armed callbacks out of the engine, runs them against the host in
//! registration order, and puts the persistent ones back.

use crate::framework::{ControlError, PropertyStore, ResourceId, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

pub type ConditionFn = dyn Fn(&ObservedState) -> bool + Send + Sync;

/// How an event fires.
pub enum Trigger {
    /// Only through an explicit `fire_event`.
    Manual,
    /// Whenever the predicate over observed state turns from false to true.
    Condition(Box<ConditionFn>),
}

impl Trigger {
    pub fn condition<F>(predicate: F) -> Self
    where
        F: Fn(&ObservedState) -> bool + Send + Sync + 'static,
    {
        Self::Condition(Box::new(predicate))
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("Manual"),
            Self::Condition(_) => f.write_str("Condition(..)"),
        }
    }
}

/// Last reported property values per resource, fed by request replies.
#[derive(Debug, Clone, Default)]
pub struct ObservedState {
    resources: HashMap<ResourceId, PropertyStore>,
}

impl ObservedState {
    pub fn record(&mut self, resource: &ResourceId, property: &str, value: Value) {
        self.resources
            .entry(resource.clone())
            .or_default()
            .insert(property.to_owned(), value);
    }

    pub fn get(&self, resource: &str, property: &str) -> Option<&Value> {
        self.resources.get(resource)?.get(property)
    }

    pub fn get_f64(&self, resource: &str, property: &str) -> Option<f64> {
        self.get(resource, property).and_then(Value::as_f64)
    }

    pub fn resource(&self, resource: &str) -> Option<&PropertyStore> {
        self.resources.get(resource)
    }
}

pub type EventCallback<C> = Box<dyn FnMut(&mut C) + Send>;

struct Subscription<C> {
    seq: u64,
    once: bool,
    callback: EventCallback<C>,
}

struct EventRecord<C> {
    name: String,
    trigger: Trigger,
    subscriptions: Vec<Subscription<C>>,
    fired: u64,
    condition_held: bool,
}

pub struct EventEngine<C> {
    records: Vec<EventRecord<C>>,
    keys: HashMap<String, usize>,
    next_seq: u64,
}

impl<C> Default for EventEngine<C> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            keys: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<C> EventEngine<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an event. Redefining an existing name (or alias) replaces its trigger
    /// and keeps its callbacks.
    pub fn def_event(&mut self, name: &str, trigger: Trigger) {
        match self.keys.get(name) {
            Some(&index) => {
                let record = &mut self.records[index];
                debug!(event = name, ?trigger, "Redefined event");
                record.trigger = trigger;
                record.condition_held = false;
            }
            None => {
                debug!(event = name, ?trigger, "Defined event");
                self.keys.insert(name.to_owned(), self.records.len());
                self.records.push(EventRecord {
                    name: name.to_owned(),
                    trigger,
                    subscriptions: Vec::new(),
                    fired: 0,
                    condition_held: false,
                });
            }
        }
    }

    /// Makes `alias` another key for the record behind `existing`. A name that already
    /// keys a different record is refused.
    pub fn alias_event(&mut self, alias: &str, existing: &str) -> Result<()> {
        let index = self.index(existing)?;
        if let Some(&taken) = self.keys.get(alias) {
            if taken != index {
                return Err(ControlError::EventNameTaken {
                    alias: alias.to_owned(),
                    event: self.records[taken].name.clone(),
                });
            }
        }
        debug!(alias, event = %self.records[index].name, "Aliased event");
        self.keys.insert(alias.to_owned(), index);
        Ok(())
    }

    pub fn on_event<F>(&mut self, name: &str, consume_once: bool, callback: F) -> Result<()>
    where
        F: FnMut(&mut C) + Send + 'static,
    {
        let index = self.index(name)?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.records[index].subscriptions.push(Subscription {
            seq,
            once: consume_once,
            callback: Box::new(callback),
        });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.keys.contains_key(name)
    }

    /// The primary name behind `name`, which may be an alias.
    pub fn canonical(&self, name: &str) -> Result<&str> {
        Ok(&self.records[self.index(name)?].name)
    }

    /// How many times the event has fired.
    pub fn fired(&self, name: &str) -> Result<u64> {
        Ok(self.records[self.index(name)?].fired)
    }

    /// Callbacks still armed on the event.
    pub fn armed(&self, name: &str) -> Result<usize> {
        Ok(self.records[self.index(name)?].subscriptions.len())
    }

    /// Re-evaluates condition triggers and returns the records whose condition just
    /// became true.
    pub(crate) fn rising_conditions(&mut self, observed: &ObservedState) -> Vec<usize> {
        let mut rising = Vec::new();
        for (index, record) in self.records.iter_mut().enumerate() {
            let Trigger::Condition(predicate) = &record.trigger else {
                continue;
            };
            let holds = predicate(observed);
            if holds && !record.condition_held {
                rising.push(index);
            }
            record.condition_held = holds;
        }
        rising
    }

    fn index(&self, name: &str) -> Result<usize> {
        self.keys
            .get(name)
            .copied()
            .ok_or_else(|| ControlError::EventNotFound(name.to_owned()))
    }

    fn take_armed(&mut self, index: usize) -> Vec<Subscription<C>> {
        let record = &mut self.records[index];
        record.fired += 1;
        std::mem::take(&mut record.subscriptions)
    }

    /// Puts surviving callbacks back ahead of any registered while they ran.
    fn rearm(&mut self, index: usize, mut kept: Vec<Subscription<C>>) {
        let record = &mut self.records[index];
        kept.append(&mut record.subscriptions);
        kept.sort_by_key(|s| s.seq);
        record.subscriptions = kept;
    }
}

/// Implemented by whatever owns an [`EventEngine`] and is handed to its callbacks.
pub trait EventHost: Sized {
    fn events(&mut self) -> &mut EventEngine<Self>;
}

/// Fires `name` (or the event it aliases). Every armed callback runs once, in
/// registration order; consume-once callbacks are dropped afterwards. Returns how many
/// callbacks ran.
pub fn fire<C: EventHost>(host: &mut C, name: &str) -> Result<usize> {
    let index = host.events().index(name)?;
    Ok(fire_record(host, index))
}

/// Fires the record at `index` directly, as condition events do.
pub(crate) fn fire_record<C: EventHost>(host: &mut C, index: usize) -> usize {
    let mut armed = host.events().take_armed(index);
    let ran = armed.len();
    info!(event = %host.events().records[index].name, callbacks = ran, "Event fired");

    for subscription in &mut armed {
        (subscription.callback)(host);
    }
    armed.retain(|s| !s.once);
    host.events().rearm(index, armed);
    ran
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Host {
        events: EventEngine<Host>,
        log: Vec<&'static str>,
    }

    impl EventHost for Host {
        fn events(&mut self) -> &mut EventEngine<Self> {
            &mut self.events
        }
    }

    #[test]
    fn consume_once_runs_exactly_once() {
        let mut host = Host::default();
        host.events.def_event("E", Trigger::Manual);
        host.events
            .on_event("E", true, |h: &mut Host| h.log.push("once"))
            .unwrap();

        fire(&mut host, "E").unwrap();
        fire(&mut host, "E").unwrap();
        assert_eq!(host.log, vec!["once"]);
        assert_eq!(host.events.fired("E").unwrap(), 2);
    }

    #[test]
    fn persistent_callbacks_keep_order() {
        let mut host = Host::default();
        host.events.def_event("E", Trigger::Manual);
        host.events.on_event("E", false, |h: &mut Host| h.log.push("a")).unwrap();
        host.events.on_event("E", true, |h: &mut Host| h.log.push("b")).unwrap();
        host.events.on_event("E", false, |h: &mut Host| h.log.push("c")).unwrap();

        assert_eq!(fire(&mut host, "E").unwrap(), 3);
        assert_eq!(fire(&mut host, "E").unwrap(), 2);
        assert_eq!(host.log, vec!["a", "b", "c", "a", "c"]);
    }

    #[test]
    fn alias_fires_the_shared_record() {
        let mut host = Host::default();
        host.events.def_event("ENGINE_OVERHEAT", Trigger::Manual);
        host.events.alias_event("HOT", "ENGINE_OVERHEAT").unwrap();
        host.events.on_event("HOT", false, |h: &mut Host| h.log.push("cool down")).unwrap();

        fire(&mut host, "ENGINE_OVERHEAT").unwrap();
        fire(&mut host, "HOT").unwrap();
        assert_eq!(host.log, vec!["cool down", "cool down"]);
        assert_eq!(host.events.fired("HOT").unwrap(), 2);
        assert_eq!(host.events.canonical("HOT").unwrap(), "ENGINE_OVERHEAT");
    }

    #[test]
    fn alias_cannot_take_another_events_name() {
        let mut host = Host::default();
        host.events.def_event("HOT", Trigger::Manual);
        host.events.def_event("COLD", Trigger::Manual);
        host.events.on_event("HOT", false, |h: &mut Host| h.log.push("hot")).unwrap();

        assert_eq!(
            host.events.alias_event("HOT", "COLD").unwrap_err(),
            ControlError::EventNameTaken {
                alias: "HOT".into(),
                event: "HOT".into(),
            }
        );
        fire(&mut host, "HOT").unwrap();
        assert_eq!(host.log, vec!["hot"]);
        assert_eq!(host.events.fired("COLD").unwrap(), 0);

        // Re-aliasing within the same record is harmless
        host.events.alias_event("WARM", "HOT").unwrap();
        host.events.alias_event("WARM", "HOT").unwrap();
        assert_eq!(host.events.canonical("WARM").unwrap(), "HOT");
    }

    #[test]
    fn undefined_event_fails() {
        let mut host = Host::default();
        assert_eq!(
            host.events.alias_event("x", "missing").unwrap_err(),
            ControlError::EventNotFound("missing".into())
        );
        assert!(host.events.on_event("missing", true, |_: &mut Host| {}).is_err());
        assert!(fire(&mut host, "missing").is_err());
    }

    #[test]
    fn callback_registered_while_firing_waits_for_next_fire() {
        let mut host = Host::default();
        host.events.def_event("E", Trigger::Manual);
        host.events
            .on_event("E", true, |h: &mut Host| {
                h.log.push("first");
                h.events
                    .on_event("E", true, |h: &mut Host| h.log.push("second"))
                    .unwrap();
            })
            .unwrap();

        fire(&mut host, "E").unwrap();
        assert_eq!(host.log, vec!["first"]);
        fire(&mut host, "E").unwrap();
        assert_eq!(host.log, vec!["first", "second"]);
    }

    #[test]
    fn conditions_report_rising_edges_only() {
        let mut events = EventEngine::<Host>::new();
        events.def_event(
            "FAST",
            Trigger::condition(|obs| obs.get_f64("e1", "rpm").is_some_and(|rpm| rpm > 5000.0)),
        );
        let mut observed = ObservedState::default();
        let e1 = ResourceId::from("e1");

        observed.record(&e1, "rpm", json!(1000.0));
        assert!(events.rising_conditions(&observed).is_empty());
        observed.record(&e1, "rpm", json!(5750.0));
        assert_eq!(events.rising_conditions(&observed), vec![0]);
        observed.record(&e1, "rpm", json!(6000.0));
        assert!(events.rising_conditions(&observed).is_empty());
        observed.record(&e1, "rpm", json!(0.0));
        observed.record(&e1, "rpm", json!(9000.0));
        assert!(events.rising_conditions(&observed).is_empty());
    }
}
