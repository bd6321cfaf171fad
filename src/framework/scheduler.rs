//! # Timers
//!
//! `after` and `every` timers for a single-owner event loop. The spawned tokio task only
//! posts the timer's handle back to the owner; the callback itself stays in the
//! [`Scheduler`] and runs on the owner's loop, so callbacks never execute concurrently
//! with anything else the loop does.
//!
//! Cancelling removes the entry on the loop. A tick that was already queued then finds
//! nothing to run, which is what makes cancellation exact.

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Cancellable handle returned by `after` and `every`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

struct TimerEntry<C> {
    callback: C,
    repeating: bool,
    task: JoinHandle<()>,
}

/// A timer whose callback has been taken out for execution.
pub(crate) struct Fired<C> {
    pub(crate) handle: TimerHandle,
    pub(crate) callback: C,
    repeating: bool,
    task: JoinHandle<()>,
}

pub struct Scheduler<C> {
    entries: HashMap<TimerHandle, TimerEntry<C>>,
    in_flight: HashSet<TimerHandle>,
    cancelled: HashSet<TimerHandle>,
    next_id: u64,
    sender: mpsc::UnboundedSender<TimerHandle>,
    receiver: mpsc::UnboundedReceiver<TimerHandle>,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            entries: HashMap::new(),
            in_flight: HashSet::new(),
            cancelled: HashSet::new(),
            next_id: 1,
            sender,
            receiver,
        }
    }

    /// Runs `callback` once, `delay` from now. Must be called inside a tokio runtime.
    pub fn after(&mut self, delay: Duration, callback: C) -> TimerHandle {
        let handle = self.next_handle();
        let sender = self.sender.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(handle);
        });
        self.entries.insert(
            handle,
            TimerEntry {
                callback,
                repeating: false,
                task,
            },
        );
        handle
    }

    /// Runs `callback` every `interval`, first one `interval` from now.
    pub fn every(&mut self, interval: Duration, callback: C) -> TimerHandle {
        let handle = self.next_handle();
        let sender = self.sender.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if sender.send(handle).is_err() {
                    break;
                }
            }
        });
        self.entries.insert(
            handle,
            TimerEntry {
                callback,
                repeating: true,
                task,
            },
        );
        handle
    }

    /// Cancels a timer. Returns `false` if it already completed or was never known.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        if let Some(entry) = self.entries.remove(&handle) {
            entry.task.abort();
            return true;
        }
        if self.in_flight.contains(&handle) {
            self.cancelled.insert(handle);
            return true;
        }
        false
    }

    /// Whether `handle` is still armed.
    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waits for the next tick. Ticks of cancelled timers are still delivered here and
    /// are filtered out by [`begin`](Self::begin).
    pub async fn next_due(&mut self) -> Option<TimerHandle> {
        self.receiver.recv().await
    }

    pub(crate) fn begin(&mut self, handle: TimerHandle) -> Option<Fired<C>> {
        let entry = self.entries.remove(&handle)?;
        self.in_flight.insert(handle);
        Some(Fired {
            handle,
            callback: entry.callback,
            repeating: entry.repeating,
            task: entry.task,
        })
    }

    /// Re-arms a repeating timer unless it was cancelled while its callback ran.
    pub(crate) fn finish(&mut self, fired: Fired<C>) {
        self.in_flight.remove(&fired.handle);
        let cancelled = self.cancelled.remove(&fired.handle);
        if fired.repeating && !cancelled {
            self.entries.insert(
                fired.handle,
                TimerEntry {
                    callback: fired.callback,
                    repeating: true,
                    task: fired.task,
                },
            );
        } else {
            fired.task.abort();
        }
    }

    /// Drops a taken timer for good.
    pub(crate) fn discard(&mut self, fired: Fired<C>) {
        self.in_flight.remove(&fired.handle);
        self.cancelled.remove(&fired.handle);
        fired.task.abort();
    }

    fn next_handle(&mut self) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        handle
    }
}

impl<C> Drop for Scheduler<C> {
    fn drop(&mut self) {
        for entry in self.entries.values() {
            entry.task.abort();
        }
    }
}
