//! Keyed tables of overridable entries.
//!
//! Handlers, hooks and work routines all share one override rule: installing under an
//! occupied key replaces the entry, unless the key was first `extend`ed, in which case
//! the displaced entry becomes the new entry's base.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

pub(crate) struct ChainTable<K, E> {
    entries: HashMap<K, Arc<E>>,
    pending: HashMap<K, Option<Arc<E>>>,
}

impl<K, E> Default for ChainTable<K, E> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            pending: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone + Debug, E> ChainTable<K, E> {
    /// Installs a new entry. `build` receives the base captured by a preceding
    /// [`extend`](Self::extend) for the same key, or `None`.
    pub(crate) fn install(&mut self, key: K, build: impl FnOnce(Option<Arc<E>>) -> E) {
        let base = self.pending.remove(&key).flatten();
        if base.is_none() && self.entries.contains_key(&key) {
            debug!(?key, "Replacing entry");
        }
        let entry = Arc::new(build(base));
        self.entries.insert(key, entry);
    }

    /// Captures the entry currently under `key` (or `fallback` when there is none) as
    /// the base for the next install. The current entry stays active until then.
    pub(crate) fn extend(&mut self, key: K, fallback: Option<Arc<E>>) {
        let current = self.entries.get(&key).cloned().or(fallback);
        self.pending.insert(key, current);
    }

    pub(crate) fn get(&self, key: &K) -> Option<&Arc<E>> {
        self.entries.get(key)
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Entry {
        label: &'static str,
        base: Option<Arc<Entry>>,
    }

    fn labels(entry: &Entry) -> Vec<&'static str> {
        let mut out = vec![entry.label];
        let mut next = entry.base.as_deref();
        while let Some(e) = next {
            out.push(e.label);
            next = e.base.as_deref();
        }
        out
    }

    #[test]
    fn install_without_extend_replaces() {
        let mut table = ChainTable::<&str, Entry>::default();
        table.install("x", |base| Entry { label: "first", base });
        table.install("x", |base| Entry { label: "second", base });
        assert_eq!(labels(table.get(&"x").unwrap()), vec!["second"]);
    }

    #[test]
    fn extend_chains_previous_entry() {
        let mut table = ChainTable::<&str, Entry>::default();
        table.install("x", |base| Entry { label: "first", base });
        table.extend("x", None);
        table.install("x", |base| Entry { label: "second", base });
        table.extend("x", None);
        table.install("x", |base| Entry { label: "third", base });
        assert_eq!(labels(table.get(&"x").unwrap()), vec!["third", "second", "first"]);
    }

    #[test]
    fn extend_keeps_current_entry_until_install() {
        let mut table = ChainTable::<&str, Entry>::default();
        table.install("x", |base| Entry { label: "first", base });
        table.extend("x", None);
        assert_eq!(table.get(&"x").unwrap().label, "first");
    }

    #[test]
    fn extend_on_empty_key_uses_fallback() {
        let mut table = ChainTable::<&str, Entry>::default();
        let fallback = Arc::new(Entry { label: "default", base: None });
        table.extend("x", Some(fallback));
        table.install("x", |base| Entry { label: "custom", base });
        assert_eq!(labels(table.get(&"x").unwrap()), vec!["custom", "default"]);

        table.extend("y", None);
        table.install("y", |base| Entry { label: "lonely", base });
        assert!(table.get(&"y").unwrap().base.is_none());
    }
}
