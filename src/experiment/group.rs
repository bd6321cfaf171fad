//! # Groups
//!
//! Named collections of resource references. A member is either a resource id or the
//! name of another group, and is stored as written: nested groups are only expanded
//! when a group is resolved, so a group may mention one that is defined later.

use crate::framework::{ControlError, ResourceId, Result};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Default)]
pub struct GroupCoordinator {
    groups: BTreeMap<String, Vec<String>>,
}

impl GroupCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines (or redefines) a group. Repeated members are kept once.
    pub fn def_group<I, S>(&mut self, name: &str, members: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Vec::new();
        push_unique(&mut list, members);
        debug!(group = name, members = ?list, "Defined group");
        self.groups.insert(name.to_owned(), list);
        self
    }

    /// Appends members to an existing group.
    pub fn add_members<I, S>(&mut self, name: &str, members: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = self
            .groups
            .get_mut(name)
            .ok_or_else(|| ControlError::GroupNotFound(name.to_owned()))?;
        push_unique(list, members);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    /// Members as written, unresolved.
    pub fn members(&self, name: &str) -> Result<&[String]> {
        self.groups
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ControlError::GroupNotFound(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Flattens a group into distinct resource ids, in first-seen order.
    pub fn resolve(&self, name: &str) -> Result<Vec<ResourceId>> {
        let mut resolved = Vec::new();
        let mut seen = HashSet::new();
        self.expand(name, &mut Vec::new(), &mut seen, &mut resolved)?;
        Ok(resolved)
    }

    /// Every resource referenced by any group, each once.
    pub fn all_groups(&self) -> Result<Vec<ResourceId>> {
        let mut resolved = Vec::new();
        let mut seen = HashSet::new();
        for name in self.groups.keys() {
            self.expand(name, &mut Vec::new(), &mut seen, &mut resolved)?;
        }
        Ok(resolved)
    }

    fn expand<'a>(
        &'a self,
        name: &'a str,
        path: &mut Vec<&'a str>,
        seen: &mut HashSet<ResourceId>,
        resolved: &mut Vec<ResourceId>,
    ) -> Result<()> {
        if path.contains(&name) {
            return Err(ControlError::CyclicGroupReference(name.to_owned()));
        }
        let members = self
            .groups
            .get(name)
            .ok_or_else(|| ControlError::GroupNotFound(name.to_owned()))?;

        path.push(name);
        for member in members {
            if self.groups.contains_key(member) {
                self.expand(member, path, seen, resolved)?;
            } else {
                let id = ResourceId::from(member.as_str());
                if seen.insert(id.clone()) {
                    resolved.push(id);
                }
            }
        }
        path.pop();
        Ok(())
    }
}

fn push_unique<I, S>(list: &mut Vec<String>, members: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for member in members {
        let member = member.into();
        if !list.contains(&member) {
            list.push(member);
        }
    }
}
