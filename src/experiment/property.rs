//! Experiment properties: named values scoped to the running script, not to a resource.

use crate::framework::{ControlError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentProperty {
    pub name: String,
    pub value: Value,
    pub default: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PropertyBook {
    properties: BTreeMap<String, ExperimentProperty>,
}

impl PropertyBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a property. A property that already exists keeps its current value; only
    /// its default and description are updated.
    pub fn def_property(&mut self, name: &str, default: Value, description: Option<String>) {
        match self.properties.get_mut(name) {
            Some(existing) => {
                existing.default = default;
                if description.is_some() {
                    existing.description = description;
                }
            }
            None => {
                debug!(property = name, %default, "Defined experiment property");
                self.properties.insert(
                    name.to_owned(),
                    ExperimentProperty {
                        name: name.to_owned(),
                        value: default.clone(),
                        default,
                        description,
                    },
                );
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<&ExperimentProperty> {
        self.properties
            .get(name)
            .ok_or_else(|| ControlError::PropertyNotFound(name.to_owned()))
    }

    pub fn value(&self, name: &str) -> Result<&Value> {
        self.get(name).map(|p| &p.value)
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let property = self
            .properties
            .get_mut(name)
            .ok_or_else(|| ControlError::PropertyNotFound(name.to_owned()))?;
        debug!(property = name, %value, "Set experiment property");
        property.value = value;
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExperimentProperty> {
        self.properties.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redefinition_keeps_the_current_value() {
        let mut book = PropertyBook::new();
        book.def_property("duration", json!(30), Some("Run time in seconds".into()));
        book.set("duration", json!(60)).unwrap();
        book.def_property("duration", json!(10), None);

        let property = book.get("duration").unwrap();
        assert_eq!(property.value, json!(60));
        assert_eq!(property.default, json!(10));
        assert_eq!(property.description.as_deref(), Some("Run time in seconds"));
    }

    #[test]
    fn unknown_property_fails() {
        let mut book = PropertyBook::new();
        assert_eq!(
            book.value("missing").unwrap_err(),
            ControlError::PropertyNotFound("missing".into())
        );
        assert!(book.set("missing", json!(1)).is_err());
    }
}
