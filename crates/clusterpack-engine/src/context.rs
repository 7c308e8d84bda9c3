//! Resolved template context
//!
//! A flat, ordered map from setter name to its resolved value. Built once
//! per package after overrides are applied and read-only while rendering.

use std::collections::BTreeMap;

use clusterpack_core::{Kptfile, SetterDefinition};
use indexmap::IndexMap;

use crate::error::Result;
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    values: IndexMap<String, Value>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context from already-read setters; later setters win on name clashes
    pub fn from_setters(setters: &[SetterDefinition]) -> Self {
        let values = setters
            .iter()
            .map(|setter| (setter.name.clone(), Value::from(&setter.value)))
            .collect();
        Self { values }
    }

    /// Context from every setter declared in a manifest
    pub fn from_kptfile(kptfile: &Kptfile) -> Result<Self> {
        Ok(Self::from_setters(&kptfile.list_setters()?))
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Merge another context over this one
    pub fn extend(&mut self, other: TemplateContext) {
        self.values.extend(other.values);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The context as a template map, exposed to templates as `.Values`
    pub fn to_value(&self) -> Value {
        Value::Map(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        )
    }
}
