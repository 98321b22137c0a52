//! Validated set of `FieldSpec`s, keyed by field name.

use std::collections::BTreeMap;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::field_spec::FieldSpec;

#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    specs: BTreeMap<String, FieldSpec>,
}

impl FieldCatalog {
    /// Build from the `[fields.<name>]` tables. A missing section is an empty catalog.
    pub fn from_config(config: &Config) -> Result<Self> {
        if !config.figment().contains("fields") {
            return Ok(Self::default());
        }
        let raw: BTreeMap<String, FieldSpec> = config.get("fields")?;
        Self::from_specs(raw)
    }

    pub fn from_specs(raw: BTreeMap<String, FieldSpec>) -> Result<Self> {
        let mut specs = BTreeMap::new();
        for (name, mut spec) in raw {
            if spec.field_name.is_empty() {
                spec.field_name.clone_from(&name);
            } else if spec.field_name != name {
                return Err(Error::invalid_config(format!(
                    "fields.{name}: field_name '{}' does not match its key",
                    spec.field_name
                )));
            }
            spec.validate()?;
            specs.insert(name, spec);
        }
        debug!(fields = specs.len(), "field catalog loaded");
        Ok(Self { specs })
    }

    pub fn get(&self, field_name: &str) -> Result<&FieldSpec> {
        self.specs
            .get(field_name)
            .ok_or_else(|| Error::NotFound(format!("field '{field_name}' is not configured")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> { self.specs.keys().map(String::as_str) }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> { self.specs.values() }

    pub fn len(&self) -> usize { self.specs.len() }

    pub fn is_empty(&self) -> bool { self.specs.is_empty() }
}
