//! Per-field retrieval configuration.
//!
//! A `FieldSpec` is deserialized from the `[fields.<name>]` tables of the
//! configuration, validated once when the catalog is built, and re-validated
//! on every `retrieve` entry. The engine never mutates it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// Which retrieval strategy produces the ranked candidates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Separate lexical and semantic calls combined by the engine.
    #[default]
    TwoPhase,
    /// One call to an index that combines both channels itself.
    NativeHybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    #[serde(default)]
    pub field_name: String,
    #[serde(default)]
    pub lexical_query_terms: Vec<String>,
    #[serde(default)]
    pub semantic_query_text: String,
    #[serde(default)]
    pub lexical_threshold: f32,
    #[serde(default)]
    pub semantic_threshold: f32,
    #[serde(default = "default_intersection_boost")]
    pub intersection_boost: f32,
    #[serde(default)]
    pub page_boost_pages: BTreeSet<u32>,
    #[serde(default)]
    pub page_boost_amount: f32,
    #[serde(default)]
    pub adjacent_before: u32,
    #[serde(default)]
    pub adjacent_after: u32,
    #[serde(default)]
    pub max_images: usize,
    #[serde(default)]
    pub image_enabled: bool,
    #[serde(default = "default_final_top_k")]
    pub final_top_k: usize,
    /// Overrides `RetrievalConfig::strategy` for this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,
}

fn default_intersection_boost() -> f32 { 1.0 }
fn default_final_top_k() -> usize { 5 }

impl FieldSpec {
    pub fn new(field_name: &str) -> Self {
        Self {
            field_name: field_name.to_string(),
            lexical_query_terms: Vec::new(),
            semantic_query_text: String::new(),
            lexical_threshold: 0.0,
            semantic_threshold: 0.0,
            intersection_boost: default_intersection_boost(),
            page_boost_pages: BTreeSet::new(),
            page_boost_amount: 0.0,
            adjacent_before: 0,
            adjacent_after: 0,
            max_images: 0,
            image_enabled: false,
            final_top_k: default_final_top_k(),
            strategy: None,
        }
    }

    /// Combined lexical query: the terms joined in order.
    pub fn lexical_query(&self) -> String {
        self.lexical_query_terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn has_lexical_query(&self) -> bool { !self.lexical_query().is_empty() }

    pub fn has_semantic_query(&self) -> bool { !self.semantic_query_text.trim().is_empty() }

    pub fn is_boosted_page(&self, page: Option<u32>) -> bool {
        page.is_some_and(|p| self.page_boost_pages.contains(&p))
    }

    /// Fails fast on values that would otherwise be silently clamped.
    pub fn validate(&self) -> Result<()> {
        let name = &self.field_name;
        if name.trim().is_empty() {
            return Err(Error::invalid_config("field_name must not be empty"));
        }
        if self.final_top_k == 0 {
            return Err(Error::invalid_config(format!("field '{name}': final_top_k must be > 0")));
        }
        if !self.intersection_boost.is_finite() || self.intersection_boost < 1.0 {
            return Err(Error::invalid_config(format!(
                "field '{name}': intersection_boost must be >= 1.0 (got {})",
                self.intersection_boost
            )));
        }
        for (key, value) in [
            ("lexical_threshold", self.lexical_threshold),
            ("semantic_threshold", self.semantic_threshold),
            ("page_boost_amount", self.page_boost_amount),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::invalid_config(format!("field '{name}': {key} must be a finite value >= 0 (got {value})")));
            }
        }
        if !self.has_lexical_query() && !self.has_semantic_query() {
            return Err(Error::invalid_config(format!(
                "field '{name}': needs lexical_query_terms or semantic_query_text"
            )));
        }
        Ok(())
    }
}
