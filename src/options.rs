//! Conversion policy.
//!
//! Plain booleans and name sets, deserializable from JSON so that hosts can
//! pass them across the FFI boundary. Every field defaults to "off".

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::PopulateError;

/// Options controlling how the populator resolves the MXSR tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulateOptions {
    pub delay_rests: DelayRestsOptions,
    pub ignore: IgnoreOptions,
    pub parts: PartsFilter,
}

/// Decorations that may be held across a rest and attached to the next
/// non-rest note instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayRestsOptions {
    pub dynamics: bool,
    pub words: bool,
    pub beams: bool,
    pub slurs: bool,
    pub ligatures: bool,
    pub pedals: bool,
    pub slashes: bool,
    pub wedges: bool,
}

/// Markup categories dropped altogether.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreOptions {
    pub slurs: bool,
    pub ties: bool,
    pub dynamics: bool,
    pub words: bool,
    pub ornaments: bool,
    pub articulations: bool,
    pub wedges: bool,
    pub lyrics: bool,
    pub harmonies: bool,
    pub figured_basses: bool,
}

/// Parts to keep or drop once the score is fully populated.
///
/// When a keep set is non-empty only the parts it names survive; the ignore
/// sets are applied afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartsFilter {
    pub keep_ids: BTreeSet<String>,
    pub ignore_ids: BTreeSet<String>,
    pub keep_names: BTreeSet<String>,
    pub ignore_names: BTreeSet<String>,
}

impl PopulateOptions {
    /// Parse options from a JSON object. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, PopulateError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl PartsFilter {
    pub fn is_empty(&self) -> bool {
        self.keep_ids.is_empty()
            && self.ignore_ids.is_empty()
            && self.keep_names.is_empty()
            && self.ignore_names.is_empty()
    }

    /// Whether a part with this id and name survives the filter.
    pub fn keeps(&self, id: &str, name: &str) -> bool {
        let kept = (self.keep_ids.is_empty() && self.keep_names.is_empty())
            || self.keep_ids.contains(id)
            || self.keep_names.contains(name);
        kept && !self.ignore_ids.contains(id) && !self.ignore_names.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_off() {
        let opts = PopulateOptions::from_json(r#"{ "delay_rests": { "slurs": true } }"#).unwrap();
        assert!(opts.delay_rests.slurs);
        assert!(!opts.delay_rests.dynamics);
        assert!(!opts.ignore.ties);
        assert!(opts.parts.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(PopulateOptions::from_json("{ not json").is_err());
    }

    #[test]
    fn parts_filter_keep_then_ignore() {
        let mut filter = PartsFilter::default();
        assert!(filter.keeps("P1", "Flute"));

        filter.keep_ids.insert("P1".to_string());
        filter.keep_names.insert("Cello".to_string());
        assert!(filter.keeps("P1", "Flute"));
        assert!(filter.keeps("P3", "Cello"));
        assert!(!filter.keeps("P2", "Oboe"));

        filter.ignore_names.insert("Flute".to_string());
        assert!(!filter.keeps("P1", "Flute"));
    }
}
