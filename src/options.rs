//! Mapping options.
//!
//! Options are plain data: they deserialize through serde and can themselves
//! be constructed from an element graph, so they can live in the very
//! configuration they govern.
use serde::{Deserialize, Serialize};

use crate::descriptor::Mapped;
use crate::recipe::Recipe;

// ------------------------------- Policy ---------------------------------- //

/// Nesting bound for construction and decomposition.
pub const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Bind node entries to component names when a recipe declares them.
    pub match_by_name: bool,
    /// Check each bound sub-element against its component's kind.
    pub match_by_kind: bool,
    /// Refuse to bind a node positionally.
    pub strict_names: bool,
    pub max_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            match_by_name: true,
            match_by_kind: true,
            strict_names: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Mapped for Options {
    fn recipes() -> Vec<Recipe> {
        let Options {
            match_by_name,
            match_by_kind,
            strict_names,
            max_depth,
        } = Options::default();
        vec![
            Recipe::structural::<Self>()
                .field_or(
                    "match_by_name",
                    |o: &Self| o.match_by_name,
                    |o, v| o.match_by_name = v,
                    move || match_by_name,
                )
                .field_or(
                    "match_by_kind",
                    |o: &Self| o.match_by_kind,
                    |o, v| o.match_by_kind = v,
                    move || match_by_kind,
                )
                .field_or(
                    "strict_names",
                    |o: &Self| o.strict_names,
                    |o, v| o.strict_names = v,
                    move || strict_names,
                )
                .field_or(
                    "max_depth",
                    |o: &Self| o.max_depth,
                    |o, v| o.max_depth = v,
                    move || max_depth,
                )
                .build(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_take_defaults() {
        let options: Options = serde_json::from_value(json!({"strict_names": true})).unwrap();
        assert!(options.strict_names);
        assert!(options.match_by_name);
        assert_eq!(options.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn options_construct_from_elements() {
        let element = crate::Element::from(json!({"max_depth": 8, "match_by_kind": false}));
        let options: Options = crate::construct(&element).unwrap();
        assert_eq!(options.max_depth, 8);
        assert!(!options.match_by_kind);
        assert!(!options.strict_names);
        let back = crate::decompose(&options).unwrap();
        assert_eq!(back, crate::Element::from(json!({
            "match_by_name": true,
            "match_by_kind": false,
            "strict_names": false,
            "max_depth": 8
        })));
    }
}
