//! Query answers: concept maps, groups and aggregate values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::concept::Concept;

/// One answer to a match query: variable name to concept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptMap {
    pub map: HashMap<String, Concept>,
}

impl ConceptMap {
    pub fn get(&self, variable: &str) -> Option<&Concept> {
        self.map.get(variable)
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.map.values()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl FromIterator<(String, Concept)> for ConceptMap {
    fn from_iter<I: IntoIterator<Item = (String, Concept)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

/// Result of an aggregate query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Numeric {
    Long(i64),
    Double(f64),
    /// Aggregate over an empty answer set.
    NaN,
}

impl Numeric {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Long(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(value) => Some(*value),
            Self::Long(value) => Some(*value as f64),
            Self::NaN => None,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Self::NaN)
    }
}

/// Answers of a `match ... group` query sharing one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMapGroup {
    pub owner: Concept,
    pub concept_maps: Vec<ConceptMap>,
}

/// Aggregate of one group of a `match ... group ... aggregate` query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericGroup {
    pub owner: Concept,
    pub numeric: Numeric,
}

/// A rule definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub label: String,
    pub when: String,
    pub then: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Numeric::Long(3).as_i64(), Some(3));
        assert_eq!(Numeric::Long(3).as_f64(), Some(3.0));
        assert_eq!(Numeric::Double(1.5).as_i64(), None);
        assert!(Numeric::NaN.is_nan());
        assert_eq!(Numeric::NaN.as_f64(), None);
    }

    #[test]
    fn test_concept_map_lookup() {
        let map: ConceptMap = [("x".to_string(), Concept::RootThingType)]
            .into_iter()
            .collect();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("x"), Some(&Concept::RootThingType));
        assert!(map.get("y").is_none());
        assert_eq!(map.variables().collect::<Vec<_>>(), vec!["x"]);
    }
}
