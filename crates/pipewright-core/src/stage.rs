//! Stage kinds and configured property values

use crate::column::InputRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three kinds of stages a pipeline is assembled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Categorizes records into a finite set of outcomes
    Filter,

    /// Produces new (virtual) columns
    Transformer,

    /// Consumes columns and produces a result
    Analyzer,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Transformer => "transformer",
            Self::Analyzer => "analyzer",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value configured for one property slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    /// Column slot binding (single-valued slots hold exactly one entry)
    Columns(Vec<InputRef>),

    /// Literal, enum or array property
    Value(serde_json::Value),
}

impl PropertyValue {
    /// Whether the value counts as "set" for required-slot checks
    pub fn is_set(&self) -> bool {
        match self {
            Self::Columns(inputs) => !inputs.is_empty(),
            Self::Value(serde_json::Value::Null) => false,
            Self::Value(serde_json::Value::Array(items)) => !items.is_empty(),
            Self::Value(_) => true,
        }
    }

    pub fn as_columns(&self) -> Option<&[InputRef]> {
        match self {
            Self::Columns(inputs) => Some(inputs),
            Self::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Columns(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ColumnId;
    use serde_json::json;

    #[test]
    fn empty_values_are_not_set() {
        assert!(!PropertyValue::Columns(vec![]).is_set());
        assert!(!PropertyValue::Value(json!(null)).is_set());
        assert!(!PropertyValue::Value(json!([])).is_set());
        assert!(PropertyValue::Value(json!(false)).is_set());
        assert!(PropertyValue::Columns(vec![ColumnId::new(1).into()]).is_set());
    }

    #[test]
    fn stage_kind_display() {
        assert_eq!(StageKind::Transformer.to_string(), "transformer");
    }
}
