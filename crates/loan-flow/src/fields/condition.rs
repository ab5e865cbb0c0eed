use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use super::coerce::{is_present, strict_equals, to_number, to_text};
use crate::forms::FormData;

/// Comparison applied by a [`Condition`]. Operators outside the known set are kept
/// verbatim so a malformed rule can be reported instead of rejected at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    Exists,
    Unknown(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "notEquals",
            Operator::GreaterThan => "greaterThan",
            Operator::LessThan => "lessThan",
            Operator::Contains => "contains",
            Operator::Exists => "exists",
            Operator::Unknown(raw) => raw,
        }
    }
}

impl From<String> for Operator {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "equals" => Operator::Equals,
            "notEquals" => Operator::NotEquals,
            "greaterThan" => Operator::GreaterThan,
            "lessThan" => Operator::LessThan,
            "contains" => Operator::Contains,
            "exists" => Operator::Exists,
            _ => Operator::Unknown(raw),
        }
    }
}

impl From<Operator> for String {
    fn from(operator: Operator) -> Self {
        operator.as_str().to_string()
    }
}

/// A single declarative rule evaluated against one field of the form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    /// `Some(Value::Null)` and `None` are distinct: an explicit `null` is a value.
    #[serde(
        default,
        deserialize_with = "explicit_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
}

fn explicit_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: Option<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Equals, Some(value.into()))
    }

    pub fn not_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::NotEquals, Some(value.into()))
    }

    pub fn greater_than(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::GreaterThan, Some(value.into()))
    }

    pub fn less_than(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::LessThan, Some(value.into()))
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Contains, Some(value.into()))
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::new(field, Operator::Exists, None)
    }

    pub fn holds(&self, data: &FormData) -> bool {
        let actual = data.get(&self.field);
        let expected = self.value.as_ref();

        match &self.operator {
            Operator::Equals => strict_equals(actual, expected),
            Operator::NotEquals => !strict_equals(actual, expected),
            Operator::GreaterThan => to_number(actual) > to_number(expected),
            Operator::LessThan => to_number(actual) < to_number(expected),
            Operator::Contains => match actual {
                Some(Value::String(text)) => text
                    .to_lowercase()
                    .contains(&to_text(expected).to_lowercase()),
                _ => false,
            },
            Operator::Exists => is_present(actual),
            Operator::Unknown(raw) => {
                // Fails open so a malformed rule never blocks the form.
                warn!(
                    field = %self.field,
                    operator = %raw,
                    "unknown condition operator treated as satisfied"
                );
                true
            }
        }
    }
}

/// Conjunction of every condition; an empty rule set is satisfied.
pub fn evaluate(conditions: &[Condition], data: &FormData) -> bool {
    conditions.iter().all(|condition| condition.holds(data))
}
