use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::coerce::{is_truthy, to_number, to_text};
use crate::forms::FormData;

pub const MAX_LOAN_FROM_INCOME: &str = "maxLoanFromIncome";
pub const LOAN_AMOUNT_WITH_FEES: &str = "loanAmountWithFees";
pub const FULL_NAME: &str = "fullName";

/// Registry lookup plus the fields the formula is allowed to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedValue {
    pub formula: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl DerivedValue {
    pub fn new<I, S>(formula: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            formula: formula.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
        }
    }
}

/// Projection of the form restricted to a formula's declared dependencies.
pub struct FormulaInputs<'a> {
    values: BTreeMap<&'a str, &'a Value>,
}

impl<'a> FormulaInputs<'a> {
    fn project(data: &'a FormData, dependencies: &'a [String]) -> Self {
        let values = dependencies
            .iter()
            .filter_map(|name| data.get(name).map(|value| (name.as_str(), value)))
            .collect();
        Self { values }
    }

    fn raw(&self, name: &str) -> Option<&'a Value> {
        self.values.get(name).copied()
    }

    /// Falsy or undeclared inputs count as zero.
    pub fn number(&self, name: &str) -> f64 {
        let value = self.raw(name);
        if is_truthy(value) {
            to_number(value)
        } else {
            0.0
        }
    }

    /// Falsy or undeclared inputs count as the empty string.
    pub fn text(&self, name: &str) -> String {
        let value = self.raw(name);
        if is_truthy(value) {
            to_text(value)
        } else {
            String::new()
        }
    }
}

pub type Formula = fn(&FormulaInputs<'_>) -> Option<Value>;

/// Closed set of derived-value formulas keyed by identifier.
#[derive(Clone, Default)]
pub struct FormulaRegistry {
    formulas: BTreeMap<String, Formula>,
}

impl fmt::Debug for FormulaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.formulas.keys()).finish()
    }
}

impl FormulaRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(MAX_LOAN_FROM_INCOME, max_loan_from_income);
        registry.register(LOAN_AMOUNT_WITH_FEES, loan_amount_with_fees);
        registry.register(FULL_NAME, full_name);
        registry
    }

    /// Adds or replaces an entry, returning the formula it displaced.
    pub fn register(&mut self, id: impl Into<String>, formula: Formula) -> Option<Formula> {
        self.formulas.insert(id.into(), formula)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.formulas.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.formulas.keys().map(String::as_str)
    }

    pub fn compute(&self, derived: &DerivedValue, data: &FormData) -> Option<Value> {
        let Some(formula) = self.formulas.get(&derived.formula) else {
            warn!(formula = %derived.formula, "unknown derived-value formula yields no value");
            return None;
        };

        let inputs = FormulaInputs::project(data, &derived.dependencies);
        formula(&inputs)
    }
}

fn number_value(result: f64) -> Option<Value> {
    serde_json::Number::from_f64(result).map(Value::Number)
}

fn max_loan_from_income(inputs: &FormulaInputs<'_>) -> Option<Value> {
    number_value(inputs.number("income") * 0.5)
}

fn loan_amount_with_fees(inputs: &FormulaInputs<'_>) -> Option<Value> {
    number_value(inputs.number("loanAmount") * 1.1)
}

fn full_name(inputs: &FormulaInputs<'_>) -> Option<Value> {
    Some(Value::String(format!(
        "{} {}",
        inputs.text("firstName"),
        inputs.text("lastName")
    )))
}
