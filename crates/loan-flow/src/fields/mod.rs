//! Declarative field rules: condition evaluation, derived values and per-field state.

pub(crate) mod coerce;
pub mod condition;
pub mod formula;
pub mod logic;

pub use condition::{evaluate, Condition, Operator};
pub use formula::{DerivedValue, Formula, FormulaInputs, FormulaRegistry};
pub use logic::{primary_applicant_fields, FieldConfig, FieldLogicEngine, FieldState};
