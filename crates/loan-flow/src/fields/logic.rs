use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::condition::{evaluate, Condition};
use super::formula::{DerivedValue, FormulaRegistry, FULL_NAME, MAX_LOAN_FROM_INCOME};
use crate::forms::FormData;

/// Declarative behavior of one form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visibility_rules: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enablement_rules: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_value: Option<DerivedValue>,
}

impl FieldConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility_rules: Vec::new(),
            enablement_rules: Vec::new(),
            derived_value: None,
        }
    }

    pub fn visible_when(mut self, condition: Condition) -> Self {
        self.visibility_rules.push(condition);
        self
    }

    pub fn enabled_when(mut self, condition: Condition) -> Self {
        self.enablement_rules.push(condition);
        self
    }

    pub fn derived(mut self, derived: DerivedValue) -> Self {
        self.derived_value = Some(derived);
        self
    }
}

/// Render-time state of a field for the current form snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldState {
    pub visible: bool,
    pub disabled: bool,
    pub derived_value: Option<Value>,
}

/// Resolves field configs against a form snapshot. Holds no state besides the
/// formula registry, so callers simply re-resolve after every edit.
#[derive(Debug, Clone)]
pub struct FieldLogicEngine {
    formulas: FormulaRegistry,
}

impl Default for FieldLogicEngine {
    fn default() -> Self {
        Self::new(FormulaRegistry::standard())
    }
}

impl FieldLogicEngine {
    pub fn new(formulas: FormulaRegistry) -> Self {
        Self { formulas }
    }

    pub fn formulas(&self) -> &FormulaRegistry {
        &self.formulas
    }

    pub fn resolve(&self, config: &FieldConfig, data: &FormData) -> FieldState {
        let visible = evaluate(&config.visibility_rules, data);
        let disabled = !config.enablement_rules.is_empty()
            && !evaluate(&config.enablement_rules, data);
        let derived_value = config
            .derived_value
            .as_ref()
            .and_then(|derived| self.formulas.compute(derived, data));

        FieldState {
            visible,
            disabled,
            derived_value,
        }
    }

    pub fn resolve_all(
        &self,
        configs: &[FieldConfig],
        data: &FormData,
    ) -> BTreeMap<String, FieldState> {
        configs
            .iter()
            .map(|config| (config.name.clone(), self.resolve(config, data)))
            .collect()
    }
}

/// Field rules rendered on the primary applicant sub-stage.
pub fn primary_applicant_fields() -> Vec<FieldConfig> {
    vec![
        FieldConfig::new("hasCoApplicant").visible_when(Condition::equals("loanType", "Home")),
        FieldConfig::new("incomeProofType")
            .visible_when(Condition::exists("employmentType"))
            .enabled_when(Condition::greater_than("income", 0)),
        FieldConfig::new("maxLoanAmount")
            .derived(DerivedValue::new(MAX_LOAN_FROM_INCOME, ["income"])),
        FieldConfig::new("applicantName")
            .derived(DerivedValue::new(FULL_NAME, ["firstName", "lastName"])),
    ]
}
