use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::fields::coerce::is_truthy;
use crate::fields::FieldConfig;
use crate::forms::FormData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    LeadCapture,
    Application,
    DocumentUpload,
    Underwriting,
    Approval,
}

impl Stage {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::LeadCapture,
            Self::Application,
            Self::DocumentUpload,
            Self::Underwriting,
            Self::Approval,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::LeadCapture => "Lead Capture",
            Self::Application => "Application",
            Self::DocumentUpload => "Document Upload",
            Self::Underwriting => "Underwriting",
            Self::Approval => "Approval",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LeadCapture => "lead-capture",
            Self::Application => "application",
            Self::DocumentUpload => "document-upload",
            Self::Underwriting => "underwriting",
            Self::Approval => "approval",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ParseNameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ordered()
            .into_iter()
            .find(|stage| stage.as_str() == value)
            .ok_or_else(|| ParseNameError::Stage(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Agent,
    Manager,
    Underwriter,
    Admin,
}

impl Role {
    pub const fn ordered() -> [Self; 4] {
        [Self::Agent, Self::Manager, Self::Underwriter, Self::Admin]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Agent => "Agent",
            Self::Manager => "Manager",
            Self::Underwriter => "Underwriter",
            Self::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Role {
    type Err = ParseNameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ordered()
            .into_iter()
            .find(|role| role.label().eq_ignore_ascii_case(value))
            .ok_or_else(|| ParseNameError::Role(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseNameError {
    #[error("unknown stage `{0}`")]
    Stage(String),
    #[error("unknown role `{0}`")]
    Role(String),
}

#[derive(Debug, Clone)]
pub struct SubStageConfig {
    pub id: &'static str,
    pub title: &'static str,
    /// Only callers holding exactly this role may enter.
    pub requires_role: Option<Role>,
    /// Fields that must be truthy before the user may move past this sub-stage.
    pub required_fields: Vec<&'static str>,
    /// Field that must be truthy for the sub-stage to render; otherwise it is skipped.
    pub entry_guard: Option<&'static str>,
    /// Background task that runs while the user is on this sub-stage.
    pub task: Option<&'static str>,
    /// Field that must be truthy before the task may start on its own.
    pub task_consent: Option<&'static str>,
    pub fields: Vec<FieldConfig>,
}

impl SubStageConfig {
    pub fn new(id: &'static str, title: &'static str) -> Self {
        Self {
            id,
            title,
            requires_role: None,
            required_fields: Vec::new(),
            entry_guard: None,
            task: None,
            task_consent: None,
            fields: Vec::new(),
        }
    }

    pub fn requiring_role(mut self, role: Role) -> Self {
        self.requires_role = Some(role);
        self
    }

    pub fn requiring_fields(mut self, fields: &[&'static str]) -> Self {
        self.required_fields.extend_from_slice(fields);
        self
    }

    pub fn guarded_by(mut self, field: &'static str) -> Self {
        self.entry_guard = Some(field);
        self
    }

    pub fn running(mut self, task: &'static str) -> Self {
        self.task = Some(task);
        self
    }

    pub fn consented_by(mut self, field: &'static str) -> Self {
        self.task_consent = Some(field);
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldConfig>) -> Self {
        self.fields = fields;
        self
    }

    pub fn missing_fields(&self, data: &FormData) -> Vec<String> {
        self.required_fields
            .iter()
            .filter(|field| !is_truthy(data.get(field)))
            .map(|field| field.to_string())
            .collect()
    }

    pub fn admits(&self, data: &FormData) -> bool {
        self.entry_guard
            .map_or(true, |field| is_truthy(data.get(field)))
    }

    pub fn permits(&self, role: Role) -> bool {
        self.requires_role.map_or(true, |required| required == role)
    }

    /// The bound task, once its consent field (if any) holds.
    pub fn startable_task(&self, data: &FormData) -> Option<&'static str> {
        let consented = self
            .task_consent
            .map_or(true, |field| is_truthy(data.get(field)));
        self.task.filter(|_| consented)
    }
}

#[derive(Debug, Clone)]
pub struct StageConfig {
    pub id: Stage,
    pub title: &'static str,
    pub sub_stages: Vec<SubStageConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPosition {
    pub stage: Stage,
    pub sub_stage: &'static str,
}

impl fmt::Display for WorkflowPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stage, self.sub_stage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from: WorkflowPosition,
    pub to: WorkflowPosition,
    /// Sub-stages passed over because their entry guard did not hold.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<&'static str>,
}

impl Transition {
    pub fn moved(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("complete the required fields on {sub_stage}: {}", .missing.join(", "))]
    Validation {
        sub_stage: String,
        missing: Vec<String>,
    },
    #[error("{sub_stage} requires the {required} role")]
    AccessDenied { sub_stage: String, required: Role },
    #[error("stage {stage} has no sub-stage `{sub_stage}`")]
    UnknownSubStage { stage: Stage, sub_stage: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Completed,
    Active,
    Upcoming,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubStageProgress {
    pub id: &'static str,
    pub title: &'static str,
    pub state: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_role: Option<Role>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageProgress {
    pub stage: Stage,
    pub title: &'static str,
    pub state: StepState,
    pub sub_stages: Vec<SubStageProgress>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowProgress {
    pub stages: Vec<StageProgress>,
    pub completed_sub_stages: usize,
    pub total_sub_stages: usize,
    pub percent_complete: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_names_round_trip_through_wire_form() {
        for stage in Stage::ordered() {
            assert_eq!(stage.as_str().parse::<Stage>(), Ok(stage));
            assert_eq!(
                serde_json::to_value(stage).expect("serialize"),
                json!(stage.as_str())
            );
        }
        assert!("closing".parse::<Stage>().is_err());
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("manager".parse::<Role>(), Ok(Role::Manager));
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(
            "auditor".parse::<Role>(),
            Err(ParseNameError::Role("auditor".into()))
        );
    }

    #[test]
    fn role_gate_is_exact() {
        let gated = SubStageConfig::new("overrides", "Underwriter Overrides")
            .requiring_role(Role::Manager);
        assert!(gated.permits(Role::Manager));
        assert!(!gated.permits(Role::Admin));
        assert!(!gated.permits(Role::Agent));
        assert!(SubStageConfig::new("sanction", "Sanction").permits(Role::Agent));
    }

    #[test]
    fn required_fields_use_truthiness() {
        let sub_stage = SubStageConfig::new("primary-applicant", "Primary Applicant")
            .requiring_fields(&["income", "employmentType"]);
        let data: FormData = [("income", json!(0)), ("employmentType", json!("Salaried"))]
            .into_iter()
            .collect();

        assert_eq!(sub_stage.missing_fields(&data), vec!["income".to_string()]);
    }

    #[test]
    fn task_waits_for_consent_field() {
        let sub_stage = SubStageConfig::new("bureau-check", "Credit Bureau Check")
            .running("creditBureauCheck")
            .consented_by("consentBureau");
        let refused: FormData = [("consentBureau", json!(false))].into_iter().collect();
        let given: FormData = [("consentBureau", json!(true))].into_iter().collect();

        assert_eq!(sub_stage.startable_task(&FormData::default()), None);
        assert_eq!(sub_stage.startable_task(&refused), None);
        assert_eq!(sub_stage.startable_task(&given), Some("creditBureauCheck"));

        let unconditional =
            SubStageConfig::new("auto-offer", "Auto Loan Offer").running("autoOffer");
        assert_eq!(unconditional.startable_task(&FormData::default()), Some("autoOffer"));
    }

    #[test]
    fn validation_error_lists_missing_fields() {
        let err = NavigationError::Validation {
            sub_stage: "basic-details".into(),
            missing: vec!["email".into(), "phone".into()],
        };
        assert_eq!(
            err.to_string(),
            "complete the required fields on basic-details: email, phone"
        );
    }
}
