use super::domain::{Role, Stage, StageConfig, SubStageConfig, WorkflowPosition};
use crate::fields::primary_applicant_fields;
use crate::tasks::{AUTO_OFFER, CREDIT_BUREAU_CHECK, DOCUMENT_VERIFICATION};

/// Fixed two-level traversal graph. Sub-stages are addressed by their ordinal in the
/// flattened sequence so navigation is plain index arithmetic.
#[derive(Debug)]
pub struct WorkflowCatalogue {
    stages: Vec<StageConfig>,
    index: Vec<(usize, usize)>,
}

impl WorkflowCatalogue {
    pub fn standard() -> Self {
        Self::from_stages(standard_stages())
    }

    // Stages without sub-stages are dropped since no position could point at them.
    fn from_stages(stages: Vec<StageConfig>) -> Self {
        let stages: Vec<StageConfig> = stages
            .into_iter()
            .filter(|stage| !stage.sub_stages.is_empty())
            .collect();
        let index = stages
            .iter()
            .enumerate()
            .flat_map(|(stage_idx, stage)| {
                (0..stage.sub_stages.len()).map(move |sub_idx| (stage_idx, sub_idx))
            })
            .collect();

        Self { stages, index }
    }

    pub fn stages(&self) -> &[StageConfig] {
        &self.stages
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageConfig> {
        self.stages.iter().find(|config| config.id == stage)
    }

    /// Number of sub-stages across all stages.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn first(&self) -> Option<WorkflowPosition> {
        self.position_at(0)
    }

    pub fn ordinal(&self, position: WorkflowPosition) -> Option<usize> {
        self.index.iter().position(|&(stage_idx, sub_idx)| {
            let stage = &self.stages[stage_idx];
            stage.id == position.stage && stage.sub_stages[sub_idx].id == position.sub_stage
        })
    }

    pub fn position_at(&self, ordinal: usize) -> Option<WorkflowPosition> {
        let &(stage_idx, sub_idx) = self.index.get(ordinal)?;
        let stage = &self.stages[stage_idx];
        Some(WorkflowPosition {
            stage: stage.id,
            sub_stage: stage.sub_stages[sub_idx].id,
        })
    }

    pub fn sub_stage_at(&self, ordinal: usize) -> Option<&SubStageConfig> {
        let &(stage_idx, sub_idx) = self.index.get(ordinal)?;
        Some(&self.stages[stage_idx].sub_stages[sub_idx])
    }

    /// Infallible lookup for ordinals produced by this catalogue.
    pub(crate) fn position_of(&self, ordinal: usize) -> WorkflowPosition {
        let (stage_idx, sub_idx) = self.index[ordinal];
        let stage = &self.stages[stage_idx];
        WorkflowPosition {
            stage: stage.id,
            sub_stage: stage.sub_stages[sub_idx].id,
        }
    }

    pub(crate) fn sub_stage_of(&self, ordinal: usize) -> &SubStageConfig {
        let (stage_idx, sub_idx) = self.index[ordinal];
        &self.stages[stage_idx].sub_stages[sub_idx]
    }

    pub fn sub_stage(&self, position: WorkflowPosition) -> Option<&SubStageConfig> {
        self.stage(position.stage)?
            .sub_stages
            .iter()
            .find(|sub_stage| sub_stage.id == position.sub_stage)
    }

    /// Resolves a caller-supplied sub-stage id into a position within `stage`.
    pub fn locate(&self, stage: Stage, sub_stage: &str) -> Option<WorkflowPosition> {
        self.stage(stage)?
            .sub_stages
            .iter()
            .find(|config| config.id == sub_stage)
            .map(|config| WorkflowPosition {
                stage,
                sub_stage: config.id,
            })
    }

    /// Sub-stage during which the named background task runs.
    pub fn position_for_task(&self, task: &str) -> Option<WorkflowPosition> {
        self.stages.iter().find_map(|stage| {
            stage
                .sub_stages
                .iter()
                .find(|sub_stage| sub_stage.task == Some(task))
                .map(|sub_stage| WorkflowPosition {
                    stage: stage.id,
                    sub_stage: sub_stage.id,
                })
        })
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .flat_map(|stage| stage.sub_stages.iter())
            .filter_map(|sub_stage| sub_stage.task)
            .collect()
    }
}

fn standard_stages() -> Vec<StageConfig> {
    vec![
        StageConfig {
            id: Stage::LeadCapture,
            title: Stage::LeadCapture.label(),
            sub_stages: vec![
                SubStageConfig::new("basic-details", "Basic Details")
                    .requiring_fields(&["fullName", "email", "phone"]),
                SubStageConfig::new("otp-verification", "OTP Verification")
                    .requiring_fields(&["otpVerified"]),
            ],
        },
        StageConfig {
            id: Stage::Application,
            title: Stage::Application.label(),
            sub_stages: vec![
                SubStageConfig::new("primary-applicant", "Primary Applicant")
                    .requiring_fields(&["income", "employmentType"])
                    .with_fields(primary_applicant_fields()),
                SubStageConfig::new("co-applicant", "Co-Applicant").guarded_by("hasCoApplicant"),
                SubStageConfig::new("bureau-check", "Credit Bureau Check")
                    .requiring_fields(&["consentBureau"])
                    .running(CREDIT_BUREAU_CHECK)
                    .consented_by("consentBureau"),
            ],
        },
        StageConfig {
            id: Stage::DocumentUpload,
            title: Stage::DocumentUpload.label(),
            sub_stages: vec![
                SubStageConfig::new("upload", "Upload Documents"),
                SubStageConfig::new("verification", "Document Verification")
                    .running(DOCUMENT_VERIFICATION),
                SubStageConfig::new("auto-offer", "Auto Loan Offer").running(AUTO_OFFER),
            ],
        },
        StageConfig {
            id: Stage::Underwriting,
            title: Stage::Underwriting.label(),
            sub_stages: vec![
                SubStageConfig::new("risk-score", "Risk Score & Rules"),
                SubStageConfig::new("overrides", "Underwriter Overrides")
                    .requiring_role(Role::Manager),
            ],
        },
        StageConfig {
            id: Stage::Approval,
            title: Stage::Approval.label(),
            sub_stages: vec![
                SubStageConfig::new("sanction", "Sanction & Agreement"),
                SubStageConfig::new("disbursement", "Final Checklist & Disbursement"),
            ],
        },
    ]
}
