use std::sync::Arc;

use tracing::{debug, info};

use super::catalogue::WorkflowCatalogue;
use super::domain::{
    NavigationError, Role, Stage, StageProgress, StepState, SubStageConfig, SubStageProgress,
    Transition, WorkflowPosition, WorkflowProgress,
};
use crate::forms::FormData;

/// Owns the current position in the catalogue. Every operation either commits a complete
/// transition (including any automatic skips) or leaves the position untouched.
#[derive(Debug, Clone)]
pub struct WorkflowStateMachine {
    catalogue: Arc<WorkflowCatalogue>,
    cursor: usize,
}

impl WorkflowStateMachine {
    pub fn new(catalogue: Arc<WorkflowCatalogue>) -> Self {
        Self {
            catalogue,
            cursor: 0,
        }
    }

    pub fn catalogue(&self) -> &WorkflowCatalogue {
        &self.catalogue
    }

    pub fn position(&self) -> WorkflowPosition {
        self.position_of(self.cursor)
    }

    pub fn current(&self) -> &SubStageConfig {
        self.sub_stage_of(self.cursor)
    }

    pub fn next(&mut self, data: &FormData, role: Role) -> Result<Transition, NavigationError> {
        let from = self.cursor;
        let mut skipped = Vec::new();

        let Some(step) = self.step_forward(from, data, role)? else {
            debug!(position = %self.position(), "already at final sub-stage");
            return Ok(self.commit(from, from, skipped));
        };
        let target = self.skip_forward(step, data, role, &mut skipped)?;

        Ok(self.commit(from, target, skipped))
    }

    /// Moves back one sub-stage. Never validated; sub-stages whose entry guard fails are
    /// passed over backwards so they do not bounce the user forward again.
    pub fn prev(&mut self, data: &FormData) -> Transition {
        let from = self.cursor;
        let mut skipped = Vec::new();
        if from == 0 {
            return self.commit(from, from, skipped);
        }

        let mut target = from - 1;
        while target > 0 && !self.sub_stage_of(target).admits(data) {
            skipped.push(self.sub_stage_of(target).id);
            target -= 1;
        }

        self.commit(from, target, skipped)
    }

    pub fn go_to(
        &mut self,
        stage: Stage,
        sub_stage: &str,
        data: &FormData,
        role: Role,
    ) -> Result<Transition, NavigationError> {
        let from = self.cursor;
        let destination = self
            .catalogue
            .locate(stage, sub_stage)
            .and_then(|position| self.catalogue.ordinal(position))
            .ok_or_else(|| NavigationError::UnknownSubStage {
                stage,
                sub_stage: sub_stage.to_string(),
            })?;

        self.check_role(destination, role)?;

        let mut skipped = Vec::new();
        let target = self.skip_forward(destination, data, role, &mut skipped)?;
        Ok(self.commit(from, target, skipped))
    }

    /// Re-applies entry guards to the current sub-stage after the form data changed.
    /// Returns the transition when the machine had to move.
    pub fn settle(
        &mut self,
        data: &FormData,
        role: Role,
    ) -> Result<Option<Transition>, NavigationError> {
        let from = self.cursor;
        let mut skipped = Vec::new();
        let target = self.skip_forward(from, data, role, &mut skipped)?;
        if target == from {
            return Ok(None);
        }

        Ok(Some(self.commit(from, target, skipped)))
    }

    pub fn progress(&self) -> WorkflowProgress {
        let current = self.position();
        let total = self.catalogue.len();
        let current_stage = self
            .catalogue
            .stages()
            .iter()
            .position(|stage| stage.id == current.stage)
            .unwrap_or_default();

        let mut seen = 0;
        let stages = self
            .catalogue
            .stages()
            .iter()
            .enumerate()
            .map(|(stage_idx, stage)| {
                let sub_stages = stage
                    .sub_stages
                    .iter()
                    .map(|sub_stage| {
                        let state = step_state(seen, self.cursor);
                        seen += 1;
                        SubStageProgress {
                            id: sub_stage.id,
                            title: sub_stage.title,
                            state,
                            requires_role: sub_stage.requires_role,
                        }
                    })
                    .collect();

                StageProgress {
                    stage: stage.id,
                    title: stage.title,
                    state: step_state(stage_idx, current_stage),
                    sub_stages,
                }
            })
            .collect();

        let percent_complete = if total == 0 {
            0
        } else {
            (self.cursor * 100 / total) as u8
        };

        WorkflowProgress {
            stages,
            completed_sub_stages: self.cursor,
            total_sub_stages: total,
            percent_complete,
        }
    }

    /// One validated step forward from `ordinal`. `None` at the end of the catalogue.
    fn step_forward(
        &self,
        ordinal: usize,
        data: &FormData,
        role: Role,
    ) -> Result<Option<usize>, NavigationError> {
        let sub_stage = self.sub_stage_of(ordinal);
        let missing = sub_stage.missing_fields(data);
        if !missing.is_empty() {
            return Err(NavigationError::Validation {
                sub_stage: sub_stage.id.to_string(),
                missing,
            });
        }

        let next = ordinal + 1;
        if next >= self.catalogue.len() {
            return Ok(None);
        }

        self.check_role(next, role)?;
        Ok(Some(next))
    }

    fn skip_forward(
        &self,
        mut ordinal: usize,
        data: &FormData,
        role: Role,
        skipped: &mut Vec<&'static str>,
    ) -> Result<usize, NavigationError> {
        while !self.sub_stage_of(ordinal).admits(data) {
            match self.step_forward(ordinal, data, role)? {
                Some(next) => {
                    skipped.push(self.sub_stage_of(ordinal).id);
                    ordinal = next;
                }
                None => break,
            }
        }

        Ok(ordinal)
    }

    fn check_role(&self, ordinal: usize, role: Role) -> Result<(), NavigationError> {
        let sub_stage = self.sub_stage_of(ordinal);
        match sub_stage.requires_role {
            Some(required) if required != role => Err(NavigationError::AccessDenied {
                sub_stage: sub_stage.id.to_string(),
                required,
            }),
            _ => Ok(()),
        }
    }

    fn commit(&mut self, from: usize, to: usize, skipped: Vec<&'static str>) -> Transition {
        self.cursor = to;
        let transition = Transition {
            from: self.position_of(from),
            to: self.position_of(to),
            skipped,
        };

        if transition.moved() {
            info!(
                from = %transition.from,
                to = %transition.to,
                skipped = transition.skipped.len(),
                "workflow position changed"
            );
        }

        transition
    }

    fn position_of(&self, ordinal: usize) -> WorkflowPosition {
        self.catalogue.position_of(ordinal)
    }

    fn sub_stage_of(&self, ordinal: usize) -> &SubStageConfig {
        self.catalogue.sub_stage_of(ordinal)
    }
}

fn step_state(index: usize, current: usize) -> StepState {
    use std::cmp::Ordering;

    match index.cmp(&current) {
        Ordering::Less => StepState::Completed,
        Ordering::Equal => StepState::Active,
        Ordering::Greater => StepState::Upcoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn machine() -> WorkflowStateMachine {
        WorkflowStateMachine::new(Arc::new(WorkflowCatalogue::standard()))
    }

    fn data(pairs: &[(&str, serde_json::Value)]) -> FormData {
        pairs.iter().cloned().collect()
    }

    fn lead_complete() -> FormData {
        data(&[
            ("fullName", json!("Ann")),
            ("email", json!("a@b.com")),
            ("phone", json!("555")),
            ("otpVerified", json!(true)),
            ("income", json!(5000)),
            ("employmentType", json!("Salaried")),
        ])
    }

    #[test]
    fn starts_at_first_sub_stage() {
        let machine = machine();
        assert_eq!(machine.position().stage, Stage::LeadCapture);
        assert_eq!(machine.position().sub_stage, "basic-details");
    }

    #[test]
    fn prev_at_start_is_a_no_op() {
        let mut machine = machine();
        let transition = machine.prev(&FormData::new());
        assert!(!transition.moved());
    }

    #[test]
    fn next_crosses_into_following_stage() {
        let mut machine = machine();
        let data = lead_complete();
        machine.next(&data, Role::Agent).expect("to otp");
        let transition = machine.next(&data, Role::Agent).expect("to application");

        assert_eq!(transition.to.stage, Stage::Application);
        assert_eq!(transition.to.sub_stage, "primary-applicant");
    }

    #[test]
    fn prev_passes_over_guarded_sub_stage_backwards() {
        let mut machine = machine();
        let data = lead_complete();
        machine
            .go_to(Stage::Application, "bureau-check", &data, Role::Agent)
            .expect("jump");

        let transition = machine.prev(&data);
        assert_eq!(transition.to.sub_stage, "primary-applicant");
        assert_eq!(transition.skipped, vec!["co-applicant"]);
    }

    #[test]
    fn prev_lands_on_last_sub_stage_of_previous_stage() {
        let mut machine = machine();
        let data = lead_complete();
        machine
            .go_to(Stage::DocumentUpload, "upload", &data, Role::Agent)
            .expect("jump");

        let transition = machine.prev(&data);
        assert_eq!(transition.to.stage, Stage::Application);
        assert_eq!(transition.to.sub_stage, "bureau-check");
    }

    #[test]
    fn next_into_gated_sub_stage_is_refused_atomically() {
        let mut machine = machine();
        let data = lead_complete();
        machine
            .go_to(Stage::Underwriting, "risk-score", &data, Role::Agent)
            .expect("jump");

        let err = machine.next(&data, Role::Agent).expect_err("denied");
        assert_eq!(
            err,
            NavigationError::AccessDenied {
                sub_stage: "overrides".into(),
                required: Role::Manager,
            }
        );
        assert_eq!(machine.position().sub_stage, "risk-score");
    }

    #[test]
    fn next_at_final_sub_stage_stays_put() {
        let mut machine = machine();
        let data = lead_complete();
        machine
            .go_to(Stage::Approval, "disbursement", &data, Role::Agent)
            .expect("jump");

        let transition = machine.next(&data, Role::Agent).expect("no-op");
        assert!(!transition.moved());
        assert_eq!(machine.position().sub_stage, "disbursement");
    }

    #[test]
    fn go_to_unknown_sub_stage_reports_error() {
        let mut machine = machine();
        let err = machine
            .go_to(Stage::Approval, "risk-score", &FormData::new(), Role::Admin)
            .expect_err("unknown");
        assert!(matches!(err, NavigationError::UnknownSubStage { .. }));
        assert_eq!(machine.position().sub_stage, "basic-details");
    }

    #[test]
    fn settle_skips_co_applicant_once_flag_cleared() {
        let mut machine = machine();
        let with_co = lead_complete().with_field("hasCoApplicant", json!(true));
        machine
            .go_to(Stage::Application, "co-applicant", &with_co, Role::Agent)
            .expect("jump");
        assert!(machine.settle(&with_co, Role::Agent).expect("settle").is_none());

        let without_co = with_co.with_field("hasCoApplicant", json!(false));
        let transition = machine
            .settle(&without_co, Role::Agent)
            .expect("settle")
            .expect("moved");
        assert_eq!(transition.to.sub_stage, "bureau-check");
    }

    #[test]
    fn progress_marks_completed_active_upcoming() {
        let mut machine = machine();
        let data = lead_complete();
        machine
            .go_to(Stage::Application, "primary-applicant", &data, Role::Agent)
            .expect("jump");

        let progress = machine.progress();
        assert_eq!(progress.completed_sub_stages, 2);
        assert_eq!(progress.total_sub_stages, 12);
        assert_eq!(progress.percent_complete, 16);
        assert_eq!(progress.stages[0].state, StepState::Completed);
        assert_eq!(progress.stages[1].state, StepState::Active);
        assert_eq!(progress.stages[1].sub_stages[0].state, StepState::Active);
        assert_eq!(progress.stages[1].sub_stages[1].state, StepState::Upcoming);
        assert_eq!(progress.stages[4].state, StepState::Upcoming);
    }
}
