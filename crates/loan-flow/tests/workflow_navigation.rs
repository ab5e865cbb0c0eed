//! Navigation scenarios driven through the public state machine and catalogue.

mod common {
    use std::sync::Arc;

    use loan_flow::forms::FormData;
    use loan_flow::workflow::{WorkflowCatalogue, WorkflowStateMachine};
    use serde_json::{json, Value};

    pub(super) fn machine() -> WorkflowStateMachine {
        WorkflowStateMachine::new(Arc::new(WorkflowCatalogue::standard()))
    }

    pub(super) fn form(pairs: &[(&str, Value)]) -> FormData {
        pairs.iter().cloned().collect()
    }

    pub(super) fn basic_details() -> FormData {
        form(&[
            ("fullName", json!("Ann")),
            ("email", json!("a@b.com")),
            ("phone", json!("555")),
        ])
    }
}

use common::{basic_details, form, machine};
use loan_flow::fields::{evaluate, Condition};
use loan_flow::workflow::{NavigationError, Role, Stage};
use serde_json::json;

#[test]
fn basic_details_advance_to_otp_verification() {
    let mut machine = machine();
    let transition = machine
        .next(&basic_details(), Role::Agent)
        .expect("basic details complete");

    assert_eq!(transition.to.stage, Stage::LeadCapture);
    assert_eq!(transition.to.sub_stage, "otp-verification");
    assert_eq!(machine.position().sub_stage, "otp-verification");
}

#[test]
fn each_missing_basic_detail_blocks_advance() {
    for missing in ["fullName", "email", "phone"] {
        let mut machine = machine();
        let data: loan_flow::forms::FormData = basic_details()
            .iter()
            .filter(|(name, _)| name.as_str() != missing)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let err = machine.next(&data, Role::Agent).expect_err("incomplete");
        assert_eq!(
            err,
            NavigationError::Validation {
                sub_stage: "basic-details".into(),
                missing: vec![missing.to_string()],
            }
        );
        assert_eq!(machine.position().sub_stage, "basic-details");
    }
}

#[test]
fn empty_strings_do_not_satisfy_required_fields() {
    let mut machine = machine();
    let data = basic_details().with_field("phone", json!(""));
    assert!(machine.next(&data, Role::Agent).is_err());
}

#[test]
fn overrides_are_refused_to_agents_and_open_to_managers() {
    let data = form(&[]);

    let mut agent = machine();
    let err = agent
        .go_to(Stage::Underwriting, "overrides", &data, Role::Agent)
        .expect_err("agent refused");
    assert!(matches!(
        err,
        NavigationError::AccessDenied {
            required: Role::Manager,
            ..
        }
    ));
    assert_eq!(agent.position().sub_stage, "basic-details");

    let mut manager = machine();
    let transition = manager
        .go_to(Stage::Underwriting, "overrides", &data, Role::Manager)
        .expect("manager allowed");
    assert_eq!(transition.to.stage, Stage::Underwriting);
    assert_eq!(transition.to.sub_stage, "overrides");
}

#[test]
fn admin_is_not_a_stand_in_for_manager() {
    let mut machine = machine();
    assert!(machine
        .go_to(Stage::Underwriting, "overrides", &form(&[]), Role::Admin)
        .is_err());
}

#[test]
fn co_applicant_is_skipped_without_a_co_applicant() {
    let mut machine = machine();
    let data = form(&[
        ("income", json!(5200)),
        ("employmentType", json!("Salaried")),
        ("hasCoApplicant", json!(false)),
    ]);
    machine
        .go_to(Stage::Application, "primary-applicant", &data, Role::Agent)
        .expect("jump");

    let transition = machine.next(&data, Role::Agent).expect("advance");
    assert_eq!(transition.to.sub_stage, "bureau-check");
    assert_eq!(transition.skipped, vec!["co-applicant"]);
}

#[test]
fn co_applicant_is_shown_when_requested() {
    let mut machine = machine();
    let data = form(&[
        ("income", json!(5200)),
        ("employmentType", json!("Salaried")),
        ("hasCoApplicant", json!(true)),
    ]);
    machine
        .go_to(Stage::Application, "primary-applicant", &data, Role::Agent)
        .expect("jump");

    let transition = machine.next(&data, Role::Agent).expect("advance");
    assert_eq!(transition.to.sub_stage, "co-applicant");
    assert!(transition.skipped.is_empty());
}

#[test]
fn bureau_check_needs_consent_before_document_upload() {
    let mut machine = machine();
    let data = form(&[("consentBureau", json!(false))]);
    machine
        .go_to(Stage::Application, "bureau-check", &data, Role::Agent)
        .expect("jump");

    let err = machine.next(&data, Role::Agent).expect_err("no consent");
    assert_eq!(
        err,
        NavigationError::Validation {
            sub_stage: "bureau-check".into(),
            missing: vec!["consentBureau".into()],
        }
    );
    assert_eq!(machine.position().sub_stage, "bureau-check");

    let consented = data.with_field("consentBureau", json!(true));
    let transition = machine.next(&consented, Role::Agent).expect("advance");
    assert_eq!(transition.to.stage, Stage::DocumentUpload);
    assert_eq!(transition.to.sub_stage, "upload");
}

#[test]
fn prev_from_first_stage_start_is_a_no_op() {
    let mut machine = machine();
    let transition = machine.prev(&basic_details());
    assert_eq!(transition.from, transition.to);
}

#[test]
fn loan_type_condition_matches_exactly() {
    let rule = [Condition::equals("loanType", "Home")];
    assert!(evaluate(&rule, &form(&[("loanType", json!("Home"))])));
    assert!(!evaluate(&rule, &form(&[("loanType", json!("Auto"))])));
}
