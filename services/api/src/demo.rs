use clap::Args;
use loan_flow::config::AppConfig;
use loan_flow::error::AppError;
use loan_flow::forms::ApplicationId;
use loan_flow::tasks::CREDIT_BUREAU_CHECK;
use loan_flow::workflow::{Role, Transition};
use loan_flow::{ApplicationSession, FieldUpdate, NetworkStatusObserver, SessionDependencies};
use serde_json::{json, Value};

/// Polls the demo waits for before giving up on the bureau check.
const MAX_TASK_WAITS: usize = 10;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Role the demo session acts as (Agent, Manager, Underwriter, Admin)
    #[arg(long, default_value = "Agent")]
    pub(crate) role: Role,
    /// Drop connectivity while filling the primary applicant and reconnect afterwards
    #[arg(long)]
    pub(crate) offline_edits: bool,
    /// Application id for the walkthrough
    #[arg(long, default_value = "demo-application")]
    pub(crate) application_id: String,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let engine = config.engine;
    let network = NetworkStatusObserver::new(true);
    let deps = SessionDependencies::simulated(&engine, network.clone());
    let session =
        ApplicationSession::open(ApplicationId::from(args.application_id), args.role, &deps)?;

    println!("Loan application walkthrough");
    println!(
        "Application {} as {} (sync latency {} ms, task poll {} ms)",
        session.application_id(),
        session.role(),
        engine.sync_latency.as_millis(),
        engine.task_poll_interval.as_millis()
    );
    println!("Starting at {}", session.position());

    println!("\nLead capture");
    fill(
        &session,
        &[
            ("fullName", json!("Asha Rao")),
            ("email", json!("asha@example.com")),
            ("phone", json!("+91 98450 00000")),
        ],
    )?;
    report_transition(&session.next()?);
    fill(&session, &[("otpVerified", json!(true))])?;
    report_transition(&session.next()?);

    println!("\nPrimary applicant");
    if args.offline_edits {
        network.set_online(false);
        println!("  Connectivity dropped");
    }
    fill(
        &session,
        &[
            ("loanType", json!("Home")),
            ("employmentType", json!("Salaried")),
            ("income", json!(85000)),
            ("hasCoApplicant", json!(false)),
        ],
    )?;
    if args.offline_edits {
        println!(
            "  Pending changes held locally: sync status {}",
            session.sync_status().label()
        );
        network.set_online(true);
        println!("  Connectivity restored");
    }
    tokio::time::sleep(engine.sync_latency * 2).await;
    println!("  Sync status: {}", session.sync_status().label());

    let snapshot = session.snapshot();
    for name in ["maxLoanAmount", "incomeProofType"] {
        if let Some(state) = snapshot.fields.get(name) {
            println!(
                "  {}: visible={} disabled={} derived={}",
                name,
                state.visible,
                state.disabled,
                state
                    .derived_value
                    .as_ref()
                    .map(Value::to_string)
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }

    println!("\nCredit bureau");
    report_transition(&session.next()?);
    fill(&session, &[("consentBureau", json!(true))])?;
    for _ in 0..MAX_TASK_WAITS {
        let Some(task) = session.task(CREDIT_BUREAU_CHECK) else {
            println!("  Bureau check was not started");
            break;
        };
        println!(
            "  {}: {}{}",
            task.name,
            task.status_label,
            task.message
                .as_deref()
                .map(|message| format!(" ({message})"))
                .unwrap_or_default()
        );
        if task.status.is_terminal() {
            if let Some(result) = task.result {
                println!("  Result: {}", result);
            }
            break;
        }
        tokio::time::sleep(engine.task_poll_interval).await;
    }

    let progress = session.snapshot().progress;
    println!(
        "\nProgress: {}/{} sub-stages ({}%)",
        progress.completed_sub_stages, progress.total_sub_stages, progress.percent_complete
    );
    for stage in progress.stages {
        println!("  {:<14} {:?}", stage.title, stage.state);
    }

    session.close();
    Ok(())
}

fn fill(session: &ApplicationSession, values: &[(&str, Value)]) -> Result<(), AppError> {
    for (field, value) in values {
        let FieldUpdate {
            status,
            notice,
            transition,
        } = session.update_field(*field, value.clone())?;
        println!("  {} = {} [{}]", field, value, status.label());
        if let Some(notice) = notice {
            println!("    {}", notice);
        }
        if let Some(transition) = transition {
            report_transition(&transition);
        }
    }
    Ok(())
}

fn report_transition(transition: &Transition) {
    if transition.skipped.is_empty() {
        println!("  -> {} (from {})", transition.to, transition.from);
    } else {
        println!(
            "  -> {} (from {}, skipped {})",
            transition.to,
            transition.from,
            transition.skipped.join(", ")
        );
    }
}
