//! Walks an ordered three-step chain against a throwaway database.
//!
//! `MODERATION_TABLE_PREFIX` and `MODERATION_RESUBMIT_AFTER_REJECTION` are read
//! from the environment; the database path is always a temp dir.
use anyhow::Context;
use moderation_engine::{
    Config, Decision, ModerationService, Resource, StepDecision, StepSpec, UserId, utils,
};

fn main() -> anyhow::Result<()> {
    utils::init_tracing("info,moderation_engine=debug");

    let temp_dir = tempfile::tempdir()?;
    let config = Config {
        db_path: temp_dir.path().join("walkthrough.db"),
        ..Config::from_env().context("Failed to load configuration")?
    };
    tracing::info!(prefix = %config.table_prefix, "configuration loaded");

    let service = ModerationService::open(config)?;
    let articles = Resource::new("articles");
    service.store().put_record(&articles, 42, b"{\"title\":\"Quarterly report\"}")?;

    let chain = service.create_request(
        &articles,
        42,
        UserId::new("user_author"),
        true,
        vec![
            StepSpec::new(["user_editor_a", "user_editor_b"]),
            StepSpec::new(["user_legal"]),
            StepSpec::new(["user_publisher"]),
        ],
    )?;

    let attempt = service.decide_step(
        chain.steps[2].id,
        StepDecision::new("user_publisher", Decision::Approve),
    );
    if let Err(err) = attempt {
        tracing::info!(code = err.code(), "publisher tried to skip ahead: {err}");
    }

    service.decide_step(
        chain.steps[0].id,
        StepDecision::new("user_editor_b", Decision::Approve).with_remarks("copy edited"),
    )?;
    service.reassign_approvers(chain.steps[1].id, vec![UserId::new("user_legal_backup")])?;
    service.decide_step(
        chain.steps[1].id,
        StepDecision::new("user_legal_backup", Decision::Approve),
    )?;
    let outcome = service.decide_step(
        chain.steps[2].id,
        StepDecision::new("user_publisher", Decision::Approve),
    )?;

    println!("{:#?}", outcome.request);
    for step in service.steps_for_request(outcome.request.id)? {
        println!(
            "step {:?}: {} by {:?}",
            step.ordinal, step.outcome, step.decided_by
        );
    }

    Ok(())
}
