use std::sync::Arc;

use rust_decimal::Decimal;

use justifi_core::domain::justification::{JustificationDraft, JustificationStatus, JustificationUpdate};
use justifi_core::domain::rule::RuleDraft;
use justifi_core::domain::task::TaskStatus;
use justifi_core::errors::DomainError;
use justifi_core::workflow::TaskAction;
use justifi_db::repositories::InMemoryWorkflowStore;
use justifi_engine::{EngineError, WorkflowEngine};

fn engine() -> WorkflowEngine {
    WorkflowEngine::from_shared(Arc::new(InMemoryWorkflowStore::default()))
}

async fn seed_default_rule(engine: &WorkflowEngine) {
    engine
        .create_rule(RuleDraft {
            name: "IT Project Default".to_string(),
            department: "IT".to_string(),
            type_code: "PROJECT".to_string(),
            spend_threshold: Decimal::ZERO,
            approver_emails: vec!["manager@x.com".to_string(), "director@x.com".to_string()],
            ..RuleDraft::default()
        })
        .await
        .expect("rule saves");
}

fn draft(cost_estimate: i64) -> JustificationDraft {
    JustificationDraft {
        title: "New laptops".to_string(),
        type_code: "PROJECT".to_string(),
        department: "IT".to_string(),
        cost_centre: "CC100".to_string(),
        requester_email: "alice@example.com".to_string(),
        urgency: "Normal".to_string(),
        description: "Replace aging hardware".to_string(),
        cost_estimate: Decimal::new(cost_estimate, 0),
        ..JustificationDraft::default()
    }
}

#[tokio::test]
async fn single_step_approval_approves_the_justification() {
    let engine = engine();
    seed_default_rule(&engine).await;

    let justification = engine.submit(draft(500)).await.expect("submission routes");
    assert_eq!(justification.status, JustificationStatus::InReview);

    // The one pending task is addressed to both approvers.
    let manager_inbox = engine.inbox("manager@x.com").await.expect("inbox");
    let director_inbox = engine.inbox("director@x.com").await.expect("inbox");
    assert_eq!(manager_inbox.len(), 1);
    assert_eq!(director_inbox.len(), 1);
    assert_eq!(manager_inbox[0].task.id, director_inbox[0].task.id);

    let task_id = manager_inbox[0].task.id.clone();
    let resolved = engine
        .act(&task_id, "manager@x.com", TaskAction::Approve)
        .await
        .expect("approve succeeds");
    assert_eq!(resolved.status, TaskStatus::Approved);

    let mine = engine.list_mine("alice@example.com").await.expect("list mine");
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].status, JustificationStatus::Approved);

    // Nothing left for either approver.
    assert!(engine.inbox("manager@x.com").await.expect("inbox").is_empty());
    assert!(engine.inbox("director@x.com").await.expect("inbox").is_empty());
}

#[tokio::test]
async fn rejection_carries_comment_and_creates_no_further_task() {
    let engine = engine();
    seed_default_rule(&engine).await;

    let justification = engine.submit(draft(500)).await.expect("submission routes");
    let inbox = engine.inbox("director@x.com").await.expect("inbox");
    let task_id = inbox[0].task.id.clone();

    let resolved = engine
        .act(&task_id, "director@x.com", TaskAction::Reject { comment: "budget".to_string() })
        .await
        .expect("reject succeeds");

    assert_eq!(resolved.status, TaskStatus::Rejected);
    assert_eq!(resolved.comment.as_deref(), Some("budget"));

    let mine = engine.list_mine("alice@example.com").await.expect("list mine");
    assert_eq!(mine[0].status, JustificationStatus::Rejected);

    let history = engine.list_tasks(&justification.id).await.expect("history");
    assert_eq!(history.len(), 1, "rejection must not open another step");
}

#[tokio::test]
async fn higher_threshold_rule_wins_and_steps_run_sequentially() {
    let engine = engine();
    seed_default_rule(&engine).await;
    engine
        .create_rule(RuleDraft {
            name: "IT Project Large Spend".to_string(),
            department: "IT".to_string(),
            type_code: "PROJECT".to_string(),
            spend_threshold: Decimal::new(1000, 0),
            steps: vec![vec!["manager@x.com".to_string()], vec!["cfo@x.com".to_string()]],
            ..RuleDraft::default()
        })
        .await
        .expect("rule saves");

    let justification = engine.submit(draft(1500)).await.expect("submission routes");

    // Step 1 is live, step 2 must not exist yet.
    assert_eq!(engine.inbox("manager@x.com").await.expect("inbox").len(), 1);
    assert!(engine.inbox("cfo@x.com").await.expect("inbox").is_empty());

    let first = engine.inbox("manager@x.com").await.expect("inbox")[0].task.id.clone();
    engine.act(&first, "manager@x.com", TaskAction::Approve).await.expect("step 1 approves");

    // Still in review; step 2 opened only after step 1 resolved.
    let mine = engine.list_mine("alice@example.com").await.expect("list mine");
    assert_eq!(mine[0].status, JustificationStatus::InReview);
    let cfo_inbox = engine.inbox("cfo@x.com").await.expect("inbox");
    assert_eq!(cfo_inbox.len(), 1);
    assert_eq!(cfo_inbox[0].task.step_index, 1);

    let second = cfo_inbox[0].task.id.clone();
    engine.act(&second, "cfo@x.com", TaskAction::Approve).await.expect("step 2 approves");

    let mine = engine.list_mine("alice@example.com").await.expect("list mine");
    assert_eq!(mine[0].status, JustificationStatus::Approved);

    let history = engine.list_tasks(&justification.id).await.expect("history");
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn request_info_and_resubmission_produce_a_new_plan_version() {
    let engine = engine();
    seed_default_rule(&engine).await;

    let justification = engine.submit(draft(500)).await.expect("submission routes");
    let task_id = engine.inbox("manager@x.com").await.expect("inbox")[0].task.id.clone();

    let resolved = engine
        .act(
            &task_id,
            "manager@x.com",
            TaskAction::RequestInfo { reason: "need vendor quote".to_string() },
        )
        .await
        .expect("request info succeeds");
    assert_eq!(resolved.status, TaskStatus::InfoRequested);

    let mine = engine.list_mine("alice@example.com").await.expect("list mine");
    assert_eq!(mine[0].status, JustificationStatus::NeedsInfo);
    assert!(engine.inbox("manager@x.com").await.expect("inbox").is_empty());

    let resubmitted = engine
        .resubmit(
            &justification.id,
            "alice@example.com",
            JustificationUpdate {
                description: Some("Replace aging hardware; quote attached".to_string()),
                ..JustificationUpdate::default()
            },
        )
        .await
        .expect("resubmission routes");

    assert_eq!(resubmitted.status, JustificationStatus::InReview);
    assert_eq!(resubmitted.plan_version, 2);

    // A fresh step-0 task is pending; the old task stays info_requested and
    // out of every inbox.
    let inbox = engine.inbox("manager@x.com").await.expect("inbox");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].task.plan_version, 2);
    assert_eq!(inbox[0].task.step_index, 0);

    let history = engine.list_tasks(&justification.id).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, TaskStatus::InfoRequested);
    assert_eq!(history[0].comment.as_deref(), Some("need vendor quote"));

    // The superseded task is no longer actionable.
    let error = engine
        .act(&task_id, "manager@x.com", TaskAction::Approve)
        .await
        .expect_err("old task is resolved");
    assert!(matches!(
        error,
        EngineError::Domain(DomainError::TaskAlreadyResolved { .. })
    ));
}

#[tokio::test]
async fn unroutable_submission_fails_and_persists_nothing() {
    let engine = engine();
    seed_default_rule(&engine).await;

    let mut unroutable = draft(500);
    unroutable.department = "HR".to_string();
    unroutable.type_code = "TRAVEL".to_string();

    let error = engine.submit(unroutable).await.expect_err("no rule matches");
    assert!(matches!(error, EngineError::Domain(DomainError::NoRoutingRule { .. })));

    assert!(engine.list_mine("alice@example.com").await.expect("list mine").is_empty());
    assert!(engine.inbox("manager@x.com").await.expect("inbox").is_empty());
}

#[tokio::test]
async fn invalid_submissions_are_refused() {
    let engine = engine();
    seed_default_rule(&engine).await;

    let mut blank_title = draft(500);
    blank_title.title = "  ".to_string();
    let error = engine.submit(blank_title).await.expect_err("blank title");
    assert!(matches!(error, EngineError::Domain(DomainError::InvalidJustification(_))));

    let mut negative_cost = draft(500);
    negative_cost.cost_estimate = Decimal::new(-100, 0);
    let error = engine.submit(negative_cost).await.expect_err("negative cost");
    assert!(matches!(error, EngineError::Domain(DomainError::InvalidJustification(_))));
}

#[tokio::test]
async fn actor_outside_the_step_is_not_authorized() {
    let engine = engine();
    seed_default_rule(&engine).await;

    engine.submit(draft(500)).await.expect("submission routes");
    let task_id = engine.inbox("manager@x.com").await.expect("inbox")[0].task.id.clone();

    let error = engine
        .act(&task_id, "alice@example.com", TaskAction::Approve)
        .await
        .expect_err("requester is not an approver");
    assert!(matches!(error, EngineError::Domain(DomainError::NotAuthorized { .. })));

    // The failed attempt must not consume the task.
    assert_eq!(engine.inbox("manager@x.com").await.expect("inbox").len(), 1);
}

#[tokio::test]
async fn duplicate_action_reports_task_already_resolved() {
    let engine = engine();
    seed_default_rule(&engine).await;

    engine.submit(draft(500)).await.expect("submission routes");
    let task_id = engine.inbox("manager@x.com").await.expect("inbox")[0].task.id.clone();

    engine.act(&task_id, "manager@x.com", TaskAction::Approve).await.expect("first wins");

    let error = engine
        .act(&task_id, "director@x.com", TaskAction::Approve)
        .await
        .expect_err("second action is a stale duplicate");
    assert!(matches!(
        error,
        EngineError::Domain(DomainError::TaskAlreadyResolved { .. })
    ));
}

#[tokio::test]
async fn unknown_task_reports_not_found() {
    let engine = engine();
    let error = engine
        .act(
            &justifi_core::domain::task::TaskId("missing".to_string()),
            "manager@x.com",
            TaskAction::Approve,
        )
        .await
        .expect_err("unknown task");
    assert!(matches!(error, EngineError::TaskNotFound(_)));
}

#[tokio::test]
async fn resubmission_is_guarded_by_requester_and_state() {
    let engine = engine();
    seed_default_rule(&engine).await;

    let justification = engine.submit(draft(500)).await.expect("submission routes");

    // Not in NeedsInfo yet.
    let error = engine
        .resubmit(&justification.id, "alice@example.com", JustificationUpdate::default())
        .await
        .expect_err("in-review justification cannot be resubmitted");
    assert!(matches!(
        error,
        EngineError::Domain(DomainError::InvalidStatusTransition { .. })
    ));

    let task_id = engine.inbox("manager@x.com").await.expect("inbox")[0].task.id.clone();
    engine
        .act(&task_id, "manager@x.com", TaskAction::RequestInfo { reason: "why?".to_string() })
        .await
        .expect("request info succeeds");

    // Only the requester may resubmit.
    let error = engine
        .resubmit(&justification.id, "manager@x.com", JustificationUpdate::default())
        .await
        .expect_err("approver cannot resubmit");
    assert!(matches!(error, EngineError::Domain(DomainError::NotAuthorized { .. })));
}

#[tokio::test]
async fn concurrent_actions_resolve_exactly_once() {
    let engine = Arc::new(engine());
    seed_default_rule(&engine).await;

    engine.submit(draft(500)).await.expect("submission routes");
    let task_id = engine.inbox("manager@x.com").await.expect("inbox")[0].task.id.clone();

    let mut handles = Vec::new();
    for worker in 0..8 {
        let engine = engine.clone();
        let task_id = task_id.clone();
        let actor =
            if worker % 2 == 0 { "manager@x.com".to_string() } else { "director@x.com".to_string() };
        handles.push(tokio::spawn(async move {
            engine.act(&task_id, &actor, TaskAction::Approve).await
        }));
    }

    let mut successes = 0;
    let mut already_resolved = 0;
    for handle in handles {
        match handle.await.expect("task completes") {
            Ok(_) => successes += 1,
            Err(EngineError::Domain(DomainError::TaskAlreadyResolved { .. })) => {
                already_resolved += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1, "exactly one concurrent action may win");
    assert_eq!(already_resolved, 7);

    let mine = engine.list_mine("alice@example.com").await.expect("list mine");
    assert_eq!(mine[0].status, JustificationStatus::Approved);
}

#[tokio::test]
async fn resubmission_can_reroute_to_a_different_rule() {
    let engine = engine();
    seed_default_rule(&engine).await;
    engine
        .create_rule(RuleDraft {
            name: "IT Project Large Spend".to_string(),
            department: "IT".to_string(),
            type_code: "PROJECT".to_string(),
            spend_threshold: Decimal::new(1000, 0),
            steps: vec![vec!["manager@x.com".to_string()], vec!["cfo@x.com".to_string()]],
            ..RuleDraft::default()
        })
        .await
        .expect("rule saves");

    let justification = engine.submit(draft(500)).await.expect("routes to default rule");
    let task_id = engine.inbox("manager@x.com").await.expect("inbox")[0].task.id.clone();
    engine
        .act(&task_id, "manager@x.com", TaskAction::RequestInfo { reason: "true cost?".to_string() })
        .await
        .expect("request info succeeds");

    // The corrected estimate crosses the large-spend threshold, so the new
    // plan comes from the stricter two-step rule.
    engine
        .resubmit(
            &justification.id,
            "alice@example.com",
            JustificationUpdate {
                cost_estimate: Some(Decimal::new(2000, 0)),
                ..JustificationUpdate::default()
            },
        )
        .await
        .expect("resubmission routes");

    let inbox = engine.inbox("manager@x.com").await.expect("inbox");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].task.plan_version, 2);

    engine
        .act(&inbox[0].task.id, "manager@x.com", TaskAction::Approve)
        .await
        .expect("step 1 approves");
    assert_eq!(engine.inbox("cfo@x.com").await.expect("inbox").len(), 1);
}
