//! Notification boundary. Delivery (email, chat, webhooks) lives outside the
//! engine; implementations of [`Notifier`] receive task lifecycle events and
//! decide what, if anything, to send.

use justifi_core::domain::justification::Justification;
use justifi_core::domain::task::ApprovalTask;

pub trait Notifier: Send + Sync {
    /// A step became active and its approvers can now act.
    fn task_created(&self, task: &ApprovalTask, justification: &Justification);

    /// A task was resolved (approved, rejected, or info requested).
    fn task_resolved(&self, task: &ApprovalTask, justification: &Justification);
}

/// Discards all notifications.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn task_created(&self, _task: &ApprovalTask, _justification: &Justification) {}

    fn task_resolved(&self, _task: &ApprovalTask, _justification: &Justification) {}
}

/// Logs notifications through `tracing`; the default until a real delivery
/// channel is wired up.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn task_created(&self, task: &ApprovalTask, justification: &Justification) {
        tracing::info!(
            event_name = "notify.task_created",
            task_id = %task.id.0,
            justification_id = %justification.id.0,
            step_index = task.step_index,
            approvers = task.approvers.len(),
            "approval task awaiting action"
        );
    }

    fn task_resolved(&self, task: &ApprovalTask, justification: &Justification) {
        tracing::info!(
            event_name = "notify.task_resolved",
            task_id = %task.id.0,
            justification_id = %justification.id.0,
            status = task.status.as_str(),
            resolved_by = task.resolved_by.as_deref().unwrap_or("unknown"),
            "approval task resolved"
        );
    }
}
