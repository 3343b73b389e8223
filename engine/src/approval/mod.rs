//! Approval Gate
//!
//! Human-in-the-loop gating for risky plans. Depending on the autonomy
//! level a request is auto-approved immediately or parked as a pending
//! request that races an external approve/reject call against a timeout.
//! Whichever resolution arrives first wins; the pending entry is removed
//! atomically with the first resolution, so any later call is a no-op.

use crate::config::{AutonomyLevel, OperationMode};
use crate::decision::{ExecutionPlan, RiskAssessment, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

/// Terminal and transient approval states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Timeout,
    AutoApproved,
}

/// A parked request awaiting a decision
///
/// Exists only while unresolved; removed as soon as any resolution fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub task_id: String,
    pub plan: ExecutionPlan,
    pub risk: RiskAssessment,
    pub source: String,
    pub timestamp: i64,
}

/// The single resolution produced for a request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResult {
    pub granted: bool,
    pub status: ApprovalStatus,
    pub reason: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<i64>,
}

/// Side channel informed when a request parks
///
/// Implementations must not block; the gate never waits on them.
pub trait Notifier: Send + Sync {
    fn notify(&self, request: &ApprovalRequest);
}

/// Pushes pending requests onto an unbounded channel for a host UI to
/// consume (web mode).
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<ApprovalRequest>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ApprovalRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, request: &ApprovalRequest) {
        // Receiver may be gone; notification is fire-and-forget
        let _ = self.tx.send(request.clone());
    }
}

/// Emits a structured log line (api and background modes)
pub struct LogNotifier {
    mode: OperationMode,
}

impl LogNotifier {
    pub fn new(mode: OperationMode) -> Self {
        Self { mode }
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, request: &ApprovalRequest) {
        info!(
            task_id = %request.task_id,
            mode = ?self.mode,
            risk = request.risk.level.as_str(),
            steps = request.plan.steps.len(),
            description = %request.plan.description,
            "approval required"
        );
    }
}

struct PendingApproval {
    request: ApprovalRequest,
    resolve: oneshot::Sender<ApprovalResult>,
}

/// Gate that decides whether a plan may execute
pub struct ApprovalGate {
    autonomy: AutonomyLevel,
    timeout: Duration,
    notifier: Box<dyn Notifier>,
    pending: Mutex<HashMap<String, PendingApproval>>,
}

impl ApprovalGate {
    pub fn new(autonomy: AutonomyLevel, timeout: Duration, notifier: Box<dyn Notifier>) -> Self {
        Self {
            autonomy,
            timeout,
            notifier,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve an approval decision for the plan.
    ///
    /// Auto-approves when the autonomy level permits the assessed risk.
    /// Otherwise parks a pending request keyed by task id, notifies the
    /// side channel, and waits for whichever of approve, reject, or the
    /// timeout fires first.
    pub async fn request_approval(
        &self,
        task_id: &str,
        plan: ExecutionPlan,
        risk: RiskAssessment,
        source: &str,
    ) -> ApprovalResult {
        if self.should_auto_approve(&risk) {
            return ApprovalResult {
                granted: true,
                status: ApprovalStatus::AutoApproved,
                reason: Some("Auto-approved based on autonomy level and low risk".to_string()),
                approved_by: None,
                approved_at: Some(now_millis()),
            };
        }

        let request = ApprovalRequest {
            task_id: task_id.to_string(),
            plan,
            risk,
            source: source.to_string(),
            timestamp: now_millis(),
        };

        let (tx, rx) = oneshot::channel();
        self.pending_lock().insert(
            task_id.to_string(),
            PendingApproval {
                request: request.clone(),
                resolve: tx,
            },
        );

        self.notifier.notify(&request);

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => ApprovalResult {
                granted: false,
                status: ApprovalStatus::Rejected,
                reason: Some("Approval channel closed".to_string()),
                approved_by: None,
                approved_at: None,
            },
            Err(_) => {
                self.pending_lock().remove(task_id);
                ApprovalResult {
                    granted: false,
                    status: ApprovalStatus::Timeout,
                    reason: Some("Approval request timed out".to_string()),
                    approved_by: None,
                    approved_at: None,
                }
            }
        }
    }

    /// Grant a pending request. Returns false when no request is pending
    /// for the task id (already resolved, timed out, or never parked).
    pub fn approve(&self, task_id: &str, approved_by: &str) -> bool {
        let Some(pending) = self.pending_lock().remove(task_id) else {
            return false;
        };

        let _ = pending.resolve.send(ApprovalResult {
            granted: true,
            status: ApprovalStatus::Approved,
            reason: None,
            approved_by: Some(approved_by.to_string()),
            approved_at: Some(now_millis()),
        });

        true
    }

    /// Deny a pending request. Same no-op semantics as `approve`.
    pub fn reject(&self, task_id: &str, reason: &str) -> bool {
        let Some(pending) = self.pending_lock().remove(task_id) else {
            return false;
        };

        let _ = pending.resolve.send(ApprovalResult {
            granted: false,
            status: ApprovalStatus::Rejected,
            reason: Some(reason.to_string()),
            approved_by: None,
            approved_at: None,
        });

        true
    }

    /// Whether a request is currently awaiting a decision.
    pub fn has_pending_approval(&self, task_id: &str) -> bool {
        self.pending_lock().contains_key(task_id)
    }

    /// Snapshot of all unresolved requests.
    pub fn get_pending_approvals(&self) -> Vec<ApprovalRequest> {
        self.pending_lock()
            .values()
            .map(|p| p.request.clone())
            .collect()
    }

    fn should_auto_approve(&self, risk: &RiskAssessment) -> bool {
        match self.autonomy {
            AutonomyLevel::Full => {
                risk.level == RiskLevel::Low || risk.level == RiskLevel::Medium
            }
            AutonomyLevel::Semi => risk.level == RiskLevel::Low,
            AutonomyLevel::Interactive => false,
        }
    }

    fn pending_lock(&self) -> MutexGuard<'_, HashMap<String, PendingApproval>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn empty_plan() -> ExecutionPlan {
        ExecutionPlan {
            task_id: String::new(),
            description: "test".to_string(),
            steps: vec![],
            estimated_total_time: 0,
            overall_risk: RiskLevel::Low,
        }
    }

    fn risk(level: RiskLevel) -> RiskAssessment {
        RiskAssessment {
            level,
            requires_approval: true,
            concerns: vec![],
            destructive_actions: vec![],
            external_calls: vec![],
        }
    }

    fn gate(autonomy: AutonomyLevel, timeout: Duration) -> Arc<ApprovalGate> {
        Arc::new(ApprovalGate::new(
            autonomy,
            timeout,
            Box::new(LogNotifier::new(OperationMode::Api)),
        ))
    }

    #[tokio::test]
    async fn test_full_autonomy_auto_approves_medium() {
        let gate = gate(AutonomyLevel::Full, Duration::from_secs(1));
        let result = gate
            .request_approval("t1", empty_plan(), risk(RiskLevel::Medium), "user")
            .await;

        assert!(result.granted);
        assert_eq!(result.status, ApprovalStatus::AutoApproved);
        assert!(result.approved_at.is_some());
        assert!(!gate.has_pending_approval("t1"));
    }

    #[tokio::test]
    async fn test_semi_autonomy_auto_approves_only_low() {
        let gate = gate(AutonomyLevel::Semi, Duration::from_millis(20));

        let result = gate
            .request_approval("t1", empty_plan(), risk(RiskLevel::Low), "user")
            .await;
        assert_eq!(result.status, ApprovalStatus::AutoApproved);

        // Medium risk parks and then times out
        let result = gate
            .request_approval("t2", empty_plan(), risk(RiskLevel::Medium), "user")
            .await;
        assert_eq!(result.status, ApprovalStatus::Timeout);
        assert!(!result.granted);
    }

    #[tokio::test]
    async fn test_interactive_registers_pending_request() {
        let gate = gate(AutonomyLevel::Interactive, Duration::from_secs(5));

        let gate_clone = Arc::clone(&gate);
        let handle = tokio::spawn(async move {
            gate_clone
                .request_approval("t1", empty_plan(), risk(RiskLevel::Low), "user")
                .await
        });

        // Wait for the request to park
        while !gate.has_pending_approval("t1") {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(gate.get_pending_approvals().len(), 1);
        assert_eq!(gate.get_pending_approvals()[0].task_id, "t1");

        assert!(gate.approve("t1", "reviewer"));
        let result = handle.await.expect("approval task panicked");

        assert!(result.granted);
        assert_eq!(result.status, ApprovalStatus::Approved);
        assert_eq!(result.approved_by.as_deref(), Some("reviewer"));
        assert!(!gate.has_pending_approval("t1"));
    }

    #[tokio::test]
    async fn test_first_resolution_wins() {
        let gate = gate(AutonomyLevel::Interactive, Duration::from_secs(5));

        let gate_clone = Arc::clone(&gate);
        let handle = tokio::spawn(async move {
            gate_clone
                .request_approval("t1", empty_plan(), risk(RiskLevel::Low), "user")
                .await
        });

        while !gate.has_pending_approval("t1") {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert!(gate.approve("t1", "user"));
        // Every later call is a no-op
        assert!(!gate.reject("t1", "too late"));
        assert!(!gate.approve("t1", "user"));

        let result = handle.await.expect("approval task panicked");
        assert_eq!(result.status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn test_reject_resolves_with_reason() {
        let gate = gate(AutonomyLevel::Interactive, Duration::from_secs(5));

        let gate_clone = Arc::clone(&gate);
        let handle = tokio::spawn(async move {
            gate_clone
                .request_approval("t1", empty_plan(), risk(RiskLevel::High), "user")
                .await
        });

        while !gate.has_pending_approval("t1") {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert!(gate.reject("t1", "not today"));
        let result = handle.await.expect("approval task panicked");

        assert!(!result.granted);
        assert_eq!(result.status, ApprovalStatus::Rejected);
        assert_eq!(result.reason.as_deref(), Some("not today"));
    }

    #[tokio::test]
    async fn test_timeout_clears_pending() {
        let gate = gate(AutonomyLevel::Interactive, Duration::from_millis(10));

        let result = gate
            .request_approval("t1", empty_plan(), risk(RiskLevel::Low), "user")
            .await;

        assert_eq!(result.status, ApprovalStatus::Timeout);
        assert!(!gate.has_pending_approval("t1"));
        assert!(!gate.approve("t1", "user"));
    }

    #[tokio::test]
    async fn test_channel_notifier_delivers_request() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let gate = Arc::new(ApprovalGate::new(
            AutonomyLevel::Interactive,
            Duration::from_secs(5),
            Box::new(notifier),
        ));

        let gate_clone = Arc::clone(&gate);
        let handle = tokio::spawn(async move {
            gate_clone
                .request_approval("t1", empty_plan(), risk(RiskLevel::Low), "web")
                .await
        });

        let request = rx.recv().await.expect("notification not delivered");
        assert_eq!(request.task_id, "t1");
        assert_eq!(request.source, "web");

        gate.approve(&request.task_id, "ui");
        let result = handle.await.expect("approval task panicked");
        assert!(result.granted);
    }

    #[test]
    fn test_status_wire_strings() {
        assert_eq!(
            serde_json::to_string(&ApprovalStatus::AutoApproved).unwrap(),
            "\"auto_approved\""
        );
        assert_eq!(
            serde_json::to_string(&ApprovalStatus::Timeout).unwrap(),
            "\"timeout\""
        );
    }
}
