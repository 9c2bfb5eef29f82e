//! Planner/workflow bridge: long-running automation plans and the assist
//! surface.
//!
//! A goal with automation in flight carries one [`PlannerPlan`]. Resuming
//! a paused plan passes a two-part guard:
//!
//! 1. the plan itself holds a resume token, and
//! 2. the global planner is not busy (single-flight — two resumes must
//!    never race the shared planner).
//!
//! Tokens are opaque and single-use from the bridge's perspective. Taking
//! one locks the plan until the next plan update arrives; the update is
//! what re-arms resumability, whether the continuation succeeded or not.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use uuid::Uuid;

use cadence_core::model::{Board, PlanStatus, PlannerPlan, ResumeToken};

/// Why resume is currently disabled for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeGate {
    /// Both guards pass.
    Ready,
    UnknownPlan,
    /// The plan carries no continuation token.
    NoToken,
    /// The shared planner is already working.
    PlannerBusy,
    /// A token was already submitted; waiting for the next plan update.
    AwaitingUpdate,
}

impl ResumeGate {
    pub fn is_ready(self) -> bool {
        self == ResumeGate::Ready
    }
}

/// Resume refusals, mirroring [`ResumeGate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeError {
    UnknownPlan(Uuid),
    NoToken(Uuid),
    PlannerBusy,
    AwaitingUpdate(Uuid),
    /// The workflow engine rejected the continuation.
    Rejected(String),
}

impl fmt::Display for ResumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPlan(goal) => write!(f, "no plan tracked for goal {goal}"),
            Self::NoToken(goal) => write!(f, "plan for goal {goal} has no resume token"),
            Self::PlannerBusy => write!(f, "planner is busy"),
            Self::AwaitingUpdate(goal) => {
                write!(f, "resume already submitted for goal {goal}, awaiting update")
            }
            Self::Rejected(e) => write!(f, "workflow engine rejected resume: {e}"),
        }
    }
}

impl std::error::Error for ResumeError {}

struct PlanEntry {
    plan: PlannerPlan,
    /// Set when a token was submitted; cleared by the next plan update.
    awaiting_update: bool,
}

/// Tracks plans per goal and enforces the resume guards.
#[derive(Default)]
pub struct PlannerBridge {
    plans: HashMap<Uuid, PlanEntry>,
    busy: bool,
}

impl PlannerBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or refresh the plan for a goal. A plan update unlocks a
    /// plan that was awaiting one.
    pub fn upsert_plan(&mut self, plan: PlannerPlan) {
        self.plans.insert(
            plan.goal_id,
            PlanEntry {
                plan,
                awaiting_update: false,
            },
        );
    }

    pub fn remove_plan(&mut self, goal_id: Uuid) -> Option<PlannerPlan> {
        self.plans.remove(&goal_id).map(|e| e.plan)
    }

    pub fn plan(&self, goal_id: Uuid) -> Option<&PlannerPlan> {
        self.plans.get(&goal_id).map(|e| &e.plan)
    }

    /// Plans currently in flight (running or paused), for the activity
    /// rail.
    pub fn active_plans(&self) -> Vec<&PlannerPlan> {
        let mut plans: Vec<&PlannerPlan> = self
            .plans
            .values()
            .map(|e| &e.plan)
            .filter(|p| matches!(p.status, PlanStatus::Running | PlanStatus::Paused))
            .collect();
        plans.sort_by_key(|p| p.goal_id);
        plans
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Global planner-busy flag, driven by planner status updates.
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// The two-part resume guard, for rendering the resume control.
    pub fn resume_gate(&self, goal_id: Uuid) -> ResumeGate {
        let Some(entry) = self.plans.get(&goal_id) else {
            return ResumeGate::UnknownPlan;
        };
        if entry.awaiting_update {
            return ResumeGate::AwaitingUpdate;
        }
        if entry.plan.resume_token.is_none() {
            return ResumeGate::NoToken;
        }
        if self.busy {
            return ResumeGate::PlannerBusy;
        }
        ResumeGate::Ready
    }

    /// Take the plan's token for submission. Single-use: the token leaves
    /// the plan, the plan locks until its next update, and the planner
    /// goes busy.
    pub fn begin_resume(&mut self, goal_id: Uuid) -> Result<ResumeToken, ResumeError> {
        match self.resume_gate(goal_id) {
            ResumeGate::Ready => {}
            ResumeGate::UnknownPlan => return Err(ResumeError::UnknownPlan(goal_id)),
            ResumeGate::NoToken => return Err(ResumeError::NoToken(goal_id)),
            ResumeGate::PlannerBusy => return Err(ResumeError::PlannerBusy),
            ResumeGate::AwaitingUpdate => return Err(ResumeError::AwaitingUpdate(goal_id)),
        }

        let entry = self
            .plans
            .get_mut(&goal_id)
            .ok_or(ResumeError::UnknownPlan(goal_id))?;
        let token = entry
            .plan
            .resume_token
            .take()
            .ok_or(ResumeError::NoToken(goal_id))?;
        entry.awaiting_update = true;
        self.busy = true;
        Ok(token)
    }

    /// The submission round-trip finished (either way); the planner is
    /// free again. The plan stays locked until its next update.
    pub fn complete_submission(&mut self) {
        self.busy = false;
    }
}

/// The workflow engine's continuation endpoint. The token is replayed
/// verbatim — the bridge never looks inside it.
pub trait WorkflowApi: Send + Sync + 'static {
    fn resume(
        &self,
        goal_id: Uuid,
        token: ResumeToken,
    ) -> impl Future<Output = Result<(), ResumeError>> + Send;
}

/// Guard, submit, release: the one correct order for a resume.
pub async fn resume_plan<W: WorkflowApi>(
    bridge: &tokio::sync::Mutex<PlannerBridge>,
    api: &W,
    goal_id: Uuid,
) -> Result<(), ResumeError> {
    let token = bridge.lock().await.begin_resume(goal_id)?;
    let result = api.resume(goal_id, token).await;
    bridge.lock().await.complete_submission();
    result
}

// ───────────────────────────────────────────────────────────────────
// Assist surface
// ───────────────────────────────────────────────────────────────────

/// Suggestions for the active board, plus an optional spotlighted card.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssistResponse {
    pub suggestions: Vec<String>,
    pub spotlight: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub enum AssistError {
    Unavailable(String),
}

impl fmt::Display for AssistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(e) => write!(f, "assist endpoint unavailable: {e}"),
        }
    }
}

impl std::error::Error for AssistError {}

/// The assist/automation endpoint.
pub trait AssistApi: Send + Sync + 'static {
    fn suggestions(
        &self,
        board: Board,
    ) -> impl Future<Output = Result<AssistResponse, AssistError>> + Send;
}

// ===================================================================
// Tests
// ===================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::model::{PlanStage, StageState};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn plan(goal_id: Uuid, token: Option<ResumeToken>) -> PlannerPlan {
        PlannerPlan {
            goal_id,
            workflow_id: Uuid::new_v4(),
            status: PlanStatus::Paused,
            stages: vec![
                PlanStage {
                    name: "survey".into(),
                    state: StageState::Completed,
                },
                PlanStage {
                    name: "draft".into(),
                    state: StageState::Pending,
                },
            ],
            resume_token: token,
        }
    }

    #[test]
    fn test_gate_requires_token_and_free_planner() {
        let mut bridge = PlannerBridge::new();
        let goal = Uuid::new_v4();

        assert_eq!(bridge.resume_gate(goal), ResumeGate::UnknownPlan);

        bridge.upsert_plan(plan(goal, None));
        assert_eq!(bridge.resume_gate(goal), ResumeGate::NoToken);

        bridge.upsert_plan(plan(goal, Some(ResumeToken::from_bytes(vec![1]))));
        assert_eq!(bridge.resume_gate(goal), ResumeGate::Ready);

        bridge.set_busy(true);
        assert_eq!(bridge.resume_gate(goal), ResumeGate::PlannerBusy);
    }

    #[test]
    fn test_begin_resume_takes_token_once() {
        let mut bridge = PlannerBridge::new();
        let goal = Uuid::new_v4();
        bridge.upsert_plan(plan(goal, Some(ResumeToken::from_bytes(vec![9, 9]))));

        let token = bridge.begin_resume(goal).unwrap();
        assert_eq!(token.as_bytes(), &[9, 9]);
        assert!(bridge.is_busy());

        // Locked until the next plan update, even after the planner frees.
        bridge.complete_submission();
        assert_eq!(bridge.resume_gate(goal), ResumeGate::AwaitingUpdate);
        assert!(matches!(
            bridge.begin_resume(goal),
            Err(ResumeError::AwaitingUpdate(_))
        ));
    }

    #[test]
    fn test_plan_update_rearms_resume() {
        let mut bridge = PlannerBridge::new();
        let goal = Uuid::new_v4();
        bridge.upsert_plan(plan(goal, Some(ResumeToken::from_bytes(vec![1]))));
        bridge.begin_resume(goal).unwrap();
        bridge.complete_submission();

        // The next update carries a fresh token; resume is available again.
        bridge.upsert_plan(plan(goal, Some(ResumeToken::from_bytes(vec![2]))));
        assert_eq!(bridge.resume_gate(goal), ResumeGate::Ready);
        let token = bridge.begin_resume(goal).unwrap();
        assert_eq!(token.as_bytes(), &[2]);
    }

    #[test]
    fn test_single_flight_across_plans() {
        let mut bridge = PlannerBridge::new();
        let (goal_a, goal_b) = (Uuid::new_v4(), Uuid::new_v4());
        bridge.upsert_plan(plan(goal_a, Some(ResumeToken::from_bytes(vec![1]))));
        bridge.upsert_plan(plan(goal_b, Some(ResumeToken::from_bytes(vec![2]))));

        bridge.begin_resume(goal_a).unwrap();
        // The global flag blocks the second plan too.
        assert!(matches!(
            bridge.begin_resume(goal_b),
            Err(ResumeError::PlannerBusy)
        ));
    }

    #[test]
    fn test_active_plans_filter() {
        let mut bridge = PlannerBridge::new();
        let running = Uuid::new_v4();
        let done = Uuid::new_v4();

        let mut p = plan(running, None);
        p.status = PlanStatus::Running;
        bridge.upsert_plan(p);

        let mut p = plan(done, None);
        p.status = PlanStatus::Completed;
        bridge.upsert_plan(p);

        let active = bridge.active_plans();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].goal_id, running);
    }

    struct CountingWorkflow {
        calls: AtomicUsize,
        accept: bool,
    }

    impl WorkflowApi for CountingWorkflow {
        fn resume(
            &self,
            _goal_id: Uuid,
            token: ResumeToken,
        ) -> impl Future<Output = Result<(), ResumeError>> + Send {
            let accept = self.accept;
            self.calls.fetch_add(1, Ordering::SeqCst);
            async move {
                // The token arrives intact, still opaque.
                assert!(!token.as_bytes().is_empty());
                if accept {
                    Ok(())
                } else {
                    Err(ResumeError::Rejected("stale continuation".into()))
                }
            }
        }
    }

    #[tokio::test]
    async fn test_resume_plan_roundtrip() {
        let bridge = tokio::sync::Mutex::new(PlannerBridge::new());
        let goal = Uuid::new_v4();
        bridge
            .lock()
            .await
            .upsert_plan(plan(goal, Some(ResumeToken::from_bytes(vec![7]))));

        let api = Arc::new(CountingWorkflow {
            calls: AtomicUsize::new(0),
            accept: true,
        });
        resume_plan(&bridge, api.as_ref(), goal).await.unwrap();
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        let b = bridge.lock().await;
        // Planner freed, plan locked until its next update.
        assert!(!b.is_busy());
        assert_eq!(b.resume_gate(goal), ResumeGate::AwaitingUpdate);
    }

    #[tokio::test]
    async fn test_resume_plan_rejection_frees_planner() {
        let bridge = tokio::sync::Mutex::new(PlannerBridge::new());
        let goal = Uuid::new_v4();
        bridge
            .lock()
            .await
            .upsert_plan(plan(goal, Some(ResumeToken::from_bytes(vec![7]))));

        let api = CountingWorkflow {
            calls: AtomicUsize::new(0),
            accept: false,
        };
        let err = resume_plan(&bridge, &api, goal).await.unwrap_err();
        assert!(matches!(err, ResumeError::Rejected(_)));
        assert!(!bridge.lock().await.is_busy());
    }
}
