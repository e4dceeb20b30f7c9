//! Effects produced by state transitions

use super::event::{PlanExercisesPurpose, PlanPurpose, PlansPurpose, ProfilePurpose};
use crate::db::{ExerciseId, Period, PlanId, ProfileUpdate, UserProfile};
use crate::render::Reply;

/// Effects to be executed after state transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Send a message (and optional menu) to the user
    Reply(Reply),

    /// Persist the new state; `Idle` removes the session
    PersistState,

    // Writes
    SaveProfile(UserProfile),
    UpdateProfile(ProfileUpdate),
    DeleteProfile,
    /// Yields `PlanCreated` or `PlanNameTaken`
    CreatePlan { name: String },
    /// Yields `PlanRenamed` or `PlanNameTaken`
    RenamePlan { plan_id: PlanId, name: String },
    DeletePlan { plan_id: PlanId },
    /// Attach with the catalog's default sets/reps. Yields `ExerciseAttached`
    /// or `ExerciseDefaultsMissing`
    AttachExercise {
        plan_id: PlanId,
        exercise_id: ExerciseId,
    },
    DetachExercise {
        plan_id: PlanId,
        exercise_id: ExerciseId,
    },
    /// Timestamped by the runtime at execution
    RecordProgress {
        exercise_id: ExerciseId,
        weight: f64,
        sets: u32,
        reps: String,
    },

    // Loads, each answered by the matching `*Loaded` event
    LoadProfile { purpose: ProfilePurpose },
    LoadPlans { purpose: PlansPurpose },
    LoadPlan {
        plan_id: PlanId,
        purpose: PlanPurpose,
    },
    LoadGroupExercises { group: String },
    LoadPlanExercises {
        plan_id: PlanId,
        purpose: PlanExercisesPurpose,
    },
    /// The name rides along so the reply needs no catalog lookup
    LoadProgress {
        exercise_id: ExerciseId,
        exercise_name: String,
        period: Period,
        initial: bool,
    },

    /// Render a plan's exercises with its target sets/reps
    ShowPlanDetails { plan_id: PlanId, name: String },
}

impl Effect {
    pub fn reply(reply: Reply) -> Self {
        Effect::Reply(reply)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Effect::Reply(Reply::text(text))
    }
}
