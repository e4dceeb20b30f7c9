//! Events that can occur in a conversation

use crate::db::{
    ExerciseId, ExerciseRef, Period, PlanId, PlanSummary, ProfileField, ProgressLog, UserProfile,
};
use crate::metrics::{ActivityLevel, Gender, Goal};
use serde::{Deserialize, Serialize};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Transport events
    Command(Command),
    Text {
        text: String,
    },
    Choice(Choice),

    // Effect outcomes
    ProfileLoaded {
        purpose: ProfilePurpose,
        profile: Option<UserProfile>,
    },
    PlansLoaded {
        purpose: PlansPurpose,
        plans: Vec<PlanSummary>,
    },
    PlanLoaded {
        purpose: PlanPurpose,
        /// `None` when the plan is gone or owned by someone else
        plan: Option<PlanSummary>,
    },
    PlanCreated {
        plan_id: PlanId,
        name: String,
    },
    PlanNameTaken {
        name: String,
    },
    PlanRenamed {
        name: String,
    },
    GroupExercisesLoaded {
        group: String,
        exercises: Vec<ExerciseRef>,
    },
    ExerciseAttached,
    ExerciseDefaultsMissing {
        exercise_id: ExerciseId,
    },
    PlanExercisesLoaded {
        purpose: PlanExercisesPurpose,
        exercises: Vec<ExerciseRef>,
    },
    ProgressLoaded {
        exercise_id: ExerciseId,
        exercise_name: String,
        period: Period,
        /// First render on entering the display step
        initial: bool,
        logs: Vec<ProgressLog>,
    },
}

impl Event {
    /// Whether this event came from the transport rather than an effect
    pub fn is_inbound(&self) -> bool {
        matches!(self, Event::Command(_) | Event::Text { .. } | Event::Choice(_))
    }
}

/// Commands available from any state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Start,
    Plan,
    Log,
    Calories,
    Profile,
    Help,
    Cancel,
}

impl Command {
    /// Decode a slash command or a main-menu label
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let command = match text {
            "/start" => Command::Start,
            "/plan" | "Plans" => Command::Plan,
            "/log" | "Progress" => Command::Log,
            "/calories" | "Calories" => Command::Calories,
            "/profile" | "Profile" => Command::Profile,
            "/help" | "Help" => Command::Help,
            "/cancel" => Command::Cancel,
            _ => return None,
        };
        Some(command)
    }
}

/// Menu selections. Decoded once at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Choice {
    // Accepted in any state
    StartRegistration,
    ViewPlan { plan_id: PlanId },
    EditPlan { plan_id: PlanId },
    DeletePlan { plan_id: PlanId },
    CreatePlan,
    BackToPlans,
    ViewProgress,
    EditProfile,
    ResetProfile,
    EditField { field: ProfileField },
    BackToProfile,

    // Scoped to a step
    Gender { gender: Gender },
    ActivityLevel { level: ActivityLevel },
    Goal { goal: Goal },
    MuscleGroup { group: String },
    FinishExercises,
    Exercise { exercise_id: ExerciseId },
    AnotherGroup,
    AddMoreExercises,
    FinishPlan,
    EditAction { action: EditAction },
    Plan { plan_id: PlanId },
    ProgressFilter { period: Period },
}

impl Choice {
    /// Global choices reset the session and act regardless of the current step
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            Choice::StartRegistration
                | Choice::ViewPlan { .. }
                | Choice::EditPlan { .. }
                | Choice::DeletePlan { .. }
                | Choice::CreatePlan
                | Choice::BackToPlans
                | Choice::ViewProgress
                | Choice::EditProfile
                | Choice::ResetProfile
                | Choice::EditField { .. }
                | Choice::BackToProfile
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    Rename,
    AddExercise,
    RemoveExercise,
}

/// Why a profile was loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfilePurpose {
    Greeting,
    Show { notice: Option<String> },
    Calories,
}

/// Why the user's plan list was loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlansPurpose {
    /// `/plan`: an empty list starts plan creation
    Manage,
    /// Re-render the list, optionally prefixed with a notice
    Browse { notice: Option<String> },
    Logging,
    Viewing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanPurpose {
    View,
    Edit,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanExercisesPurpose {
    Logging,
    Viewing,
    Removal,
}
