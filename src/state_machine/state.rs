//! Conversation state types

use crate::db::{ExerciseId, ExerciseRef, PlanId, PlanSummary, ProfileField, UserId};
use crate::metrics::{ActivityLevel, Gender};
use serde::{Deserialize, Serialize};

// ============================================================================
// Flow Steps - scratch data lives in the step that needs it
// ============================================================================

/// Registration collects six fields in a fixed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum RegistrationStep {
    Weight,
    Height {
        weight: f64,
    },
    Age {
        weight: f64,
        height: u32,
    },
    Gender {
        weight: f64,
        height: u32,
        age: u32,
    },
    ActivityLevel {
        weight: f64,
        height: u32,
        age: u32,
        gender: Gender,
    },
    Target {
        weight: f64,
        height: u32,
        age: u32,
        gender: Gender,
        activity_level: ActivityLevel,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PlanCreationStep {
    PlanName,
    MuscleGroup {
        plan_id: PlanId,
        /// Set when entered from the plan edit menu; adding an exercise
        /// returns there instead of the add-more loop
        #[serde(default)]
        editing: bool,
    },
    ExerciseSelection {
        plan_id: PlanId,
        #[serde(default)]
        editing: bool,
        group: String,
        exercises: Vec<ExerciseRef>,
    },
    AddMoreExercises {
        plan_id: PlanId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PlanEditingStep {
    ActionMenu,
    Renaming,
    RemovingExercise { exercises: Vec<ExerciseRef> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum LogProgressStep {
    PlanSelection { plans: Vec<PlanSummary> },
    ExerciseSelection { exercises: Vec<ExerciseRef> },
    LogDetails { exercise_id: ExerciseId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ViewProgressStep {
    PlanSelection {
        plans: Vec<PlanSummary>,
    },
    ExerciseSelection {
        exercises: Vec<ExerciseRef>,
    },
    /// Revisitable: period filters re-render without leaving this step
    FilterDisplay {
        exercise_id: ExerciseId,
        exercise_name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ProfileEditingStep {
    ChooseField,
    Editing { field: ProfileField },
}

// ============================================================================
// Conversation State
// ============================================================================

/// Per-user conversation state: the active flow and its typed step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "flow", rename_all = "snake_case")]
#[derive(Default)]
pub enum ConvState {
    /// No active flow
    #[default]
    Idle,

    Registration { step: RegistrationStep },

    PlanCreation { step: PlanCreationStep },

    PlanEditing {
        plan_id: PlanId,
        step: PlanEditingStep,
    },

    LogProgress { step: LogProgressStep },

    ViewProgress { step: ViewProgressStep },

    ProfileEditing { step: ProfileEditingStep },
}

impl ConvState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ConvState::Idle)
    }

    /// Flow name as used in logs and API responses
    pub fn flow_name(&self) -> &'static str {
        match self {
            ConvState::Idle => "idle",
            ConvState::Registration { .. } => "registration",
            ConvState::PlanCreation { .. } => "plan_creation",
            ConvState::PlanEditing { .. } => "plan_editing",
            ConvState::LogProgress { .. } => "log_progress",
            ConvState::ViewProgress { .. } => "view_progress",
            ConvState::ProfileEditing { .. } => "profile_editing",
        }
    }

    pub fn step_name(&self) -> Option<&'static str> {
        let name = match self {
            ConvState::Idle => return None,
            ConvState::Registration { step } => match step {
                RegistrationStep::Weight => "weight",
                RegistrationStep::Height { .. } => "height",
                RegistrationStep::Age { .. } => "age",
                RegistrationStep::Gender { .. } => "gender",
                RegistrationStep::ActivityLevel { .. } => "activity_level",
                RegistrationStep::Target { .. } => "target",
            },
            ConvState::PlanCreation { step } => match step {
                PlanCreationStep::PlanName => "plan_name",
                PlanCreationStep::MuscleGroup { .. } => "muscle_group",
                PlanCreationStep::ExerciseSelection { .. } => "exercise_selection",
                PlanCreationStep::AddMoreExercises { .. } => "add_more_exercises",
            },
            ConvState::PlanEditing { step, .. } => match step {
                PlanEditingStep::ActionMenu => "edit_action_menu",
                PlanEditingStep::Renaming => "renaming_plan",
                PlanEditingStep::RemovingExercise { .. } => "removing_exercise",
            },
            ConvState::LogProgress { step } => match step {
                LogProgressStep::PlanSelection { .. } => "plan_selection",
                LogProgressStep::ExerciseSelection { .. } => "exercise_selection",
                LogProgressStep::LogDetails { .. } => "log_details",
            },
            ConvState::ViewProgress { step } => match step {
                ViewProgressStep::PlanSelection { .. } => "plan_selection",
                ViewProgressStep::ExerciseSelection { .. } => "exercise_selection",
                ViewProgressStep::FilterDisplay { .. } => "filter_display",
            },
            ConvState::ProfileEditing { step } => match step {
                ProfileEditingStep::ChooseField => "choose_field",
                ProfileEditingStep::Editing { .. } => "editing",
            },
        };
        Some(name)
    }
}

/// Context for a conversation (immutable for the runtime's lifetime)
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub user_id: UserId,
    /// Muscle groups offered in the plan-building menus
    pub muscle_groups: Vec<String>,
}

impl ConvContext {
    pub fn new(user_id: UserId, muscle_groups: Vec<String>) -> Self {
        Self {
            user_id,
            muscle_groups,
        }
    }
}
