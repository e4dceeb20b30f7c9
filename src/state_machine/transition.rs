//! Pure state transition function
//!
//! Every inbound event is matched against the current `(flow, step)`.
//! Validation failures keep the state and re-prompt; accepted input either
//! advances with a prompt or completes the flow with its write effects.

use super::event::{
    Choice, Command, EditAction, PlanExercisesPurpose, PlanPurpose, PlansPurpose, ProfilePurpose,
};
use super::state::{
    LogProgressStep, PlanCreationStep, PlanEditingStep, ProfileEditingStep, RegistrationStep,
    ViewProgressStep,
};
use super::{ConvContext, ConvState, Effect, Event};
use crate::db::{ExerciseId, ExerciseRef, Period, ProfileField, ProfileUpdate, UserProfile};
use crate::metrics::{self, ActivityLevel, Gender, Goal};
use crate::render::{self, Reply};
use thiserror::Error;

const WEIGHT_RANGE: (f64, f64) = (20.0, 300.0);
const HEIGHT_RANGE: (u32, u32) = (100, 250);
const AGE_RANGE: (u32, u32) = (12, 100);

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs. Effects are
/// executed by the runtime, which feeds their outcomes back in as events.
pub fn transition(
    state: &ConvState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match event {
        Event::Command(command) => Ok(handle_command(state, command)),
        Event::Choice(choice) if choice.is_global() => Ok(handle_global_choice(state, choice)),
        Event::Choice(choice) => Ok(handle_scoped_choice(state, context, choice)),
        Event::Text { text } => Ok(handle_text(state, context, &text)),
        outcome => handle_outcome(state, context, outcome),
    }
}

// ============================================================================
// Result builders
// ============================================================================

/// Explicit clear-then-set: the prior session is discarded before `next`
fn restart(prior: &ConvState, next: ConvState) -> TransitionResult {
    let persist = !(prior.is_idle() && next.is_idle());
    let result = TransitionResult::new(next);
    if persist {
        result.with_effect(Effect::PersistState)
    } else {
        result
    }
}

fn advance(next: ConvState, reply: Reply) -> TransitionResult {
    TransitionResult::new(next)
        .with_effect(Effect::PersistState)
        .with_effect(Effect::reply(reply))
}

fn stay(state: &ConvState, reply: Reply) -> TransitionResult {
    TransitionResult::new(state.clone()).with_effect(Effect::reply(reply))
}

fn reprompt(state: &ConvState, context: &ConvContext, error: &str) -> TransitionResult {
    stay(state, render::reprompt(error, state, context))
}

fn unexpected(state: &ConvState, event: &Event) -> TransitionError {
    TransitionError::InvalidTransition(format!(
        "{event:?} in {}/{}",
        state.flow_name(),
        state.step_name().unwrap_or("-")
    ))
}

// ============================================================================
// Commands and global choices
// ============================================================================

fn handle_command(state: &ConvState, command: Command) -> TransitionResult {
    match command {
        Command::Start => restart(state, ConvState::Idle).with_effect(Effect::LoadProfile {
            purpose: ProfilePurpose::Greeting,
        }),
        Command::Plan => restart(state, ConvState::Idle).with_effect(Effect::LoadPlans {
            purpose: PlansPurpose::Manage,
        }),
        Command::Log => restart(state, ConvState::Idle).with_effect(Effect::LoadPlans {
            purpose: PlansPurpose::Logging,
        }),
        Command::Calories => restart(state, ConvState::Idle).with_effect(Effect::LoadProfile {
            purpose: ProfilePurpose::Calories,
        }),
        Command::Profile => restart(state, ConvState::Idle).with_effect(Effect::LoadProfile {
            purpose: ProfilePurpose::Show { notice: None },
        }),
        Command::Help => {
            restart(state, ConvState::Idle).with_effect(Effect::reply(render::help()))
        }
        Command::Cancel => {
            let text = if state.is_idle() {
                "Nothing to cancel."
            } else {
                "Cancelled."
            };
            restart(state, ConvState::Idle)
                .with_effect(Effect::reply(Reply::with_menu(text, render::main_menu())))
        }
    }
}

fn handle_global_choice(state: &ConvState, choice: Choice) -> TransitionResult {
    match choice {
        Choice::StartRegistration => restart(
            state,
            ConvState::Registration {
                step: RegistrationStep::Weight,
            },
        )
        .with_effect(Effect::reply(render::weight_prompt())),

        Choice::ViewPlan { plan_id } => {
            restart(state, ConvState::Idle).with_effect(Effect::LoadPlan {
                plan_id,
                purpose: PlanPurpose::View,
            })
        }
        Choice::EditPlan { plan_id } => {
            restart(state, ConvState::Idle).with_effect(Effect::LoadPlan {
                plan_id,
                purpose: PlanPurpose::Edit,
            })
        }
        Choice::DeletePlan { plan_id } => {
            restart(state, ConvState::Idle).with_effect(Effect::LoadPlan {
                plan_id,
                purpose: PlanPurpose::Delete,
            })
        }
        Choice::CreatePlan => restart(
            state,
            ConvState::PlanCreation {
                step: PlanCreationStep::PlanName,
            },
        )
        .with_effect(Effect::reply(render::plan_name_prompt())),
        Choice::BackToPlans => restart(state, ConvState::Idle).with_effect(Effect::LoadPlans {
            purpose: PlansPurpose::Browse { notice: None },
        }),

        Choice::ViewProgress => restart(state, ConvState::Idle).with_effect(Effect::LoadPlans {
            purpose: PlansPurpose::Viewing,
        }),

        Choice::EditProfile => restart(
            state,
            ConvState::ProfileEditing {
                step: ProfileEditingStep::ChooseField,
            },
        )
        .with_effect(Effect::reply(render::choose_field())),
        Choice::EditField { field } => restart(
            state,
            ConvState::ProfileEditing {
                step: ProfileEditingStep::Editing { field },
            },
        )
        .with_effect(Effect::reply(render::field_prompt(field))),
        Choice::BackToProfile => {
            restart(state, ConvState::Idle).with_effect(Effect::LoadProfile {
                purpose: ProfilePurpose::Show { notice: None },
            })
        }
        Choice::ResetProfile => restart(state, ConvState::Idle)
            .with_effect(Effect::DeleteProfile)
            .with_effect(Effect::text(
                "Your profile has been reset. Use /start to register again.",
            )),

        scoped => {
            debug_assert!(!scoped.is_global());
            TransitionResult::new(state.clone())
        }
    }
}

// ============================================================================
// Free text
// ============================================================================

fn handle_text(state: &ConvState, context: &ConvContext, text: &str) -> TransitionResult {
    match state {
        ConvState::Idle => stay(
            state,
            Reply::with_menu(
                "I didn't understand that. Use the menu or /help.",
                render::main_menu(),
            ),
        ),

        ConvState::Registration { step } => registration_text(state, context, step, text),

        ConvState::PlanCreation {
            step: PlanCreationStep::PlanName,
        } => match non_empty(text) {
            Some(name) => TransitionResult::new(state.clone()).with_effect(Effect::CreatePlan {
                name: name.to_string(),
            }),
            None => reprompt(state, context, "The plan name cannot be empty."),
        },

        ConvState::PlanEditing {
            plan_id,
            step: PlanEditingStep::Renaming,
        } => match non_empty(text) {
            Some(name) => TransitionResult::new(state.clone()).with_effect(Effect::RenamePlan {
                plan_id: *plan_id,
                name: name.to_string(),
            }),
            None => reprompt(state, context, "The plan name cannot be empty."),
        },

        ConvState::LogProgress {
            step: LogProgressStep::LogDetails { exercise_id },
        } => match parse_log_entry(text) {
            Some(entry) => TransitionResult::new(ConvState::Idle)
                .with_effect(Effect::RecordProgress {
                    exercise_id: *exercise_id,
                    weight: entry.weight,
                    sets: entry.sets,
                    reps: entry.reps,
                })
                .with_effect(Effect::PersistState)
                .with_effect(Effect::reply(Reply::with_menu(
                    "Progress recorded!",
                    render::main_menu(),
                ))),
            None => reprompt(state, context, render::invalid_log_entry()),
        },

        ConvState::ProfileEditing {
            step: ProfileEditingStep::Editing { field },
        } => match parse_field_value(*field, text) {
            Ok(update) => complete_field_edit(update),
            Err(error) => reprompt(state, context, error),
        },

        // Menu-driven steps
        ConvState::PlanCreation { .. }
        | ConvState::PlanEditing { .. }
        | ConvState::LogProgress { .. }
        | ConvState::ViewProgress { .. }
        | ConvState::ProfileEditing { .. } => {
            reprompt(state, context, render::invalid_choice())
        }
    }
}

fn registration_text(
    state: &ConvState,
    context: &ConvContext,
    step: &RegistrationStep,
    text: &str,
) -> TransitionResult {
    match *step {
        RegistrationStep::Weight => match parse_weight(text) {
            Some(weight) => advance(
                ConvState::Registration {
                    step: RegistrationStep::Height { weight },
                },
                render::height_prompt(),
            ),
            None => reprompt(state, context, render::invalid_weight()),
        },
        RegistrationStep::Height { weight } => match parse_height(text) {
            Some(height) => advance(
                ConvState::Registration {
                    step: RegistrationStep::Age { weight, height },
                },
                render::age_prompt(),
            ),
            None => reprompt(state, context, render::invalid_height()),
        },
        RegistrationStep::Age { weight, height } => match parse_age(text) {
            Some(age) => advance(
                ConvState::Registration {
                    step: RegistrationStep::Gender {
                        weight,
                        height,
                        age,
                    },
                },
                render::gender_prompt(),
            ),
            None => reprompt(state, context, render::invalid_age()),
        },
        RegistrationStep::Gender { .. } => match Gender::from_label(text) {
            Some(gender) => accept_registration_choice(state, context, Choice::Gender { gender }),
            None => reprompt(state, context, render::invalid_choice()),
        },
        RegistrationStep::ActivityLevel { .. } => match ActivityLevel::from_label(text) {
            Some(level) => {
                accept_registration_choice(state, context, Choice::ActivityLevel { level })
            }
            None => reprompt(state, context, render::invalid_choice()),
        },
        RegistrationStep::Target { .. } => match Goal::from_label(text) {
            Some(goal) => accept_registration_choice(state, context, Choice::Goal { goal }),
            None => reprompt(state, context, render::invalid_choice()),
        },
    }
}

/// Menu-constrained registration steps; text labels are decoded into the
/// same choices before reaching here
fn accept_registration_choice(
    state: &ConvState,
    context: &ConvContext,
    choice: Choice,
) -> TransitionResult {
    let ConvState::Registration { step } = state else {
        return reprompt(state, context, render::invalid_choice());
    };

    match (step.clone(), choice) {
        (
            RegistrationStep::Gender {
                weight,
                height,
                age,
            },
            Choice::Gender { gender },
        ) => advance(
            ConvState::Registration {
                step: RegistrationStep::ActivityLevel {
                    weight,
                    height,
                    age,
                    gender,
                },
            },
            render::activity_prompt(),
        ),

        (
            RegistrationStep::ActivityLevel {
                weight,
                height,
                age,
                gender,
            },
            Choice::ActivityLevel { level },
        ) => advance(
            ConvState::Registration {
                step: RegistrationStep::Target {
                    weight,
                    height,
                    age,
                    gender,
                    activity_level: level,
                },
            },
            render::target_prompt(metrics::bmi(weight, height)),
        ),

        (
            RegistrationStep::Target {
                weight,
                height,
                age,
                gender,
                activity_level,
            },
            Choice::Goal { goal },
        ) => {
            let profile = UserProfile {
                user_id: context.user_id,
                weight,
                height,
                age,
                gender,
                activity_level,
                goal,
            };
            TransitionResult::new(ConvState::Idle)
                .with_effect(Effect::SaveProfile(profile))
                .with_effect(Effect::PersistState)
                .with_effect(Effect::reply(Reply::with_menu(
                    "Registration complete! Choose what to do next:",
                    render::main_menu(),
                )))
        }

        _ => reprompt(state, context, render::invalid_choice()),
    }
}

fn complete_field_edit(update: ProfileUpdate) -> TransitionResult {
    let notice = render::field_updated(update.field());
    TransitionResult::new(ConvState::Idle).with_effects([
        Effect::UpdateProfile(update),
        Effect::PersistState,
        Effect::LoadProfile {
            purpose: ProfilePurpose::Show {
                notice: Some(notice),
            },
        },
    ])
}

// ============================================================================
// Scoped choices
// ============================================================================

fn handle_scoped_choice(
    state: &ConvState,
    context: &ConvContext,
    choice: Choice,
) -> TransitionResult {
    match (state, choice) {
        // Registration
        (
            ConvState::Registration { .. },
            choice @ (Choice::Gender { .. } | Choice::ActivityLevel { .. } | Choice::Goal { .. }),
        ) => accept_registration_choice(state, context, choice),

        // Plan creation
        (
            ConvState::PlanCreation {
                step: PlanCreationStep::MuscleGroup { .. },
            },
            Choice::MuscleGroup { group },
        ) => TransitionResult::new(state.clone()).with_effect(Effect::LoadGroupExercises { group }),

        (
            ConvState::PlanCreation {
                step: PlanCreationStep::MuscleGroup { editing, .. },
            },
            Choice::FinishExercises,
        ) => {
            let text = if *editing {
                "Changes saved!"
            } else {
                "Plan saved!"
            };
            advance(
                ConvState::Idle,
                Reply::with_menu(text, render::main_menu()),
            )
        }

        (
            ConvState::PlanCreation {
                step: PlanCreationStep::ExerciseSelection {
                    plan_id, editing, ..
                },
            },
            Choice::AnotherGroup,
        ) => advance(
            ConvState::PlanCreation {
                step: PlanCreationStep::MuscleGroup {
                    plan_id: *plan_id,
                    editing: *editing,
                },
            },
            render::choose_group(&context.muscle_groups),
        ),

        (
            ConvState::PlanCreation {
                step: PlanCreationStep::ExerciseSelection {
                    plan_id, exercises, ..
                },
            },
            Choice::Exercise { exercise_id },
        ) if listed(exercises, exercise_id) => {
            TransitionResult::new(state.clone()).with_effect(Effect::AttachExercise {
                plan_id: *plan_id,
                exercise_id,
            })
        }

        (
            ConvState::PlanCreation {
                step: PlanCreationStep::AddMoreExercises { plan_id },
            },
            Choice::AddMoreExercises,
        ) => advance(
            ConvState::PlanCreation {
                step: PlanCreationStep::MuscleGroup {
                    plan_id: *plan_id,
                    editing: false,
                },
            },
            render::choose_group(&context.muscle_groups),
        ),

        (
            ConvState::PlanCreation {
                step: PlanCreationStep::AddMoreExercises { .. },
            },
            Choice::FinishPlan,
        ) => advance(
            ConvState::Idle,
            Reply::with_menu("Plan saved!", render::main_menu()),
        ),

        // Plan editing
        (
            ConvState::PlanEditing {
                plan_id,
                step: PlanEditingStep::ActionMenu,
            },
            Choice::EditAction { action },
        ) => match action {
            EditAction::Rename => advance(
                ConvState::PlanEditing {
                    plan_id: *plan_id,
                    step: PlanEditingStep::Renaming,
                },
                Reply::text("Enter a new name for the plan:"),
            ),
            EditAction::AddExercise => advance(
                ConvState::PlanCreation {
                    step: PlanCreationStep::MuscleGroup {
                        plan_id: *plan_id,
                        editing: true,
                    },
                },
                render::choose_group(&context.muscle_groups),
            ),
            EditAction::RemoveExercise => {
                TransitionResult::new(state.clone()).with_effect(Effect::LoadPlanExercises {
                    plan_id: *plan_id,
                    purpose: PlanExercisesPurpose::Removal,
                })
            }
        },

        (
            ConvState::PlanEditing {
                plan_id,
                step: PlanEditingStep::RemovingExercise { exercises },
            },
            Choice::Exercise { exercise_id },
        ) if listed(exercises, exercise_id) => TransitionResult::new(ConvState::PlanEditing {
            plan_id: *plan_id,
            step: PlanEditingStep::ActionMenu,
        })
        .with_effects([
            Effect::DetachExercise {
                plan_id: *plan_id,
                exercise_id,
            },
            Effect::PersistState,
            Effect::reply(Reply::with_menu(
                "Exercise removed.",
                render::edit_plan_menu(),
            )),
        ]),

        // Progress logging
        (
            ConvState::LogProgress {
                step: LogProgressStep::PlanSelection { plans },
            },
            Choice::Plan { plan_id },
        ) if plans.iter().any(|plan| plan.id == plan_id) => {
            TransitionResult::new(state.clone()).with_effect(Effect::LoadPlanExercises {
                plan_id,
                purpose: PlanExercisesPurpose::Logging,
            })
        }

        (
            ConvState::LogProgress {
                step: LogProgressStep::ExerciseSelection { exercises },
            },
            Choice::Exercise { exercise_id },
        ) if listed(exercises, exercise_id) => advance(
            ConvState::LogProgress {
                step: LogProgressStep::LogDetails { exercise_id },
            },
            render::log_details_prompt(),
        ),

        // Progress viewing
        (
            ConvState::ViewProgress {
                step: ViewProgressStep::PlanSelection { plans },
            },
            Choice::Plan { plan_id },
        ) if plans.iter().any(|plan| plan.id == plan_id) => {
            TransitionResult::new(state.clone()).with_effect(Effect::LoadPlanExercises {
                plan_id,
                purpose: PlanExercisesPurpose::Viewing,
            })
        }

        (
            ConvState::ViewProgress {
                step: ViewProgressStep::ExerciseSelection { exercises },
            },
            Choice::Exercise { exercise_id },
        ) if listed(exercises, exercise_id) => {
            TransitionResult::new(state.clone()).with_effect(Effect::LoadProgress {
                exercise_id,
                exercise_name: listed_name(exercises, exercise_id),
                period: Period::All,
                initial: true,
            })
        }

        (
            ConvState::ViewProgress {
                step:
                    ViewProgressStep::FilterDisplay {
                        exercise_id,
                        exercise_name,
                    },
            },
            Choice::ProgressFilter { period },
        ) => TransitionResult::new(state.clone()).with_effect(Effect::LoadProgress {
            exercise_id: *exercise_id,
            exercise_name: exercise_name.clone(),
            period,
            initial: false,
        }),

        // A filter without a progress view behind it is a broken session
        (_, Choice::ProgressFilter { .. }) => {
            restart(state, ConvState::Idle).with_effect(Effect::reply(Reply::with_menu(
                "This progress view is no longer available. Use /log to start again.",
                render::main_menu(),
            )))
        }

        // Profile editing
        (
            ConvState::ProfileEditing {
                step: ProfileEditingStep::Editing { field },
            },
            choice,
        ) => match (*field, choice) {
            (ProfileField::Gender, Choice::Gender { gender }) => {
                complete_field_edit(ProfileUpdate::Gender(gender))
            }
            (ProfileField::ActivityLevel, Choice::ActivityLevel { level }) => {
                complete_field_edit(ProfileUpdate::ActivityLevel(level))
            }
            (ProfileField::Goal, Choice::Goal { goal }) => {
                complete_field_edit(ProfileUpdate::Goal(goal))
            }
            _ => reprompt(state, context, render::invalid_choice()),
        },

        (ConvState::Idle, _) => stay(
            state,
            Reply::with_menu(
                "This option is no longer available.",
                render::main_menu(),
            ),
        ),

        _ => reprompt(state, context, render::invalid_choice()),
    }
}

fn listed(exercises: &[ExerciseRef], exercise_id: ExerciseId) -> bool {
    exercises.iter().any(|exercise| exercise.id == exercise_id)
}

fn listed_name(exercises: &[ExerciseRef], exercise_id: ExerciseId) -> String {
    exercises
        .iter()
        .find(|exercise| exercise.id == exercise_id)
        .map(|exercise| exercise.name.clone())
        .unwrap_or_default()
}

// ============================================================================
// Effect outcomes
// ============================================================================

fn handle_outcome(
    state: &ConvState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    let result = match (state, event) {
        // Profile reads
        (ConvState::Idle, Event::ProfileLoaded { purpose, profile }) => {
            let reply = match (purpose, profile) {
                (ProfilePurpose::Greeting, profile) => render::greeting(profile.as_ref()),
                (ProfilePurpose::Show { notice }, Some(profile)) => {
                    render::profile(&profile, notice.as_deref())
                }
                (ProfilePurpose::Calories, Some(profile)) => render::calories(&profile),
                (_, None) => render::not_registered(),
            };
            stay(state, reply)
        }

        // Plan lists
        (ConvState::Idle, Event::PlansLoaded { purpose, plans }) => match purpose {
            PlansPurpose::Manage if plans.is_empty() => advance(
                ConvState::PlanCreation {
                    step: PlanCreationStep::PlanName,
                },
                render::first_plan_prompt(),
            ),
            PlansPurpose::Manage => stay(state, render::plan_list(&plans, None)),
            PlansPurpose::Browse { notice } => {
                stay(state, render::plan_list(&plans, notice.as_deref()))
            }
            PlansPurpose::Logging | PlansPurpose::Viewing if plans.is_empty() => stay(
                state,
                Reply::with_menu(
                    "You have no workout plans yet. Create one with /plan first.",
                    render::main_menu(),
                ),
            ),
            PlansPurpose::Logging => advance(
                ConvState::LogProgress {
                    step: LogProgressStep::PlanSelection {
                        plans: plans.clone(),
                    },
                },
                render::log_plan_prompt(&plans),
            ),
            PlansPurpose::Viewing => advance(
                ConvState::ViewProgress {
                    step: ViewProgressStep::PlanSelection {
                        plans: plans.clone(),
                    },
                },
                render::view_plan_prompt(&plans),
            ),
        },

        // Single plan, ownership checked by the load
        (ConvState::Idle, Event::PlanLoaded { plan: None, .. }) => stay(
            state,
            Reply::with_menu("Plan not found.", render::main_menu()),
        ),
        (
            ConvState::Idle,
            Event::PlanLoaded {
                purpose,
                plan: Some(plan),
            },
        ) => match purpose {
            PlanPurpose::View => {
                TransitionResult::new(ConvState::Idle).with_effect(Effect::ShowPlanDetails {
                    plan_id: plan.id,
                    name: plan.name,
                })
            }
            PlanPurpose::Edit => advance(
                ConvState::PlanEditing {
                    plan_id: plan.id,
                    step: PlanEditingStep::ActionMenu,
                },
                render::edit_plan_prompt(&plan.name),
            ),
            PlanPurpose::Delete => TransitionResult::new(ConvState::Idle).with_effects([
                Effect::DeletePlan { plan_id: plan.id },
                Effect::LoadPlans {
                    purpose: PlansPurpose::Browse {
                        notice: Some(format!("Plan '{}' deleted.", plan.name)),
                    },
                },
            ]),
        },

        // Plan naming
        (
            ConvState::PlanCreation {
                step: PlanCreationStep::PlanName,
            },
            Event::PlanCreated { plan_id, name },
        ) => advance(
            ConvState::PlanCreation {
                step: PlanCreationStep::MuscleGroup {
                    plan_id,
                    editing: false,
                },
            },
            render::plan_created(&name, &context.muscle_groups),
        ),
        (
            ConvState::PlanCreation {
                step: PlanCreationStep::PlanName,
            }
            | ConvState::PlanEditing {
                step: PlanEditingStep::Renaming,
                ..
            },
            Event::PlanNameTaken { name },
        ) => reprompt(
            state,
            context,
            &format!("You already have a plan named '{name}'. Choose another name."),
        ),
        (
            ConvState::PlanEditing {
                step: PlanEditingStep::Renaming,
                ..
            },
            Event::PlanRenamed { name },
        ) => TransitionResult::new(ConvState::Idle).with_effects([
            Effect::PersistState,
            Effect::LoadPlans {
                purpose: PlansPurpose::Browse {
                    notice: Some(format!("Plan renamed to '{name}'.")),
                },
            },
        ]),

        // Exercise selection
        (
            ConvState::PlanCreation {
                step: PlanCreationStep::MuscleGroup { plan_id, editing },
            },
            Event::GroupExercisesLoaded { group, exercises },
        ) => {
            if exercises.is_empty() {
                stay(state, render::empty_group(&group, &context.muscle_groups))
            } else {
                let reply = render::choose_exercise(&group, &exercises);
                advance(
                    ConvState::PlanCreation {
                        step: PlanCreationStep::ExerciseSelection {
                            plan_id: *plan_id,
                            editing: *editing,
                            group,
                            exercises,
                        },
                    },
                    reply,
                )
            }
        }
        (
            ConvState::PlanCreation {
                step: PlanCreationStep::ExerciseSelection {
                    plan_id, editing, ..
                },
            },
            Event::ExerciseAttached,
        ) => {
            if *editing {
                advance(
                    ConvState::PlanEditing {
                        plan_id: *plan_id,
                        step: PlanEditingStep::ActionMenu,
                    },
                    Reply::with_menu("Exercise added.", render::edit_plan_menu()),
                )
            } else {
                advance(
                    ConvState::PlanCreation {
                        step: PlanCreationStep::AddMoreExercises { plan_id: *plan_id },
                    },
                    Reply::with_menu(
                        "Exercise added. Add more or finish the plan?",
                        render::add_more_menu(),
                    ),
                )
            }
        }
        (
            ConvState::PlanCreation {
                step: PlanCreationStep::ExerciseSelection { exercises, .. },
            },
            Event::ExerciseDefaultsMissing { exercise_id },
        ) => {
            let name = exercises
                .iter()
                .find(|exercise| exercise.id == exercise_id)
                .map_or("That exercise", |exercise| exercise.name.as_str());
            reprompt(
                state,
                context,
                &format!("{name} is no longer available. Choose another one."),
            )
        }

        // Plan exercise lists
        (
            ConvState::PlanEditing {
                plan_id,
                step: PlanEditingStep::ActionMenu,
            },
            Event::PlanExercisesLoaded {
                purpose: PlanExercisesPurpose::Removal,
                exercises,
            },
        ) => {
            if exercises.is_empty() {
                stay(
                    state,
                    Reply::with_menu(
                        "This plan has no exercises to remove.",
                        render::edit_plan_menu(),
                    ),
                )
            } else {
                let reply = render::removal_prompt(*plan_id, &exercises);
                advance(
                    ConvState::PlanEditing {
                        plan_id: *plan_id,
                        step: PlanEditingStep::RemovingExercise { exercises },
                    },
                    reply,
                )
            }
        }
        (
            ConvState::LogProgress {
                step: LogProgressStep::PlanSelection { .. },
            },
            Event::PlanExercisesLoaded {
                purpose: PlanExercisesPurpose::Logging,
                exercises,
            },
        ) => {
            if exercises.is_empty() {
                advance(ConvState::Idle, empty_plan_reply())
            } else {
                let reply = render::log_exercise_prompt(&exercises);
                advance(
                    ConvState::LogProgress {
                        step: LogProgressStep::ExerciseSelection { exercises },
                    },
                    reply,
                )
            }
        }
        (
            ConvState::ViewProgress {
                step: ViewProgressStep::PlanSelection { .. },
            },
            Event::PlanExercisesLoaded {
                purpose: PlanExercisesPurpose::Viewing,
                exercises,
            },
        ) => {
            if exercises.is_empty() {
                advance(ConvState::Idle, empty_plan_reply())
            } else {
                let reply = render::view_exercise_prompt(&exercises);
                advance(
                    ConvState::ViewProgress {
                        step: ViewProgressStep::ExerciseSelection { exercises },
                    },
                    reply,
                )
            }
        }

        // Progress history
        (
            ConvState::ViewProgress {
                step: ViewProgressStep::ExerciseSelection { .. },
            },
            Event::ProgressLoaded {
                exercise_id,
                exercise_name,
                initial: true,
                logs,
                ..
            },
        ) => {
            if logs.is_empty() {
                advance(
                    ConvState::Idle,
                    Reply::with_menu(
                        format!("No records for '{exercise_name}' yet."),
                        render::main_menu(),
                    ),
                )
            } else {
                let reply = render::progress(&exercise_name, None, &logs);
                advance(
                    ConvState::ViewProgress {
                        step: ViewProgressStep::FilterDisplay {
                            exercise_id,
                            exercise_name,
                        },
                    },
                    reply,
                )
            }
        }
        (
            ConvState::ViewProgress {
                step: ViewProgressStep::FilterDisplay { .. },
            },
            Event::ProgressLoaded {
                exercise_name,
                period,
                initial: false,
                logs,
                ..
            },
        ) => {
            let reply = if logs.is_empty() {
                render::no_progress_in_period(&exercise_name)
            } else {
                render::progress(&exercise_name, Some(period), &logs)
            };
            stay(state, reply)
        }

        (state, event) => return Err(unexpected(state, &event)),
    };
    Ok(result)
}

fn empty_plan_reply() -> Reply {
    Reply::with_menu(
        "This plan has no exercises yet. Add some with /plan first.",
        render::main_menu(),
    )
}

// ============================================================================
// Input parsing
// ============================================================================

/// A progress entry parsed from `WEIGHTxSETSxREPS`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LogEntry {
    pub weight: f64,
    pub sets: u32,
    pub reps: String,
}

fn non_empty(text: &str) -> Option<&str> {
    let text = text.trim();
    (!text.is_empty()).then_some(text)
}

fn parse_decimal(text: &str) -> Option<f64> {
    text.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

pub(crate) fn parse_weight(text: &str) -> Option<f64> {
    parse_decimal(text).filter(|w| *w > WEIGHT_RANGE.0 && *w < WEIGHT_RANGE.1)
}

pub(crate) fn parse_height(text: &str) -> Option<u32> {
    text.trim()
        .parse::<u32>()
        .ok()
        .filter(|h| *h > HEIGHT_RANGE.0 && *h < HEIGHT_RANGE.1)
}

pub(crate) fn parse_age(text: &str) -> Option<u32> {
    text.trim()
        .parse::<u32>()
        .ok()
        .filter(|a| *a > AGE_RANGE.0 && *a < AGE_RANGE.1)
}

/// Exactly three `x`-separated tokens; reps stay free-form (e.g. `8-10`)
pub(crate) fn parse_log_entry(text: &str) -> Option<LogEntry> {
    let text = text.trim().to_lowercase();
    let parts: Vec<&str> = text.split('x').collect();
    let [weight, sets, reps] = parts.as_slice() else {
        return None;
    };

    let weight = parse_decimal(weight).filter(|w| *w >= 0.0)?;
    let sets = sets.trim().parse::<u32>().ok()?;
    let reps = non_empty(reps)?;

    Some(LogEntry {
        weight,
        sets,
        reps: reps.to_string(),
    })
}

fn parse_field_value(field: ProfileField, text: &str) -> Result<ProfileUpdate, &'static str> {
    match field {
        ProfileField::Weight => parse_weight(text)
            .map(ProfileUpdate::Weight)
            .ok_or(render::invalid_weight()),
        ProfileField::Height => parse_height(text)
            .map(ProfileUpdate::Height)
            .ok_or(render::invalid_height()),
        ProfileField::Age => parse_age(text)
            .map(ProfileUpdate::Age)
            .ok_or(render::invalid_age()),
        ProfileField::Gender => Gender::from_label(text)
            .map(ProfileUpdate::Gender)
            .ok_or(render::invalid_choice()),
        ProfileField::ActivityLevel => ActivityLevel::from_label(text)
            .map(ProfileUpdate::ActivityLevel)
            .ok_or(render::invalid_choice()),
        ProfileField::Goal => Goal::from_label(text)
            .map(ProfileUpdate::Goal)
            .ok_or(render::invalid_choice()),
    }
}
