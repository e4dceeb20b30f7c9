//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::event::*;
use super::state::*;
use super::transition::*;
use super::*;
use crate::db::{ExerciseRef, Period, PlanSummary, ProfileField, ProgressLog};
use crate::metrics::{ActivityLevel, Gender, Goal};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> ConvContext {
    ConvContext::new(42, vec!["Chest".to_string(), "Back".to_string()])
}

fn registration_bounds_hold(step: &RegistrationStep) -> bool {
    let weight_ok = |w: f64| w > 20.0 && w < 300.0;
    let height_ok = |h: u32| h > 100 && h < 250;
    let age_ok = |a: u32| a > 12 && a < 100;
    match *step {
        RegistrationStep::Weight => true,
        RegistrationStep::Height { weight } => weight_ok(weight),
        RegistrationStep::Age { weight, height } => weight_ok(weight) && height_ok(height),
        RegistrationStep::Gender {
            weight,
            height,
            age,
        }
        | RegistrationStep::ActivityLevel {
            weight,
            height,
            age,
            ..
        }
        | RegistrationStep::Target {
            weight,
            height,
            age,
            ..
        } => weight_ok(weight) && height_ok(height) && age_ok(age),
    }
}

/// Selection steps always carry something to select
fn is_valid_state(state: &ConvState) -> bool {
    match state {
        ConvState::Idle => true,
        ConvState::Registration { step } => registration_bounds_hold(step),
        ConvState::PlanCreation {
            step: PlanCreationStep::ExerciseSelection { exercises, .. },
        }
        | ConvState::PlanEditing {
            step: PlanEditingStep::RemovingExercise { exercises },
            ..
        }
        | ConvState::LogProgress {
            step: LogProgressStep::ExerciseSelection { exercises },
        }
        | ConvState::ViewProgress {
            step: ViewProgressStep::ExerciseSelection { exercises },
        } => !exercises.is_empty(),
        ConvState::LogProgress {
            step: LogProgressStep::PlanSelection { plans },
        }
        | ConvState::ViewProgress {
            step: ViewProgressStep::PlanSelection { plans },
        } => !plans.is_empty(),
        ConvState::PlanCreation { .. }
        | ConvState::PlanEditing { .. }
        | ConvState::LogProgress { .. }
        | ConvState::ViewProgress { .. }
        | ConvState::ProfileEditing { .. } => true,
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_gender() -> impl Strategy<Value = Gender> {
    prop_oneof![Just(Gender::Male), Just(Gender::Female)]
}

fn arb_activity() -> impl Strategy<Value = ActivityLevel> {
    prop_oneof![
        Just(ActivityLevel::Minimal),
        Just(ActivityLevel::Light),
        Just(ActivityLevel::Moderate),
        Just(ActivityLevel::High),
    ]
}

fn arb_goal() -> impl Strategy<Value = Goal> {
    prop_oneof![
        Just(Goal::GainMass),
        Just(Goal::LoseWeight),
        Just(Goal::Maintain),
    ]
}

fn arb_period() -> impl Strategy<Value = Period> {
    prop_oneof![Just(Period::Week), Just(Period::Month), Just(Period::All)]
}

fn arb_field() -> impl Strategy<Value = ProfileField> {
    proptest::sample::select(ProfileField::ALL.to_vec())
}

fn arb_exercises(min: usize) -> impl Strategy<Value = Vec<ExerciseRef>> {
    proptest::collection::vec(
        (1i64..6, "[A-Z][a-z]{2,8}").prop_map(|(id, name)| ExerciseRef { id, name }),
        min..4,
    )
}

fn arb_plans(min: usize) -> impl Strategy<Value = Vec<PlanSummary>> {
    proptest::collection::vec(
        (1i64..6, "[A-Z][a-z]{2,8}").prop_map(|(id, name)| PlanSummary { id, name }),
        min..4,
    )
}

fn arb_logs() -> impl Strategy<Value = Vec<ProgressLog>> {
    proptest::collection::vec(
        (0u32..200, 1u32..6, 0i64..60).prop_map(|(weight, sets, days)| ProgressLog {
            weight: f64::from(weight),
            sets,
            reps: "10".to_string(),
            log_date: Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
                - chrono::Duration::days(days),
        }),
        0..3,
    )
}

fn arb_registration_state() -> impl Strategy<Value = ConvState> {
    (
        21.0f64..299.0,
        101u32..250,
        13u32..100,
        arb_gender(),
        arb_activity(),
    )
        .prop_flat_map(|(weight, height, age, gender, activity_level)| {
            prop_oneof![
                Just(RegistrationStep::Weight),
                Just(RegistrationStep::Height { weight }),
                Just(RegistrationStep::Age { weight, height }),
                Just(RegistrationStep::Gender {
                    weight,
                    height,
                    age
                }),
                Just(RegistrationStep::ActivityLevel {
                    weight,
                    height,
                    age,
                    gender
                }),
                Just(RegistrationStep::Target {
                    weight,
                    height,
                    age,
                    gender,
                    activity_level
                }),
            ]
        })
        .prop_map(|step| ConvState::Registration { step })
}

fn arb_plan_creation_state() -> impl Strategy<Value = ConvState> {
    (1i64..6, any::<bool>(), arb_exercises(1))
        .prop_flat_map(|(plan_id, editing, exercises)| {
            prop_oneof![
                Just(PlanCreationStep::PlanName),
                Just(PlanCreationStep::MuscleGroup { plan_id, editing }),
                Just(PlanCreationStep::ExerciseSelection {
                    plan_id,
                    editing,
                    group: "Chest".to_string(),
                    exercises,
                }),
                Just(PlanCreationStep::AddMoreExercises { plan_id }),
            ]
        })
        .prop_map(|step| ConvState::PlanCreation { step })
}

fn arb_plan_editing_state() -> impl Strategy<Value = ConvState> {
    (1i64..6, arb_exercises(1)).prop_flat_map(|(plan_id, exercises)| {
        prop_oneof![
            Just(PlanEditingStep::ActionMenu),
            Just(PlanEditingStep::Renaming),
            Just(PlanEditingStep::RemovingExercise { exercises }),
        ]
        .prop_map(move |step| ConvState::PlanEditing { plan_id, step })
    })
}

fn arb_progress_state() -> impl Strategy<Value = ConvState> {
    (arb_plans(1), arb_exercises(1), 1i64..6).prop_flat_map(|(plans, exercises, exercise_id)| {
        prop_oneof![
            Just(ConvState::LogProgress {
                step: LogProgressStep::PlanSelection {
                    plans: plans.clone()
                }
            }),
            Just(ConvState::LogProgress {
                step: LogProgressStep::ExerciseSelection {
                    exercises: exercises.clone()
                }
            }),
            Just(ConvState::LogProgress {
                step: LogProgressStep::LogDetails { exercise_id }
            }),
            Just(ConvState::ViewProgress {
                step: ViewProgressStep::PlanSelection { plans }
            }),
            Just(ConvState::ViewProgress {
                step: ViewProgressStep::ExerciseSelection { exercises }
            }),
            Just(ConvState::ViewProgress {
                step: ViewProgressStep::FilterDisplay {
                    exercise_id,
                    exercise_name: "Squat".to_string(),
                }
            }),
        ]
    })
}

fn arb_profile_editing_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![
        Just(ProfileEditingStep::ChooseField),
        arb_field().prop_map(|field| ProfileEditingStep::Editing { field }),
    ]
    .prop_map(|step| ConvState::ProfileEditing { step })
}

fn arb_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![
        Just(ConvState::Idle),
        arb_registration_state(),
        arb_plan_creation_state(),
        arb_plan_editing_state(),
        arb_progress_state(),
        arb_profile_editing_state(),
    ]
}

fn arb_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Start),
        Just(Command::Plan),
        Just(Command::Log),
        Just(Command::Calories),
        Just(Command::Profile),
        Just(Command::Help),
        Just(Command::Cancel),
    ]
}

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        proptest::sample::select(vec![
            "80", "75,5", "175", "30", "Male", "moderate", "Maintain", "Push Day", "80x3x10",
            "", "   ", "abc", "19", "301",
        ])
        .prop_map(String::from),
        "[a-zA-Z0-9 ,.x]{0,12}",
    ]
}

fn arb_global_choice() -> impl Strategy<Value = Choice> {
    let plan_id = 1i64..6;
    prop_oneof![
        Just(Choice::StartRegistration),
        plan_id.clone().prop_map(|plan_id| Choice::ViewPlan { plan_id }),
        plan_id.clone().prop_map(|plan_id| Choice::EditPlan { plan_id }),
        plan_id.prop_map(|plan_id| Choice::DeletePlan { plan_id }),
        Just(Choice::CreatePlan),
        Just(Choice::BackToPlans),
        Just(Choice::ViewProgress),
        prop_oneof![Just(Choice::EditProfile), Just(Choice::ResetProfile)],
        arb_field().prop_map(|field| Choice::EditField { field }),
        Just(Choice::BackToProfile),
    ]
}

fn arb_scoped_choice() -> impl Strategy<Value = Choice> {
    prop_oneof![
        arb_gender().prop_map(|gender| Choice::Gender { gender }),
        arb_activity().prop_map(|level| Choice::ActivityLevel { level }),
        arb_goal().prop_map(|goal| Choice::Goal { goal }),
        proptest::sample::select(vec!["Chest", "Back", "Legs"]).prop_map(|group| {
            Choice::MuscleGroup {
                group: group.to_string(),
            }
        }),
        (1i64..6).prop_map(|exercise_id| Choice::Exercise { exercise_id }),
        prop_oneof![
            Just(Choice::FinishExercises),
            Just(Choice::AnotherGroup),
            Just(Choice::AddMoreExercises),
            Just(Choice::FinishPlan),
        ],
        prop_oneof![
            Just(EditAction::Rename),
            Just(EditAction::AddExercise),
            Just(EditAction::RemoveExercise),
        ]
        .prop_map(|action| Choice::EditAction { action }),
        (1i64..6).prop_map(|plan_id| Choice::Plan { plan_id }),
        arb_period().prop_map(|period| Choice::ProgressFilter { period }),
    ]
}

fn arb_choice() -> impl Strategy<Value = Choice> {
    prop_oneof![
        1 => arb_global_choice(),
        2 => arb_scoped_choice(),
    ]
}

fn arb_inbound_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_command().prop_map(Event::Command),
        arb_text().prop_map(|text| Event::Text { text }),
        arb_choice().prop_map(Event::Choice),
    ]
}

fn arb_outcome_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        (1i64..6, "[A-Z][a-z]{2,8}").prop_map(|(plan_id, name)| Event::PlanCreated { plan_id, name }),
        "[A-Z][a-z]{2,8}".prop_map(|name| Event::PlanNameTaken { name }),
        "[A-Z][a-z]{2,8}".prop_map(|name| Event::PlanRenamed { name }),
        arb_exercises(0).prop_map(|exercises| Event::GroupExercisesLoaded {
            group: "Chest".to_string(),
            exercises
        }),
        Just(Event::ExerciseAttached),
        (1i64..6).prop_map(|exercise_id| Event::ExerciseDefaultsMissing { exercise_id }),
        (
            prop_oneof![
                Just(PlanExercisesPurpose::Logging),
                Just(PlanExercisesPurpose::Viewing),
                Just(PlanExercisesPurpose::Removal),
            ],
            arb_exercises(0)
        )
            .prop_map(|(purpose, exercises)| Event::PlanExercisesLoaded { purpose, exercises }),
        (
            prop_oneof![
                Just(PlansPurpose::Manage),
                Just(PlansPurpose::Browse { notice: None }),
                Just(PlansPurpose::Logging),
                Just(PlansPurpose::Viewing),
            ],
            arb_plans(0)
        )
            .prop_map(|(purpose, plans)| Event::PlansLoaded { purpose, plans }),
        (1i64..6, arb_period(), any::<bool>(), arb_logs()).prop_map(
            |(exercise_id, period, initial, logs)| Event::ProgressLoaded {
                exercise_id,
                exercise_name: "Squat".to_string(),
                period,
                initial,
                logs,
            }
        ),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        3 => arb_inbound_event(),
        1 => arb_outcome_event(),
    ]
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Selection steps never hold empty lists and registration scratch stays in range
    #[test]
    fn prop_transitions_preserve_validity(events in proptest::collection::vec(arb_event(), 0..25)) {
        let mut state = ConvState::Idle;
        let ctx = test_context();

        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                state = result.new_state;
                prop_assert!(is_valid_state(&state), "Invalid state: {:?}", state);
            }
        }
    }

    // Transport events are handled in every state
    #[test]
    fn prop_inbound_events_never_fail(state in arb_state(), event in arb_inbound_event()) {
        let result = transition(&state, &test_context(), event);
        prop_assert!(result.is_ok(), "Inbound event rejected: {:?}", result);
    }

    // PersistState effect always emitted on state change
    #[test]
    fn prop_state_changes_persist(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, &test_context(), event) {
            if result.new_state != state {
                prop_assert!(
                    result.effects.iter().any(|e| matches!(e, Effect::PersistState)),
                    "State changed but no PersistState effect: {:?} -> {:?}",
                    state,
                    result.new_state
                );
            }
        }
    }

    // Cancel always ends in Idle
    #[test]
    fn prop_cancel_resets_session(state in arb_state()) {
        let result = transition(&state, &test_context(), Event::Command(Command::Cancel)).unwrap();
        prop_assert_eq!(result.new_state, ConvState::Idle);
    }

    // Weights strictly inside (20, 300) are stored verbatim, dot or comma
    #[test]
    fn prop_weight_in_range_accepted(weight in 20.01f64..299.99, comma in any::<bool>()) {
        let mut input = weight.to_string();
        if comma {
            input = input.replace('.', ",");
        }
        let state = ConvState::Registration { step: RegistrationStep::Weight };
        let result = transition(&state, &test_context(), Event::Text { text: input }).unwrap();
        prop_assert_eq!(
            result.new_state,
            ConvState::Registration { step: RegistrationStep::Height { weight } }
        );
    }

    #[test]
    fn prop_weight_out_of_range_rejected(
        weight in prop_oneof![-500.0f64..=20.0, 300.0f64..5000.0]
    ) {
        let state = ConvState::Registration { step: RegistrationStep::Weight };
        let result = transition(
            &state,
            &test_context(),
            Event::Text { text: weight.to_string() },
        )
        .unwrap();
        prop_assert_eq!(&result.new_state, &state);
        prop_assert!(!result.effects.iter().any(|e| matches!(e, Effect::PersistState)));
    }

    #[test]
    fn prop_weight_non_numeric_rejected(text in "[a-zA-Z ]{0,12}") {
        let state = ConvState::Registration { step: RegistrationStep::Weight };
        let result = transition(&state, &test_context(), Event::Text { text }).unwrap();
        prop_assert_eq!(result.new_state, state);
    }

    // Re-sending an accepted weight goes to the height validator; the stored
    // weight is never overwritten
    #[test]
    fn prop_resubmitted_weight_is_not_reprocessed(weight in 20.01f64..299.99) {
        let ctx = test_context();
        let input = weight.to_string();
        let state = ConvState::Registration { step: RegistrationStep::Weight };

        let first = transition(&state, &ctx, Event::Text { text: input.clone() }).unwrap();
        let second = transition(&first.new_state, &ctx, Event::Text { text: input }).unwrap();

        match second.new_state {
            ConvState::Registration { step: RegistrationStep::Height { weight: stored } }
            | ConvState::Registration { step: RegistrationStep::Age { weight: stored, .. } } => {
                prop_assert_eq!(stored, weight);
            }
            other => prop_assert!(false, "unexpected state {:?}", other),
        }
    }

    #[test]
    fn prop_log_entry_accepts_three_tokens(
        weight in 0u32..400,
        half in any::<bool>(),
        sets in 0u32..20,
        reps in "[0-9]{1,2}(-[0-9]{1,2})?"
    ) {
        let weight = f64::from(weight) + if half { 0.5 } else { 0.0 };
        let entry = parse_log_entry(&format!("{weight}x{sets}x{reps}"));
        prop_assert_eq!(entry, Some(LogEntry { weight, sets, reps }));
    }

    #[test]
    fn prop_log_entry_rejects_other_token_counts(
        tokens in prop_oneof![
            proptest::collection::vec("[0-9]{1,3}", 1..3),
            proptest::collection::vec("[0-9]{1,3}", 4..7),
        ]
    ) {
        prop_assert_eq!(parse_log_entry(&tokens.join("x")), None);
    }
}
