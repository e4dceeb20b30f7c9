//! Rendering of replies and menus
//!
//! Pure functions from domain data to `Reply` values. They never look at the
//! session store; the transition function and the executor pick which one to
//! call.

use crate::db::{
    ExerciseRef, Period, PlanExerciseDetail, PlanId, PlanSummary, ProfileField, ProgressLog,
    UserProfile,
};
use crate::metrics::{self, ActivityLevel, Bmi, Gender, Goal};
use crate::state_machine::event::{Choice, EditAction};
use crate::state_machine::state::{
    LogProgressStep, PlanCreationStep, PlanEditingStep, ProfileEditingStep, RegistrationStep,
    ViewProgressStep,
};
use crate::state_machine::{ConvContext, ConvState};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Outbound rendering instruction: text plus an optional menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu: Option<Menu>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            menu: None,
        }
    }

    pub fn with_menu(text: impl Into<String>, menu: Menu) -> Self {
        Self {
            text: text.into(),
            menu: Some(menu),
        }
    }
}

/// Rows of labeled items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Menu {
    pub rows: Vec<Vec<MenuItem>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub label: String,
    /// `None` means the label itself is sent back as text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice: Option<Choice>,
}

impl MenuItem {
    pub fn choice(label: impl Into<String>, choice: Choice) -> Self {
        Self {
            label: label.into(),
            choice: Some(choice),
        }
    }

    pub fn keyword(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            choice: None,
        }
    }
}

impl Menu {
    pub fn new(rows: Vec<Vec<MenuItem>>) -> Self {
        Self { rows }
    }

    /// One item per row
    pub fn column(items: impl IntoIterator<Item = MenuItem>) -> Self {
        Self {
            rows: items.into_iter().map(|item| vec![item]).collect(),
        }
    }

    pub fn push_row(mut self, row: Vec<MenuItem>) -> Self {
        self.rows.push(row);
        self
    }

    #[cfg(test)]
    pub fn choices(&self) -> impl Iterator<Item = &Choice> {
        self.rows.iter().flatten().filter_map(|item| item.choice.as_ref())
    }
}

// ============================================================================
// Menus
// ============================================================================

pub fn main_menu() -> Menu {
    Menu::new(vec![
        vec![MenuItem::keyword("Plans"), MenuItem::keyword("Progress")],
        vec![MenuItem::keyword("Profile"), MenuItem::keyword("Help")],
        vec![MenuItem::keyword("Calories")],
    ])
}

pub fn gender_menu() -> Menu {
    Menu::new(vec![Gender::ALL
        .into_iter()
        .map(|gender| MenuItem::choice(gender.label(), Choice::Gender { gender }))
        .collect()])
}

pub fn activity_menu() -> Menu {
    Menu::column(
        ActivityLevel::ALL
            .into_iter()
            .map(|level| MenuItem::choice(level.label(), Choice::ActivityLevel { level })),
    )
}

pub fn goal_menu() -> Menu {
    Menu::column(
        Goal::ALL
            .into_iter()
            .map(|goal| MenuItem::choice(goal.label(), Choice::Goal { goal })),
    )
}

pub fn muscle_group_menu(groups: &[String]) -> Menu {
    let items: Vec<MenuItem> = groups
        .iter()
        .map(|group| MenuItem::choice(group, Choice::MuscleGroup { group: group.clone() }))
        .collect();

    let mut menu = Menu::new(items.chunks(2).map(<[MenuItem]>::to_vec).collect());
    menu = menu.push_row(vec![MenuItem::choice("Finish", Choice::FinishExercises)]);
    menu
}

pub fn exercise_menu(exercises: &[ExerciseRef]) -> Menu {
    Menu::column(exercises.iter().map(|exercise| {
        MenuItem::choice(
            &exercise.name,
            Choice::Exercise {
                exercise_id: exercise.id,
            },
        )
    }))
}

fn group_exercise_menu(exercises: &[ExerciseRef]) -> Menu {
    exercise_menu(exercises).push_row(vec![MenuItem::choice(
        "Back to muscle groups",
        Choice::AnotherGroup,
    )])
}

pub fn add_more_menu() -> Menu {
    Menu::column([
        MenuItem::choice("Add more", Choice::AddMoreExercises),
        MenuItem::choice("Finish plan", Choice::FinishPlan),
    ])
}

pub fn edit_plan_menu() -> Menu {
    Menu::column([
        MenuItem::choice(
            "Rename",
            Choice::EditAction {
                action: EditAction::Rename,
            },
        ),
        MenuItem::choice(
            "Add exercise",
            Choice::EditAction {
                action: EditAction::AddExercise,
            },
        ),
        MenuItem::choice(
            "Remove exercise",
            Choice::EditAction {
                action: EditAction::RemoveExercise,
            },
        ),
        MenuItem::choice("Back to plans", Choice::BackToPlans),
    ])
}

fn removal_menu(plan_id: PlanId, exercises: &[ExerciseRef]) -> Menu {
    Menu::column(exercises.iter().map(|exercise| {
        MenuItem::choice(
            format!("Remove {}", exercise.name),
            Choice::Exercise {
                exercise_id: exercise.id,
            },
        )
    }))
    .push_row(vec![MenuItem::choice("Back", Choice::EditPlan { plan_id })])
}

fn plan_list_menu(plans: &[PlanSummary]) -> Menu {
    let mut menu = Menu::new(
        plans
            .iter()
            .map(|plan| {
                vec![
                    MenuItem::choice(&plan.name, Choice::ViewPlan { plan_id: plan.id }),
                    MenuItem::choice("Edit", Choice::EditPlan { plan_id: plan.id }),
                    MenuItem::choice("Delete", Choice::DeletePlan { plan_id: plan.id }),
                ]
            })
            .collect(),
    );
    menu = menu.push_row(vec![MenuItem::choice("Create new plan", Choice::CreatePlan)]);
    menu
}

fn log_plan_menu(plans: &[PlanSummary]) -> Menu {
    Menu::column(plans.iter().map(|plan| {
        MenuItem::choice(format!("Log: {}", plan.name), Choice::Plan { plan_id: plan.id })
    }))
    .push_row(vec![MenuItem::choice("View progress", Choice::ViewProgress)])
}

fn view_plan_menu(plans: &[PlanSummary]) -> Menu {
    Menu::column(
        plans
            .iter()
            .map(|plan| MenuItem::choice(&plan.name, Choice::Plan { plan_id: plan.id })),
    )
}

pub fn progress_filter_menu() -> Menu {
    Menu::new(vec![[Period::Week, Period::Month, Period::All]
        .into_iter()
        .map(|period| MenuItem::choice(period.label(), Choice::ProgressFilter { period }))
        .collect()])
}

fn profile_menu() -> Menu {
    Menu::column([
        MenuItem::choice("Edit profile", Choice::EditProfile),
        MenuItem::choice("Reset profile", Choice::ResetProfile),
    ])
}

pub fn field_menu() -> Menu {
    let items: Vec<MenuItem> = ProfileField::ALL
        .into_iter()
        .map(|field| MenuItem::choice(field.label(), Choice::EditField { field }))
        .collect();
    Menu::new(items.chunks(2).map(<[MenuItem]>::to_vec).collect())
        .push_row(vec![MenuItem::choice("Back to profile", Choice::BackToProfile)])
}

// ============================================================================
// Command replies
// ============================================================================

pub fn greeting(profile: Option<&UserProfile>) -> Reply {
    match profile {
        Some(_) => Reply::with_menu("Welcome back!", main_menu()),
        None => Reply::with_menu(
            "Welcome! Let's get you registered before we start.",
            Menu::column([MenuItem::choice("Register", Choice::StartRegistration)]),
        ),
    }
}

pub fn help() -> Reply {
    Reply::with_menu(
        "Commands:\n\
         /start - start and register\n\
         /plan - create, view, edit and delete workout plans\n\
         /log - log and view training progress\n\
         /calories - daily calorie targets\n\
         /profile - view, edit or reset your profile\n\
         /cancel - abandon the current step\n\
         /help - show this help",
        main_menu(),
    )
}

pub fn not_registered() -> Reply {
    Reply::text("You are not registered yet. Use /start to register.")
}

pub fn profile(profile: &UserProfile, notice: Option<&str>) -> Reply {
    let bmi = metrics::bmi(profile.weight, profile.height);
    let mut text = String::new();
    if let Some(notice) = notice {
        let _ = writeln!(text, "{notice}\n");
    }
    let _ = write!(
        text,
        "Your profile:\n\n\
         Weight: {} kg\n\
         Height: {} cm\n\
         Age: {}\n\
         Gender: {}\n\
         Goal: {}\n\
         Activity: {}\n\n\
         BMI: {} ({})",
        profile.weight,
        profile.height,
        profile.age,
        profile.gender,
        profile.goal,
        profile.activity_level,
        bmi.value,
        bmi.category.label(),
    );
    Reply::with_menu(text, profile_menu())
}

pub fn calories(profile: &UserProfile) -> Reply {
    let targets = metrics::daily_calories(
        profile.gender,
        profile.weight,
        profile.height,
        profile.age,
        profile.activity_level,
    );
    Reply::text(format!(
        "Your daily calorie targets:\n\n\
         Lose weight: ~{} kcal\n\
         Maintain: ~{} kcal\n\
         Gain mass: ~{} kcal\n\n\
         Your current goal is {} (~{} kcal).\n\
         Based on the Mifflin-St Jeor formula and your activity level.",
        targets.lose_weight,
        targets.maintain,
        targets.gain_mass,
        profile.goal,
        targets.for_goal(profile.goal),
    ))
}

// ============================================================================
// Registration
// ============================================================================

pub fn weight_prompt() -> Reply {
    Reply::text("Let's start. Enter your weight in kg (for example, 75.5):")
}

pub fn height_prompt() -> Reply {
    Reply::text("Great! Now enter your height in cm:")
}

pub fn age_prompt() -> Reply {
    Reply::text("How old are you?")
}

pub fn gender_prompt() -> Reply {
    Reply::with_menu("Select your gender:", gender_menu())
}

pub fn activity_prompt() -> Reply {
    Reply::with_menu("Select your activity level:", activity_menu())
}

/// Shown before goal selection, with a goal suggestion for the BMI category
pub fn target_prompt(bmi: Bmi) -> Reply {
    let mut text = format!("Thanks! Your BMI is {} ({}).", bmi.value, bmi.category.label());
    if let Some(goal) = bmi.category.recommended_goal() {
        let _ = write!(text, "\n\nWe recommend the goal '{}'.", goal.label());
    }
    text.push_str("\n\nNow choose your main goal:");
    Reply::with_menu(text, goal_menu())
}

pub fn invalid_weight() -> &'static str {
    "Please enter a valid number for weight (for example, 75.5). It must be between 20 and 300 kg."
}

pub fn invalid_height() -> &'static str {
    "Please enter a whole number for height in cm. It must be between 100 and 250 cm."
}

pub fn invalid_age() -> &'static str {
    "Please enter a whole number for age (between 12 and 100)."
}

pub fn invalid_choice() -> &'static str {
    "Please choose one of the options."
}

// ============================================================================
// Plans
// ============================================================================

pub fn plan_list(plans: &[PlanSummary], notice: Option<&str>) -> Reply {
    let prefix = notice.map(|n| format!("{n}\n\n")).unwrap_or_default();
    if plans.is_empty() && notice.is_some() {
        return Reply::with_menu(
            format!("{prefix}You have no more plans. Create a new one:"),
            plan_list_menu(plans),
        );
    }
    Reply::with_menu(format!("{prefix}Your workout plans:"), plan_list_menu(plans))
}

pub fn plan_details(name: &str, details: &[PlanExerciseDetail]) -> Reply {
    if details.is_empty() {
        return Reply::with_menu(
            format!("Plan '{name}' has no exercises yet."),
            Menu::column([MenuItem::choice("Back to plans", Choice::BackToPlans)]),
        );
    }
    let mut text = format!("Workout plan: {name}\n");
    for detail in details {
        let _ = write!(text, "\n  - {}: {}x{}", detail.exercise_name, detail.sets, detail.reps);
    }
    Reply::with_menu(
        text,
        Menu::column([MenuItem::choice("Back to plans", Choice::BackToPlans)]),
    )
}

pub fn plan_name_prompt() -> Reply {
    Reply::text("Enter a name for your new workout plan:")
}

pub fn first_plan_prompt() -> Reply {
    Reply::text("You have no workout plans yet. Let's create the first one! Enter a name for it:")
}

pub fn plan_created(name: &str, groups: &[String]) -> Reply {
    Reply::with_menu(
        format!("Plan '{name}' created. Now choose a muscle group to add exercises:"),
        muscle_group_menu(groups),
    )
}

pub fn choose_group(groups: &[String]) -> Reply {
    Reply::with_menu("Choose a muscle group:", muscle_group_menu(groups))
}

pub fn empty_group(group: &str, groups: &[String]) -> Reply {
    Reply::with_menu(
        format!("No exercises found for '{group}'. Choose another muscle group:"),
        muscle_group_menu(groups),
    )
}

pub fn choose_exercise(group: &str, exercises: &[ExerciseRef]) -> Reply {
    Reply::with_menu(
        format!("Choose an exercise for '{group}':"),
        group_exercise_menu(exercises),
    )
}

pub fn edit_plan_prompt(name: &str) -> Reply {
    Reply::with_menu(format!("What do you want to do with '{name}'?"), edit_plan_menu())
}

pub fn removal_prompt(plan_id: PlanId, exercises: &[ExerciseRef]) -> Reply {
    Reply::with_menu(
        "Choose an exercise to remove:",
        removal_menu(plan_id, exercises),
    )
}

// ============================================================================
// Progress
// ============================================================================

pub fn log_plan_prompt(plans: &[PlanSummary]) -> Reply {
    Reply::with_menu("Choose an action:", log_plan_menu(plans))
}

pub fn view_plan_prompt(plans: &[PlanSummary]) -> Reply {
    Reply::with_menu("Choose a plan to view progress:", view_plan_menu(plans))
}

pub fn log_exercise_prompt(exercises: &[ExerciseRef]) -> Reply {
    Reply::with_menu("Choose an exercise to log:", exercise_menu(exercises))
}

pub fn view_exercise_prompt(exercises: &[ExerciseRef]) -> Reply {
    Reply::with_menu("Choose an exercise to view progress:", exercise_menu(exercises))
}

pub fn log_details_prompt() -> Reply {
    Reply::text("Enter your result as WEIGHTxSETSxREPS (for example, 80x3x10):")
}

pub fn invalid_log_entry() -> &'static str {
    "Wrong format. Enter your result as WEIGHTxSETSxREPS, for example: 80x3x10."
}

/// Log lines for one exercise; `period` is `None` for the initial all-time view
pub fn progress(exercise_name: &str, period: Option<Period>, logs: &[ProgressLog]) -> Reply {
    let mut text = match period {
        Some(period) => format!("Progress for {exercise_name} ({})\n", period.label()),
        None => format!("Progress for {exercise_name}\n"),
    };
    for log in logs {
        let _ = write!(
            text,
            "\n{}: {} kg x {}x{}",
            log.log_date.format("%Y-%m-%d"),
            log.weight,
            log.sets,
            log.reps
        );
    }
    Reply::with_menu(text, progress_filter_menu())
}

pub fn no_progress_in_period(exercise_name: &str) -> Reply {
    Reply::with_menu(
        format!("No records for '{exercise_name}' in the selected period."),
        progress_filter_menu(),
    )
}

// ============================================================================
// Profile editing
// ============================================================================

pub fn field_prompt(field: ProfileField) -> Reply {
    match field {
        ProfileField::Weight => Reply::text("Enter your new weight in kg:"),
        ProfileField::Height => Reply::text("Enter your new height in cm:"),
        ProfileField::Age => Reply::text("Enter your new age:"),
        ProfileField::Gender => Reply::with_menu("Select your gender:", gender_menu()),
        ProfileField::ActivityLevel => {
            Reply::with_menu("Select your new activity level:", activity_menu())
        }
        ProfileField::Goal => Reply::with_menu("Choose your new goal:", goal_menu()),
    }
}

pub fn field_updated(field: ProfileField) -> String {
    format!("{} updated.", field.label())
}

pub fn choose_field() -> Reply {
    Reply::with_menu("Which field do you want to change?", field_menu())
}

// ============================================================================
// Re-prompting
// ============================================================================

/// Prompt for the step the user is currently on
pub fn step_prompt(state: &ConvState, context: &ConvContext) -> Reply {
    match state {
        ConvState::Idle => Reply::with_menu("Choose what to do next:", main_menu()),
        ConvState::Registration { step } => match step {
            RegistrationStep::Weight => weight_prompt(),
            RegistrationStep::Height { .. } => height_prompt(),
            RegistrationStep::Age { .. } => age_prompt(),
            RegistrationStep::Gender { .. } => gender_prompt(),
            RegistrationStep::ActivityLevel { .. } => activity_prompt(),
            RegistrationStep::Target { .. } => Reply::with_menu("Choose your main goal:", goal_menu()),
        },
        ConvState::PlanCreation { step } => match step {
            PlanCreationStep::PlanName => plan_name_prompt(),
            PlanCreationStep::MuscleGroup { .. } => choose_group(&context.muscle_groups),
            PlanCreationStep::ExerciseSelection {
                group, exercises, ..
            } => choose_exercise(group, exercises),
            PlanCreationStep::AddMoreExercises { .. } => {
                Reply::with_menu("What next?", add_more_menu())
            }
        },
        ConvState::PlanEditing { plan_id, step } => match step {
            PlanEditingStep::ActionMenu => {
                Reply::with_menu("What do you want to do with the plan?", edit_plan_menu())
            }
            PlanEditingStep::Renaming => Reply::text("Enter a new name for the plan:"),
            PlanEditingStep::RemovingExercise { exercises } => removal_prompt(*plan_id, exercises),
        },
        ConvState::LogProgress { step } => match step {
            LogProgressStep::PlanSelection { plans } => log_plan_prompt(plans),
            LogProgressStep::ExerciseSelection { exercises } => log_exercise_prompt(exercises),
            LogProgressStep::LogDetails { .. } => log_details_prompt(),
        },
        ConvState::ViewProgress { step } => match step {
            ViewProgressStep::PlanSelection { plans } => view_plan_prompt(plans),
            ViewProgressStep::ExerciseSelection { exercises } => view_exercise_prompt(exercises),
            ViewProgressStep::FilterDisplay { exercise_name, .. } => Reply::with_menu(
                format!("Choose a period for {exercise_name}:"),
                progress_filter_menu(),
            ),
        },
        ConvState::ProfileEditing { step } => match step {
            ProfileEditingStep::ChooseField => choose_field(),
            ProfileEditingStep::Editing { field } => field_prompt(*field),
        },
    }
}

/// `error` followed by the current step's prompt
pub fn reprompt(error: &str, state: &ConvState, context: &ConvContext) -> Reply {
    let prompt = step_prompt(state, context);
    Reply {
        text: format!("{error}\n\n{}", prompt.text),
        menu: prompt.menu,
    }
}
