//! Database schema and domain records

use crate::metrics::{ActivityLevel, Gender, Goal};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type PlanId = i64;
pub type ExerciseId = i64;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    weight REAL NOT NULL,
    height INTEGER NOT NULL,
    age INTEGER NOT NULL,
    gender TEXT NOT NULL,
    activity_level TEXT NOT NULL,
    goal TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS exercises (
    exercise_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    muscle_group TEXT NOT NULL,
    default_sets INTEGER NOT NULL,
    default_reps TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_exercises_group ON exercises(muscle_group);

CREATE TABLE IF NOT EXISTS workout_plans (
    plan_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_workout_plans_user ON workout_plans(user_id, name);

CREATE TABLE IF NOT EXISTS workout_plan_exercises (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    plan_id INTEGER NOT NULL,
    exercise_id INTEGER NOT NULL,
    sets INTEGER NOT NULL,
    reps TEXT NOT NULL,

    FOREIGN KEY (plan_id) REFERENCES workout_plans(plan_id) ON DELETE CASCADE,
    FOREIGN KEY (exercise_id) REFERENCES exercises(exercise_id)
);

CREATE INDEX IF NOT EXISTS idx_plan_exercises_plan ON workout_plan_exercises(plan_id);

CREATE TABLE IF NOT EXISTS progress_logs (
    log_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    exercise_id INTEGER NOT NULL,
    weight REAL NOT NULL,
    sets INTEGER NOT NULL,
    reps TEXT NOT NULL,
    log_date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_progress_user_exercise
    ON progress_logs(user_id, exercise_id, log_date DESC);

CREATE TABLE IF NOT EXISTS sessions (
    user_id INTEGER PRIMARY KEY,
    state TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Registered user profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: UserId,
    pub weight: f64,
    pub height: u32,
    pub age: u32,
    pub gender: Gender,
    pub activity_level: ActivityLevel,
    pub goal: Goal,
}

/// `(id, name)` pair used for exercise menus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExerciseRef {
    pub id: ExerciseId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExerciseDefaults {
    pub sets: u32,
    pub reps: String,
}

/// `(id, name)` pair for a workout plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanSummary {
    pub id: PlanId,
    pub name: String,
}

/// One line of a plan: exercise with its target sets/reps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanExerciseDetail {
    pub exercise_name: String,
    pub sets: u32,
    pub reps: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressLog {
    pub weight: f64,
    pub sets: u32,
    pub reps: String,
    pub log_date: DateTime<Utc>,
}

/// Rolling window for progress queries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Week,
    Month,
    All,
}

impl Period {
    pub fn label(self) -> &'static str {
        match self {
            Period::Week => "Week",
            Period::Month => "Month",
            Period::All => "All time",
        }
    }

    /// Start of the UTC day `N` days before `now`; `None` for `All`
    pub fn cutoff(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = match self {
            Period::Week => 7,
            Period::Month => 30,
            Period::All => return None,
        };
        let day = (now - Duration::days(days)).date_naive();
        day.and_hms_opt(0, 0, 0).map(|start| start.and_utc())
    }
}

/// Editable profile field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Weight,
    Height,
    Age,
    Gender,
    ActivityLevel,
    Goal,
}

impl ProfileField {
    pub const ALL: [ProfileField; 6] = [
        ProfileField::Weight,
        ProfileField::Height,
        ProfileField::Age,
        ProfileField::Gender,
        ProfileField::ActivityLevel,
        ProfileField::Goal,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProfileField::Weight => "Weight",
            ProfileField::Height => "Height",
            ProfileField::Age => "Age",
            ProfileField::Gender => "Gender",
            ProfileField::ActivityLevel => "Activity",
            ProfileField::Goal => "Goal",
        }
    }
}

/// A single-field profile change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ProfileUpdate {
    Weight(f64),
    Height(u32),
    Age(u32),
    Gender(Gender),
    ActivityLevel(ActivityLevel),
    Goal(Goal),
}

impl ProfileUpdate {
    pub fn field(&self) -> ProfileField {
        match self {
            ProfileUpdate::Weight(_) => ProfileField::Weight,
            ProfileUpdate::Height(_) => ProfileField::Height,
            ProfileUpdate::Age(_) => ProfileField::Age,
            ProfileUpdate::Gender(_) => ProfileField::Gender,
            ProfileUpdate::ActivityLevel(_) => ProfileField::ActivityLevel,
            ProfileUpdate::Goal(_) => ProfileField::Goal,
        }
    }

    pub(crate) fn column(&self) -> &'static str {
        match self.field() {
            ProfileField::Weight => "weight",
            ProfileField::Height => "height",
            ProfileField::Age => "age",
            ProfileField::Gender => "gender",
            ProfileField::ActivityLevel => "activity_level",
            ProfileField::Goal => "goal",
        }
    }

    pub(crate) fn apply(&self, profile: &mut UserProfile) {
        match *self {
            ProfileUpdate::Weight(v) => profile.weight = v,
            ProfileUpdate::Height(v) => profile.height = v,
            ProfileUpdate::Age(v) => profile.age = v,
            ProfileUpdate::Gender(v) => profile.gender = v,
            ProfileUpdate::ActivityLevel(v) => profile.activity_level = v,
            ProfileUpdate::Goal(v) => profile.goal = v,
        }
    }
}
