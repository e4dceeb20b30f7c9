//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::db::{
    DbError, ExerciseDefaults, ExerciseId, ExerciseRef, Period, PlanExerciseDetail, PlanId,
    PlanSummary, ProfileUpdate, ProgressLog, UserId, UserProfile,
};
use crate::state_machine::ConvState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Persistence operations the conversation needs
#[async_trait]
pub trait FitnessStore: Send + Sync {
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserProfile>, String>;

    /// Upsert: replaces any existing profile for the same user
    async fn add_user(&self, profile: &UserProfile) -> Result<(), String>;

    async fn update_user_fields(
        &self,
        user_id: UserId,
        updates: &[ProfileUpdate],
    ) -> Result<(), String>;

    /// Removes the profile with its plans, plan links and progress logs
    async fn delete_user(&self, user_id: UserId) -> Result<(), String>;

    async fn list_muscle_groups(&self) -> Result<Vec<String>, String>;

    async fn list_exercises_by_group(&self, group: &str) -> Result<Vec<ExerciseRef>, String>;

    async fn list_all_exercises(&self) -> Result<Vec<ExerciseRef>, String>;

    async fn get_exercise_defaults(
        &self,
        exercise_id: ExerciseId,
    ) -> Result<Option<ExerciseDefaults>, String>;

    async fn plan_exists(&self, user_id: UserId, name: &str) -> Result<bool, String>;

    /// `None` when the user already has a plan with this name
    async fn create_plan(&self, user_id: UserId, name: &str) -> Result<Option<PlanId>, String>;

    /// `false` when another plan of the same owner has this name
    async fn rename_plan(&self, plan_id: PlanId, name: &str) -> Result<bool, String>;

    async fn delete_plan(&self, plan_id: PlanId) -> Result<(), String>;

    /// Plan owned by `user_id`
    async fn get_plan(&self, user_id: UserId, plan_id: PlanId)
        -> Result<Option<PlanSummary>, String>;

    async fn list_user_plans(&self, user_id: UserId) -> Result<Vec<PlanSummary>, String>;

    async fn add_exercise_to_plan(
        &self,
        plan_id: PlanId,
        exercise_id: ExerciseId,
        sets: u32,
        reps: &str,
    ) -> Result<(), String>;

    /// Removes at most one matching link
    async fn remove_exercise_from_plan(
        &self,
        plan_id: PlanId,
        exercise_id: ExerciseId,
    ) -> Result<bool, String>;

    async fn list_plan_exercises(&self, plan_id: PlanId) -> Result<Vec<ExerciseRef>, String>;

    async fn get_plan_details(&self, plan_id: PlanId) -> Result<Vec<PlanExerciseDetail>, String>;

    async fn add_progress_log(
        &self,
        user_id: UserId,
        exercise_id: ExerciseId,
        weight: f64,
        sets: u32,
        reps: &str,
        logged_at: DateTime<Utc>,
    ) -> Result<(), String>;

    /// Newest first, filtered by a window ending at `now`
    async fn get_progress_logs(
        &self,
        user_id: UserId,
        exercise_id: ExerciseId,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProgressLog>, String>;
}

/// Storage for conversation sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session(&self, user_id: UserId) -> Result<Option<ConvState>, String>;

    async fn save_session(&self, user_id: UserId, state: &ConvState) -> Result<(), String>;

    async fn clear_session(&self, user_id: UserId) -> Result<(), String>;
}

/// Combined storage trait for convenience
pub trait Storage: FitnessStore + SessionStore {}
impl<T: FitnessStore + SessionStore> Storage for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: FitnessStore + ?Sized> FitnessStore for Arc<T> {
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserProfile>, String> {
        (**self).get_user(user_id).await
    }

    async fn add_user(&self, profile: &UserProfile) -> Result<(), String> {
        (**self).add_user(profile).await
    }

    async fn update_user_fields(
        &self,
        user_id: UserId,
        updates: &[ProfileUpdate],
    ) -> Result<(), String> {
        (**self).update_user_fields(user_id, updates).await
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), String> {
        (**self).delete_user(user_id).await
    }

    async fn list_muscle_groups(&self) -> Result<Vec<String>, String> {
        (**self).list_muscle_groups().await
    }

    async fn list_exercises_by_group(&self, group: &str) -> Result<Vec<ExerciseRef>, String> {
        (**self).list_exercises_by_group(group).await
    }

    async fn list_all_exercises(&self) -> Result<Vec<ExerciseRef>, String> {
        (**self).list_all_exercises().await
    }

    async fn get_exercise_defaults(
        &self,
        exercise_id: ExerciseId,
    ) -> Result<Option<ExerciseDefaults>, String> {
        (**self).get_exercise_defaults(exercise_id).await
    }

    async fn plan_exists(&self, user_id: UserId, name: &str) -> Result<bool, String> {
        (**self).plan_exists(user_id, name).await
    }

    async fn create_plan(&self, user_id: UserId, name: &str) -> Result<Option<PlanId>, String> {
        (**self).create_plan(user_id, name).await
    }

    async fn rename_plan(&self, plan_id: PlanId, name: &str) -> Result<bool, String> {
        (**self).rename_plan(plan_id, name).await
    }

    async fn delete_plan(&self, plan_id: PlanId) -> Result<(), String> {
        (**self).delete_plan(plan_id).await
    }

    async fn get_plan(
        &self,
        user_id: UserId,
        plan_id: PlanId,
    ) -> Result<Option<PlanSummary>, String> {
        (**self).get_plan(user_id, plan_id).await
    }

    async fn list_user_plans(&self, user_id: UserId) -> Result<Vec<PlanSummary>, String> {
        (**self).list_user_plans(user_id).await
    }

    async fn add_exercise_to_plan(
        &self,
        plan_id: PlanId,
        exercise_id: ExerciseId,
        sets: u32,
        reps: &str,
    ) -> Result<(), String> {
        (**self)
            .add_exercise_to_plan(plan_id, exercise_id, sets, reps)
            .await
    }

    async fn remove_exercise_from_plan(
        &self,
        plan_id: PlanId,
        exercise_id: ExerciseId,
    ) -> Result<bool, String> {
        (**self).remove_exercise_from_plan(plan_id, exercise_id).await
    }

    async fn list_plan_exercises(&self, plan_id: PlanId) -> Result<Vec<ExerciseRef>, String> {
        (**self).list_plan_exercises(plan_id).await
    }

    async fn get_plan_details(&self, plan_id: PlanId) -> Result<Vec<PlanExerciseDetail>, String> {
        (**self).get_plan_details(plan_id).await
    }

    async fn add_progress_log(
        &self,
        user_id: UserId,
        exercise_id: ExerciseId,
        weight: f64,
        sets: u32,
        reps: &str,
        logged_at: DateTime<Utc>,
    ) -> Result<(), String> {
        (**self)
            .add_progress_log(user_id, exercise_id, weight, sets, reps, logged_at)
            .await
    }

    async fn get_progress_logs(
        &self,
        user_id: UserId,
        exercise_id: ExerciseId,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProgressLog>, String> {
        (**self)
            .get_progress_logs(user_id, exercise_id, period, now)
            .await
    }
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn get_session(&self, user_id: UserId) -> Result<Option<ConvState>, String> {
        (**self).get_session(user_id).await
    }

    async fn save_session(&self, user_id: UserId, state: &ConvState) -> Result<(), String> {
        (**self).save_session(user_id, state).await
    }

    async fn clear_session(&self, user_id: UserId) -> Result<(), String> {
        (**self).clear_session(user_id).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

use crate::db::Database;

/// Adapter to use Database as Storage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FitnessStore for DatabaseStorage {
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserProfile>, String> {
        self.db.get_user(user_id).map_err(|e| e.to_string())
    }

    async fn add_user(&self, profile: &UserProfile) -> Result<(), String> {
        self.db.add_user(profile).map_err(|e| e.to_string())
    }

    async fn update_user_fields(
        &self,
        user_id: UserId,
        updates: &[ProfileUpdate],
    ) -> Result<(), String> {
        self.db
            .update_user_fields(user_id, updates)
            .map_err(|e| e.to_string())
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), String> {
        self.db.delete_user(user_id).map_err(|e| e.to_string())
    }

    async fn list_muscle_groups(&self) -> Result<Vec<String>, String> {
        self.db.list_muscle_groups().map_err(|e| e.to_string())
    }

    async fn list_exercises_by_group(&self, group: &str) -> Result<Vec<ExerciseRef>, String> {
        self.db
            .list_exercises_by_group(group)
            .map_err(|e| e.to_string())
    }

    async fn list_all_exercises(&self) -> Result<Vec<ExerciseRef>, String> {
        self.db.list_all_exercises().map_err(|e| e.to_string())
    }

    async fn get_exercise_defaults(
        &self,
        exercise_id: ExerciseId,
    ) -> Result<Option<ExerciseDefaults>, String> {
        self.db
            .get_exercise_defaults(exercise_id)
            .map_err(|e| e.to_string())
    }

    async fn plan_exists(&self, user_id: UserId, name: &str) -> Result<bool, String> {
        self.db.plan_exists(user_id, name).map_err(|e| e.to_string())
    }

    async fn create_plan(&self, user_id: UserId, name: &str) -> Result<Option<PlanId>, String> {
        match self.db.create_plan(user_id, name) {
            Ok(plan_id) => Ok(Some(plan_id)),
            Err(DbError::PlanNameExists(_)) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn rename_plan(&self, plan_id: PlanId, name: &str) -> Result<bool, String> {
        match self.db.rename_plan(plan_id, name) {
            Ok(()) => Ok(true),
            Err(DbError::PlanNameExists(_)) => Ok(false),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn delete_plan(&self, plan_id: PlanId) -> Result<(), String> {
        self.db.delete_plan(plan_id).map_err(|e| e.to_string())
    }

    async fn get_plan(
        &self,
        user_id: UserId,
        plan_id: PlanId,
    ) -> Result<Option<PlanSummary>, String> {
        self.db.get_plan(user_id, plan_id).map_err(|e| e.to_string())
    }

    async fn list_user_plans(&self, user_id: UserId) -> Result<Vec<PlanSummary>, String> {
        self.db.list_user_plans(user_id).map_err(|e| e.to_string())
    }

    async fn add_exercise_to_plan(
        &self,
        plan_id: PlanId,
        exercise_id: ExerciseId,
        sets: u32,
        reps: &str,
    ) -> Result<(), String> {
        self.db
            .add_exercise_to_plan(plan_id, exercise_id, sets, reps)
            .map_err(|e| e.to_string())
    }

    async fn remove_exercise_from_plan(
        &self,
        plan_id: PlanId,
        exercise_id: ExerciseId,
    ) -> Result<bool, String> {
        self.db
            .remove_exercise_from_plan(plan_id, exercise_id)
            .map_err(|e| e.to_string())
    }

    async fn list_plan_exercises(&self, plan_id: PlanId) -> Result<Vec<ExerciseRef>, String> {
        self.db
            .list_plan_exercises(plan_id)
            .map_err(|e| e.to_string())
    }

    async fn get_plan_details(&self, plan_id: PlanId) -> Result<Vec<PlanExerciseDetail>, String> {
        self.db.get_plan_details(plan_id).map_err(|e| e.to_string())
    }

    async fn add_progress_log(
        &self,
        user_id: UserId,
        exercise_id: ExerciseId,
        weight: f64,
        sets: u32,
        reps: &str,
        logged_at: DateTime<Utc>,
    ) -> Result<(), String> {
        self.db
            .add_progress_log(user_id, exercise_id, weight, sets, reps, logged_at)
            .map_err(|e| e.to_string())
    }

    async fn get_progress_logs(
        &self,
        user_id: UserId,
        exercise_id: ExerciseId,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProgressLog>, String> {
        self.db
            .get_progress_logs(user_id, exercise_id, period, now)
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl SessionStore for DatabaseStorage {
    async fn get_session(&self, user_id: UserId) -> Result<Option<ConvState>, String> {
        self.db.get_session(user_id).map_err(|e| e.to_string())
    }

    async fn save_session(&self, user_id: UserId, state: &ConvState) -> Result<(), String> {
        self.db
            .save_session(user_id, state)
            .map_err(|e| e.to_string())
    }

    async fn clear_session(&self, user_id: UserId) -> Result<(), String> {
        self.db.clear_session(user_id).map_err(|e| e.to_string())
    }
}
