//! Database module for fitcoach
//!
//! Provides persistence for profiles, the exercise catalog, workout plans,
//! progress logs and conversation sessions.

mod schema;

pub use schema::*;

use crate::state_machine::ConvState;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Plan name already exists: {0}")]
    PlanNameExists(String),
    #[error("Plan not found: {0}")]
    PlanNotFound(PlanId),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== User Operations ====================

    pub fn get_user(&self, user_id: UserId) -> DbResult<Option<UserProfile>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT user_id, weight, height, age, gender, activity_level, goal
             FROM users WHERE user_id = ?1",
            params![user_id],
            parse_user_row,
        )
        .optional()
        .map_err(DbError::from)
    }

    /// Insert or replace the profile for `profile.user_id`
    pub fn add_user(&self, profile: &UserProfile) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO users (user_id, weight, height, age, gender, activity_level, goal, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                profile.user_id,
                profile.weight,
                profile.height,
                profile.age,
                profile.gender.as_str(),
                profile.activity_level.as_str(),
                profile.goal.as_str(),
                now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Apply field updates in one transaction. Missing users are a no-op.
    pub fn update_user_fields(&self, user_id: UserId, updates: &[ProfileUpdate]) -> DbResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for update in updates {
            let sql = format!(
                "UPDATE users SET {} = ?1, updated_at = ?2 WHERE user_id = ?3",
                update.column()
            );
            let now = now_rfc3339();
            match *update {
                ProfileUpdate::Weight(v) => tx.execute(&sql, params![v, now, user_id])?,
                ProfileUpdate::Height(v) | ProfileUpdate::Age(v) => {
                    tx.execute(&sql, params![v, now, user_id])?
                }
                ProfileUpdate::Gender(v) => tx.execute(&sql, params![v.as_str(), now, user_id])?,
                ProfileUpdate::ActivityLevel(v) => {
                    tx.execute(&sql, params![v.as_str(), now, user_id])?
                }
                ProfileUpdate::Goal(v) => tx.execute(&sql, params![v.as_str(), now, user_id])?,
            };
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a user together with their plans, plan links and progress logs
    pub fn delete_user(&self, user_id: UserId) -> DbResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM progress_logs WHERE user_id = ?1", params![user_id])?;
        // Plan links go with their plans via ON DELETE CASCADE
        tx.execute("DELETE FROM workout_plans WHERE user_id = ?1", params![user_id])?;
        tx.execute("DELETE FROM users WHERE user_id = ?1", params![user_id])?;
        tx.commit()?;
        Ok(())
    }

    // ==================== Exercise Catalog ====================

    /// Add a catalog exercise
    #[allow(dead_code)] // Catalog is maintained out of band; used by tests
    pub fn add_exercise(
        &self,
        name: &str,
        muscle_group: &str,
        default_sets: u32,
        default_reps: &str,
    ) -> DbResult<ExerciseId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO exercises (name, muscle_group, default_sets, default_reps)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, muscle_group, default_sets, default_reps],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Distinct muscle groups present in the catalog
    pub fn list_muscle_groups(&self) -> DbResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT DISTINCT muscle_group FROM exercises ORDER BY muscle_group")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn list_exercises_by_group(&self, muscle_group: &str) -> DbResult<Vec<ExerciseRef>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT exercise_id, name FROM exercises WHERE muscle_group = ?1 ORDER BY exercise_id",
        )?;
        let rows = stmt.query_map(params![muscle_group], parse_exercise_ref)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn list_all_exercises(&self) -> DbResult<Vec<ExerciseRef>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT exercise_id, name FROM exercises ORDER BY muscle_group, name")?;
        let rows = stmt.query_map([], parse_exercise_ref)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn get_exercise_defaults(&self, exercise_id: ExerciseId) -> DbResult<Option<ExerciseDefaults>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT default_sets, default_reps FROM exercises WHERE exercise_id = ?1",
            params![exercise_id],
            |row| {
                Ok(ExerciseDefaults {
                    sets: row.get(0)?,
                    reps: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(DbError::from)
    }

    // ==================== Plan Operations ====================

    pub fn plan_exists(&self, user_id: UserId, name: &str) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM workout_plans WHERE user_id = ?1 AND name = ?2)",
            params![user_id, name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Create a plan. The name check and insert share one transaction.
    pub fn create_plan(&self, user_id: UserId, name: &str) -> DbResult<PlanId> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM workout_plans WHERE user_id = ?1 AND name = ?2)",
            params![user_id, name],
            |row| row.get(0),
        )?;
        if exists {
            return Err(DbError::PlanNameExists(name.to_string()));
        }

        tx.execute(
            "INSERT INTO workout_plans (user_id, name, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, name, now_rfc3339()],
        )?;
        let plan_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(plan_id)
    }

    /// Rename a plan unless another plan of the same owner already has `new_name`
    pub fn rename_plan(&self, plan_id: PlanId, new_name: &str) -> DbResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let owner: Option<UserId> = tx
            .query_row(
                "SELECT user_id FROM workout_plans WHERE plan_id = ?1",
                params![plan_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(owner) = owner else {
            return Err(DbError::PlanNotFound(plan_id));
        };

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM workout_plans WHERE user_id = ?1 AND name = ?2 AND plan_id != ?3)",
            params![owner, new_name, plan_id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(DbError::PlanNameExists(new_name.to_string()));
        }

        tx.execute(
            "UPDATE workout_plans SET name = ?1 WHERE plan_id = ?2",
            params![new_name, plan_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Delete a plan; its exercise links cascade
    pub fn delete_plan(&self, plan_id: PlanId) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM workout_plans WHERE plan_id = ?1", params![plan_id])?;
        Ok(())
    }

    /// Plan owned by `user_id`, if any
    pub fn get_plan(&self, user_id: UserId, plan_id: PlanId) -> DbResult<Option<PlanSummary>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT plan_id, name FROM workout_plans WHERE plan_id = ?1 AND user_id = ?2",
            params![plan_id, user_id],
            parse_plan_summary,
        )
        .optional()
        .map_err(DbError::from)
    }

    pub fn list_user_plans(&self, user_id: UserId) -> DbResult<Vec<PlanSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT plan_id, name FROM workout_plans WHERE user_id = ?1 ORDER BY plan_id",
        )?;
        let rows = stmt.query_map(params![user_id], parse_plan_summary)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn add_exercise_to_plan(
        &self,
        plan_id: PlanId,
        exercise_id: ExerciseId,
        sets: u32,
        reps: &str,
    ) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO workout_plan_exercises (plan_id, exercise_id, sets, reps)
             VALUES (?1, ?2, ?3, ?4)",
            params![plan_id, exercise_id, sets, reps],
        )?;
        Ok(())
    }

    /// Remove at most one `(plan, exercise)` link. Returns whether a row went away.
    pub fn remove_exercise_from_plan(&self, plan_id: PlanId, exercise_id: ExerciseId) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM workout_plan_exercises WHERE id = (
                 SELECT id FROM workout_plan_exercises
                 WHERE plan_id = ?1 AND exercise_id = ?2
                 ORDER BY id LIMIT 1
             )",
            params![plan_id, exercise_id],
        )?;
        Ok(deleted > 0)
    }

    /// Distinct exercises linked to a plan, in the order they were first added
    pub fn list_plan_exercises(&self, plan_id: PlanId) -> DbResult<Vec<ExerciseRef>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT e.exercise_id, e.name
             FROM workout_plan_exercises wpe
             JOIN exercises e ON wpe.exercise_id = e.exercise_id
             WHERE wpe.plan_id = ?1
             GROUP BY e.exercise_id, e.name
             ORDER BY MIN(wpe.id)",
        )?;
        let rows = stmt.query_map(params![plan_id], parse_exercise_ref)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn get_plan_details(&self, plan_id: PlanId) -> DbResult<Vec<PlanExerciseDetail>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT e.name, wpe.sets, wpe.reps
             FROM workout_plan_exercises wpe
             JOIN exercises e ON wpe.exercise_id = e.exercise_id
             WHERE wpe.plan_id = ?1
             ORDER BY wpe.id",
        )?;
        let rows = stmt.query_map(params![plan_id], |row| {
            Ok(PlanExerciseDetail {
                exercise_name: row.get(0)?,
                sets: row.get(1)?,
                reps: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Progress Operations ====================

    pub fn add_progress_log(
        &self,
        user_id: UserId,
        exercise_id: ExerciseId,
        weight: f64,
        sets: u32,
        reps: &str,
        logged_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO progress_logs (user_id, exercise_id, weight, sets, reps, log_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, exercise_id, weight, sets, reps, format_datetime(logged_at)],
        )?;
        Ok(())
    }

    /// Logs for one exercise, newest first, limited to the period ending at `now`
    pub fn get_progress_logs(
        &self,
        user_id: UserId,
        exercise_id: ExerciseId,
        period: Period,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<ProgressLog>> {
        let conn = self.conn.lock().unwrap();
        // Stored timestamps share one fixed-width format, so text order is time order
        let cutoff = period
            .cutoff(now)
            .map_or_else(String::new, format_datetime);

        let mut stmt = conn.prepare(
            "SELECT weight, sets, reps, log_date FROM progress_logs
             WHERE user_id = ?1 AND exercise_id = ?2 AND log_date >= ?3
             ORDER BY log_date DESC, log_id DESC",
        )?;
        let rows = stmt.query_map(params![user_id, exercise_id, cutoff], |row| {
            Ok(ProgressLog {
                weight: row.get(0)?,
                sets: row.get(1)?,
                reps: row.get(2)?,
                log_date: parse_datetime(&row.get::<_, String>(3)?),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Session Operations ====================

    /// Persisted conversation state, `None` when the user has no active flow
    pub fn get_session(&self, user_id: UserId) -> DbResult<Option<ConvState>> {
        let conn = self.conn.lock().unwrap();
        let state_json: Option<String> = conn
            .query_row(
                "SELECT state FROM sessions WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        match state_json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn save_session(&self, user_id: UserId, state: &ConvState) -> DbResult<()> {
        let state_json = serde_json::to_string(state)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions (user_id, state, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
            params![user_id, state_json, now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn clear_session(&self, user_id: UserId) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
        Ok(())
    }
}

fn parse_user_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        user_id: row.get(0)?,
        weight: row.get(1)?,
        height: row.get(2)?,
        age: row.get(3)?,
        gender: parse_text_column(row, 4)?,
        activity_level: parse_text_column(row, 5)?,
        goal: parse_text_column(row, 6)?,
    })
}

fn parse_text_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })
}

fn parse_exercise_ref(row: &Row<'_>) -> rusqlite::Result<ExerciseRef> {
    Ok(ExerciseRef {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn parse_plan_summary(row: &Row<'_>) -> rusqlite::Result<PlanSummary> {
    Ok(PlanSummary {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn now_rfc3339() -> String {
    format_datetime(Utc::now())
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
