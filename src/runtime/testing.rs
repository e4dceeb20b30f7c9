//! In-memory storage for testing
//!
//! Mirrors the ordering and uniqueness rules of the SQLite store so runtime
//! tests exercise the same outcomes without real I/O.

use super::traits::*;
use crate::db::{
    ExerciseDefaults, ExerciseId, ExerciseRef, Period, PlanExerciseDetail, PlanId, PlanSummary,
    ProfileUpdate, ProgressLog, UserId, UserProfile,
};
use crate::state_machine::ConvState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct CatalogEntry {
    id: ExerciseId,
    name: String,
    group: String,
    sets: u32,
    reps: String,
}

struct PlanRow {
    id: PlanId,
    user_id: UserId,
    name: String,
}

struct PlanLink {
    id: i64,
    plan_id: PlanId,
    exercise_id: ExerciseId,
    sets: u32,
    reps: String,
}

struct LogRow {
    id: i64,
    user_id: UserId,
    exercise_id: ExerciseId,
    log: ProgressLog,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: HashMap<UserId, UserProfile>,
    exercises: Vec<CatalogEntry>,
    plans: Vec<PlanRow>,
    links: Vec<PlanLink>,
    logs: Vec<LogRow>,
    sessions: HashMap<UserId, ConvState>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn exercise_name(&self, exercise_id: ExerciseId) -> String {
        self.exercises
            .iter()
            .find(|e| e.id == exercise_id)
            .map(|e| e.name.clone())
            .unwrap_or_default()
    }
}

/// In-memory storage; clones share the same data
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    inner: Arc<Mutex<Inner>>,
    /// When set, every profile/plan/progress write fails
    fail_writes: Arc<AtomicBool>,
    /// When set, session saves and clears fail
    fail_sessions: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_exercise(&self, name: &str, group: &str, sets: u32, reps: &str) -> ExerciseId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id();
        inner.exercises.push(CatalogEntry {
            id,
            name: name.to_string(),
            group: group.to_string(),
            sets,
            reps: reps.to_string(),
        });
        id
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    pub fn session_of(&self, user_id: UserId) -> Option<ConvState> {
        self.inner.lock().unwrap().sessions.get(&user_id).cloned()
    }

    pub fn log_count(&self, user_id: UserId) -> usize {
        self.inner
            .lock()
            .unwrap()
            .logs
            .iter()
            .filter(|row| row.user_id == user_id)
            .count()
    }

    fn check_write(&self) -> Result<(), String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err("simulated write failure".to_string())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FitnessStore for InMemoryStorage {
    async fn get_user(&self, user_id: UserId) -> Result<Option<UserProfile>, String> {
        Ok(self.inner.lock().unwrap().users.get(&user_id).cloned())
    }

    async fn add_user(&self, profile: &UserProfile) -> Result<(), String> {
        self.check_write()?;
        self.inner
            .lock()
            .unwrap()
            .users
            .insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn update_user_fields(
        &self,
        user_id: UserId,
        updates: &[ProfileUpdate],
    ) -> Result<(), String> {
        self.check_write()?;
        let mut inner = self.inner.lock().unwrap();
        let profile = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| format!("User not found: {user_id}"))?;
        for update in updates {
            update.apply(profile);
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: UserId) -> Result<(), String> {
        self.check_write()?;
        let mut inner = self.inner.lock().unwrap();
        inner.users.remove(&user_id);
        let owned: Vec<PlanId> = inner
            .plans
            .iter()
            .filter(|plan| plan.user_id == user_id)
            .map(|plan| plan.id)
            .collect();
        inner.links.retain(|link| !owned.contains(&link.plan_id));
        inner.plans.retain(|plan| plan.user_id != user_id);
        inner.logs.retain(|row| row.user_id != user_id);
        Ok(())
    }

    async fn list_muscle_groups(&self) -> Result<Vec<String>, String> {
        let inner = self.inner.lock().unwrap();
        let mut groups: Vec<String> = inner.exercises.iter().map(|e| e.group.clone()).collect();
        groups.sort();
        groups.dedup();
        Ok(groups)
    }

    async fn list_exercises_by_group(&self, group: &str) -> Result<Vec<ExerciseRef>, String> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .exercises
            .iter()
            .filter(|e| e.group == group)
            .map(|e| ExerciseRef {
                id: e.id,
                name: e.name.clone(),
            })
            .collect())
    }

    async fn list_all_exercises(&self) -> Result<Vec<ExerciseRef>, String> {
        let inner = self.inner.lock().unwrap();
        let mut all: Vec<&CatalogEntry> = inner.exercises.iter().collect();
        all.sort_by(|a, b| (&a.group, &a.name).cmp(&(&b.group, &b.name)));
        Ok(all
            .into_iter()
            .map(|e| ExerciseRef {
                id: e.id,
                name: e.name.clone(),
            })
            .collect())
    }

    async fn get_exercise_defaults(
        &self,
        exercise_id: ExerciseId,
    ) -> Result<Option<ExerciseDefaults>, String> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .exercises
            .iter()
            .find(|e| e.id == exercise_id)
            .map(|e| ExerciseDefaults {
                sets: e.sets,
                reps: e.reps.clone(),
            }))
    }

    async fn plan_exists(&self, user_id: UserId, name: &str) -> Result<bool, String> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .plans
            .iter()
            .any(|plan| plan.user_id == user_id && plan.name == name))
    }

    async fn create_plan(&self, user_id: UserId, name: &str) -> Result<Option<PlanId>, String> {
        self.check_write()?;
        let mut inner = self.inner.lock().unwrap();
        if inner
            .plans
            .iter()
            .any(|plan| plan.user_id == user_id && plan.name == name)
        {
            return Ok(None);
        }
        let id = inner.next_id();
        inner.plans.push(PlanRow {
            id,
            user_id,
            name: name.to_string(),
        });
        Ok(Some(id))
    }

    async fn rename_plan(&self, plan_id: PlanId, name: &str) -> Result<bool, String> {
        self.check_write()?;
        let mut inner = self.inner.lock().unwrap();
        let owner = inner
            .plans
            .iter()
            .find(|plan| plan.id == plan_id)
            .map(|plan| plan.user_id)
            .ok_or_else(|| format!("Plan not found: {plan_id}"))?;
        if inner
            .plans
            .iter()
            .any(|plan| plan.user_id == owner && plan.id != plan_id && plan.name == name)
        {
            return Ok(false);
        }
        if let Some(plan) = inner.plans.iter_mut().find(|plan| plan.id == plan_id) {
            plan.name = name.to_string();
        }
        Ok(true)
    }

    async fn delete_plan(&self, plan_id: PlanId) -> Result<(), String> {
        self.check_write()?;
        let mut inner = self.inner.lock().unwrap();
        inner.links.retain(|link| link.plan_id != plan_id);
        inner.plans.retain(|plan| plan.id != plan_id);
        Ok(())
    }

    async fn get_plan(
        &self,
        user_id: UserId,
        plan_id: PlanId,
    ) -> Result<Option<PlanSummary>, String> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .plans
            .iter()
            .find(|plan| plan.id == plan_id && plan.user_id == user_id)
            .map(|plan| PlanSummary {
                id: plan.id,
                name: plan.name.clone(),
            }))
    }

    async fn list_user_plans(&self, user_id: UserId) -> Result<Vec<PlanSummary>, String> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .plans
            .iter()
            .filter(|plan| plan.user_id == user_id)
            .map(|plan| PlanSummary {
                id: plan.id,
                name: plan.name.clone(),
            })
            .collect())
    }

    async fn add_exercise_to_plan(
        &self,
        plan_id: PlanId,
        exercise_id: ExerciseId,
        sets: u32,
        reps: &str,
    ) -> Result<(), String> {
        self.check_write()?;
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id();
        inner.links.push(PlanLink {
            id,
            plan_id,
            exercise_id,
            sets,
            reps: reps.to_string(),
        });
        Ok(())
    }

    async fn remove_exercise_from_plan(
        &self,
        plan_id: PlanId,
        exercise_id: ExerciseId,
    ) -> Result<bool, String> {
        self.check_write()?;
        let mut inner = self.inner.lock().unwrap();
        let position = inner
            .links
            .iter()
            .filter(|link| link.plan_id == plan_id && link.exercise_id == exercise_id)
            .min_by_key(|link| link.id)
            .map(|link| link.id)
            .and_then(|id| inner.links.iter().position(|link| link.id == id));
        match position {
            Some(index) => {
                inner.links.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_plan_exercises(&self, plan_id: PlanId) -> Result<Vec<ExerciseRef>, String> {
        let inner = self.inner.lock().unwrap();
        let mut seen: Vec<ExerciseId> = Vec::new();
        for link in inner.links.iter().filter(|link| link.plan_id == plan_id) {
            if !seen.contains(&link.exercise_id) {
                seen.push(link.exercise_id);
            }
        }
        Ok(seen
            .into_iter()
            .map(|id| ExerciseRef {
                id,
                name: inner.exercise_name(id),
            })
            .collect())
    }

    async fn get_plan_details(&self, plan_id: PlanId) -> Result<Vec<PlanExerciseDetail>, String> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .links
            .iter()
            .filter(|link| link.plan_id == plan_id)
            .map(|link| PlanExerciseDetail {
                exercise_name: inner.exercise_name(link.exercise_id),
                sets: link.sets,
                reps: link.reps.clone(),
            })
            .collect())
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
        self.check_write()?;
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id();
        inner.logs.push(LogRow {
            id,
            user_id,
            exercise_id,
            log: ProgressLog {
                weight,
                sets,
                reps: reps.to_string(),
                log_date: logged_at,
            },
        });
        Ok(())
    }

    async fn get_progress_logs(
        &self,
        user_id: UserId,
        exercise_id: ExerciseId,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProgressLog>, String> {
        let inner = self.inner.lock().unwrap();
        let cutoff = period.cutoff(now);
        let mut rows: Vec<&LogRow> = inner
            .logs
            .iter()
            .filter(|row| row.user_id == user_id && row.exercise_id == exercise_id)
            .filter(|row| cutoff.map_or(true, |cutoff| row.log.log_date >= cutoff))
            .collect();
        rows.sort_by(|a, b| (b.log.log_date, b.id).cmp(&(a.log.log_date, a.id)));
        Ok(rows.into_iter().map(|row| row.log.clone()).collect())
    }
}

#[async_trait]
impl SessionStore for InMemoryStorage {
    async fn get_session(&self, user_id: UserId) -> Result<Option<ConvState>, String> {
        Ok(self.session_of(user_id))
    }

    async fn save_session(&self, user_id: UserId, state: &ConvState) -> Result<(), String> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err("simulated session write failure".to_string());
        }
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(user_id, state.clone());
        Ok(())
    }

    async fn clear_session(&self, user_id: UserId) -> Result<(), String> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err("simulated session write failure".to_string());
        }
        self.inner.lock().unwrap().sessions.remove(&user_id);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ActivityLevel, Gender, Goal};
    use crate::render::Reply;
    use crate::runtime::{RuntimeManager, SseEvent, Turn};
    use crate::state_machine::event::{Choice, Command};
    use crate::state_machine::state::{
        LogProgressStep, PlanCreationStep, RegistrationStep, ViewProgressStep,
    };
    use crate::state_machine::Event;
    use std::time::Duration;

    struct Harness {
        storage: InMemoryStorage,
        manager: RuntimeManager<InMemoryStorage>,
    }

    impl Harness {
        fn new() -> Self {
            let storage = InMemoryStorage::new();
            storage.seed_exercise("Bench press", "Chest", 4, "8-10");
            storage.seed_exercise("Push-up", "Chest", 3, "15");
            storage.seed_exercise("Squat", "Legs", 5, "5");
            let manager = RuntimeManager::new(storage.clone(), 8);
            Self { storage, manager }
        }

        async fn send(&self, user_id: UserId, event: Event) -> Turn {
            tokio::time::timeout(
                Duration::from_secs(2),
                self.manager.send_event(user_id, event),
            )
            .await
            .expect("turn timed out")
            .expect("runtime failed")
        }

        async fn text(&self, user_id: UserId, text: &str) -> Turn {
            self.send(
                user_id,
                Event::Text {
                    text: text.to_string(),
                },
            )
            .await
        }

        async fn command(&self, user_id: UserId, command: Command) -> Turn {
            self.send(user_id, Event::Command(command)).await
        }

        async fn choose(&self, user_id: UserId, choice: Choice) -> Turn {
            self.send(user_id, Event::Choice(choice)).await
        }

        async fn register(&self, user_id: UserId) -> Turn {
            self.command(user_id, Command::Start).await;
            self.choose(user_id, Choice::StartRegistration).await;
            self.text(user_id, "80").await;
            self.text(user_id, "180").await;
            self.text(user_id, "30").await;
            self.choose(
                user_id,
                Choice::Gender {
                    gender: Gender::Male,
                },
            )
            .await;
            self.choose(
                user_id,
                Choice::ActivityLevel {
                    level: ActivityLevel::Moderate,
                },
            )
            .await;
            self.choose(
                user_id,
                Choice::Goal {
                    goal: Goal::Maintain,
                },
            )
            .await
        }

        /// Build a plan holding one Chest exercise; returns its id
        async fn plan_with_bench(&self, user_id: UserId, name: &str) -> PlanId {
            self.command(user_id, Command::Plan).await;
            let turn = self.text(user_id, name).await;
            let ConvState::PlanCreation {
                step: PlanCreationStep::MuscleGroup { plan_id, .. },
            } = turn.state
            else {
                panic!("expected muscle group step, got {:?}", turn.state);
            };
            self.choose(
                user_id,
                Choice::MuscleGroup {
                    group: "Chest".to_string(),
                },
            )
            .await;
            self.choose(user_id, Choice::Exercise { exercise_id: 1 })
                .await;
            self.choose(user_id, Choice::FinishPlan).await;
            plan_id
        }
    }

    fn last_text(turn: &Turn) -> &str {
        turn.replies
            .last()
            .map(|reply: &Reply| reply.text.as_str())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_in_memory_storage_plan_names_are_per_user() {
        let storage = InMemoryStorage::new();
        let first = storage.create_plan(1, "Push").await.unwrap();
        assert!(first.is_some());
        assert_eq!(storage.create_plan(1, "Push").await.unwrap(), None);
        assert!(storage.create_plan(2, "Push").await.unwrap().is_some());

        // Renaming to its own name is not a conflict
        assert!(storage.rename_plan(first.unwrap(), "Push").await.unwrap());
    }

    #[tokio::test]
    async fn test_registration_flow_saves_profile_and_clears_session() {
        let h = Harness::new();

        let turn = h.command(10, Command::Start).await;
        assert!(last_text(&turn).starts_with("Welcome!"));

        let turn = h.choose(10, Choice::StartRegistration).await;
        assert_eq!(
            turn.state,
            ConvState::Registration {
                step: RegistrationStep::Weight
            }
        );

        let turn = h.text(10, "abc").await;
        assert_eq!(
            turn.state,
            ConvState::Registration {
                step: RegistrationStep::Weight
            }
        );

        let turn = h.text(10, "82,5").await;
        assert_eq!(
            turn.state,
            ConvState::Registration {
                step: RegistrationStep::Height { weight: 82.5 }
            }
        );
        assert_eq!(h.storage.session_of(10), Some(turn.state.clone()));

        let turn = h.register(10).await;
        assert!(last_text(&turn).starts_with("Registration complete!"));
        assert!(turn.state.is_idle());
        assert_eq!(h.storage.session_of(10), None);

        let profile = h.storage.get_user(10).await.unwrap().unwrap();
        assert_eq!(profile.height, 180);
        assert_eq!(profile.goal, Goal::Maintain);

        let turn = h.command(10, Command::Start).await;
        assert_eq!(last_text(&turn), "Welcome back!");
    }

    #[tokio::test]
    async fn test_plan_creation_loop_and_duplicate_name() {
        let h = Harness::new();
        h.register(20).await;

        // No plans yet: /plan goes straight to naming
        let turn = h.command(20, Command::Plan).await;
        assert_eq!(
            turn.state,
            ConvState::PlanCreation {
                step: PlanCreationStep::PlanName
            }
        );

        let turn = h.text(20, "Push Day").await;
        assert!(last_text(&turn).contains("Plan 'Push Day' created"));

        let turn = h
            .choose(
                20,
                Choice::MuscleGroup {
                    group: "Chest".to_string(),
                },
            )
            .await;
        assert!(matches!(
            turn.state,
            ConvState::PlanCreation {
                step: PlanCreationStep::ExerciseSelection { .. }
            }
        ));

        let turn = h.choose(20, Choice::Exercise { exercise_id: 2 }).await;
        assert!(matches!(
            turn.state,
            ConvState::PlanCreation {
                step: PlanCreationStep::AddMoreExercises { .. }
            }
        ));

        h.choose(20, Choice::AddMoreExercises).await;
        h.choose(
            20,
            Choice::MuscleGroup {
                group: "Legs".to_string(),
            },
        )
        .await;
        h.choose(20, Choice::Exercise { exercise_id: 3 }).await;
        let turn = h.choose(20, Choice::FinishPlan).await;
        assert_eq!(last_text(&turn), "Plan saved!");
        assert!(turn.state.is_idle());

        let plans = h.storage.list_user_plans(20).await.unwrap();
        assert_eq!(plans.len(), 1);
        let details = h.storage.get_plan_details(plans[0].id).await.unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].exercise_name, "Push-up");
        assert_eq!(details[0].reps, "15");

        // Same name again is rejected and the step stays
        h.choose(20, Choice::CreatePlan).await;
        let turn = h.text(20, "Push Day").await;
        assert!(last_text(&turn).contains("already have a plan named 'Push Day'"));
        assert_eq!(
            turn.state,
            ConvState::PlanCreation {
                step: PlanCreationStep::PlanName
            }
        );
        assert_eq!(h.storage.list_user_plans(20).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_log_then_view_progress_with_filter() {
        let h = Harness::new();
        h.register(30).await;
        let plan_id = h.plan_with_bench(30, "Chest").await;

        let turn = h.command(30, Command::Log).await;
        assert!(matches!(
            turn.state,
            ConvState::LogProgress {
                step: LogProgressStep::PlanSelection { .. }
            }
        ));
        h.choose(30, Choice::Plan { plan_id }).await;
        let turn = h.choose(30, Choice::Exercise { exercise_id: 1 }).await;
        assert_eq!(
            turn.state,
            ConvState::LogProgress {
                step: LogProgressStep::LogDetails { exercise_id: 1 }
            }
        );

        let turn = h.text(30, "60x3").await;
        assert!(!turn.state.is_idle());
        assert_eq!(h.storage.log_count(30), 0);

        let turn = h.text(30, "62.5x3x8-10").await;
        assert_eq!(last_text(&turn), "Progress recorded!");
        assert!(turn.state.is_idle());
        assert_eq!(h.storage.log_count(30), 1);

        h.choose(30, Choice::ViewProgress).await;
        h.choose(30, Choice::Plan { plan_id }).await;
        let turn = h.choose(30, Choice::Exercise { exercise_id: 1 }).await;
        assert!(matches!(
            turn.state,
            ConvState::ViewProgress {
                step: ViewProgressStep::FilterDisplay { .. }
            }
        ));
        assert!(last_text(&turn).contains("Progress for Bench press"));
        assert!(last_text(&turn).contains("62.5 kg x 3x8-10"));

        let turn = h
            .choose(
                30,
                Choice::ProgressFilter {
                    period: Period::Week,
                },
            )
            .await;
        assert!(last_text(&turn).contains("(Week)"));
        assert!(matches!(turn.state, ConvState::ViewProgress { .. }));
    }

    #[tokio::test]
    async fn test_rename_and_delete_plan() {
        let h = Harness::new();
        h.register(40).await;
        let first = h.plan_with_bench(40, "A").await;
        h.choose(40, Choice::CreatePlan).await;
        h.text(40, "B").await;
        h.choose(40, Choice::FinishExercises).await;

        h.choose(40, Choice::EditPlan { plan_id: first }).await;
        h.choose(
            40,
            Choice::EditAction {
                action: crate::state_machine::event::EditAction::Rename,
            },
        )
        .await;
        let turn = h.text(40, "B").await;
        assert!(last_text(&turn).contains("already have a plan named 'B'"));

        let turn = h.text(40, "C").await;
        assert!(last_text(&turn).starts_with("Plan renamed to 'C'."));
        assert!(turn.state.is_idle());

        let turn = h.choose(40, Choice::DeletePlan { plan_id: first }).await;
        assert!(last_text(&turn).starts_with("Plan 'C' deleted."));
        let names: Vec<String> = h
            .storage
            .list_user_plans(40)
            .await
            .unwrap()
            .into_iter()
            .map(|plan| plan.name)
            .collect();
        assert_eq!(names, vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn test_foreign_plan_is_not_found() {
        let h = Harness::new();
        h.register(50).await;
        let plan_id = h.plan_with_bench(50, "Mine").await;

        let turn = h.choose(51, Choice::DeletePlan { plan_id }).await;
        assert_eq!(last_text(&turn), "Plan not found.");
        assert_eq!(h.storage.list_user_plans(50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resumes_persisted_session() {
        let h = Harness::new();
        h.storage
            .save_session(
                60,
                &ConvState::Registration {
                    step: RegistrationStep::Height { weight: 75.0 },
                },
            )
            .await
            .unwrap();

        let turn = h.text(60, "170").await;
        assert_eq!(
            turn.state,
            ConvState::Registration {
                step: RegistrationStep::Age {
                    weight: 75.0,
                    height: 170
                }
            }
        );
        assert_eq!(h.manager.session(60).await.unwrap(), turn.state);
    }

    #[tokio::test]
    async fn test_users_do_not_share_sessions() {
        let h = Harness::new();
        h.command(70, Command::Start).await;
        h.command(71, Command::Start).await;
        h.choose(70, Choice::StartRegistration).await;
        h.choose(71, Choice::StartRegistration).await;

        let (a, b) = tokio::join!(h.text(70, "70"), h.text(71, "90"));
        assert_eq!(
            a.state,
            ConvState::Registration {
                step: RegistrationStep::Height { weight: 70.0 }
            }
        );
        assert_eq!(
            b.state,
            ConvState::Registration {
                step: RegistrationStep::Height { weight: 90.0 }
            }
        );
    }

    #[tokio::test]
    async fn test_write_failure_restores_session() {
        let h = Harness::new();
        h.command(80, Command::Start).await;
        h.choose(80, Choice::StartRegistration).await;
        h.text(80, "80").await;
        h.text(80, "180").await;
        h.text(80, "30").await;
        h.choose(
            80,
            Choice::Gender {
                gender: Gender::Female,
            },
        )
        .await;
        let before = h
            .choose(
                80,
                Choice::ActivityLevel {
                    level: ActivityLevel::Light,
                },
            )
            .await
            .state;

        h.storage.set_fail_writes(true);
        let mut events = h.manager.subscribe(80).await.unwrap();
        let turn = h
            .choose(
                80,
                Choice::Goal {
                    goal: Goal::LoseWeight,
                },
            )
            .await;

        assert_eq!(turn.state, before);
        assert_eq!(h.storage.session_of(80), Some(before.clone()));
        assert_eq!(turn.replies.len(), 1);
        assert_eq!(last_text(&turn), "Something went wrong, please try again.");
        assert!(h.storage.get_user(80).await.unwrap().is_none());

        let mut saw_error = false;
        while let Ok(event) = events.try_recv() {
            saw_error |= matches!(event, SseEvent::Error { .. });
        }
        assert!(saw_error);

        // Retrying after the store recovers completes the flow
        h.storage.set_fail_writes(false);
        let turn = h
            .choose(
                80,
                Choice::Goal {
                    goal: Goal::LoseWeight,
                },
            )
            .await;
        assert!(turn.state.is_idle());
        assert!(h.storage.get_user(80).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_events_for_one_user_apply_in_order() {
        let h = Harness::new();
        h.command(72, Command::Start).await;
        h.choose(72, Choice::StartRegistration).await;

        let (first, second) = tokio::join!(h.text(72, "80"), h.text(72, "180"));
        assert_eq!(
            first.state,
            ConvState::Registration {
                step: RegistrationStep::Height { weight: 80.0 }
            }
        );
        let expected = ConvState::Registration {
            step: RegistrationStep::Age {
                weight: 80.0,
                height: 180,
            },
        };
        assert_eq!(second.state, expected);
        assert_eq!(h.storage.session_of(72), Some(expected));
    }

    #[tokio::test]
    async fn test_concurrent_first_contact_shares_one_runtime() {
        let h = Harness::new();
        let (a, b) = tokio::join!(h.manager.get_or_create(74), h.manager.get_or_create(74));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a.mailbox_tx.same_channel(&b.mailbox_tx));

        let turn = h.command(74, Command::Start).await;
        assert!(last_text(&turn).starts_with("Welcome!"));
    }

    #[tokio::test]
    async fn test_session_write_failure_after_plan_insert_keeps_progress() {
        let h = Harness::new();
        h.register(85).await;
        h.command(85, Command::Plan).await;

        h.storage.set_fail_sessions(true);
        let turn = h.text(85, "Push Day").await;
        assert!(last_text(&turn).contains("Plan 'Push Day' created"));
        let ConvState::PlanCreation {
            step: PlanCreationStep::MuscleGroup { plan_id, .. },
        } = turn.state
        else {
            panic!("expected muscle group step, got {:?}", turn.state);
        };
        // Stored session is behind until the next event
        assert_eq!(
            h.storage.session_of(85),
            Some(ConvState::PlanCreation {
                step: PlanCreationStep::PlanName
            })
        );

        h.storage.set_fail_sessions(false);
        let turn = h
            .choose(
                85,
                Choice::MuscleGroup {
                    group: "Chest".to_string(),
                },
            )
            .await;
        assert!(matches!(
            turn.state,
            ConvState::PlanCreation {
                step: PlanCreationStep::ExerciseSelection { plan_id: id, .. }
            } if id == plan_id
        ));
        assert_eq!(h.storage.session_of(85), Some(turn.state.clone()));

        h.choose(85, Choice::Exercise { exercise_id: 1 }).await;
        let turn = h.choose(85, Choice::FinishPlan).await;
        assert_eq!(last_text(&turn), "Plan saved!");

        let plans = h.storage.list_user_plans(85).await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].id, plan_id);
        assert_eq!(h.storage.get_plan_details(plan_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_session_write_failure_after_progress_log_records_once() {
        let h = Harness::new();
        h.register(86).await;
        let plan_id = h.plan_with_bench(86, "Chest").await;
        h.command(86, Command::Log).await;
        h.choose(86, Choice::Plan { plan_id }).await;
        h.choose(86, Choice::Exercise { exercise_id: 1 }).await;

        h.storage.set_fail_sessions(true);
        let turn = h.text(86, "60x3x10").await;
        assert_eq!(last_text(&turn), "Progress recorded!");
        assert!(turn.state.is_idle());
        assert_eq!(h.storage.log_count(86), 1);

        // The next event first clears the stale log-details session
        h.storage.set_fail_sessions(false);
        let turn = h.text(86, "60x3x10").await;
        assert!(turn.state.is_idle());
        assert_eq!(h.storage.log_count(86), 1);
        assert_eq!(h.storage.session_of(86), None);
    }

    #[tokio::test]
    async fn test_effect_outcomes_are_not_accepted_from_transport() {
        let h = Harness::new();
        let result = h
            .manager
            .send_event(
                95,
                Event::PlanRenamed {
                    name: "Sneaky".to_string(),
                },
            )
            .await;
        assert!(result.is_err());
        assert_eq!(h.storage.session_of(95), None);
    }

    #[tokio::test]
    async fn test_reset_profile_removes_user_data() {
        let h = Harness::new();
        h.register(90).await;
        h.plan_with_bench(90, "Full body").await;

        let turn = h.choose(90, Choice::ResetProfile).await;
        assert!(last_text(&turn).contains("profile has been reset"));
        assert!(h.storage.get_user(90).await.unwrap().is_none());
        assert!(h.storage.list_user_plans(90).await.unwrap().is_empty());
    }
}
