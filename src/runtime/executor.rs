//! Conversation runtime executor

use super::traits::Storage;
use super::{Inbound, SseEvent, Turn};

use crate::render::{self, Reply};
use crate::state_machine::{transition, ConvContext, ConvState, Effect, Event};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

const STORAGE_FAILURE_REPLY: &str = "Something went wrong, please try again.";

/// Per-user conversation runtime, generic over storage
pub struct ConversationRuntime<S>
where
    S: Storage + Clone + 'static,
{
    context: ConvContext,
    state: ConvState,
    storage: S,
    mailbox_rx: mpsc::Receiver<Inbound>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    cancel: CancellationToken,
    /// Replies produced by the event currently being processed
    turn_replies: Vec<Reply>,
    /// A profile/plan/progress write landed during the current event
    turn_committed: bool,
    /// The in-memory session is ahead of the stored one
    persist_pending: bool,
}

impl<S> ConversationRuntime<S>
where
    S: Storage + Clone + 'static,
{
    pub fn new(
        context: ConvContext,
        state: ConvState,
        storage: S,
        mailbox_rx: mpsc::Receiver<Inbound>,
        broadcast_tx: broadcast::Sender<SseEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            context,
            state,
            storage,
            mailbox_rx,
            broadcast_tx,
            cancel,
            turn_replies: Vec::new(),
            turn_committed: false,
            persist_pending: false,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(user_id = self.context.user_id, "Starting conversation runtime");

        // Process events in a loop - no recursion
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                Some(inbound) = self.mailbox_rx.recv() => {
                    let turn = self.handle_inbound(inbound.event).await;
                    if let Some(respond_to) = inbound.respond_to {
                        let _ = respond_to.send(turn);
                    }
                }

                else => break,
            }
        }

        tracing::info!(user_id = self.context.user_id, "Conversation runtime stopped");
    }

    /// Run one inbound event to completion. A failure before any write
    /// restores the session as it was before the event; after a write the
    /// advanced session is kept so it stays consistent with stored data.
    async fn handle_inbound(&mut self, event: Event) -> Turn {
        let event_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "event",
            %event_id,
            user_id = self.context.user_id,
            flow = self.state.flow_name(),
        );

        async {
            if self.persist_pending {
                self.sync_session().await;
            }

            let snapshot = self.state.clone();
            self.turn_replies.clear();
            self.turn_committed = false;

            if let Err(e) = self.process_event(event).await {
                let _ = self.broadcast_tx.send(SseEvent::Error { message: e.clone() });

                if self.turn_committed {
                    tracing::error!(error = %e, "Error after a committed write, keeping session");
                    self.persist_pending = true;
                    let reply =
                        render::reprompt(STORAGE_FAILURE_REPLY, &self.state, &self.context);
                    self.emit_reply(reply);
                } else {
                    tracing::error!(error = %e, "Error handling event, restoring session");
                    self.state = snapshot;
                    self.sync_session().await;
                    self.turn_replies.clear();
                    self.emit_reply(Reply::with_menu(
                        STORAGE_FAILURE_REPLY,
                        render::main_menu(),
                    ));
                }
            }

            Turn {
                replies: std::mem::take(&mut self.turn_replies),
                state: self.state.clone(),
            }
        }
        .instrument(span)
        .await
    }

    async fn process_event(&mut self, event: Event) -> Result<(), String> {
        // We need to process events in a loop to handle chained effects
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            // Pure state transition
            let result = match transition(&self.state, &self.context, current_event) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "Rejected event");
                    return Err(e.to_string());
                }
            };

            // Update state
            let old_state = std::mem::replace(&mut self.state, result.new_state);
            if old_state != self.state {
                tracing::debug!(
                    from = old_state.flow_name(),
                    from_step = ?old_state.step_name(),
                    to = self.state.flow_name(),
                    to_step = ?self.state.step_name(),
                    "State transition"
                );
            }

            // Execute effects and collect generated events
            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect).await? {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(())
    }

    fn emit_reply(&mut self, reply: Reply) {
        let _ = self.broadcast_tx.send(SseEvent::Reply {
            reply: reply.clone(),
        });
        self.turn_replies.push(reply);
    }

    /// `Idle` has no session row
    async fn persist_state(&self) -> Result<(), String> {
        let user_id = self.context.user_id;
        if self.state.is_idle() {
            self.storage.clear_session(user_id).await
        } else {
            self.storage.save_session(user_id, &self.state).await
        }
    }

    /// Best-effort write of the in-memory session; failures stay pending
    async fn sync_session(&mut self) {
        match self.persist_state().await {
            Ok(()) => self.persist_pending = false,
            Err(e) => {
                tracing::warn!(error = %e, "Session not persisted, retrying on next event");
                self.persist_pending = true;
            }
        }
    }

    /// Execute an effect and optionally return a generated event
    #[allow(clippy::too_many_lines)] // One arm per effect
    async fn execute_effect(&mut self, effect: Effect) -> Result<Option<Event>, String> {
        let user_id = self.context.user_id;

        match effect {
            Effect::Reply(reply) => {
                self.emit_reply(reply);
                Ok(None)
            }

            Effect::PersistState => {
                // Once a write landed the session must move forward with it
                if self.turn_committed {
                    self.sync_session().await;
                } else {
                    self.persist_state().await?;
                    self.persist_pending = false;
                }

                // Broadcast state change with full state data
                let state_json = serde_json::to_value(&self.state).unwrap_or(Value::Null);
                let _ = self
                    .broadcast_tx
                    .send(SseEvent::StateChange { state: state_json });
                Ok(None)
            }

            // ==================== Writes ====================
            Effect::SaveProfile(profile) => {
                self.storage.add_user(&profile).await?;
                self.turn_committed = true;
                tracing::info!(user_id, goal = %profile.goal, "Registration completed");
                Ok(None)
            }

            Effect::UpdateProfile(update) => {
                self.storage.update_user_fields(user_id, &[update]).await?;
                self.turn_committed = true;
                tracing::info!(user_id, field = ?update.field(), "Profile field updated");
                Ok(None)
            }

            Effect::DeleteProfile => {
                self.storage.delete_user(user_id).await?;
                self.turn_committed = true;
                tracing::info!(user_id, "Profile reset");
                Ok(None)
            }

            Effect::CreatePlan { name } => {
                if self.storage.plan_exists(user_id, &name).await? {
                    return Ok(Some(Event::PlanNameTaken { name }));
                }
                // The insert re-checks under the same transaction
                match self.storage.create_plan(user_id, &name).await? {
                    Some(plan_id) => {
                        self.turn_committed = true;
                        tracing::info!(user_id, plan_id, "Plan created");
                        Ok(Some(Event::PlanCreated { plan_id, name }))
                    }
                    None => Ok(Some(Event::PlanNameTaken { name })),
                }
            }

            Effect::RenamePlan { plan_id, name } => {
                if self.storage.rename_plan(plan_id, &name).await? {
                    self.turn_committed = true;
                    tracing::info!(user_id, plan_id, "Plan renamed");
                    Ok(Some(Event::PlanRenamed { name }))
                } else {
                    Ok(Some(Event::PlanNameTaken { name }))
                }
            }

            Effect::DeletePlan { plan_id } => {
                self.storage.delete_plan(plan_id).await?;
                self.turn_committed = true;
                tracing::info!(user_id, plan_id, "Plan deleted");
                Ok(None)
            }

            Effect::AttachExercise {
                plan_id,
                exercise_id,
            } => match self.storage.get_exercise_defaults(exercise_id).await? {
                Some(defaults) => {
                    self.storage
                        .add_exercise_to_plan(plan_id, exercise_id, defaults.sets, &defaults.reps)
                        .await?;
                    self.turn_committed = true;
                    Ok(Some(Event::ExerciseAttached))
                }
                None => {
                    tracing::warn!(user_id, exercise_id, "Exercise has no catalog defaults");
                    Ok(Some(Event::ExerciseDefaultsMissing { exercise_id }))
                }
            },

            Effect::DetachExercise {
                plan_id,
                exercise_id,
            } => {
                let removed = self
                    .storage
                    .remove_exercise_from_plan(plan_id, exercise_id)
                    .await?;
                if removed {
                    self.turn_committed = true;
                } else {
                    tracing::warn!(plan_id, exercise_id, "No plan link to remove");
                }
                Ok(None)
            }

            Effect::RecordProgress {
                exercise_id,
                weight,
                sets,
                reps,
            } => {
                self.storage
                    .add_progress_log(user_id, exercise_id, weight, sets, &reps, Utc::now())
                    .await?;
                self.turn_committed = true;
                tracing::info!(user_id, exercise_id, "Progress recorded");
                Ok(None)
            }

            // ==================== Loads ====================
            Effect::LoadProfile { purpose } => {
                let profile = self.storage.get_user(user_id).await?;
                Ok(Some(Event::ProfileLoaded { purpose, profile }))
            }

            Effect::LoadPlans { purpose } => {
                let plans = self.storage.list_user_plans(user_id).await?;
                Ok(Some(Event::PlansLoaded { purpose, plans }))
            }

            Effect::LoadPlan { plan_id, purpose } => {
                let plan = self.storage.get_plan(user_id, plan_id).await?;
                if plan.is_none() {
                    tracing::warn!(user_id, plan_id, "Plan not found for user");
                }
                Ok(Some(Event::PlanLoaded { purpose, plan }))
            }

            Effect::LoadGroupExercises { group } => {
                let exercises = self.storage.list_exercises_by_group(&group).await?;
                Ok(Some(Event::GroupExercisesLoaded { group, exercises }))
            }

            Effect::LoadPlanExercises { plan_id, purpose } => {
                let exercises = self.storage.list_plan_exercises(plan_id).await?;
                Ok(Some(Event::PlanExercisesLoaded { purpose, exercises }))
            }

            Effect::LoadProgress {
                exercise_id,
                exercise_name,
                period,
                initial,
            } => {
                let logs = self
                    .storage
                    .get_progress_logs(user_id, exercise_id, period, Utc::now())
                    .await?;
                Ok(Some(Event::ProgressLoaded {
                    exercise_id,
                    exercise_name,
                    period,
                    initial,
                    logs,
                }))
            }

            // ==================== Views ====================
            Effect::ShowPlanDetails { plan_id, name } => {
                let details = self.storage.get_plan_details(plan_id).await?;
                self.emit_reply(render::plan_details(&name, &details));
                Ok(None)
            }
        }
    }
}
