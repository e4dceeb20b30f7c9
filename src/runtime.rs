//! Runtime for executing conversations
//!
//! One `ConversationRuntime` task per user consumes that user's mailbox in
//! order, so a session's read-modify-write never interleaves with another
//! event for the same user. Different users run fully in parallel.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::ConversationRuntime;
pub use traits::*;

use crate::db::UserId;
use crate::render::Reply;
use crate::state_machine::{ConvContext, ConvState, Event};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;

/// An inbound transport event, optionally awaiting the completed turn
pub struct Inbound {
    pub event: Event,
    pub respond_to: Option<oneshot::Sender<Turn>>,
}

/// Everything one inbound event produced
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub replies: Vec<Reply>,
    pub state: ConvState,
}

/// Handle to interact with a running conversation
#[derive(Clone)]
pub struct ConversationHandle {
    pub mailbox_tx: mpsc::Sender<Inbound>,
    pub broadcast_tx: broadcast::Sender<SseEvent>,
}

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    Reply {
        reply: Reply,
    },
    StateChange {
        /// Full state as JSON object (e.g., `{"flow":"registration","step":{...}}`)
        state: serde_json::Value,
    },
    Error {
        message: String,
    },
}

/// Manager for all per-user runtimes
pub struct RuntimeManager<S: Storage + Clone + 'static = DatabaseStorage> {
    storage: S,
    runtimes: RwLock<HashMap<UserId, ConversationHandle>>,
    mailbox_capacity: usize,
    shutdown: CancellationToken,
}

impl<S: Storage + Clone + 'static> RuntimeManager<S> {
    pub fn new(storage: S, mailbox_capacity: usize) -> Self {
        Self {
            storage,
            runtimes: RwLock::new(HashMap::new()),
            mailbox_capacity: mailbox_capacity.max(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Get or create the runtime for a user, resuming any persisted session
    pub async fn get_or_create(&self, user_id: UserId) -> Result<ConversationHandle, String> {
        // Check if already running
        {
            let runtimes = self.runtimes.read().await;
            if let Some(handle) = runtimes.get(&user_id) {
                if !handle.mailbox_tx.is_closed() {
                    return Ok(handle.clone());
                }
            }
        }

        // Storage reads happen outside the lock so other users are not held up
        let initial_state = self.storage.get_session(user_id).await?.unwrap_or_default();
        let muscle_groups = self.storage.list_muscle_groups().await?;

        // Creation holds the write lock so a user never gets two runtimes
        let mut runtimes = self.runtimes.write().await;
        if let Some(handle) = runtimes.get(&user_id) {
            if !handle.mailbox_tx.is_closed() {
                return Ok(handle.clone());
            }
        }

        let context = ConvContext::new(user_id, muscle_groups);

        let (mailbox_tx, mailbox_rx) = mpsc::channel(self.mailbox_capacity);
        let (broadcast_tx, _) = broadcast::channel(128);

        if !initial_state.is_idle() {
            tracing::info!(
                user_id,
                flow = initial_state.flow_name(),
                step = ?initial_state.step_name(),
                "Resuming persisted session"
            );
        }

        let runtime = ConversationRuntime::new(
            context,
            initial_state,
            self.storage.clone(),
            mailbox_rx,
            broadcast_tx.clone(),
            self.shutdown.child_token(),
        );

        tokio::spawn(async move {
            runtime.run().await;
        });

        let handle = ConversationHandle {
            mailbox_tx,
            broadcast_tx,
        };
        runtimes.insert(user_id, handle.clone());
        Ok(handle)
    }

    /// Deliver an event and wait for the turn it produces
    pub async fn send_event(&self, user_id: UserId, event: Event) -> Result<Turn, String> {
        if !event.is_inbound() {
            return Err(format!("Not a transport event: {event:?}"));
        }
        let handle = self.get_or_create(user_id).await?;
        let (respond_to, response) = oneshot::channel();
        handle
            .mailbox_tx
            .send(Inbound {
                event,
                respond_to: Some(respond_to),
            })
            .await
            .map_err(|e| format!("Failed to send event: {e}"))?;
        response
            .await
            .map_err(|_| "Conversation runtime stopped before replying".to_string())
    }

    /// Subscribe to a user's replies and state changes
    pub async fn subscribe(&self, user_id: UserId) -> Result<broadcast::Receiver<SseEvent>, String> {
        let handle = self.get_or_create(user_id).await?;
        Ok(handle.broadcast_tx.subscribe())
    }

    /// Current persisted session. Lags the live one only while a failed
    /// session write waits for its retry.
    pub async fn session(&self, user_id: UserId) -> Result<ConvState, String> {
        Ok(self.storage.get_session(user_id).await?.unwrap_or_default())
    }

    /// Stop all runtimes
    pub fn shutdown(&self) {
        tracing::info!("Stopping conversation runtimes");
        self.shutdown.cancel();
    }
}
