use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::completion::CompletionClient;
use crate::config::ApiKey;
use crate::prompt::Category;
use crate::splitter::{split_reply, ChartRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
}

/// Everything one interactive session owns: transcript, chart and key.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub mode: Category,
    messages: Vec<Message>,
    chart: ChartRecord,
    api_key: Option<ApiKey>,
    // Bumped by `clear`; a turn begun under an older epoch is dropped.
    epoch: u64,
    turn_lock: Arc<Mutex<()>>,
}

/// A turn between `begin_turn` and `finish_turn`.
#[derive(Debug)]
pub struct Turn {
    pub mode: Category,
    pub api_key: Option<ApiKey>,
    epoch: u64,
}

impl Session {
    pub fn new(mode: Category) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            messages: Vec::new(),
            chart: ChartRecord::placeholder(),
            api_key: None,
            epoch: 0,
            turn_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Appends to the transcript. Identical messages are kept as separate entries.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
            timestamp: Local::now(),
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn chart(&self) -> &ChartRecord {
        &self.chart
    }

    pub fn set_mode(&mut self, mode: Category) {
        self.mode = mode;
    }

    pub fn set_api_key(&mut self, key: Option<ApiKey>) {
        self.api_key = key;
    }

    /// Serializes turns on a shared session. Hold the guard from before
    /// `begin_turn` until after `finish_turn`.
    pub fn turn_lock(&self) -> Arc<Mutex<()>> {
        self.turn_lock.clone()
    }

    pub fn clear(&mut self) {
        info!(session = %self.id, "Clearing session");
        self.messages.clear();
        self.chart = ChartRecord::placeholder();
        self.epoch += 1;
    }

    /// Records a raw completion: the prose goes into the transcript and the
    /// chart is replaced only when a record parsed. Returns the prose.
    pub fn record_reply(&mut self, raw: &str) -> String {
        let split = split_reply(raw);
        if let Some(record) = split.record {
            debug!(session = %self.id, "Chart record updated");
            self.chart = record;
        }
        self.push(Role::Bot, split.prose.clone());
        split.prose
    }

    /// Records the user's query and returns what the completion call needs,
    /// so callers holding a lock can release it while the service answers.
    pub fn begin_turn(&mut self, query: &str) -> Turn {
        self.push(Role::User, query);
        Turn {
            mode: self.mode,
            api_key: self.api_key.clone(),
            epoch: self.epoch,
        }
    }

    /// Records the reply for `turn`. Returns `None`, recording nothing, when
    /// the session was cleared after the turn began.
    pub fn finish_turn(&mut self, turn: Turn, raw: &str) -> Option<String> {
        if turn.epoch != self.epoch {
            debug!(session = %self.id, "Dropping reply for a cleared transcript");
            return None;
        }
        Some(self.record_reply(raw))
    }

    /// One full turn. The query is sent on its own; earlier turns are only
    /// kept for display.
    pub async fn ask(&mut self, client: &CompletionClient, query: &str) -> String {
        let turn = self.begin_turn(query);
        let reply = client
            .for_session(turn.api_key.clone())
            .generate_response(turn.mode, query)
            .await;
        // Nothing can clear the session while `ask` holds it mutably.
        self.finish_turn(turn, &reply).unwrap_or_default()
    }
}

/// Isolated sessions for concurrent browser clients.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, mode: Category) -> Uuid {
        let session = Session::new(mode);
        let id = session.id;
        self.sessions.lock().await.insert(id, session);
        info!(session = %id, "Created session");
        id
    }

    /// Runs `f` against a session, or returns `None` if it does not exist.
    pub async fn with_session<T>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> T) -> Option<T> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(&id).map(f)
    }

    /// Drops a session and everything it holds. Returns whether it existed.
    pub async fn remove(&self, id: Uuid) -> bool {
        let mut sessions = self.sessions.lock().await;
        let removed = sessions.remove(&id).is_some();
        if removed {
            info!(session = %id, active = sessions.len(), "Removed session");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
