use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::events::TurnRecord;
use crate::pipeline::{ContextError, ContextProvider, ConversationContext, ConversationStore, StoreError};
use crate::session::SessionId;

/// Turns handed to the generator as context
const CONTEXT_TURNS: usize = 10;

/// Conversations whose recent turns stay in memory
const MAX_SESSIONS: usize = 256;

/// One line of `turns.jsonl`
#[derive(Serialize)]
struct LogLine<'a> {
    session_id: &'a SessionId,
    #[serde(flatten)]
    record: &'a TurnRecord,
}

/// Conversation log appended to `<data_dir>/turns.jsonl`
pub struct JsonlConversationStore {
    path: PathBuf,
    recent: Mutex<Recent>,
}

/// Recent turns per conversation, least recently written evicted first
#[derive(Default)]
struct Recent {
    turns: HashMap<SessionId, VecDeque<TurnRecord>>,
    order: VecDeque<SessionId>,
}

impl Recent {
    fn push(&mut self, session_id: &SessionId, record: TurnRecord) -> usize {
        self.order.retain(|id| id != session_id);
        self.order.push_back(session_id.clone());
        while self.order.len() > MAX_SESSIONS {
            if let Some(evicted) = self.order.pop_front() {
                self.turns.remove(&evicted);
                debug!(session_id = %evicted, "dropped recent turns");
            }
        }

        let turns = self.turns.entry(session_id.clone()).or_default();
        turns.push_back(record);
        while turns.len() > CONTEXT_TURNS {
            turns.pop_front();
        }
        turns.len()
    }
}

impl JsonlConversationStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("turns.jsonl"),
            recent: Mutex::new(Recent::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConversationStore for JsonlConversationStore {
    async fn persist(&self, session_id: &SessionId, record: TurnRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(&LogLine {
            session_id,
            record: &record,
        })
        .map_err(|e| StoreError(e.to_string()))?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError(format!("{}: {e}", self.path.display())))?;
        file.write_all(&line)
            .await
            .map_err(|e| StoreError(e.to_string()))?;

        let turns = self.recent.lock().await.push(session_id, record);
        debug!(%session_id, turns, "turn persisted");
        Ok(())
    }
}

#[async_trait]
impl ContextProvider for JsonlConversationStore {
    async fn assemble_context(&self, session_id: &SessionId) -> Result<ConversationContext, ContextError> {
        let recent = self.recent.lock().await;
        Ok(ConversationContext {
            session_id: session_id.to_string(),
            recent_turns: recent
                .turns
                .get(session_id)
                .map(|turns| turns.iter().cloned().collect())
                .unwrap_or_default(),
        })
    }
}
