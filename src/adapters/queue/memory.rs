use crate::adapters::queue::{QueueError, RegistrationQueue};
use crate::domain::registration::QueueRecord;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug)]
struct Entry {
    message_id: String,
    body: String,
    visible_at: Instant,
    receives: u32,
}

#[derive(Debug, Default)]
struct State {
    entries: VecDeque<Entry>,
    dead_letters: Vec<String>,
}

/// Process-local queue with the same lease/ack/dead-letter behaviour as the Redis queue.
#[derive(Debug)]
pub struct MemoryQueue {
    state: Mutex<State>,
    max_receive_count: u32,
}

impl MemoryQueue {
    #[must_use]
    pub fn new(max_receive_count: u32) -> Self {
        Self { state: Mutex::new(State::default()), max_receive_count }
    }

    /// Records still held by the queue, leased or not.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Dead-lettered entries as `{"messageId", "body"}` JSON, oldest first.
    pub async fn dead_letters(&self) -> Vec<String> {
        self.state.lock().await.dead_letters.clone()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(5)
    }
}

#[async_trait]
impl RegistrationQueue for MemoryQueue {
    async fn enqueue(&self, body: &str) -> Result<String, QueueError> {
        let message_id = Uuid::now_v7().to_string();
        self.state.lock().await.entries.push_back(Entry {
            message_id: message_id.clone(),
            body: body.to_string(),
            visible_at: Instant::now(),
            receives: 0,
        });
        Ok(message_id)
    }

    async fn lease(&self, limit: usize, visibility_timeout: Duration) -> Result<Vec<QueueRecord>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let mut leased = Vec::new();
        let mut dead = Vec::new();

        for entry in &mut state.entries {
            if leased.len() >= limit {
                break;
            }
            if entry.visible_at > now {
                continue;
            }
            entry.receives += 1;
            if entry.receives > self.max_receive_count {
                dead.push(entry.message_id.clone());
                continue;
            }
            entry.visible_at = now + visibility_timeout;
            leased.push(QueueRecord::new(entry.message_id.clone(), entry.body.clone()));
        }

        if !dead.is_empty() {
            let (kept, expired): (VecDeque<Entry>, VecDeque<Entry>) =
                std::mem::take(&mut state.entries).into_iter().partition(|e| !dead.contains(&e.message_id));
            state.entries = kept;
            state.dead_letters.extend(
                expired
                    .into_iter()
                    .map(|e| serde_json::json!({ "messageId": e.message_id, "body": e.body }).to_string()),
            );
        }

        Ok(leased)
    }

    async fn ack(&self, message_ids: &[String]) -> Result<(), QueueError> {
        self.state.lock().await.entries.retain(|e| !message_ids.contains(&e.message_id));
        Ok(())
    }

    async fn dead_letter_count(&self) -> Result<usize, QueueError> {
        Ok(self.state.lock().await.dead_letters.len())
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
