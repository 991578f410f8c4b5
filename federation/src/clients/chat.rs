//! Chat transport collaborator: proposal/result broadcast and vote-message
//! polling over room-based chat.
//!
//! Transport failures are the one tolerated error class in the voting
//! path: a room that cannot be reached contributes zero votes and the
//! session continues.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Error type for chat transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("chat API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("unknown room: {0}")]
    UnknownRoom(String),
}

/// Result type for chat transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Shared reference to a chat transport
pub type SharedChatTransport = Arc<dyn ChatTransport>;

/// A message observed in a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub author: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// Abstract room-based send/poll interface.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn broadcast(&self, room_id: &str, text: &str) -> TransportResult<()>;

    /// Recent messages in the room. The window is a transport concern and
    /// may overlap across calls; callers dedupe by message identity.
    async fn poll(&self, room_id: &str) -> TransportResult<Vec<ChatMessage>>;
}

/// Matrix client-server API transport.
pub struct MatrixChatClient {
    http: reqwest::Client,
    homeserver: String,
    access_token: String,
}

impl MatrixChatClient {
    pub fn new(
        homeserver: impl Into<String>,
        access_token: impl Into<String>,
    ) -> TransportResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            http,
            homeserver: homeserver.into(),
            access_token: access_token.into(),
        })
    }

    pub fn shared(self) -> SharedChatTransport {
        Arc::new(self)
    }
}

#[async_trait]
impl ChatTransport for MatrixChatClient {
    async fn broadcast(&self, room_id: &str, text: &str) -> TransportResult<()> {
        #[derive(Serialize)]
        struct SendBody<'a> {
            msgtype: &'a str,
            body: &'a str,
        }

        // Sends are idempotent per transaction id.
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
            self.homeserver,
            room_id,
            uuid::Uuid::new_v4()
        );

        let response = self
            .http
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&SendBody {
                msgtype: "m.text",
                body: text,
            })
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Api { status, body });
        }

        Ok(())
    }

    async fn poll(&self, room_id: &str) -> TransportResult<Vec<ChatMessage>> {
        #[derive(Deserialize)]
        struct MessagesResponse {
            chunk: Vec<RoomEvent>,
        }

        #[derive(Deserialize)]
        struct RoomEvent {
            sender: String,
            #[serde(default)]
            origin_server_ts: i64,
            #[serde(default)]
            content: EventContent,
        }

        #[derive(Deserialize, Default)]
        struct EventContent {
            #[serde(default)]
            body: String,
        }

        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/messages",
            self.homeserver, room_id
        );

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[("dir", "b"), ("limit", "100")])
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Api { status, body });
        }

        let messages: MessagesResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(messages
            .chunk
            .into_iter()
            .filter(|event| !event.content.body.is_empty())
            .map(|event| ChatMessage {
                author: event.sender,
                body: event.content.body,
                timestamp: Utc
                    .timestamp_millis_opt(event.origin_server_ts)
                    .single()
                    .unwrap_or_else(Utc::now),
            })
            .collect())
    }
}

/// In-memory chat transport for tests and local runs.
///
/// `poll` returns the room's full message history on every call, which
/// exercises the tally's dedupe-by-identity behavior.
#[derive(Default)]
pub struct MemoryChat {
    rooms: Mutex<HashMap<String, Vec<ChatMessage>>>,
    broadcasts: Mutex<Vec<(String, String)>>,
}

impl MemoryChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> Arc<MemoryChat> {
        Arc::new(self)
    }

    /// Inject a message as if a room member had sent it.
    pub fn push_message(&self, room_id: &str, author: &str, body: &str) {
        self.rooms
            .lock()
            .unwrap()
            .entry(room_id.to_string())
            .or_default()
            .push(ChatMessage {
                author: author.to_string(),
                body: body.to_string(),
                timestamp: Utc::now(),
            });
    }

    /// Everything broadcast so far, in order.
    pub fn broadcasts(&self) -> Vec<(String, String)> {
        self.broadcasts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for MemoryChat {
    async fn broadcast(&self, room_id: &str, text: &str) -> TransportResult<()> {
        self.broadcasts
            .lock()
            .unwrap()
            .push((room_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn poll(&self, room_id: &str) -> TransportResult<Vec<ChatMessage>> {
        Ok(self
            .rooms
            .lock()
            .unwrap()
            .get(room_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_chat_round_trip() {
        let chat = MemoryChat::new();
        chat.push_message("!room", "@alice", "yes abc");

        let messages = chat.poll("!room").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].author, "@alice");

        chat.broadcast("!room", "hello").await.unwrap();
        assert_eq!(chat.broadcasts().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_poll_repeats_window() {
        let chat = MemoryChat::new();
        chat.push_message("!room", "@alice", "yes abc");

        // The same message is visible across polls; dedupe is the
        // tally's job, not the transport's.
        assert_eq!(chat.poll("!room").await.unwrap().len(), 1);
        assert_eq!(chat.poll("!room").await.unwrap().len(), 1);
    }
}
