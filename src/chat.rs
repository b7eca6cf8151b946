//! Text and photo messages between admins and drivers.

use std::sync::Arc;

use serde::{ Deserialize, Serialize };
use serde_json::{ json, Value };

use crate::backend::{ BlobStore, Filter, RecordStore };
use crate::error::{ Error, Result };
use crate::model::{ now_millis, Record };
use crate::session::SessionContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub sender_id: String,
    pub chat_id: String,
    pub timestamp: i64,
    #[serde(default, rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ChatMessage {
    fn from_record(record: Record) -> Result<ChatMessage> {
        Ok(serde_json::from_value(Value::Object(record))?)
    }
}

#[derive(Clone)]
pub struct ChatService {
    session: SessionContext,
    store: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    table: String,
    bucket: String,
}

impl ChatService {
    pub fn new(
        session: SessionContext,
        store: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        table: &str,
        bucket: &str,
    ) -> ChatService {
        ChatService {
            session,
            store,
            blobs,
            table: table.to_string(),
            bucket: bucket.to_string(),
        }
    }

    fn ensure_session(&self) -> Result<()> {
        if self.session.is_valid() {
            Ok(())
        } else {
            Err(Error::NotSignedIn)
        }
    }

    async fn post(&self, chat_id: &str, text: &str, image_url: Option<String>) -> Result<ChatMessage> {
        let mut fields = Record::new();
        fields.insert("text".to_string(), json!(text));
        fields.insert("sender_id".to_string(), json!(self.session.user_id()));
        fields.insert("chat_id".to_string(), json!(chat_id));
        fields.insert("timestamp".to_string(), json!(now_millis()));
        if let Some(url) = image_url {
            fields.insert("imageUrl".to_string(), json!(url));
        }

        let stored = self.store.insert(&self.table, fields).await.map_err(|err| {
            error!["Failed to send message to {}: {}", chat_id, err];
            err
        })?;
        ChatMessage::from_record(stored)
    }

    pub async fn send_text(&self, chat_id: &str, text: &str) -> Result<ChatMessage> {
        self.ensure_session()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }
        self.post(chat_id, text, None).await
    }

    pub async fn send_image(&self, chat_id: &str, bytes: Vec<u8>) -> Result<ChatMessage> {
        self.ensure_session()?;
        if bytes.is_empty() {
            return Err(Error::EmptyMessage);
        }

        let key = format!["{}/{}/{}.jpg", self.bucket, self.session.user_id(), now_millis()];
        let url = self.blobs.upload(&key, bytes).await.map_err(|err| {
            error!["Failed to upload image for {}: {}", chat_id, err];
            err
        })?;
        self.post(chat_id, "", Some(url)).await
    }

    /// Oldest first. Rows that do not decode are skipped.
    pub async fn conversation(&self, chat_id: &str) -> Result<Vec<ChatMessage>> {
        self.ensure_session()?;
        let rows = self.store.read_all(&Filter::table(&self.table).eq("chat_id", chat_id)).await?;

        let mut messages: Vec<ChatMessage> = rows.into_iter()
            .filter_map(|row| match ChatMessage::from_record(row) {
                Ok(message) => Some(message),
                Err(err) => {
                    debug!["Skipping malformed message in {}: {}", chat_id, err];
                    None
                }
            })
            .collect();
        messages.sort_by_key(|message| message.timestamp);
        Ok(messages)
    }
}
