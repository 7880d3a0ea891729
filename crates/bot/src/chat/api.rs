//! Minimal Telegram Bot API client
//!
//! Long polling plus the three calls the runtime needs: `getUpdates`,
//! `sendMessage` with a one-time reply keyboard, and `sendDocument`.
//! Responses are decoded just deep enough for the runtime.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Bot API rejected the call: {0}")]
    Api(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// One-time reply keyboard: rows of button labels.
#[derive(Debug, Clone)]
pub struct Keyboard {
    rows: Vec<Vec<String>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    fn reply_markup(&self) -> serde_json::Value {
        let keyboard: Vec<Vec<serde_json::Value>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|label| json!({ "text": label })).collect())
            .collect();
        json!({
            "keyboard": keyboard,
            "one_time_keyboard": true,
            "resize_keyboard": true,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

fn unwrap_envelope<T>(envelope: ApiEnvelope<T>) -> Result<T, ChatError> {
    if envelope.ok {
        envelope
            .result
            .ok_or_else(|| ChatError::Api("ok response without a result".to_string()))
    } else {
        Err(ChatError::Api(
            envelope
                .description
                .unwrap_or_else(|| "unspecified error".to_string()),
        ))
    }
}

#[derive(Clone)]
pub struct ChatApi {
    http: reqwest::Client,
    base: String,
}

impl ChatApi {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("{API_BASE}/bot{api_key}"),
        }
    }

    /// Long poll for updates past `offset`. The request blocks server-side
    /// for up to `timeout_secs`; the client allows a little extra.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, ChatError> {
        let response = self
            .http
            .get(format!("{}/getUpdates", self.base))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
            ])
            .timeout(Duration::from_secs(timeout_secs + 10))
            .send()
            .await?;

        let envelope: ApiEnvelope<Vec<Update>> = response.json().await?;
        unwrap_envelope(envelope)
    }

    /// Send a text message. `keyboard` replaces the user's reply keyboard;
    /// `None` removes any keyboard that is showing.
    pub async fn send_message(
        &self,
        chat: i64,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), ChatError> {
        let reply_markup = match keyboard {
            Some(keyboard) => keyboard.reply_markup(),
            None => json!({ "remove_keyboard": true }),
        };
        let body = json!({
            "chat_id": chat,
            "text": text,
            "reply_markup": reply_markup,
        });

        let response = self
            .http
            .post(format!("{}/sendMessage", self.base))
            .json(&body)
            .send()
            .await?;

        let envelope: ApiEnvelope<serde_json::Value> = response.json().await?;
        unwrap_envelope(envelope).map(|_| ())
    }

    /// Upload a document into the chat.
    pub async fn send_document(
        &self,
        chat: i64,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<(), ChatError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/pdf")?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat.to_string())
            .part("document", part);

        let response = self
            .http
            .post(format!("{}/sendDocument", self.base))
            .multipart(form)
            .send()
            .await?;

        let envelope: ApiEnvelope<serde_json::Value> = response.json().await?;
        unwrap_envelope(envelope).map(|_| ())
    }
}
