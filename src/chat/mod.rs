pub mod dto;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tracing::debug;

/// Telegram rejects longer message bodies.
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chat API rejected the message: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError>;
    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<(), DeliveryError>;
}

/// Splits `text` into chunks of at most `limit` characters, preferring line breaks.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

pub struct TelegramGateway {
    client: Client,
    base_url: String,
}

impl TelegramGateway {
    pub fn new(api_url: &str, bot_token: &str) -> Result<Self, DeliveryError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), bot_token),
        })
    }

    async fn check(response: reqwest::Response) -> Result<(), DeliveryError> {
        let status = response.status();
        let body = response.text().await?;
        let parsed: Option<dto::ApiResponse> = serde_json::from_str(&body).ok();
        match parsed {
            Some(api) if status.is_success() && api.ok => Ok(()),
            Some(api) => Err(DeliveryError::Rejected(
                api.description.unwrap_or_else(|| status.to_string()),
            )),
            None => Err(DeliveryError::Rejected(format!("{}: {}", status, body))),
        }
    }
}

#[async_trait]
impl ChatGateway for TelegramGateway {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        let url = format!("{}/sendMessage", self.base_url);
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let response = self
                .client
                .post(&url)
                .json(&serde_json::json!({ "chat_id": chat_id, "text": chunk }))
                .send()
                .await?;
            Self::check(response).await?;
        }
        debug!("message delivered to chat {}", chat_id);
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<(), DeliveryError> {
        let url = format!("{}/sendDocument", self.base_url);
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", Part::bytes(bytes).file_name(file_name.to_string()));
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        let response = self.client.post(&url).multipart(form).send().await?;
        Self::check(response).await?;
        debug!("document {} delivered to chat {}", file_name, chat_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_split_message_respects_limit() {
        let text = "line one\nline two\nline three\n";
        let chunks = split_message(text, 12);
        assert!(chunks.iter().all(|c| c.chars().count() <= 12));
        assert_eq!(chunks.concat(), text);

        let long = "x".repeat(25);
        let chunks = split_message(&long, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), long);

        assert_eq!(split_message("short", MAX_MESSAGE_CHARS), vec!["short".to_string()]);
    }

    #[tokio::test]
    async fn test_send_message_posts_each_chunk() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(2)
            .mount(&server)
            .await;

        let gateway = TelegramGateway::new(&server.uri(), "TOKEN").unwrap();
        let text = format!("{}\n{}", "a".repeat(MAX_MESSAGE_CHARS - 1), "b");
        gateway.send_message(42, &text).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_message_surfaces_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "ok": false,
                "description": "Forbidden: bot was blocked by the user"
            })))
            .mount(&server)
            .await;

        let gateway = TelegramGateway::new(&server.uri(), "TOKEN").unwrap();
        match gateway.send_message(42, "hi").await {
            Err(DeliveryError::Rejected(msg)) => assert!(msg.contains("blocked")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
