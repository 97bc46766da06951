//! Collaborator seams: the reading service and the narration service.
//!
//! [`HttpApi`] implements both over a JSON HTTP API. Tests swap in fakes.

use crate::error::ApiError;
use crate::passage::{Bootstrap, Passage, ReadingPosition};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    Reflection,
    Response,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDraft {
    pub note_type: NoteType,
    pub verse_ref: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationRequest {
    pub text: String,
    pub voice: String,
    pub style: String,
    pub speed: f32,
}

#[async_trait]
pub trait ReadingApi: Send + Sync {
    async fn fetch_bootstrap(&self) -> Result<Bootstrap, ApiError>;

    async fn fetch_passage(
        &self,
        reference: &str,
        translation: Option<&str>,
    ) -> Result<Passage, ApiError>;

    /// Replace the user's single server-side resume record.
    async fn save_resume_position(&self, position: &ReadingPosition) -> Result<(), ApiError>;

    async fn create_note(&self, note: &NoteDraft) -> Result<(), ApiError>;
}

#[async_trait]
pub trait Narrator: Send + Sync {
    /// Synthesize `request.text` and return encoded audio bytes.
    async fn synthesize(&self, request: &NarrationRequest) -> Result<Vec<u8>, ApiError>;
}

#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|token| !token.trim().is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ReadingApi for HttpApi {
    async fn fetch_bootstrap(&self) -> Result<Bootstrap, ApiError> {
        let response = self.send(self.client.get(self.url("bootstrap"))).await?;
        Ok(response.json().await?)
    }

    async fn fetch_passage(
        &self,
        reference: &str,
        translation: Option<&str>,
    ) -> Result<Passage, ApiError> {
        let mut query = vec![("ref", reference)];
        if let Some(translation) = translation {
            query.push(("translation", translation));
        }
        debug!(reference, ?translation, "Fetching passage");
        let response = self
            .send(self.client.get(self.url("passages")).query(&query))
            .await?;
        Ok(response.json().await?)
    }

    async fn save_resume_position(&self, position: &ReadingPosition) -> Result<(), ApiError> {
        self.send(self.client.put(self.url("progress")).json(position))
            .await?;
        Ok(())
    }

    async fn create_note(&self, note: &NoteDraft) -> Result<(), ApiError> {
        self.send(self.client.post(self.url("notes")).json(note))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Narrator for HttpApi {
    async fn synthesize(&self, request: &NarrationRequest) -> Result<Vec<u8>, ApiError> {
        debug!(chars = request.text.len(), voice = %request.voice, "Requesting narration");
        let response = self
            .send(self.client.post(self.url("narration")).json(request))
            .await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn urls_join_without_double_slashes() {
        let api = HttpApi::new("https://reader.example/api/", None).expect("client");
        assert_eq!(api.url("/bootstrap"), "https://reader.example/api/bootstrap");
        assert_eq!(api.url("passages"), "https://reader.example/api/passages");
    }

    #[test]
    fn blank_tokens_are_dropped() {
        let api = HttpApi::new("http://localhost", Some("  ".into())).expect("client");
        assert!(api.token.is_none());
    }

    #[test]
    fn note_draft_serializes_camel_case() {
        let note = NoteDraft {
            note_type: NoteType::Response,
            verse_ref: "John 3:16".into(),
            body: "Grace.".into(),
        };
        let json = serde_json::to_value(&note).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "noteType": "response",
                "verseRef": "John 3:16",
                "body": "Grace."
            })
        );
    }
}
