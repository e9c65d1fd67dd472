use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::prompts;
use crate::error::prelude::*;
use crate::live::Translator;
use crate::types::lesson::{LessonPlan, LessonSelection};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() { None } else { Some(text) }
    }

    /// First inline payload of the first candidate.
    pub fn inline_data(&self) -> Option<&InlineData> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.inline_data.as_ref())
            .find(|d| !d.data.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct Models {
    pub text: String,
    pub lesson: String,
    pub tts: String,
}

/// REST client for `models/{model}:generateContent`.
#[derive(Clone)]
pub struct GeminiClient {
    base: Url,
    http: reqwest::Client,
    api_key: String,
    models: Models,
    tutor_name: String,
    voice: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        models: Models,
        tutor_name: impl Into<String>,
        voice: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let base = Url::parse(base_url).map_err(|e| ServiceError::Url(e.to_string()))?;
        Ok(Self {
            base,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .map_err(|e| ServiceError::Http(e.to_string()))?,
            api_key: api_key.into(),
            models,
            tutor_name: tutor_name.into(),
            voice: voice.into(),
        })
    }

    fn prepare_request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("x-goog-api-key", &self.api_key)
    }

    fn endpoint(&self, model: &str) -> Result<Url, ServiceError> {
        self.base
            .join(&format!("models/{model}:generateContent"))
            .map_err(|e| ServiceError::Url(e.to_string()))
    }

    async fn generate(&self, model: &str, body: Value) -> Result<GenerateContentResponse, ServiceError> {
        let url = self.endpoint(model)?;
        let resp = self
            .prepare_request(self.http.post(url).json(&body))
            .send()
            .await
            .map_err(|e| ServiceError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<GenerateContentResponse>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }

    async fn generate_text(&self, body: Value) -> Result<String, ServiceError> {
        self.generate(&self.models.text, body)
            .await?
            .text()
            .ok_or(ServiceError::EmptyResponse("text"))
    }

    pub async fn generate_lesson(&self, selection: &LessonSelection) -> Result<LessonPlan, ServiceError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompts::lesson_prompt(&self.tutor_name, selection) }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": prompts::lesson_schema(),
            }
        });

        let text = self
            .generate(&self.models.lesson, body)
            .await?
            .text()
            .ok_or(ServiceError::EmptyResponse("lesson"))?;

        serde_json::from_str::<LessonPlan>(&text)
            .map_err(|e| ServiceError::Decode(format!("malformed lesson document: {e}")))
    }

    /// Speak `text`, returning base64 PCM16 at 24 kHz.
    pub async fn generate_speech(&self, text: &str) -> Result<String, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::EmptyInput);
        }

        let body = json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": self.voice } }
                }
            }
        });

        let resp = self.generate(&self.models.tts, body).await?;
        resp.inline_data()
            .map(|d| d.data.clone())
            .ok_or(ServiceError::EmptyResponse("audio"))
    }

    pub async fn translate_text(&self, text: &str) -> Result<String, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::EmptyInput);
        }
        let body = json!({
            "contents": [{ "parts": [{ "text": prompts::translation_prompt(text) }] }]
        });
        self.generate_text(body).await.map(|t| t.trim().to_string())
    }

    pub async fn check_homework(&self, task: &str, submission: &str) -> Result<String, ServiceError> {
        if submission.trim().is_empty() {
            return Err(ServiceError::EmptyInput);
        }
        let body = json!({
            "contents": [{ "parts": [{ "text": prompts::homework_prompt(&self.tutor_name, task, submission) }] }]
        });
        self.generate_text(body).await
    }

    pub async fn analyze_handwriting(
        &self,
        task: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<String, ServiceError> {
        let body = json!({
            "contents": [{ "parts": [
                { "inlineData": { "mimeType": mime_type, "data": STANDARD.encode(image) } },
                { "text": prompts::handwriting_prompt(&self.tutor_name, task) }
            ] }]
        });
        self.generate_text(body).await
    }

    pub async fn transcribe_audio(&self, audio: &[u8], mime_type: &str) -> Result<String, ServiceError> {
        if audio.is_empty() {
            return Err(ServiceError::EmptyInput);
        }
        let body = json!({
            "contents": [{ "parts": [
                { "inlineData": { "mimeType": mime_type, "data": STANDARD.encode(audio) } },
                { "text": prompts::TRANSCRIPTION_PROMPT }
            ] }]
        });
        self.generate_text(body).await
    }
}

impl Translator for GeminiClient {
    async fn translate(&self, text: String) -> Result<String, ServiceError> {
        self.translate_text(&text).await
    }
}
