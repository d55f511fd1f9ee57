//! Assistant server protocol
//!
//! Four request/response calls: fetch the menu, execute a menu action,
//! transcribe a recording, and chat. Every transport error, non-success
//! status, or undecodable body is folded into a [`Failure`] so callers only
//! ever see a payload or a reason.

use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::{ServerConfig, Timeouts};
use crate::keypad::Digit;
use crate::menu::MenuDescriptor;
use crate::{Error, Result};

/// Failure category, one per error-taxonomy class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, connection error, non-success status
    Network,
    /// Malformed body
    Parse,
    /// Recording device could not start or record
    Device,
    /// Local check failed, nothing was sent
    Precondition,
}

/// Normalized outcome of a failed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub reason: String,
}

impl Failure {
    #[must_use]
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn network(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, reason)
    }

    #[must_use]
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Parse, reason)
    }

    #[must_use]
    pub fn device(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Device, reason)
    }

    #[must_use]
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Precondition, reason)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        match err {
            Error::Network(reason) => Self::network(reason),
            Error::Http(e) if e.is_timeout() => Self::network("Timed out"),
            Error::Http(e) if e.is_decode() => Self::parse(e.to_string()),
            Error::Http(e) => Self::network(e.to_string()),
            Error::Io(e) => Self::network(e.to_string()),
            Error::Parse(reason) => Self::parse(reason),
            Error::Serialization(e) => Self::parse(e.to_string()),
            Error::Toml(e) => Self::parse(e.to_string()),
            Error::Device(reason) => Self::device(reason),
            Error::Precondition(reason) | Error::Config(reason) => Self::precondition(reason),
        }
    }
}

/// Result of a remote call as seen by the session
pub type Outcome<T> = std::result::Result<T, Failure>;

/// The four calls the session issues against the assistant server
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// `GET /menu`
    async fn fetch_menu(&self) -> Outcome<MenuDescriptor>;

    /// `POST /action`, optionally with transcribed voice input
    async fn execute_action(&self, key: Digit, voice_input: Option<&str>) -> Outcome<String>;

    /// `POST /audio` in transcribe-only mode
    async fn transcribe(&self, audio: Vec<u8>) -> Outcome<String>;

    /// `POST /chat`, used for free-form chat and option follow-ups alike
    async fn chat(&self, text: &str) -> Outcome<String>;
}

#[derive(Serialize)]
struct ActionRequest<'a> {
    action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_input: Option<&'a str>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct TranscriptResponse {
    #[serde(default)]
    transcript: Option<String>,
}

/// [`RemoteClient`] over HTTP
///
/// Each call class gets its own connection pool so its connect and read
/// deadlines apply independently.
pub struct HttpRemoteClient {
    base_url: String,
    audio_content_type: String,
    menu: reqwest::Client,
    dialogue: reqwest::Client,
    audio: reqwest::Client,
}

impl HttpRemoteClient {
    /// Create a client for the configured server
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is empty or an HTTP client cannot be built
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("server URL must not be empty".to_string()));
        }

        tracing::debug!(
            base_url = %base_url,
            audio_content_type = %config.audio_content_type,
            "remote client initialized"
        );

        Ok(Self {
            base_url,
            audio_content_type: config.audio_content_type.clone(),
            menu: build_client(config.menu_timeouts)?,
            dialogue: build_client(config.dialogue_timeouts)?,
            audio: build_client(config.audio_timeouts)?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn try_fetch_menu(&self) -> Result<MenuDescriptor> {
        let response = self.menu.get(self.url("/menu")).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::Network(format!("Server {}", status.as_u16())));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::Parse(format!("bad menu: {e}")))
    }

    async fn try_post_reply<T: Serialize + Sync>(&self, path: &str, request: &T) -> Result<String> {
        let response = self
            .dialogue
            .post(self.url(path))
            .json(request)
            .send()
            .await?;

        let body = read_success_body(response).await?;
        reply_text(body)
    }

    async fn try_transcribe(&self, audio: Vec<u8>) -> Result<String> {
        if audio.is_empty() {
            return Err(Error::Precondition("No audio".to_string()));
        }

        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let response = self
            .audio
            .post(self.url("/audio"))
            .header(reqwest::header::CONTENT_TYPE, &self.audio_content_type)
            .header("X-Transcribe-Only", "true")
            .body(audio)
            .send()
            .await?;

        let body = read_success_body(response).await?;
        let parsed: TranscriptResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("bad transcript: {e}")))?;

        let transcript = parsed.transcript.unwrap_or_default().trim().to_string();
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn fetch_menu(&self) -> Outcome<MenuDescriptor> {
        self.try_fetch_menu().await.map_err(|e| {
            tracing::debug!(error = %e, "menu fetch failed");
            Failure::from(e)
        })
    }

    async fn execute_action(&self, key: Digit, voice_input: Option<&str>) -> Outcome<String> {
        tracing::debug!(action = %key, has_voice = voice_input.is_some(), "executing action");
        let request = ActionRequest {
            action: key.to_string(),
            voice_input,
        };
        self.try_post_reply("/action", &request).await.map_err(|e| {
            tracing::error!(action = %key, error = %e, "action request failed");
            Failure::from(e)
        })
    }

    async fn transcribe(&self, audio: Vec<u8>) -> Outcome<String> {
        self.try_transcribe(audio).await.map_err(|e| {
            tracing::error!(error = %e, "transcription failed");
            Failure::from(e)
        })
    }

    async fn chat(&self, text: &str) -> Outcome<String> {
        tracing::debug!(text_len = text.len(), "sending chat");
        self.try_post_reply("/chat", &ChatRequest { text })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat request failed");
                Failure::from(e)
            })
    }
}

fn build_client(timeouts: Timeouts) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.read)
        .build()
        .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))
}

/// Read the body of a success response, or turn the status into an error
async fn read_success_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = %status, body = %body, "server returned error status");
        return Err(Error::Network(format!("Server error: {}", status.as_u16())));
    }
    Ok(response.text().await?)
}

/// Extract the reply text from a `/action` or `/chat` body
///
/// The `response` field wins when present; otherwise the raw body is the
/// reply. A body that is not JSON at all is a parse failure.
fn reply_text(body: String) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(&body).map_err(|e| Error::Parse(format!("malformed reply: {e}")))?;

    match value.get("response") {
        Some(serde_json::Value::String(text)) => Ok(text.clone()),
        _ => Ok(body),
    }
}
