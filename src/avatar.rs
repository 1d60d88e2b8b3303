use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub const HEYGEN_BASE_URL: &str = "https://api.heygen.com";

#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("HEYGEN_API_KEY is not set")]
    MissingApiKey,
    #[error("avatar service unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("avatar service rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected avatar service response: {0}")]
    Malformed(String),
    #[error("avatar video generation failed: {0}")]
    GenerationFailed(String),
    #[error("avatar video not ready after {0:?}")]
    TimedOut(Duration),
    #[error("failed to store avatar video: {0}")]
    Io(#[from] std::io::Error),
}

impl AvatarError {
    /// Short label for logs, separating "could not talk to the service" from
    /// "the service said no".
    pub fn kind(&self) -> &'static str {
        match self {
            AvatarError::MissingApiKey => "not_configured",
            AvatarError::Unreachable(e) if e.is_decode() => "malformed_response",
            AvatarError::Unreachable(_) => "unreachable",
            AvatarError::Rejected { .. } => "rejected",
            AvatarError::Malformed(_) => "malformed_response",
            AvatarError::GenerationFailed(_) => "generation_failed",
            AvatarError::TimedOut(_) => "timed_out",
            AvatarError::Io(_) => "io",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Polling,
    Completed,
    Failed,
    TimedOut,
}

/// Decides what the poll loop does after observing `status` at `elapsed`.
pub fn next_state(status: Option<&str>, elapsed: Duration, timeout: Duration) -> PollState {
    match status {
        Some("completed") => PollState::Completed,
        Some("failed") => PollState::Failed,
        _ if elapsed > timeout => PollState::TimedOut,
        _ => PollState::Polling,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub avatar_id: String,
    pub voice_id: String,
    pub text: String,
    pub aspect_ratio: String,
    pub test: bool,
}

/// Output frame size requested for an aspect ratio string.
pub fn dimension_for(aspect_ratio: &str) -> (u32, u32) {
    match aspect_ratio.trim() {
        "9:16" => (720, 1280),
        "1:1" => (720, 720),
        _ => (1280, 720),
    }
}

pub fn generate_payload(request: &GenerateRequest) -> serde_json::Value {
    let (width, height) = dimension_for(&request.aspect_ratio);
    let mut payload = json!({
        "caption": false,
        "video_inputs": [{
            "character": {
                "type": "avatar",
                "avatar_id": request.avatar_id,
                "scale": 1,
                "avatar_style": "normal",
                "talking_style": "stable",
            },
            "voice": {
                "type": "text",
                "voice_id": request.voice_id,
                "speed": "1",
                "pitch": "0",
                "duration": "1",
                "input_text": request.text,
            },
        }],
        "dimension": { "width": width, "height": height },
    });
    if request.test {
        payload["test"] = json!(true);
    }
    payload
}

#[async_trait]
pub trait AvatarApi: Send + Sync {
    /// Submits a render and returns the service's video id.
    async fn generate(&self, request: &GenerateRequest) -> Result<String, AvatarError>;
    async fn status(&self, video_id: &str) -> Result<VideoStatus, AvatarError>;
    async fn download(&self, video_url: &str, dest: &Path) -> Result<(), AvatarError>;
    async fn list_avatars(&self) -> Result<serde_json::Value, AvatarError>;
    async fn list_voices(&self) -> Result<serde_json::Value, AvatarError>;
}

/// Time source for the poll loop.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn sleep(&self, duration: Duration);
    fn elapsed(&self) -> Duration;
}

pub struct TokioPacer {
    started: Instant,
}

impl TokioPacer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

#[async_trait]
impl Pacer for TokioPacer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct GenerateData {
    video_id: String,
}

pub struct HeygenClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HeygenClient {
    pub fn new(api_key: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn from_env() -> Result<Self, AvatarError> {
        match std::env::var("HEYGEN_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(&key, HEYGEN_BASE_URL)),
            _ => Err(AvatarError::MissingApiKey),
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .header("accept", "application/json")
    }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, AvatarError> {
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AvatarError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value, AvatarError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .get(&url)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;
        Ok(Self::checked(response).await?.json().await?)
    }
}

#[async_trait]
impl AvatarApi for HeygenClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, AvatarError> {
        let url = format!("{}/v2/video/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .header("accept", "application/json")
            .json(&generate_payload(request))
            .timeout(Duration::from_secs(60))
            .send()
            .await?;
        let envelope: Envelope<GenerateData> = Self::checked(response).await?.json().await?;
        envelope
            .data
            .map(|d| d.video_id)
            .ok_or_else(|| AvatarError::Malformed("generate response has no video_id".into()))
    }

    async fn status(&self, video_id: &str) -> Result<VideoStatus, AvatarError> {
        let url = format!("{}/v2/video/status", self.base_url);
        let response = self
            .get(&url)
            .query(&[("video_id", video_id)])
            .timeout(Duration::from_secs(30))
            .send()
            .await?;
        let envelope: Envelope<VideoStatus> = Self::checked(response).await?.json().await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn download(&self, video_url: &str, dest: &Path) -> Result<(), AvatarError> {
        let response = self
            .client
            .get(video_url)
            .timeout(Duration::from_secs(120))
            .send()
            .await?;
        let mut response = Self::checked(response).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn list_avatars(&self) -> Result<serde_json::Value, AvatarError> {
        self.get_json("/v2/avatars").await
    }

    async fn list_voices(&self) -> Result<serde_json::Value, AvatarError> {
        self.get_json("/v1/voice.list").await
    }
}

/// Polls until the render completes, fails, or `policy.timeout` passes.
pub async fn poll_video(
    api: &dyn AvatarApi,
    video_id: &str,
    pacer: &dyn Pacer,
    policy: PollPolicy,
) -> Result<VideoStatus, AvatarError> {
    let mut state = PollState::Submitted;
    loop {
        let status = api.status(video_id).await?;
        let next = next_state(status.status.as_deref(), pacer.elapsed(), policy.timeout);
        debug!("Video {}: {:?} -> {:?} ({:?})", video_id, state, next, status.status);
        state = next;
        match state {
            PollState::Completed => return Ok(status),
            PollState::Failed => {
                let reason = status
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "status failed".to_string());
                return Err(AvatarError::GenerationFailed(reason));
            }
            PollState::TimedOut => return Err(AvatarError::TimedOut(policy.timeout)),
            PollState::Submitted | PollState::Polling => pacer.sleep(policy.interval).await,
        }
    }
}

/// Submits, waits for, and downloads an avatar clip to `dest`.
pub async fn fetch_avatar_video(
    api: &dyn AvatarApi,
    request: &GenerateRequest,
    dest: &Path,
    pacer: &dyn Pacer,
    policy: PollPolicy,
) -> Result<PathBuf, AvatarError> {
    let video_id = api.generate(request).await?;
    info!("Avatar video submitted: {}", video_id);

    let done = poll_video(api, &video_id, pacer, policy).await?;
    let url = done
        .video_url
        .ok_or_else(|| AvatarError::Malformed("completed status has no video_url".into()))?;

    if let Err(e) = api.download(&url, dest).await {
        // a partial clip must not be mistaken for a finished one
        let _ = tokio::fs::remove_file(dest).await;
        return Err(e);
    }
    Ok(dest.to_path_buf())
}
