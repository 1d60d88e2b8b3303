use crate::config::{BaseConfig, LlmSettings};
use crate::news::NewsItem;
use crate::utils::write_json;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const SYSTEM_PROMPT: &str = "Ты новостной редактор. Сделай короткий сценарий выпуска: \
вступление, 3-5 сюжетов, финал. Стиль деловой, краткий, без эмоций. Язык — русский. \
Этот текст пойдёт сразу на генерацию новостного видеоролика, так что дай готовый сценарий \
для произношения на видео без разметки";

const MIN_BULLET_CHARS: usize = 12;
const MIN_SEGMENT_SECONDS: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptPayload {
    pub script_text: String,
    pub bullets: Vec<String>,
    pub segments: Vec<Caption>,
}

#[derive(Debug, Serialize)]
pub struct ScriptLog<'a> {
    pub prompt: &'a str,
    pub response: &'a str,
    pub model: &'a str,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// A text-generation backend that answers a chat request with one completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> anyhow::Result<String>;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint (OpenAI, OpenRouter, ...).
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiChat {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Key lookup order: `OPENROUTER_API_KEY`, `OPENAI_API_KEY`, then `llm.api_key`.
    pub fn from_settings(llm: &LlmSettings) -> Self {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok()
            .or_else(|| llm.api_key.clone());
        let base_url = llm.base_url.as_deref().unwrap_or("https://api.openai.com/v1");
        Self::new(base_url, api_key)
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, request: &ChatRequest) -> anyhow::Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("chat completion failed {}: {}", status, body);
        }
        let parsed: ChatResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .context("chat completion returned no choices")?;
        Ok(choice.message.content)
    }
}

pub fn format_prompt(items: &[NewsItem], base: &BaseConfig) -> String {
    let mut lines = vec![format!(
        "Тема выпуска: {}. Ведущий: {}. Сводка новостей:",
        base.theme, base.style.anchor_name
    )];
    for (i, item) in items.iter().enumerate() {
        lines.push(format!("{}) {}. {}", i + 1, item.title, item.body));
    }
    lines.push(
        "Сформируй связный текст ведущего (3-5 сюжетов), выдели короткие тезисы для титров, \
         без воды и домыслов."
            .to_string(),
    );
    lines.join("\n")
}

/// Picks caption lines out of the drafted prose.
///
/// Lines longer than 12 characters qualify, in order, until `bullet_count` are found.
/// If nothing qualifies the first three lines are used as they are.
pub fn extract_bullets(script_text: &str, bullet_count: usize) -> Vec<String> {
    let lines: Vec<&str> = script_text
        .lines()
        .map(|l| l.trim().trim_matches(|c: char| c == '-' || c == '•' || c == ' '))
        // decoration-only lines such as "---" never reach the fallback
        .filter(|l| !l.is_empty())
        .collect();

    let mut bullets = Vec::new();
    for line in &lines {
        if bullets.len() >= bullet_count {
            break;
        }
        if line.chars().count() > MIN_BULLET_CHARS {
            bullets.push(line.to_string());
        }
    }
    if bullets.is_empty() {
        bullets = lines.iter().take(3).map(|l| l.to_string()).collect();
    }
    bullets
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Splits `duration` evenly across bullets, never less than 5s per caption.
/// Segments are contiguous from zero and clamped to `duration`.
pub fn build_segments(bullets: &[String], duration: f64) -> Vec<Caption> {
    let per = (duration / bullets.len().max(1) as f64).max(MIN_SEGMENT_SECONDS);
    let mut segments = Vec::with_capacity(bullets.len());
    let mut start = 0.0_f64;
    for bullet in bullets {
        let end = (start + per).min(duration);
        segments.push(Caption {
            start: round2(start),
            end: round2(end),
            text: bullet.clone(),
        });
        start = end;
    }
    segments
}

/// Drafts the anchor script. Any error from the model aborts the run.
pub async fn build_script(
    model: &dyn ChatModel,
    items: &[NewsItem],
    base: &BaseConfig,
    log_path: &Path,
) -> anyhow::Result<ScriptPayload> {
    let prompt = format_prompt(items, base);
    debug!("Prompt has {} chars", prompt.chars().count());

    let request = ChatRequest {
        model: base.llm.model.clone(),
        temperature: base.llm.temperature,
        messages: vec![
            ChatMessage::new("system", SYSTEM_PROMPT),
            ChatMessage::new("user", &prompt),
        ],
    };
    info!("Requesting script from {}", request.model);
    let response = model
        .complete(&request)
        .await
        .context("script generation failed")?;
    let script_text = response.trim().to_string();

    let bullets = extract_bullets(&script_text, base.style.bullet_count);
    let segments = build_segments(&bullets, base.video.duration_seconds);

    write_json(
        log_path,
        &ScriptLog {
            prompt: &prompt,
            response: &script_text,
            model: &request.model,
            temperature: request.temperature,
        },
    )?;

    Ok(ScriptPayload {
        script_text,
        bullets,
        segments,
    })
}
