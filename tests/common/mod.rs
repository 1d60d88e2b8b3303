#![allow(dead_code)]

use async_trait::async_trait;
use newsreel::avatar::{AvatarApi, AvatarError, GenerateRequest, PollPolicy, VideoStatus};
use newsreel::compose::{CompositionPlan, VideoRenderer};
use newsreel::config::AppConfig;
use newsreel::pipeline::{RunOptions, Services};
use newsreel::script::{ChatModel, ChatRequest};
use newsreel::tts::SpeechEngine;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SCRIPT: &str = "Добрый вечер, с вами Анна и главные новости дня.\n\
Банк России сохранил ключевую ставку без изменений.\n\
Нефть Brent дорожает третий день подряд.\n\
IT-компании отчитались о росте выручки.\n\
На этом всё, до встречи завтра.";

pub struct FixedModel;

#[async_trait]
impl ChatModel for FixedModel {
    async fn complete(&self, _request: &ChatRequest) -> anyhow::Result<String> {
        Ok(SCRIPT.to_string())
    }
}

pub struct FailingModel;

#[async_trait]
impl ChatModel for FailingModel {
    async fn complete(&self, _request: &ChatRequest) -> anyhow::Result<String> {
        anyhow::bail!("quota exceeded")
    }
}

/// Writes one second of silence instead of running piper.
pub struct SilentSpeech;

impl SpeechEngine for SilentSpeech {
    fn render(&self, _text: &str, out_path: &Path) -> anyhow::Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(out_path, spec)?;
        for _ in 0..8_000 {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

/// Records plans and touches the output file instead of running ffmpeg.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    pub plans: Arc<Mutex<Vec<CompositionPlan>>>,
}

impl VideoRenderer for RecordingRenderer {
    fn render(&self, plan: &CompositionPlan) -> anyhow::Result<()> {
        std::fs::write(&plan.output, b"mp4")?;
        self.plans.lock().unwrap().push(plan.clone());
        Ok(())
    }
}

pub enum AvatarBehavior {
    Rejects,
    Fails,
    Completes,
}

pub struct StubAvatar {
    pub behavior: AvatarBehavior,
    pub calls: Arc<AtomicUsize>,
}

impl StubAvatar {
    pub fn new(behavior: AvatarBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl AvatarApi for StubAvatar {
    async fn generate(&self, _request: &GenerateRequest) -> Result<String, AvatarError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            AvatarBehavior::Rejects => Err(AvatarError::Rejected {
                status: 503,
                body: "maintenance".to_string(),
            }),
            _ => Ok("vid-42".to_string()),
        }
    }

    async fn status(&self, _video_id: &str) -> Result<VideoStatus, AvatarError> {
        let status = match self.behavior {
            AvatarBehavior::Completes => "completed",
            _ => "failed",
        };
        Ok(VideoStatus {
            status: Some(status.to_string()),
            video_url: Some("https://cdn.example.com/vid-42.mp4".to_string()),
            error: None,
        })
    }

    async fn download(&self, _video_url: &str, dest: &Path) -> Result<(), AvatarError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, b"mp4")?;
        Ok(())
    }

    async fn list_avatars(&self) -> Result<serde_json::Value, AvatarError> {
        Ok(serde_json::json!({ "data": [] }))
    }

    async fn list_voices(&self) -> Result<serde_json::Value, AvatarError> {
        Ok(serde_json::json!({ "data": [] }))
    }
}

pub fn sample_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("data/sample_news.json")
}

/// Config rooted in `dir`, with an existing background file.
pub fn config_in(dir: &Path) -> AppConfig {
    let bg = dir.join("bg.png");
    std::fs::write(&bg, b"png").unwrap();

    let mut config = AppConfig::default();
    config.base.paths.outputs_root = dir.join("outputs").to_string_lossy().into_owned();
    config.base.video.duration_seconds = 60.0;
    config.template.background.path = Some(bg.to_string_lossy().into_owned());
    config
}

pub fn options(dry_run: bool) -> RunOptions {
    RunOptions {
        date: "2025-10-14".to_string(),
        out: None,
        dry_run,
        use_sample: true,
        heygen_test: true,
        sample_path: sample_path(),
    }
}

pub fn services(
    llm: Box<dyn ChatModel>,
    avatar: Option<Box<dyn AvatarApi>>,
    renderer: &RecordingRenderer,
) -> Services {
    Services {
        llm,
        avatar,
        poll: PollPolicy::default(),
        speech: Box::new(SilentSpeech),
        renderer: Box::new(renderer.clone()),
    }
}
