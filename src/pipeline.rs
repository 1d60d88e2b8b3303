use crate::avatar::{
    AvatarApi, AvatarError, GenerateRequest, PollPolicy, TokioPacer, fetch_avatar_video,
};
use crate::compose::{ComposeRequest, VideoRenderer, compose_video};
use crate::config::{AppConfig, AvatarProvider};
use crate::news::{NewsItem, fetch_and_normalize, load_sample};
use crate::script::{ChatModel, ScriptPayload, build_script};
use crate::subtitle::write_srt;
use crate::tts::{SpeechEngine, synthesize};
use crate::utils::write_json;
use crate::visuals::prepare_visuals;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Per-run artifact locations, keyed by the release date.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub root: PathBuf,
    pub news_log: PathBuf,
    pub script_log: PathBuf,
    pub script: PathBuf,
    pub captions: PathBuf,
    pub tts_log: PathBuf,
    pub audio: PathBuf,
    pub avatar_video: PathBuf,
    pub video: PathBuf,
}

impl ArtifactPaths {
    pub fn new(root: &Path, date: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            news_log: root.join("logs").join(format!("news_{date}.json")),
            script_log: root.join("logs").join(format!("script_llm_{date}.json")),
            script: root.join("scripts").join(format!("script_{date}.json")),
            captions: root.join("scripts").join(format!("captions_{date}.srt")),
            tts_log: root.join("logs").join(format!("tts_{date}.json")),
            audio: root.join("audio").join(format!("voice_{date}.wav")),
            avatar_video: root.join("video").join(format!("avatar_heygen_{date}.mp4")),
            video: root.join("video").join(format!("video_{date}.mp4")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub date: String,
    pub out: Option<PathBuf>,
    pub dry_run: bool,
    pub use_sample: bool,
    pub heygen_test: bool,
    pub sample_path: PathBuf,
}

/// External capabilities the run talks to.
pub struct Services {
    pub llm: Box<dyn ChatModel>,
    /// `None` when the avatar service is not configured.
    pub avatar: Option<Box<dyn AvatarApi>>,
    pub poll: PollPolicy,
    pub speech: Box<dyn SpeechEngine>,
    pub renderer: Box<dyn VideoRenderer>,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub news_items: usize,
    pub script: PathBuf,
    pub avatar_video: Option<PathBuf>,
    pub audio: Option<PathBuf>,
    pub video: Option<PathBuf>,
}

async fn ingest(
    opts: &RunOptions,
    config: &AppConfig,
    paths: &ArtifactPaths,
) -> anyhow::Result<Vec<NewsItem>> {
    if opts.use_sample {
        let items = load_sample(&opts.sample_path)?;
        write_json(&paths.news_log, &items)?;
        return Ok(items);
    }

    let filters = &config.sources.filters;
    let items = fetch_and_normalize(
        &config.sources.sources,
        &filters.keywords_include,
        &filters.keywords_exclude,
        Some(&paths.news_log),
    )
    .await?;
    if items.is_empty() {
        warn!("[ingest] no items from feeds, using {}", opts.sample_path.display());
        return load_sample(&opts.sample_path);
    }
    Ok(items)
}

async fn fetch_avatar(
    services: &Services,
    opts: &RunOptions,
    config: &AppConfig,
    payload: &ScriptPayload,
    dest: &Path,
) -> Result<PathBuf, AvatarError> {
    let api = services.avatar.as_deref().ok_or(AvatarError::MissingApiKey)?;
    let avatar = &config.template.avatar;
    let request = GenerateRequest {
        avatar_id: avatar.avatar_id.clone(),
        voice_id: avatar.voice_id.clone(),
        text: payload.script_text.clone(),
        aspect_ratio: config.export.format.clone(),
        test: opts.heygen_test,
    };
    let pacer = TokioPacer::start();
    fetch_avatar_video(api, &request, dest, &pacer, services.poll).await
}

/// Runs every stage in order. Only the avatar stage is allowed to fail
/// without aborting; its failure switches narration to local speech.
pub async fn run(
    opts: &RunOptions,
    config: &AppConfig,
    services: &Services,
) -> anyhow::Result<RunReport> {
    let root = PathBuf::from(&config.base.paths.outputs_root);
    let paths = ArtifactPaths::new(&root, &opts.date);

    let items = ingest(opts, config, &paths).await?;
    info!("[ingest] collected {} items -> {}", items.len(), paths.news_log.display());

    let payload =
        build_script(services.llm.as_ref(), &items, &config.base, &paths.script_log).await?;
    write_json(&paths.script, &payload)?;
    write_srt(&paths.captions, &payload.segments)?;
    info!("[script] saved script to {}", paths.script.display());

    let avatar_cfg = &config.template.avatar;
    let mut avatar_video = None;
    let mut audio_target = Some(paths.audio.clone());

    if avatar_cfg.provider == AvatarProvider::Heygen && !opts.dry_run {
        match fetch_avatar(services, opts, config, &payload, &paths.avatar_video).await {
            Ok(path) => {
                info!("[heygen] video ready -> {}", path.display());
                avatar_video = Some(path);
                if avatar_cfg.use_heygen_audio {
                    audio_target = None;
                }
            }
            Err(e) => warn!("[heygen] failed ({}), fallback to TTS: {}", e.kind(), e),
        }
    }

    let mut audio = None;
    if !opts.dry_run {
        if let Some(target) = audio_target {
            let path = synthesize(
                services.speech.as_ref(),
                &payload.script_text,
                &config.tts,
                &target,
                Some(&paths.tts_log),
            )?;
            info!("[tts] audio -> {}", path.display());
            audio = Some(path);
        }
    }

    let visuals = prepare_visuals(&config.template, &root)?;
    info!("[visuals] background: {}", visuals.background_path.display());

    let video_out = opts.out.clone().unwrap_or_else(|| paths.video.clone());
    let mut video = None;
    if opts.dry_run {
        info!("[video] skipped (dry run)");
    } else {
        let clip = avatar_video.as_deref().or(visuals.avatar_video.as_deref());
        let request = ComposeRequest {
            background: &visuals.background_path,
            avatar_video: clip,
            avatar_photo: visuals.avatar_photo.as_deref(),
            captions: &payload.segments,
            audio: audio.as_deref(),
            duration: config.duration_seconds(),
        };
        let out = compose_video(
            services.renderer.as_ref(),
            &request,
            &config.export,
            avatar_cfg,
            &visuals.captions,
            &video_out,
        )?;
        info!("[video] saved to {}", out.display());
        video = Some(out);
    }

    Ok(RunReport {
        news_items: items.len(),
        script: paths.script,
        avatar_video,
        audio,
        video,
    })
}
