mod common;

use common::*;
use newsreel::compose::AudioSource;
use newsreel::config::AvatarProvider;
use newsreel::news::NewsItem;
use newsreel::pipeline::{ArtifactPaths, run};
use newsreel::script::ScriptPayload;
use std::fs;
use std::sync::atomic::Ordering;

fn paths(dir: &std::path::Path) -> ArtifactPaths {
    ArtifactPaths::new(&dir.join("outputs"), "2025-10-14")
}

#[tokio::test]
async fn dry_run_with_sample_writes_script_and_logs_only() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let renderer = RecordingRenderer::default();
    let services = services(Box::new(FixedModel), None, &renderer);

    let report = run(&options(true), &config, &services).await.unwrap();
    let paths = paths(dir.path());

    assert_eq!(report.news_items, 4);
    assert_eq!(report.script, paths.script);
    assert!(report.audio.is_none());
    assert!(report.video.is_none());

    let payload: ScriptPayload =
        serde_json::from_str(&fs::read_to_string(&paths.script).unwrap()).unwrap();
    assert_eq!(payload.bullets.len(), 4);
    assert_eq!(payload.segments.first().unwrap().start, 0.0);
    assert_eq!(payload.segments.last().unwrap().end, 60.0);

    let news: Vec<NewsItem> =
        serde_json::from_str(&fs::read_to_string(&paths.news_log).unwrap()).unwrap();
    assert_eq!(news.len(), 4);
    assert!(news.iter().all(|n| n.ts.ends_with("+00:00")));
    assert_eq!(news[0].ts, "2025-10-14T10:30:00+00:00");

    assert!(paths.script_log.exists());
    assert!(paths.captions.exists());
    assert!(!paths.audio.exists());
    assert!(!paths.tts_log.exists());
    assert!(!paths.video.exists());
    assert!(renderer.plans.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dry_run_never_contacts_avatar_service() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.template.avatar.provider = AvatarProvider::Heygen;
    let avatar = StubAvatar::new(AvatarBehavior::Completes);
    let calls = avatar.calls.clone();
    let renderer = RecordingRenderer::default();
    let services = services(Box::new(FixedModel), Some(Box::new(avatar)), &renderer);

    run(&options(true), &config, &services).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_avatar_request_falls_back_to_local_narration() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.template.avatar.provider = AvatarProvider::Heygen;
    let renderer = RecordingRenderer::default();
    let services = services(
        Box::new(FixedModel),
        Some(Box::new(StubAvatar::new(AvatarBehavior::Rejects))),
        &renderer,
    );

    let report = run(&options(false), &config, &services).await.unwrap();
    let paths = paths(dir.path());

    assert!(report.avatar_video.is_none());
    assert_eq!(report.audio.as_deref(), Some(paths.audio.as_path()));
    assert!(paths.audio.exists());
    assert!(paths.tts_log.exists());
    assert_eq!(report.video.as_deref(), Some(paths.video.as_path()));
    assert!(paths.video.exists());

    let plans = renderer.plans.lock().unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].audio, AudioSource::External(paths.audio.clone()));
}

#[tokio::test]
async fn failed_render_and_missing_client_both_fall_back() {
    for avatar in [Some(StubAvatar::new(AvatarBehavior::Fails)), None] {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.template.avatar.provider = AvatarProvider::Heygen;
        let renderer = RecordingRenderer::default();
        let avatar = avatar.map(|a| Box::new(a) as Box<dyn newsreel::avatar::AvatarApi>);
        let services = services(Box::new(FixedModel), avatar, &renderer);

        let report = run(&options(false), &config, &services).await.unwrap();
        assert!(report.audio.unwrap().exists());
        assert!(report.video.unwrap().exists());
    }
}

#[tokio::test]
async fn completed_avatar_clip_carries_its_own_audio() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.template.avatar.provider = AvatarProvider::Heygen;
    let renderer = RecordingRenderer::default();
    let services = services(
        Box::new(FixedModel),
        Some(Box::new(StubAvatar::new(AvatarBehavior::Completes))),
        &renderer,
    );

    let report = run(&options(false), &config, &services).await.unwrap();
    let paths = paths(dir.path());

    assert_eq!(report.avatar_video.as_deref(), Some(paths.avatar_video.as_path()));
    assert!(report.audio.is_none());
    assert!(!paths.audio.exists());

    let plans = renderer.plans.lock().unwrap();
    assert_eq!(plans[0].audio, AudioSource::AvatarClip);
    assert!(plans[0].filter_graph.contains("overlay="));
}

#[tokio::test]
async fn explicit_out_path_is_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let renderer = RecordingRenderer::default();
    let services = services(Box::new(FixedModel), None, &renderer);
    let mut opts = options(false);
    let out = dir.path().join("final/briefing.mp4");
    opts.out = Some(out.clone());

    let report = run(&opts, &config, &services).await.unwrap();
    assert_eq!(report.video.as_deref(), Some(out.as_path()));
    assert!(out.exists());
}

#[tokio::test]
async fn script_failure_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let renderer = RecordingRenderer::default();
    let services = services(Box::new(FailingModel), None, &renderer);

    let err = run(&options(false), &config, &services).await.unwrap_err();
    assert!(format!("{:#}", err).contains("quota exceeded"));
    let paths = paths(dir.path());
    assert!(paths.news_log.exists());
    assert!(!paths.script.exists());
    assert!(!paths.audio.exists());
    assert!(renderer.plans.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dry_run_with_missing_background_paints_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.template.background.path =
        Some(dir.path().join("assets/background.png").to_string_lossy().into_owned());
    let renderer = RecordingRenderer::default();
    let services = services(Box::new(FixedModel), None, &renderer);

    let report = run(&options(true), &config, &services).await.unwrap();
    assert!(report.video.is_none());

    let placeholder = dir.path().join("outputs/bg_placeholder.png");
    let img = image::open(&placeholder).unwrap().to_rgb8();
    assert_eq!(img.dimensions(), (1280, 720));
    assert_eq!(img.get_pixel(1279, 719).0, [0x0f, 0x17, 0x2a]);
}
