use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use newsreel::args::Args;
use newsreel::avatar::{AvatarApi, HeygenClient, PollPolicy};
use newsreel::compose::FfmpegRenderer;
use newsreel::config::AppConfig;
use newsreel::pipeline::{self, RunOptions, Services};
use newsreel::script::OpenAiChat;
use newsreel::tts::PiperEngine;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    if args.list_avatars || args.list_voices {
        let client = HeygenClient::from_env()?;
        let listing = if args.list_avatars {
            client.list_avatars().await?
        } else {
            client.list_voices().await?
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    let date = match &args.date {
        Some(d) => {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .with_context(|| format!("--date must be YYYY-MM-DD, got {}", d))?;
            d.clone()
        }
        None => Utc::now().format("%Y-%m-%d").to_string(),
    };

    let config = AppConfig::load(Path::new(&args.config_dir), Path::new(&args.sources))?;
    info!("Starting news video pipeline for {}", date);

    // a missing key surfaces later as a "not_configured" avatar failure
    let avatar = HeygenClient::from_env()
        .ok()
        .map(|client| Box::new(client) as Box<dyn AvatarApi>);
    let services = Services {
        llm: Box::new(OpenAiChat::from_settings(&config.base.llm)),
        avatar,
        poll: PollPolicy::default(),
        speech: Box::new(PiperEngine::new(&config.tts.model)),
        renderer: Box::new(FfmpegRenderer),
    };
    let opts = RunOptions {
        date,
        out: args.out.as_ref().map(PathBuf::from),
        dry_run: args.dry_run,
        use_sample: args.use_sample,
        heygen_test: args.heygen_test,
        sample_path: PathBuf::from(&args.sample_path),
    };

    let report = pipeline::run(&opts, &config, &services).await?;
    info!(
        "Process complete: {} items, script {}, video {}",
        report.news_items,
        report.script.display(),
        report
            .video
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    Ok(())
}
