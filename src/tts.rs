use crate::audio::wav_duration_seconds;
use crate::config::TtsConfig;
use crate::utils::{ensure_parent_dir, write_json};
use anyhow::Context;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{error, info, warn};

/// Renders speech for a whole text into a WAV file.
pub trait SpeechEngine: Send + Sync {
    fn render(&self, text: &str, out_path: &Path) -> anyhow::Result<()>;
}

pub struct PiperEngine {
    model: String,
}

impl PiperEngine {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }
}

impl SpeechEngine for PiperEngine {
    fn render(&self, text: &str, out_path: &Path) -> anyhow::Result<()> {
        let mut child = Command::new("piper")
            .arg("--model")
            .arg(&self.model)
            .arg("--output_file")
            .arg(out_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn piper process")?;

        {
            let stdin = child.stdin.as_mut().context("failed to open piper stdin")?;
            stdin.write_all(text.as_bytes())?;
        }

        let status = child.wait()?;
        if !status.success() {
            error!("Piper TTS command failed for {}", out_path.display());
            anyhow::bail!("TTS engine failed, command returned non-zero");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct TtsMeta<'a> {
    pub provider: &'a str,
    pub language: &'a str,
    pub text_char_len: usize,
    pub duration_seconds: Option<f64>,
}

/// Narrates `text` in one pass. The result always gets a `.wav` extension,
/// whatever `output_path` asked for.
pub fn synthesize(
    engine: &dyn SpeechEngine,
    text: &str,
    cfg: &TtsConfig,
    output_path: &Path,
    log_path: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    let output_path = match output_path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("wav") => output_path.to_path_buf(),
        _ => output_path.with_extension("wav"),
    };
    ensure_parent_dir(&output_path)?;

    info!(
        "Synthesizing {} chars ({}) to {}",
        text.chars().count(),
        cfg.language,
        output_path.display()
    );
    engine.render(text, &output_path)?;

    if let Some(log_path) = log_path.filter(|_| cfg.log_params) {
        let duration_seconds = match wav_duration_seconds(&output_path) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!("Could not read narration length: {:#}", e);
                None
            }
        };
        write_json(
            log_path,
            &TtsMeta {
                provider: &cfg.provider,
                language: &cfg.language,
                text_char_len: text.chars().count(),
                duration_seconds,
            },
        )?;
    }
    Ok(output_path)
}
