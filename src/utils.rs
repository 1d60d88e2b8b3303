use anyhow::Context;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;
use tracing::{debug, error};

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("space regex"));

/// Strips markup tags and collapses runs of whitespace into single spaces.
pub fn clean_text(text: &str) -> String {
    let without_tags = TAG_RE.replace_all(text, " ");
    SPACE_RE.replace_all(&without_tags, " ").trim().to_string()
}

pub fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Writes `value` as pretty JSON, creating parent directories first.
/// Non-ASCII text is kept as-is so Cyrillic stays readable in the logs.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    ensure_parent_dir(path)?;
    let data = serde_json::to_string_pretty(value)?;
    fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

pub fn run_ffmpeg<S: AsRef<std::ffi::OsStr>>(args: &[S], what: &str) -> anyhow::Result<()> {
    let status = Command::new("ffmpeg")
        .args(args)
        .status()
        .context("failed to spawn ffmpeg")?;
    if !status.success() {
        error!("ffmpeg failed to {}", what);
        anyhow::bail!("ffmpeg failed to {}", what);
    }
    Ok(())
}
