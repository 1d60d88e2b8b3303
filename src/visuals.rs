use crate::compose::drawtext_escape;
use crate::config::{CaptionStyle, TemplateConfig};
use crate::utils::run_ffmpeg;
use anyhow::Context;
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const PLACEHOLDER_SIZE: (u32, u32) = (1280, 720);
const PLACEHOLDER_LABEL: &str = "Tech/Markets Briefing";
const DEFAULT_FILL: Rgb<u8> = Rgb([0x0f, 0x17, 0x2a]);

#[derive(Debug, Clone, PartialEq)]
pub struct Visuals {
    pub background_path: PathBuf,
    pub avatar_video: Option<PathBuf>,
    pub avatar_photo: Option<PathBuf>,
    pub captions: CaptionStyle,
}

fn non_empty(path: &str) -> Option<PathBuf> {
    let path = path.trim();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// Parses `#rrggbb` (leading `#` optional).
pub fn parse_hex_color(color: &str) -> Option<Rgb<u8>> {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// ffmpeg arguments that stamp the placeholder label onto `input`.
pub fn label_args(input: &Path, out: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        format!(
            "drawtext=text='{}':x=40:y=40:fontsize=28:fontcolor=#94a3b8",
            drawtext_escape(PLACEHOLDER_LABEL)
        ),
        out.to_string_lossy().into_owned(),
    ]
}

/// Writes a flat 1280x720 PNG in `color`. Unknown colours fall back to slate.
pub fn paint_placeholder(color: &str, out: &Path) -> anyhow::Result<()> {
    let fill = parse_hex_color(color).unwrap_or_else(|| {
        warn!("Unrecognised background colour {:?}, using default", color);
        DEFAULT_FILL
    });
    let (w, h) = PLACEHOLDER_SIZE;
    RgbImage::from_pixel(w, h, fill)
        .save(out)
        .with_context(|| format!("writing placeholder {}", out.display()))
}

// The label is cosmetic; the plain fill stays if ffmpeg is missing or fails.
fn stamp_label(out: &Path) {
    let labelled = out.with_file_name("bg_placeholder_label.png");
    match run_ffmpeg(&label_args(out, &labelled), "label placeholder background") {
        Ok(()) => {
            if let Err(e) = fs::rename(&labelled, out) {
                warn!("Keeping unlabelled placeholder: {}", e);
                let _ = fs::remove_file(&labelled);
            }
        }
        Err(e) => {
            warn!("Keeping unlabelled placeholder: {:#}", e);
            let _ = fs::remove_file(&labelled);
        }
    }
}

/// Resolves the background, painting a flat placeholder when the configured
/// image is missing.
pub fn prepare_visuals(template: &TemplateConfig, outputs_root: &Path) -> anyhow::Result<Visuals> {
    fs::create_dir_all(outputs_root)
        .with_context(|| format!("creating {}", outputs_root.display()))?;

    let background_path = match template.background.path.as_deref().and_then(non_empty) {
        Some(path) if path.exists() => path,
        _ => {
            let out = outputs_root.join("bg_placeholder.png");
            info!(
                "Background missing, painting {} placeholder at {}",
                template.background.color_fallback,
                out.display()
            );
            paint_placeholder(&template.background.color_fallback, &out)?;
            stamp_label(&out);
            out
        }
    };

    Ok(Visuals {
        background_path,
        avatar_video: non_empty(&template.avatar.video_path),
        avatar_photo: non_empty(&template.avatar.photo_path),
        captions: template.captions.clone(),
    })
}
