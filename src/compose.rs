use crate::config::{AvatarSettings, CaptionStyle, ExportConfig};
use crate::script::Caption;
use crate::subtitle::wrap_text;
use crate::utils::{ensure_parent_dir, run_ffmpeg};
use std::path::{Path, PathBuf};
use tracing::info;

/// Average glyph width relative to font size, used to wrap captions to their box.
const GLYPH_WIDTH_RATIO: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    External(PathBuf),
    AvatarClip,
    Silent,
}

#[derive(Debug, Clone, PartialEq)]
enum AvatarLayer {
    Video(PathBuf),
    Photo(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ComposeRequest<'a> {
    pub background: &'a Path,
    pub avatar_video: Option<&'a Path>,
    pub avatar_photo: Option<&'a Path>,
    pub captions: &'a [Caption],
    pub audio: Option<&'a Path>,
    pub duration: f64,
}

/// Everything ffmpeg needs for one render.
#[derive(Debug, Clone)]
pub struct CompositionPlan {
    pub input_args: Vec<String>,
    pub filter_graph: String,
    pub audio: AudioSource,
    pub output_args: Vec<String>,
    pub output: PathBuf,
}

impl CompositionPlan {
    pub fn ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string()];
        args.extend(self.input_args.iter().cloned());
        args.push("-filter_complex".to_string());
        args.push(self.filter_graph.clone());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Escapes a value for a single-quoted drawtext option inside a filter graph.
pub fn drawtext_escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\u{2019}")
        .replace(':', "\\:")
}

fn px(fraction: f64, total: u32) -> i64 {
    (fraction * total as f64).round() as i64
}

fn caption_filter(caption: &Caption, style: &CaptionStyle, width: u32, height: u32) -> String {
    let [ax, ay, aw, ah] = style.area;
    let (x, y, w, h) = (px(ax, width), px(ay, height), px(aw, width), px(ah, height));
    let chars_per_line = ((w as f64) / (style.font_size.max(1) as f64 * GLYPH_WIDTH_RATIO))
        .floor()
        .max(1.0) as usize;
    let text = wrap_text(&caption.text, chars_per_line).join("\n");
    format!(
        "drawtext=font='{font}':text='{text}':expansion=none:fontsize={size}:fontcolor={color}:\
         bordercolor={stroke}:borderw={stroke_w}:x={x}+({w}-text_w)/2:y={y}+({h}-text_h)/2:\
         enable='between(t,{start},{end})'",
        font = drawtext_escape(&style.font),
        text = drawtext_escape(&text),
        size = style.font_size,
        color = style.color,
        stroke = style.stroke_color,
        stroke_w = style.stroke_width,
        start = caption.start,
        end = caption.end,
    )
}

/// Builds the ffmpeg invocation for the final composite. Missing avatar or
/// audio files are treated as absent.
pub fn plan_composition(
    request: &ComposeRequest<'_>,
    export: &ExportConfig,
    avatar: &AvatarSettings,
    style: &CaptionStyle,
    output: &Path,
) -> CompositionPlan {
    let [width, height] = export.resolution;
    let duration = request.duration.to_string();
    let path_arg = |p: &Path| p.to_string_lossy().into_owned();

    let mut input_args = vec![
        "-loop".to_string(),
        "1".to_string(),
        "-t".to_string(),
        duration.clone(),
        "-i".to_string(),
        path_arg(request.background),
    ];
    let mut next_input = 1;

    let layer = match (request.avatar_video, request.avatar_photo) {
        (Some(v), _) if v.exists() => Some(AvatarLayer::Video(v.to_path_buf())),
        (_, Some(p)) if p.exists() => Some(AvatarLayer::Photo(p.to_path_buf())),
        _ => None,
    };
    match &layer {
        Some(AvatarLayer::Video(v)) => {
            input_args.extend(["-i".to_string(), path_arg(v.as_path())]);
        }
        Some(AvatarLayer::Photo(p)) => {
            input_args.extend([
                "-loop".to_string(),
                "1".to_string(),
                "-t".to_string(),
                duration.clone(),
                "-i".to_string(),
                path_arg(p.as_path()),
            ]);
        }
        None => {}
    }
    if layer.is_some() {
        next_input += 1;
    }

    let audio = match request.audio {
        Some(a) if a.exists() => AudioSource::External(a.to_path_buf()),
        _ if matches!(layer, Some(AvatarLayer::Video(_))) => AudioSource::AvatarClip,
        _ => AudioSource::Silent,
    };
    if let AudioSource::External(a) = &audio {
        input_args.extend(["-i".to_string(), path_arg(a.as_path())]);
    }

    let mut chains = vec![format!("[0:v]scale={}:{},setsar=1[bg]", width, height)];
    let mut current = "bg".to_string();
    if let Some(layer) = &layer {
        let (aw, ah) = (px(avatar.size[0], width), px(avatar.size[1], height));
        let (x, y) = (px(avatar.position[0], width), px(avatar.position[1], height));
        // a finished clip drops out of the frame instead of freezing
        let eof = match layer {
            AvatarLayer::Video(_) => ":eof_action=pass",
            AvatarLayer::Photo(_) => "",
        };
        chains.push(format!("[1:v]scale={}:{}[av]", aw, ah));
        chains.push(format!("[{}][av]overlay={}:{}{}[ov]", current, x, y, eof));
        current = "ov".to_string();
    }
    let mut tail: Vec<String> = request
        .captions
        .iter()
        .map(|c| caption_filter(c, style, width, height))
        .collect();
    tail.push("format=yuv420p".to_string());
    chains.push(format!("[{}]{}[vout]", current, tail.join(",")));
    let filter_graph = chains.join(";");

    let mut output_args = vec!["-map".to_string(), "[vout]".to_string()];
    match &audio {
        AudioSource::External(_) => {
            output_args.extend(["-map".to_string(), format!("{}:a:0", next_input)]);
        }
        AudioSource::AvatarClip => {
            output_args.extend(["-map".to_string(), "1:a?".to_string()]);
        }
        AudioSource::Silent => {}
    }
    output_args.extend([
        "-c:v".to_string(),
        export.video_codec.clone(),
        "-b:v".to_string(),
        export.bitrate.clone(),
        "-r".to_string(),
        export.fps.to_string(),
    ]);
    if audio != AudioSource::Silent {
        output_args.extend([
            "-c:a".to_string(),
            export.audio_codec.clone(),
            "-b:a".to_string(),
            export.audio_bitrate.clone(),
        ]);
    }
    output_args.extend(["-t".to_string(), duration]);
    if matches!(audio, AudioSource::External(_)) {
        // stop at whichever of picture and narration ends first
        output_args.push("-shortest".to_string());
    }

    CompositionPlan {
        input_args,
        filter_graph,
        audio,
        output_args,
        output: output.to_path_buf(),
    }
}

pub trait VideoRenderer: Send + Sync {
    fn render(&self, plan: &CompositionPlan) -> anyhow::Result<()>;
}

pub struct FfmpegRenderer;

impl VideoRenderer for FfmpegRenderer {
    fn render(&self, plan: &CompositionPlan) -> anyhow::Result<()> {
        run_ffmpeg(&plan.ffmpeg_args(), "produce final video")
    }
}

pub fn compose_video(
    renderer: &dyn VideoRenderer,
    request: &ComposeRequest<'_>,
    export: &ExportConfig,
    avatar: &AvatarSettings,
    style: &CaptionStyle,
    output: &Path,
) -> anyhow::Result<PathBuf> {
    ensure_parent_dir(output)?;
    let plan = plan_composition(request, export, avatar, style, output);
    info!(
        "Compositing {} captions, audio {:?} -> {}",
        request.captions.len(),
        plan.audio,
        output.display()
    );
    renderer.render(&plan)?;
    Ok(output.to_path_buf())
}
