use anyhow::Context;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::debug;

pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let value = serde_yaml::from_str(&data)
        .with_context(|| format!("parsing config {}", path.display()))?;
    debug!("Loaded config {}", path.display());
    Ok(value)
}

/// All configuration for one run. Built once at startup and only ever read.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub base: BaseConfig,
    pub sources: SourcesConfig,
    pub tts: TtsConfig,
    pub template: TemplateConfig,
    pub export: ExportConfig,
}

impl AppConfig {
    pub fn load(config_dir: &Path, sources_path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            base: load_yaml(&config_dir.join("base.yaml"))?,
            sources: load_yaml(sources_path)?,
            tts: load_yaml(&config_dir.join("tts.yaml"))?,
            template: load_yaml(&config_dir.join("template.yaml"))?,
            export: load_yaml(&config_dir.join("export.yaml"))?,
        })
    }

    pub fn duration_seconds(&self) -> f64 {
        self.base.video.duration_seconds
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    pub video: VideoSettings,
    pub paths: PathSettings,
    pub theme: String,
    pub style: StyleSettings,
    pub llm: LlmSettings,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            video: VideoSettings::default(),
            paths: PathSettings::default(),
            theme: "Технологии и рынки".to_string(),
            style: StyleSettings::default(),
            llm: LlmSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub duration_seconds: f64,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            duration_seconds: 90.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub outputs_root: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            outputs_root: "outputs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StyleSettings {
    pub anchor_name: String,
    pub bullet_count: usize,
}

impl Default for StyleSettings {
    fn default() -> Self {
        Self {
            anchor_name: "Ведущий".to_string(),
            bullet_count: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f32,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            base_url: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SourceSpec {
    #[serde(default = "default_source_name")]
    pub name: String,
    pub url: String,
}

fn default_source_name() -> String {
    "rss".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub sources: Vec<SourceSpec>,
    pub filters: FilterSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub keywords_include: Vec<String>,
    pub keywords_exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub provider: String,
    pub language: String,
    /// Piper voice model (.onnx)
    pub model: String,
    pub log_params: bool,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: "piper".to_string(),
            language: "ru".to_string(),
            model: "./tts/ru_RU-dmitri-medium.onnx".to_string(),
            log_params: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub background: BackgroundSettings,
    pub avatar: AvatarSettings,
    pub captions: CaptionStyle,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackgroundSettings {
    pub path: Option<String>,
    pub color_fallback: String,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            path: None,
            color_fallback: "#0f172a".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AvatarProvider {
    #[default]
    Static,
    Heygen,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AvatarSettings {
    pub provider: AvatarProvider,
    pub avatar_id: String,
    pub voice_id: String,
    pub video_path: String,
    pub photo_path: String,
    pub use_heygen_audio: bool,
    /// Top-left corner as fractions of the frame.
    pub position: [f64; 2],
    /// Width and height as fractions of the frame.
    pub size: [f64; 2],
}

impl Default for AvatarSettings {
    fn default() -> Self {
        Self {
            provider: AvatarProvider::Static,
            avatar_id: String::new(),
            voice_id: String::new(),
            video_path: String::new(),
            photo_path: String::new(),
            use_heygen_audio: true,
            position: [0.6, 0.1],
            size: [0.35, 0.7],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptionStyle {
    pub font: String,
    pub font_size: u32,
    pub color: String,
    pub stroke_color: String,
    pub stroke_width: u32,
    /// `[x, y, width, height]` as fractions of the frame.
    pub area: [f64; 4],
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font: "Arial".to_string(),
            font_size: 36,
            color: "white".to_string(),
            stroke_color: "black".to_string(),
            stroke_width: 2,
            area: [0.0, 0.0, 1.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub resolution: [u32; 2],
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub bitrate: String,
    pub audio_bitrate: String,
    /// Aspect ratio requested from the avatar service, e.g. "16:9".
    pub format: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            resolution: [1280, 720],
            fps: 30,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            bitrate: "3M".to_string(),
            audio_bitrate: "192k".to_string(),
            format: "16:9".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_base_config_keeps_defaults() {
        let base: BaseConfig = serde_yaml::from_str(
            "video:\n  duration_seconds: 60\nllm:\n  model: test-model\n",
        )
        .unwrap();
        assert_eq!(base.video.duration_seconds, 60.0);
        assert_eq!(base.llm.model, "test-model");
        assert_eq!(base.llm.temperature, 0.3);
        assert_eq!(base.style.bullet_count, 4);
        assert_eq!(base.paths.outputs_root, "outputs");
    }

    #[test]
    fn sources_config_parses_filters() {
        let yaml = r#"
sources:
  - name: Lenta
    url: https://lenta.ru/rss
  - url: https://example.com/feed
filters:
  keywords_include: [рынок, ИИ]
  keywords_exclude: [спорт]
"#;
        let cfg: SourcesConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.sources.len(), 2);
        assert_eq!(cfg.sources[1].name, "rss");
        assert_eq!(cfg.filters.keywords_include, vec!["рынок", "ИИ"]);
        assert_eq!(cfg.filters.keywords_exclude, vec!["спорт"]);
    }

    #[test]
    fn template_reads_heygen_provider() {
        let yaml = "avatar:\n  provider: heygen\n  avatar_id: a1\n  voice_id: v1\n";
        let cfg: TemplateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.avatar.provider, AvatarProvider::Heygen);
        assert!(cfg.avatar.use_heygen_audio);
        assert_eq!(cfg.captions.font_size, 36);
        assert_eq!(cfg.background.color_fallback, "#0f172a");
    }

    #[test]
    fn load_reads_all_files_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["base.yaml", "tts.yaml", "template.yaml", "export.yaml"] {
            fs::write(dir.path().join(name), "{}\n").unwrap();
        }
        let sources = dir.path().join("sources.yaml");
        fs::write(&sources, "sources: []\n").unwrap();

        let cfg = AppConfig::load(dir.path(), &sources).unwrap();
        assert_eq!(cfg.duration_seconds(), 90.0);
        assert_eq!(cfg.export.resolution, [1280, 720]);
        assert_eq!(cfg.tts.language, "ru");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_yaml::<BaseConfig>(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(err.to_string().contains("nope.yaml"));
    }
}
