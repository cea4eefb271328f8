use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error_codes::{CodedError, INVALID_CONFIG};
use crate::paginate::PageMetrics;

pub const DEFAULT_CONFIG_FILE_NAME: &str = "slidecast.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    pub canvas: CanvasConfig,
    pub style: StyleConfig,
    pub speech: SpeechConfig,
    pub video: VideoConfig,
    pub staging_dir: PathBuf,
    pub keep_staging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            style: StyleConfig::default(),
            speech: SpeechConfig::default(),
            video: VideoConfig::default(),
            staging_dir: PathBuf::from("assets"),
            keep_staging: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 500,
            height: 500,
            margin: 10,
        }
    }
}

impl CanvasConfig {
    pub fn content_width(&self) -> f32 {
        self.width.saturating_sub(self.margin * 2) as f32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StyleConfig {
    pub background: String,
    pub foreground: String,
    pub font_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_sha256: Option<String>,
    pub font_size: f32,
    pub line_height_factor: f32,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            background: "#181B28".to_owned(),
            foreground: "#eeeeee".to_owned(),
            font_path: PathBuf::from("fonts/IBMPlexSans-Regular.ttf"),
            font_sha256: None,
            font_size: 20.0,
            line_height_factor: 1.1,
        }
    }
}

impl StyleConfig {
    pub fn line_height(&self) -> f32 {
        self.font_size * self.line_height_factor
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case", deny_unknown_fields)]
pub enum SpeechConfig {
    /// Runs a local TTS program once per page. The page text is written to its stdin.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_language")]
        language: String,
        #[serde(default = "default_command_extension")]
        extension: String,
    },
    /// The Google Translate speech endpoint, as used by gTTS.
    GoogleTranslate {
        #[serde(default = "default_language")]
        language: String,
        #[serde(default = "default_tld")]
        tld: String,
    },
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self::Command {
            program: "espeak-ng".to_owned(),
            args: vec![
                "-v".to_owned(),
                "{language}".to_owned(),
                "-w".to_owned(),
                "{output}".to_owned(),
                "--stdin".to_owned(),
            ],
            language: default_language(),
            extension: default_command_extension(),
        }
    }
}

fn default_language() -> String {
    "en".to_owned()
}

fn default_command_extension() -> String {
    "wav".to_owned()
}

fn default_tld() -> String {
    "com".to_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FfmpegMode {
    #[default]
    Auto,
    System,
    Sidecar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct VideoConfig {
    pub fps: u32,
    pub output: PathBuf,
    /// How long a page without a voice-over stays on screen. Zero drops it from the video.
    pub silent_page_seconds: f32,
    pub ffmpeg: FfmpegMode,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            output: PathBuf::from("dist/output.mp4"),
            silent_page_seconds: 0.0,
            ffmpeg: FfmpegMode::Auto,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let canvas = &self.canvas;
        if canvas.width == 0 || canvas.height == 0 {
            bail!(
                "canvas must be positive, got {}x{}",
                canvas.width,
                canvas.height
            );
        }
        if canvas.margin.saturating_mul(2) >= canvas.width
            || canvas.margin.saturating_mul(2) >= canvas.height
        {
            bail!(
                "canvas margin {} leaves no content area on a {}x{} canvas",
                canvas.margin,
                canvas.width,
                canvas.height
            );
        }

        let style = &self.style;
        parse_hex_color(&style.background)
            .map_err(|error| anyhow!("style.background: {error}"))?;
        parse_hex_color(&style.foreground)
            .map_err(|error| anyhow!("style.foreground: {error}"))?;
        if !style.font_size.is_finite() || style.font_size <= 0.0 {
            bail!("style.font_size must be > 0");
        }
        if !style.line_height_factor.is_finite() || style.line_height_factor <= 0.0 {
            bail!("style.line_height_factor must be > 0");
        }
        if let Some(hash) = &style.font_sha256 {
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                bail!("style.font_sha256 must be 64 hex characters");
            }
        }

        match &self.speech {
            SpeechConfig::Command {
                program, extension, ..
            } => {
                if program.trim().is_empty() {
                    bail!("speech.program cannot be empty");
                }
                if extension.trim().is_empty() || extension.contains(['/', '\\', '.']) {
                    bail!("speech.extension must be a bare file extension like 'wav'");
                }
            }
            SpeechConfig::GoogleTranslate { language, tld } => {
                if language.trim().is_empty() || tld.trim().is_empty() {
                    bail!("speech.language and speech.tld cannot be empty");
                }
            }
        }

        if self.video.fps == 0 {
            bail!("video.fps must be > 0");
        }
        if !self.video.silent_page_seconds.is_finite() || self.video.silent_page_seconds < 0.0 {
            bail!("video.silent_page_seconds must be a non-negative number");
        }
        if self.staging_dir.as_os_str().is_empty() {
            bail!("staging_dir cannot be empty");
        }

        Ok(())
    }

    pub fn page_metrics(&self) -> PageMetrics {
        PageMetrics {
            canvas_height: self.canvas.height as f32,
            top_margin: self.canvas.margin as f32,
            bottom_margin: self.canvas.margin as f32,
            line_height: self.style.line_height(),
        }
    }

    /// Resolves relative paths against `base_dir`, usually the settings file's directory.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        for path in [
            &mut self.style.font_path,
            &mut self.video.output,
            &mut self.staging_dir,
        ] {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }
    }
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let contents = fs::read_to_string(path)
        .map_err(|error| anyhow!("failed to read settings {}: {error}", path.display()))?;
    let mut settings = parse_settings(&contents).map_err(|error| {
        anyhow::Error::from(CodedError::usage(
            INVALID_CONFIG,
            format!("{}: {error:#}", path.display()),
        ))
    })?;

    let base_dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    settings.resolve_paths(&base_dir);
    Ok(settings)
}

pub fn parse_settings(contents: &str) -> Result<Settings> {
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }

    let settings: Settings = serde_yaml::from_str(contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!("failed to parse yaml at {}: {}", location, error)
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Settings from `--config`, or from `slidecast.yaml` in `cwd` when present, else defaults.
pub fn resolve_settings(config_override: Option<&Path>, cwd: &Path) -> Result<Settings> {
    if let Some(path) = config_override {
        let path = if path.is_relative() {
            cwd.join(path)
        } else {
            path.to_path_buf()
        };
        return load_settings(&path);
    }

    let candidate = cwd.join(DEFAULT_CONFIG_FILE_NAME);
    if candidate.is_file() {
        return load_settings(&candidate);
    }

    let mut settings = Settings::default();
    settings.resolve_paths(cwd);
    Ok(settings)
}

/// Parses `#RRGGBB` into an opaque RGBA color.
pub fn parse_hex_color(raw: &str) -> Result<[u8; 4]> {
    static HEX_COLOR: OnceLock<Regex> = OnceLock::new();
    let pattern = HEX_COLOR.get_or_init(|| {
        Regex::new(r"^#?([0-9A-Fa-f]{2})([0-9A-Fa-f]{2})([0-9A-Fa-f]{2})$")
            .expect("hex color pattern is valid")
    });

    let captures = pattern
        .captures(raw.trim())
        .ok_or_else(|| anyhow!("expected a #RRGGBB color, got '{raw}'"))?;
    let mut rgba = [0, 0, 0, 255];
    for (channel, slot) in rgba.iter_mut().take(3).enumerate() {
        *slot = u8::from_str_radix(&captures[channel + 1], 16)?;
    }
    Ok(rgba)
}
