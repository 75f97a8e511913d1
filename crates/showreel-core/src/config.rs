//! Configuration management for showreel
//!
//! Settings are resolved once into an [`E2eConfig`]: defaults, then an optional
//! `.showreel/config.toml`, then `BF_E2E_*` environment overrides. Components
//! receive the resolved struct and never read the environment themselves.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

use crate::{Result, ShowreelError, VideoFormat, VideoQuality};

pub const ENV_BASE_URL: &str = "BF_E2E_BASE_URL";
pub const ENV_SHOW_BROWSER: &str = "BF_E2E_SHOW_BROWSER";
pub const ENV_EXECUTABLE_PATH: &str = "PUPPETEER_EXECUTABLE_PATH";
pub const ENV_SCREENSHOT_DIR: &str = "BF_E2E_SCREENSHOT_DIR";
pub const ENV_LATEST_DIR: &str = "BF_E2E_LATEST_DIR";
pub const ENV_VIDEO_DIR: &str = "BF_E2E_VIDEO_DIR";
pub const ENV_SMOOTH: &str = "BF_E2E_SMOOTH";
pub const ENV_HUMAN_MOUSE: &str = "BF_E2E_HUMAN_MOUSE";
pub const ENV_VIDEO_FORMAT: &str = "BF_E2E_VIDEO_FORMAT";
pub const ENV_VIDEO_QUALITY: &str = "BF_E2E_VIDEO_QUALITY";
pub const ENV_VIDEO_FPS: &str = "BF_E2E_VIDEO_FPS";

/// Fully resolved harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct E2eConfig {
    /// Base URL of the application under test
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Run the browser with a visible window
    #[serde(default)]
    pub show_browser: bool,

    /// Explicit browser binary; probed when unset
    #[serde(default)]
    pub executable_path: Option<PathBuf>,

    /// Directory for timestamped screenshots
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,

    /// Stable mirror directory for CI artifact pickup
    #[serde(default)]
    pub latest_dir: Option<PathBuf>,

    /// Directory for recorded videos
    #[serde(default = "default_video_dir")]
    pub video_dir: PathBuf,

    /// Smooth (human-like) interactions instead of instant ones
    #[serde(default = "default_true")]
    pub smooth: bool,

    /// Curved, jittered mouse paths instead of straight eased moves
    #[serde(default = "default_true")]
    pub human_mouse: bool,

    /// Navigation and wait timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Browser viewport
    #[serde(default)]
    pub viewport: Viewport,

    /// Video encoding settings
    #[serde(default)]
    pub video: VideoSettings,
}

/// Browser viewport size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Encoder settings handed to the video sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSettings {
    #[serde(default)]
    pub format: VideoFormat,

    #[serde(default)]
    pub quality: VideoQuality,

    #[serde(default = "default_framerate")]
    pub framerate: u32,

    /// Remove captured frames once the video is encoded
    #[serde(default = "default_true")]
    pub delete_frames: bool,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("tmp/screenshots")
}

fn default_video_dir() -> PathBuf {
    PathBuf::from("tmp/videos")
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_framerate() -> u32 {
    30
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            show_browser: false,
            executable_path: None,
            screenshot_dir: default_screenshot_dir(),
            latest_dir: None,
            video_dir: default_video_dir(),
            smooth: true,
            human_mouse: true,
            timeout_ms: default_timeout_ms(),
            viewport: Viewport::default(),
            video: VideoSettings::default(),
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            format: VideoFormat::default(),
            quality: VideoQuality::default(),
            framerate: default_framerate(),
            delete_frames: true,
        }
    }
}

impl E2eConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load `.showreel/config.toml` under `root` (or defaults), then apply the environment
    pub fn load(root: &Path) -> Result<Self> {
        let mut config = Self::load_or_default(root)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from `.showreel/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = Self::config_path(root);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| ShowreelError::Config(format!("Failed to parse config file: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.showreel/config.toml`
    pub fn write_default(root: &Path) -> Result<PathBuf> {
        let config_path = Self::config_path(root);
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| ShowreelError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(".showreel").join("config.toml")
    }

    /// Apply overrides from a variable lookup
    ///
    /// Unparseable values are logged and ignored so a typo in CI never aborts a run.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_BASE_URL) {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(value) = get(ENV_SHOW_BROWSER) {
            apply_bool(ENV_SHOW_BROWSER, &value, &mut self.show_browser);
        }
        if let Some(path) = get(ENV_EXECUTABLE_PATH) {
            self.executable_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = get(ENV_SCREENSHOT_DIR) {
            self.screenshot_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(ENV_LATEST_DIR) {
            self.latest_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = get(ENV_VIDEO_DIR) {
            self.video_dir = PathBuf::from(dir);
        }
        if let Some(value) = get(ENV_SMOOTH) {
            apply_bool(ENV_SMOOTH, &value, &mut self.smooth);
        }
        if let Some(value) = get(ENV_HUMAN_MOUSE) {
            apply_bool(ENV_HUMAN_MOUSE, &value, &mut self.human_mouse);
        }
        if let Some(value) = get(ENV_VIDEO_FORMAT) {
            apply_parsed(ENV_VIDEO_FORMAT, &value, &mut self.video.format);
        }
        if let Some(value) = get(ENV_VIDEO_QUALITY) {
            apply_parsed(ENV_VIDEO_QUALITY, &value, &mut self.video.quality);
        }
        if let Some(value) = get(ENV_VIDEO_FPS) {
            match value.trim().parse::<u32>() {
                Ok(fps) if fps > 0 => self.video.framerate = fps,
                _ => warn!("Ignoring {}={:?}: expected a positive integer", ENV_VIDEO_FPS, value),
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn apply_bool(key: &str, value: &str, target: &mut bool) {
    match parse_bool(value) {
        Some(parsed) => *target = parsed,
        None => warn!("Ignoring {}={:?}: expected true/false", key, value),
    }
}

fn apply_parsed<T: FromStr>(key: &str, value: &str, target: &mut T) {
    match value.parse::<T>() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!("Ignoring {}={:?}: unsupported value", key, value),
    }
}
