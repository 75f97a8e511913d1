//! Screenshot and video artifacts on disk
//!
//! Screenshots are written as `{timestamp}_{name}.png` under the screenshot
//! directory. When a latest directory is configured every artifact is also
//! copied to `{latest}/{name}.{ext}` so CI can pick it up under a stable name.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use showreel_core::{E2eConfig, Result};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;
use tracing::{debug, info, warn};

/// Types of stored artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Screenshot,
    Video,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Screenshot => write!(f, "screenshot"),
            ArtifactKind::Video => write!(f, "video"),
        }
    }
}

/// Metadata for a stored artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    /// Stable copy under the latest directory
    pub latest_path: Option<PathBuf>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

fn unsafe_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-z0-9_-]+").expect("constant pattern compiles"))
}

/// File-name-safe form of a test or recording name
///
/// Lowercased, runs of anything but `[a-z0-9_-]` collapse to one `-`.
pub fn sanitize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let replaced = unsafe_chars().replace_all(&lowered, "-");
    let trimmed = replaced.trim_matches('-');
    if trimmed.is_empty() {
        "artifact".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Writes artifacts and their latest mirrors
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    screenshot_dir: PathBuf,
    latest_dir: Option<PathBuf>,
}

impl ArtifactStore {
    pub fn new(screenshot_dir: PathBuf, latest_dir: Option<PathBuf>) -> Self {
        Self {
            screenshot_dir,
            latest_dir,
        }
    }

    pub fn from_config(config: &E2eConfig) -> Self {
        Self::new(config.screenshot_dir.clone(), config.latest_dir.clone())
    }

    pub fn screenshot_dir(&self) -> &Path {
        &self.screenshot_dir
    }

    /// Store PNG bytes as `{timestamp}_{name}.png`
    pub async fn store_screenshot(&self, name: &str, png: &[u8]) -> Result<Artifact> {
        fs::create_dir_all(&self.screenshot_dir).await?;

        let created_at = Utc::now();
        let sanitized = sanitize_name(name);
        let file_name = format!(
            "{}_{}.png",
            created_at.format("%Y%m%d-%H%M%S%.3f"),
            sanitized
        );
        let path = self.screenshot_dir.join(file_name);
        fs::write(&path, png).await?;
        info!("Screenshot saved: {}", path.display());

        let latest_path = self.mirror_latest(&path, &sanitized, "png").await;
        Ok(Artifact {
            kind: ArtifactKind::Screenshot,
            path,
            latest_path,
            size_bytes: png.len() as u64,
            created_at,
        })
    }

    /// Record an encoded video, mirroring it to the latest directory
    pub async fn register_video(&self, name: &str, video_path: &Path) -> Result<Artifact> {
        let size_bytes = fs::metadata(video_path).await?.len();
        let extension = video_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4");
        let latest_path = self
            .mirror_latest(video_path, &sanitize_name(name), extension)
            .await;

        Ok(Artifact {
            kind: ArtifactKind::Video,
            path: video_path.to_path_buf(),
            latest_path,
            size_bytes,
            created_at: Utc::now(),
        })
    }

    /// Copy to `{latest}/{name}.{ext}`; failures only warn
    async fn mirror_latest(&self, source: &Path, name: &str, extension: &str) -> Option<PathBuf> {
        let latest_dir = self.latest_dir.as_ref()?;
        let target = latest_dir.join(format!("{}.{}", name, extension));

        let copied = async {
            fs::create_dir_all(latest_dir).await?;
            fs::copy(source, &target).await
        }
        .await;

        match copied {
            Ok(_) => {
                debug!("Mirrored {} to {}", source.display(), target.display());
                Some(target)
            }
            Err(e) => {
                warn!("Failed to mirror {} to latest: {}", source.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Login Flow"), "login-flow");
        assert_eq!(sanitize_name("  checkout/step #2 "), "checkout-step-2");
        assert_eq!(sanitize_name("already_safe-name"), "already_safe-name");
        assert_eq!(sanitize_name("!!!"), "artifact");
    }

    #[test]
    fn test_sanitize_name_collapses_unsafe_runs() {
        assert_eq!(sanitize_name("a  &&  b"), "a-b");
        assert_eq!(sanitize_name("Café: ünïcode"), "caf-n-code");
    }

    #[tokio::test]
    async fn test_store_screenshot_with_latest_mirror() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("shots"), Some(dir.path().join("latest")));

        let artifact = store.store_screenshot("Home Page", b"png").await.unwrap();

        assert_eq!(artifact.kind, ArtifactKind::Screenshot);
        assert_eq!(artifact.size_bytes, 3);
        let file_name = artifact.path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.ends_with("_home-page.png"), "{}", file_name);
        assert!(artifact.path.starts_with(dir.path().join("shots")));

        let latest = artifact.latest_path.unwrap();
        assert_eq!(latest, dir.path().join("latest/home-page.png"));
        assert_eq!(std::fs::read(latest).unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_store_screenshot_without_latest_dir() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf(), None);

        let artifact = store.store_screenshot("plain", b"x").await.unwrap();
        assert!(artifact.latest_path.is_none());
        assert!(artifact.path.exists());
    }

    #[tokio::test]
    async fn test_register_video_keeps_extension() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("demo-1234.webm");
        std::fs::write(&video, b"webm-bytes").unwrap();
        let store = ArtifactStore::new(dir.path().join("shots"), Some(dir.path().join("latest")));

        let artifact = store.register_video("Demo Run", &video).await.unwrap();

        assert_eq!(artifact.kind, ArtifactKind::Video);
        assert_eq!(artifact.size_bytes, 10);
        assert_eq!(artifact.latest_path, Some(dir.path().join("latest/demo-run.webm")));
    }
}
