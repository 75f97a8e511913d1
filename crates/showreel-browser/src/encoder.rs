//! Encoding captured frames into a video file
//!
//! The provided encoder shells out to `ffmpeg`. Frames arrive at irregular
//! intervals (the browser only emits on repaint), so they are fed through a
//! concat list whose per-frame durations come from the capture timestamps.

use async_trait::async_trait;
use serde::Serialize;
use showreel_core::{Result, ShowreelError, VideoFormat, VideoQuality, VideoSettings};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::artifacts::sanitize_name;
use crate::screencast::{CapturedFrames, FrameRecord};

/// Name of the concat list written next to the frames
pub const CONCAT_LIST_NAME: &str = "frames.ffconcat";

/// Result of a finished encode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoFile {
    pub video_path: PathBuf,
    pub file_size: u64,
}

/// Sink turning captured frames into a video file
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    async fn encode(&self, captured: &CapturedFrames, settings: &VideoSettings) -> Result<VideoFile>;
}

/// `{output_dir}/{name}-{session id}.{ext}`
pub fn video_path(captured: &CapturedFrames, format: VideoFormat) -> PathBuf {
    let session = &captured.session;
    session.output_dir.join(format!(
        "{}-{}.{}",
        sanitize_name(&session.name),
        session.id.simple(),
        format.extension()
    ))
}

fn quote_path(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// Build an `ffconcat` list; each frame lasts until the next one was captured
pub fn concat_list(frames: &[FrameRecord], framerate: u32) -> String {
    let fallback = 1.0 / f64::from(framerate.max(1));
    let mut list = String::from("ffconcat version 1.0\n");

    for (index, frame) in frames.iter().enumerate() {
        let duration = match (frame.timestamp, frames.get(index + 1).and_then(|f| f.timestamp)) {
            (Some(current), Some(next)) if next > current => next - current,
            _ => fallback,
        };
        let _ = writeln!(list, "file {}", quote_path(&frame.path));
        let _ = writeln!(list, "duration {:.6}", duration);
    }

    // The demuxer ignores the duration of the final entry
    if let Some(last) = frames.last() {
        let _ = writeln!(list, "file {}", quote_path(&last.path));
    }
    list
}

/// Codec arguments for the output container
pub fn output_args(format: VideoFormat, quality: VideoQuality, framerate: u32) -> Vec<String> {
    match format {
        VideoFormat::Mp4 => {
            let (crf, preset) = match quality {
                VideoQuality::Low => ("28", "veryfast"),
                VideoQuality::Medium => ("23", "medium"),
                VideoQuality::High => ("18", "slow"),
            };
            vec![
                "-vf".into(),
                "scale=trunc(iw/2)*2:trunc(ih/2)*2".into(),
                "-c:v".into(),
                "libx264".into(),
                "-preset".into(),
                preset.into(),
                "-crf".into(),
                crf.into(),
                "-pix_fmt".into(),
                "yuv420p".into(),
                "-movflags".into(),
                "+faststart".into(),
                "-r".into(),
                framerate.to_string(),
            ]
        }
        VideoFormat::Webm => {
            let crf = match quality {
                VideoQuality::Low => "40",
                VideoQuality::Medium => "32",
                VideoQuality::High => "24",
            };
            vec![
                "-c:v".into(),
                "libvpx-vp9".into(),
                "-crf".into(),
                crf.into(),
                "-b:v".into(),
                "0".into(),
                "-pix_fmt".into(),
                "yuv420p".into(),
                "-r".into(),
                framerate.to_string(),
            ]
        }
        VideoFormat::Gif => {
            let fps = match quality {
                VideoQuality::Low => framerate.min(10),
                VideoQuality::Medium => framerate.min(15),
                VideoQuality::High => framerate,
            };
            vec![
                "-vf".into(),
                format!(
                    "fps={},split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse",
                    fps.max(1)
                ),
                "-loop".into(),
                "0".into(),
            ]
        }
    }
}

/// Encoder backed by the `ffmpeg` binary
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Whether `ffmpeg -version` runs
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    async fn run(&self, list: &Path, output: &Path, settings: &VideoSettings) -> Result<()> {
        let mut command = Command::new(&self.program);
        command
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(list)
            .args(output_args(settings.format, settings.quality, settings.framerate))
            .arg(output);
        debug!("Running {:?}", command);

        let result = command.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ShowreelError::Encoder(
                    "ffmpeg was not found on PATH. Install ffmpeg and verify `ffmpeg -version` works"
                        .to_string(),
                )
            } else {
                ShowreelError::Encoder(format!("failed to spawn ffmpeg: {}", e))
            }
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ShowreelError::Encoder(format!(
                "ffmpeg failed with status {}: {}",
                result.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, captured: &CapturedFrames, settings: &VideoSettings) -> Result<VideoFile> {
        if captured.is_empty() {
            return Err(ShowreelError::Encoder(format!(
                "no frames captured for '{}'",
                captured.session.name
            )));
        }

        let frames_dir = &captured.session.frames_dir;
        let list_path = frames_dir.join(CONCAT_LIST_NAME);
        tokio::fs::write(&list_path, concat_list(&captured.frames, settings.framerate)).await?;

        let output = video_path(captured, settings.format);
        tokio::fs::create_dir_all(&captured.session.output_dir).await?;
        self.run(&list_path, &output, settings).await?;

        let file_size = tokio::fs::metadata(&output).await?.len();
        info!(
            "Encoded {} frames into {} ({} bytes)",
            captured.frames.len(),
            output.display(),
            file_size
        );

        if settings.delete_frames {
            if let Err(e) = tokio::fs::remove_dir_all(frames_dir).await {
                warn!("Failed to delete frames in {}: {}", frames_dir.display(), e);
            }
        }

        Ok(VideoFile {
            video_path: output,
            file_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screencast::RecordingSession;
    use tempfile::TempDir;

    fn frame(path: &str, timestamp: Option<f64>) -> FrameRecord {
        FrameRecord {
            path: PathBuf::from(path),
            timestamp,
        }
    }

    #[test]
    fn test_concat_list_uses_capture_gaps() {
        let frames = vec![
            frame("/f/frame_000000.jpg", Some(10.0)),
            frame("/f/frame_000001.jpg", Some(12.5)),
            frame("/f/frame_000002.jpg", Some(12.6)),
        ];

        let list = concat_list(&frames, 25);
        let lines: Vec<&str> = list.lines().collect();

        assert_eq!(lines[0], "ffconcat version 1.0");
        assert_eq!(lines[1], "file '/f/frame_000000.jpg'");
        assert_eq!(lines[2], "duration 2.500000");
        assert_eq!(lines[6], "duration 0.040000");
        assert_eq!(lines[7], "file '/f/frame_000002.jpg'");
        assert_eq!(lines.len(), 8);
    }

    #[test]
    fn test_concat_list_falls_back_to_framerate() {
        let frames = vec![frame("/f/a.jpg", None), frame("/f/b.jpg", Some(1.0))];
        let list = concat_list(&frames, 10);
        assert!(list.contains("duration 0.100000"));
        assert!(!list.contains("duration 1.0"));
    }

    #[test]
    fn test_quote_path_escapes_single_quotes() {
        assert_eq!(quote_path(Path::new("/tmp/it's.jpg")), r"'/tmp/it'\''s.jpg'");
    }

    #[test]
    fn test_output_args_per_format() {
        let mp4 = output_args(VideoFormat::Mp4, VideoQuality::High, 30);
        assert!(mp4.windows(2).any(|w| w == ["-crf", "18"]));
        assert!(mp4.windows(2).any(|w| w == ["-preset", "slow"]));
        assert!(mp4.contains(&"+faststart".to_string()));

        let webm = output_args(VideoFormat::Webm, VideoQuality::Low, 30);
        assert!(webm.windows(2).any(|w| w == ["-c:v", "libvpx-vp9"]));
        assert!(webm.windows(2).any(|w| w == ["-b:v", "0"]));

        let gif = output_args(VideoFormat::Gif, VideoQuality::Medium, 30);
        assert!(gif[1].starts_with("fps=15,"));
        assert!(gif[1].contains("palettegen"));
    }

    #[tokio::test]
    async fn test_empty_capture_is_an_encoder_error() {
        let dir = TempDir::new().unwrap();
        let captured = CapturedFrames {
            session: RecordingSession::new("empty", dir.path()),
            frames: Vec::new(),
        };

        let err = FfmpegEncoder::default()
            .encode(&captured, &VideoSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ShowreelError::Encoder(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_keeps_frames() {
        let dir = TempDir::new().unwrap();
        let session = RecordingSession::new("Demo", dir.path());
        std::fs::create_dir_all(&session.frames_dir).unwrap();
        let path = session.frames_dir.join("frame_000000.jpg");
        std::fs::write(&path, b"jpg").unwrap();
        let captured = CapturedFrames {
            session,
            frames: vec![FrameRecord {
                path: path.clone(),
                timestamp: Some(1.0),
            }],
        };

        let encoder = FfmpegEncoder::new("showreel-test-no-such-ffmpeg");
        assert!(!encoder.is_available().await);
        let err = encoder
            .encode(&captured, &VideoSettings::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("not found on PATH"));
        assert!(path.exists());
        assert!(captured.session.frames_dir.join(CONCAT_LIST_NAME).exists());
    }

    #[test]
    fn test_video_path_uses_sanitized_name() {
        let session = RecordingSession::new("My Demo", Path::new("/videos"));
        let id = session.id.simple().to_string();
        let captured = CapturedFrames {
            session,
            frames: Vec::new(),
        };
        assert_eq!(
            video_path(&captured, VideoFormat::Webm),
            PathBuf::from(format!("/videos/my-demo-{}.webm", id))
        );
    }
}
