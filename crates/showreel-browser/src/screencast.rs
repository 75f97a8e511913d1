//! Screencast capture into numbered JPEG frames

use chrono::{DateTime, Utc};
use serde::Serialize;
use showreel_core::{Result, ShowreelError};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::page::{ScreencastParams, SharedPage};

/// Identity and location of one recording
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingSession {
    pub id: Uuid,
    pub name: String,
    /// Directory the encoded video is written to
    pub output_dir: PathBuf,
    /// Directory holding the captured frames
    pub frames_dir: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl RecordingSession {
    /// New session whose frames live in `{output_dir}/{id}-frames`
    pub fn new(name: &str, output_dir: &Path) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            name: name.to_string(),
            output_dir: output_dir.to_path_buf(),
            frames_dir: output_dir.join(format!("{}-frames", id)),
            started_at: Utc::now(),
        }
    }
}

/// One frame written to disk
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub path: PathBuf,
    /// Capture time in seconds, when the browser reported one
    pub timestamp: Option<f64>,
}

/// Frames of a finished capture, handed to the encoder
#[derive(Debug, Clone)]
pub struct CapturedFrames {
    pub session: RecordingSession,
    pub frames: Vec<FrameRecord>,
}

impl CapturedFrames {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

pub fn frame_file_name(index: usize) -> String {
    format!("frame_{:06}.jpg", index)
}

/// A running screencast and the task writing its frames
pub struct Screencast {
    page: SharedPage,
    session: RecordingSession,
    writer: JoinHandle<Vec<FrameRecord>>,
}

impl Screencast {
    /// Start capturing; each frame is acknowledged, then written
    pub async fn start(
        page: SharedPage,
        session: RecordingSession,
        params: ScreencastParams,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&session.frames_dir).await?;
        let mut frames = page.start_screencast(params).await?;

        let ack_page = page.clone();
        let frames_dir = session.frames_dir.clone();
        let writer = tokio::spawn(async move {
            let mut records = Vec::new();
            while let Some(frame) = frames.recv().await {
                // The browser holds further frames until this one is acknowledged
                if let Err(e) = ack_page.ack_screencast_frame(frame.session_id).await {
                    debug!("Frame ack failed: {}", e);
                }

                let path = frames_dir.join(frame_file_name(records.len()));
                match tokio::fs::write(&path, &frame.data).await {
                    Ok(()) => records.push(FrameRecord {
                        path,
                        timestamp: frame.timestamp,
                    }),
                    Err(e) => warn!("Failed to write frame {}: {}", path.display(), e),
                }
            }
            records
        });

        info!("Screencast started for '{}' ({})", session.name, session.id);
        Ok(Self {
            page,
            session,
            writer,
        })
    }

    /// Give up on the capture without waiting for its frames
    ///
    /// Usable from `Drop`: the browser is told to stop from a spawned task
    /// when a runtime is available.
    pub fn abort(self) {
        self.writer.abort();
        info!("Screencast '{}' aborted", self.session.name);

        let page = self.page;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = page.stop_screencast().await {
                    debug!("Stopping aborted screencast failed: {}", e);
                }
            });
        }
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    /// Stop capturing and wait for every received frame to be on disk
    pub async fn stop(self) -> Result<CapturedFrames> {
        if let Err(e) = self.page.stop_screencast().await {
            warn!("Stopping screencast failed: {}", e);
        }

        let frames = self
            .writer
            .await
            .map_err(|e| ShowreelError::Recording(format!("frame writer failed: {}", e)))?;

        info!(
            "Screencast '{}' stopped with {} frames",
            self.session.name,
            frames.len()
        );
        Ok(CapturedFrames {
            session: self.session,
            frames,
        })
    }
}
