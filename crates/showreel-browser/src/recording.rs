//! Recording Session Manager
//!
//! `Idle -> Recording -> Idle`. Starting a recording injects the cursor and
//! URL chrome overlays (each fail-open), starts the screencast and keeps the
//! throbber running so static stretches still produce frames. The returned
//! [`RecordingControls`] narrate the video and finally stop it.
//!
//! A failed encode never fails the test: `stop` logs it and returns `None`.

use showreel_core::fail_open::fail_open;
use showreel_core::{E2eConfig, Result, ShowreelError, StatusKind, VideoSettings};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::annotations::Annotations;
use crate::artifacts::ArtifactStore;
use crate::cursor::CursorOverlay;
use crate::encoder::{FfmpegEncoder, VideoEncoder, VideoFile};
use crate::page::{ScreencastParams, SharedPage};
use crate::screencast::{RecordingSession, Screencast};
use crate::throbber::RecordingThrobber;
use crate::url_chrome::UrlChromeOverlay;

/// What a recording shows besides the page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingOptions {
    pub url_chrome: bool,
    pub cursor: bool,
    pub screencast: ScreencastParams,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            url_chrome: true,
            cursor: true,
            screencast: ScreencastParams::default(),
        }
    }
}

/// Display and hold times of a subtitle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtitleOptions {
    /// Auto-hide after this long; `None` keeps it until cleared
    pub show_for: Option<Duration>,
    /// How long the call blocks so the subtitle is on screen
    pub pause: Duration,
}

impl Default for SubtitleOptions {
    fn default() -> Self {
        Self {
            show_for: Some(Duration::from_millis(3000)),
            pause: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleCardOptions {
    pub show_for: Option<Duration>,
    pub pause: Duration,
    /// Fade in; turn off when chaining cards back to back
    pub animate: bool,
}

impl Default for TitleCardOptions {
    fn default() -> Self {
        Self {
            show_for: Some(Duration::from_millis(3000)),
            pause: Duration::from_millis(3000),
            animate: true,
        }
    }
}

/// Starts recordings on one page, one at a time
pub struct RecordingManager {
    page: SharedPage,
    cursor: Arc<CursorOverlay>,
    encoder: Arc<dyn VideoEncoder>,
    video_dir: PathBuf,
    settings: VideoSettings,
    artifacts: ArtifactStore,
    recording: Arc<AtomicBool>,
}

impl RecordingManager {
    pub fn new(page: SharedPage, cursor: Arc<CursorOverlay>, config: &E2eConfig) -> Self {
        Self {
            page,
            cursor,
            encoder: Arc::new(FfmpegEncoder::default()),
            video_dir: config.video_dir.clone(),
            settings: config.video.clone(),
            artifacts: ArtifactStore::from_config(config),
            recording: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn VideoEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Move to Recording; fails with `InvalidState` if already there
    pub async fn start_recording(
        &self,
        name: &str,
        options: RecordingOptions,
    ) -> Result<RecordingControls> {
        if self.recording.swap(true, Ordering::SeqCst) {
            return Err(ShowreelError::InvalidState(format!(
                "cannot start '{}': a recording is already running",
                name
            )));
        }

        match self.begin(name, options).await {
            Ok(controls) => Ok(controls),
            Err(e) => {
                self.recording.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn begin(&self, name: &str, options: RecordingOptions) -> Result<RecordingControls> {
        let chrome = if options.url_chrome {
            let overlay = UrlChromeOverlay::new(self.page.clone());
            fail_open("url_chrome_inject", || overlay.inject()).await;
            Some(overlay)
        } else {
            None
        };

        let cursor_preinstalled = self.cursor.is_injected();
        let cursor_injected = options.cursor
            && fail_open("cursor_inject", || self.cursor.inject())
                .await
                .is_some();

        let session = RecordingSession::new(name, &self.video_dir);
        let screencast =
            match Screencast::start(self.page.clone(), session, options.screencast).await {
                Ok(screencast) => screencast,
                Err(e) => {
                    warn!("Recording '{}' could not start capturing: {}", name, e);
                    if let Some(chrome) = &chrome {
                        fail_open("url_chrome_remove", || chrome.remove()).await;
                    }
                    if cursor_injected && !cursor_preinstalled {
                        fail_open("cursor_remove", || self.cursor.remove()).await;
                    }
                    return Err(e);
                }
            };

        let throbber = RecordingThrobber::new(self.page.clone());
        fail_open("throbber_inject", || throbber.inject()).await;

        info!("Recording '{}' started", name);
        Ok(RecordingControls {
            name: name.to_string(),
            page: self.page.clone(),
            cursor: cursor_injected.then(|| self.cursor.clone()),
            chrome,
            throbber,
            screencast: Mutex::new(Some(screencast)),
            encoder: self.encoder.clone(),
            settings: self.settings.clone(),
            artifacts: self.artifacts.clone(),
            recording: self.recording.clone(),
            stopped: AtomicBool::new(false),
            released: AtomicBool::new(false),
        })
    }
}

/// Controls of one running recording; all fail with `InvalidState` after `stop`
pub struct RecordingControls {
    name: String,
    page: SharedPage,
    cursor: Option<Arc<CursorOverlay>>,
    chrome: Option<UrlChromeOverlay>,
    throbber: RecordingThrobber,
    screencast: Mutex<Option<Screencast>>,
    encoder: Arc<dyn VideoEncoder>,
    settings: VideoSettings,
    artifacts: ArtifactStore,
    recording: Arc<AtomicBool>,
    stopped: AtomicBool,
    /// Set once the manager's recording flag was handed back
    released: AtomicBool,
}

impl RecordingControls {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> Option<RecordingSession> {
        self.screencast
            .lock()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.session().clone()))
    }

    fn ensure_recording(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ShowreelError::InvalidState(format!(
                "recording '{}' is already stopped",
                self.name
            )));
        }
        Ok(())
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.recording.store(false, Ordering::SeqCst);
        }
    }

    fn annotations(&self) -> Annotations<'_> {
        Annotations::new(self.page.as_ref())
    }

    /// Finish the capture and encode it
    ///
    /// Returns `Ok(None)` when capture or encoding failed; those are logged.
    pub async fn stop(&self) -> Result<Option<VideoFile>> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(ShowreelError::InvalidState(format!(
                "recording '{}' is already stopped",
                self.name
            )));
        }

        fail_open("throbber_remove", || self.throbber.remove()).await;

        let screencast = self.screencast.lock().ok().and_then(|mut s| s.take());
        let captured = match screencast {
            Some(screencast) => fail_open("screencast_stop", || screencast.stop()).await,
            None => None,
        };

        let video = match captured {
            Some(captured) => {
                fail_open("video_encode", || self.encoder.encode(&captured, &self.settings)).await
            }
            None => None,
        };

        if let Some(cursor) = &self.cursor {
            fail_open("cursor_remove", || cursor.remove()).await;
        }
        if let Some(chrome) = &self.chrome {
            fail_open("url_chrome_remove", || chrome.remove()).await;
        }
        if !self.page.is_closed() {
            let annotations = self.annotations();
            fail_open("annotations_remove", || annotations.remove()).await;
        }

        if let Some(video) = &video {
            fail_open("video_mirror", || {
                self.artifacts.register_video(&self.name, &video.video_path)
            })
            .await;
            info!(
                "Recording '{}' saved to {}",
                self.name,
                video.video_path.display()
            );
        } else {
            warn!("Recording '{}' produced no video", self.name);
        }

        self.release();
        Ok(video)
    }

    /// Block so whatever is on screen lands in the video
    pub async fn pause(&self, duration: Duration) -> Result<()> {
        self.ensure_recording()?;
        tokio::time::sleep(duration).await;
        Ok(())
    }

    /// Show a subtitle without waiting
    pub async fn display_subtitle(&self, text: &str, show_for: Option<Duration>) -> Result<()> {
        self.ensure_recording()?;
        let annotations = self.annotations();
        fail_open("show_subtitle", || annotations.show_subtitle(text, show_for)).await;
        Ok(())
    }

    /// Show a subtitle, then hold for `options.pause`
    pub async fn show_subtitle(&self, text: &str, options: SubtitleOptions) -> Result<()> {
        self.display_subtitle(text, options.show_for).await?;
        self.pause(options.pause).await
    }

    pub async fn display_title_card(
        &self,
        title: &str,
        subtitle: Option<&str>,
        show_for: Option<Duration>,
        animate: bool,
    ) -> Result<()> {
        self.ensure_recording()?;
        let annotations = self.annotations();
        fail_open("show_title_card", || {
            annotations.show_title_card(title, subtitle, show_for, animate)
        })
        .await;
        Ok(())
    }

    pub async fn show_title_card(
        &self,
        title: &str,
        subtitle: Option<&str>,
        options: TitleCardOptions,
    ) -> Result<()> {
        self.display_title_card(title, subtitle, options.show_for, options.animate)
            .await?;
        self.pause(options.pause).await
    }

    /// Remove the subtitle and any title card
    pub async fn clear_subtitle(&self) -> Result<()> {
        self.ensure_recording()?;
        let annotations = self.annotations();
        fail_open("clear_subtitle", || annotations.clear_subtitle()).await;
        Ok(())
    }

    /// Highlight an element; returns whether it was found
    pub async fn highlight_element(&self, selector: &str, text: Option<&str>) -> Result<bool> {
        self.ensure_recording()?;
        let annotations = self.annotations();
        let found = fail_open("highlight_element", || {
            annotations.highlight(selector, text, None)
        })
        .await;
        Ok(found.unwrap_or(false))
    }

    /// Status badge in the URL chrome; a no-op with a warning when it is disabled
    pub async fn show_status(
        &self,
        text: &str,
        kind: StatusKind,
        duration: Option<Duration>,
    ) -> Result<()> {
        self.ensure_recording()?;
        match &self.chrome {
            Some(chrome) => {
                fail_open("show_status", || chrome.update_status(text, kind, duration)).await;
            }
            None => warn!("show_status ignored: URL chrome is disabled for '{}'", self.name),
        }
        Ok(())
    }

    pub async fn clear_status(&self) -> Result<()> {
        self.ensure_recording()?;
        match &self.chrome {
            Some(chrome) => {
                fail_open("clear_status", || chrome.clear_status()).await;
            }
            None => warn!("clear_status ignored: URL chrome is disabled for '{}'", self.name),
        }
        Ok(())
    }
}

impl Drop for RecordingControls {
    fn drop(&mut self) {
        let abandoned = self.screencast.get_mut().ok().and_then(|s| s.take());
        if let Some(screencast) = abandoned {
            warn!("Recording '{}' dropped without stop", self.name);
            screencast.abort();
        }
        self.release();
    }
}
