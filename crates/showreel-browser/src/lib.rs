//! Human-like browser driving and video recording for E2E tests
//!
//! This crate drives a Chromium page over the Chrome DevTools Protocol and
//! makes every action presentable on video: a synthetic cursor that follows
//! natural pointer paths, a URL bar mock with a status badge, subtitles and
//! title cards, and screencast capture encoded with ffmpeg.
//!
//! # Example
//!
//! ```no_run
//! use showreel_browser::{setup_e2e_test, RecordingOptions, SetupOptions, SubtitleOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = setup_e2e_test(SetupOptions::default()).await?;
//!     ctx.navigate("/").await?;
//!
//!     let recording = ctx.start_recording("checkout", RecordingOptions::default()).await?;
//!     recording.show_subtitle("Adding an item to the cart", SubtitleOptions::default()).await?;
//!     ctx.click("[data-testid=\"add-to-cart\"]").await?;
//!     let video = recording.stop().await?;
//!     println!("Video: {:?}", video.map(|v| v.video_path));
//!
//!     ctx.teardown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`page`]: the [`PageDriver`] seam every component talks through
//! - [`chrome`]: the `headless_chrome` implementation of it
//! - [`bridge`]: the versioned `window.__e2eBridge` contract with page scripts
//! - [`cursor`], [`url_chrome`], [`annotations`], [`throbber`]: page overlays
//! - [`interaction`]: click, type, hover, focus and scroll
//! - [`screencast`], [`encoder`], [`recording`]: video capture
//! - [`artifacts`]: screenshot and video files on disk
//! - [`context`]: the façade tests use

pub mod annotations;
pub mod artifacts;
pub mod bridge;
pub mod chrome;
pub mod context;
pub mod cursor;
pub mod encoder;
pub mod interaction;
pub mod launcher;
pub mod page;
pub mod recording;
pub mod screencast;
pub mod throbber;
pub mod url_chrome;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use artifacts::{sanitize_name, Artifact, ArtifactKind, ArtifactStore};
pub use chrome::ChromePage;
pub use context::{setup_e2e_test, E2eContext, LoginOptions, ScreenshotOptions, SetupOptions};
pub use cursor::CursorOverlay;
pub use encoder::{FfmpegEncoder, VideoEncoder, VideoFile};
pub use interaction::{
    InteractionConfig, InteractionDriver, InteractionMode, ScrollDirection, TypeOptions,
};
pub use launcher::{locate_browser, resolve_browser};
pub use page::{PageDriver, PageEvent, SharedPage};
pub use recording::{
    RecordingControls, RecordingManager, RecordingOptions, SubtitleOptions, TitleCardOptions,
};
pub use url_chrome::UrlChromeOverlay;
