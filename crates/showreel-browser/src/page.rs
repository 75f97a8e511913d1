//! The browser page seam
//!
//! Every component talks to the browser through [`PageDriver`]. The Chrome
//! backend lives in [`crate::chrome`]; unit tests use a scripted double.

use async_trait::async_trait;
use serde_json::Value;
use showreel_core::{Point, Result, ShowreelError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

/// Poll interval for the default wait implementations
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Events a page emits to the host
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// The main frame committed a new document
    FrameNavigated { url: String },
    /// A `console.*` call in the page
    Console { level: String, text: String },
}

/// Handle of a script registered to run on every new document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InitScriptId(pub String);

/// Screencast settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreencastParams {
    /// JPEG quality (0-100)
    pub quality: u8,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub every_nth_frame: u32,
}

impl Default for ScreencastParams {
    fn default() -> Self {
        Self {
            quality: 80,
            max_width: None,
            max_height: None,
            every_nth_frame: 1,
        }
    }
}

/// One captured screencast frame
#[derive(Debug, Clone)]
pub struct ScreencastFrame {
    /// Encoded JPEG bytes
    pub data: Vec<u8>,
    /// Capture time in seconds since the epoch, when the browser reports it
    pub timestamp: Option<f64>,
    /// Id the frame must be acknowledged with
    pub session_id: u64,
}

/// Browser automation primitives the harness is built on
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for the load to finish
    async fn goto(&self, url: &str) -> Result<()>;

    async fn url(&self) -> Result<String>;

    /// Evaluate a JavaScript expression; promises are awaited and the result
    /// comes back JSON-decoded (`undefined` becomes `null`)
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    /// Run `source` in every document created from now on
    async fn add_init_script(&self, source: &str) -> Result<InitScriptId>;

    async fn remove_init_script(&self, id: &InitScriptId) -> Result<()>;

    async fn mouse_move(&self, point: Point) -> Result<()>;

    /// Press and release the left button
    async fn mouse_click(&self, point: Point) -> Result<()>;

    async fn mouse_wheel(&self, point: Point, delta_x: f64, delta_y: f64) -> Result<()>;

    /// Type into the focused element
    async fn type_text(&self, text: &str) -> Result<()>;

    async fn press_key(&self, key: &str) -> Result<()>;

    /// Select everything in the focused field
    async fn select_all(&self) -> Result<()>;

    /// PNG bytes of the viewport or the full page
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let expression = format!(
            "document.querySelector({}) !== null",
            crate::bridge::js_arg(&selector)
        );
        self.wait_for_function(&expression, timeout)
            .await
            .map_err(|e| match e {
                ShowreelError::Timeout(_) => {
                    ShowreelError::Timeout(format!("waiting for selector {}", selector))
                }
                other => other,
            })
    }

    /// Poll until `expression` is truthy
    async fn wait_for_function(&self, expression: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let probe = format!("Boolean({})", expression);
        loop {
            if let Ok(Value::Bool(true)) = self.evaluate(&probe).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ShowreelError::Timeout(format!(
                    "waiting for function after {:?}",
                    timeout
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait until the document is loaded and no new resources started for `idle`
    async fn wait_for_network_idle(&self, idle: Duration, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let probe = "document.readyState === 'complete' ? performance.getEntriesByType('resource').length : -1";
        let mut last_count: Option<i64> = None;
        let mut quiet_since = Instant::now();

        loop {
            let count = self.evaluate(probe).await?.as_i64().unwrap_or(-1);
            if count < 0 || last_count != Some(count) {
                last_count = Some(count);
                quiet_since = Instant::now();
            } else if quiet_since.elapsed() >= idle {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(ShowreelError::Timeout(format!(
                    "waiting for network idle after {:?}",
                    timeout
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Start a screencast; frames arrive on the returned channel until stopped
    async fn start_screencast(
        &self,
        params: ScreencastParams,
    ) -> Result<mpsc::UnboundedReceiver<ScreencastFrame>>;

    async fn ack_screencast_frame(&self, session_id: u64) -> Result<()>;

    async fn stop_screencast(&self) -> Result<()>;

    /// Navigation and console events
    fn subscribe(&self) -> broadcast::Receiver<PageEvent>;

    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Shared page handle used by every component
pub type SharedPage = Arc<dyn PageDriver>;
