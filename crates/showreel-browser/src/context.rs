//! E2E Test Context
//!
//! The single entry point a test uses. It owns the page, forwards page
//! console output into the test log and exposes the interaction driver,
//! screenshots, recordings and a few backend helpers.

use serde::Serialize;
use serde_json::Value;
use showreel_core::fail_open::fail_open;
use showreel_core::{E2eConfig, Point, Result, ShowreelError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::annotations::Annotations;
use crate::artifacts::{Artifact, ArtifactStore};
use crate::bridge::js_arg;
use crate::chrome::ChromePage;
use crate::cursor::CursorOverlay;
use crate::interaction::{InteractionConfig, InteractionDriver, ScrollDirection, TypeOptions};
use crate::page::{PageEvent, SharedPage};
use crate::recording::{RecordingControls, RecordingManager, RecordingOptions};

/// Wait after closing the browser so the OS can release its resources
pub const TEARDOWN_GRACE: Duration = Duration::from_millis(500);

/// Quiet period for [`E2eContext::wait_for_network_idle`]
pub const NETWORK_IDLE: Duration = Duration::from_millis(500);

/// Backend endpoint that wipes the test database
pub const CLEAR_DB_PATH: &str = "/api/clear-test-db";

/// Log target for forwarded page console messages
pub const CONSOLE_TARGET: &str = "showreel::browser_console";

#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    /// Configuration to use instead of the environment
    pub config: Option<E2eConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenshotOptions {
    pub full_page: bool,
    /// Keep overlays and annotations in the image
    pub show_annotations: bool,
}

/// Login form selectors and credentials
#[derive(Debug, Clone, PartialEq)]
pub struct LoginOptions {
    pub email: String,
    pub password: Option<String>,
    pub login_path: String,
    pub email_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    /// Present once the user is logged in
    pub success_selector: String,
}

impl LoginOptions {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: None,
            login_path: "/login".to_string(),
            email_selector: "input[type=\"email\"]".to_string(),
            password_selector: "input[type=\"password\"]".to_string(),
            submit_selector: "button[type=\"submit\"]".to_string(),
            success_selector: "[data-testid=\"app-shell\"]".to_string(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearDatabaseRequest {
    confirm_clear: bool,
    test_mode: bool,
}

/// Launch a browser and build a context around its page
pub async fn setup_e2e_test(options: SetupOptions) -> Result<E2eContext> {
    let config = options.config.unwrap_or_else(E2eConfig::from_env);
    let page = ChromePage::launch(&config).await?;
    Ok(E2eContext::open(Arc::new(page), config).await)
}

fn spawn_console_forwarder(page: &SharedPage) -> JoinHandle<()> {
    let mut events = page.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PageEvent::Console { level, text }) => match level.as_str() {
                    "error" | "assert" => error!(target: CONSOLE_TARGET, "{}", text),
                    "warning" | "warn" => warn!(target: CONSOLE_TARGET, "{}", text),
                    "debug" | "trace" => debug!(target: CONSOLE_TARGET, "{}", text),
                    _ => info!(target: CONSOLE_TARGET, "{}", text),
                },
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: CONSOLE_TARGET, "{} console messages dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Everything a test needs for one browser page
pub struct E2eContext {
    config: E2eConfig,
    page: SharedPage,
    cursor: Arc<CursorOverlay>,
    driver: InteractionDriver,
    recordings: RecordingManager,
    artifacts: ArtifactStore,
    http: reqwest::Client,
    console: Mutex<Option<JoinHandle<()>>>,
    torn_down: AtomicBool,
}

impl E2eContext {
    /// Build a context around an already opened page
    pub fn new(page: SharedPage, config: E2eConfig) -> Self {
        let cursor = Arc::new(CursorOverlay::new(page.clone()));
        let driver = InteractionDriver::new(
            page.clone(),
            cursor.clone(),
            InteractionConfig::from_config(&config),
        );
        let recordings = RecordingManager::new(page.clone(), cursor.clone(), &config);
        let console = spawn_console_forwarder(&page);

        Self {
            artifacts: ArtifactStore::from_config(&config),
            config,
            page,
            cursor,
            driver,
            recordings,
            http: reqwest::Client::new(),
            console: Mutex::new(Some(console)),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Build a context and, in smooth mode, put the cursor overlay on the page
    ///
    /// The overlay's init script and navigation watcher keep it on every
    /// later document, so pointer moves are visible from the first click.
    pub async fn open(page: SharedPage, config: E2eConfig) -> Self {
        let context = Self::new(page, config);
        if context.driver.is_smooth() {
            let cursor = context.cursor.clone();
            fail_open("cursor_inject", || cursor.inject()).await;
        }
        context
    }

    /// Swap the recording manager, e.g. for a different encoder
    pub fn with_recordings(mut self, recordings: RecordingManager) -> Self {
        self.recordings = recordings;
        self
    }

    pub fn config(&self) -> &E2eConfig {
        &self.config
    }

    pub fn page(&self) -> &SharedPage {
        &self.page
    }

    pub fn driver(&self) -> &InteractionDriver {
        &self.driver
    }

    pub fn cursor(&self) -> &Arc<CursorOverlay> {
        &self.cursor
    }

    pub fn annotations(&self) -> Annotations<'_> {
        Annotations::new(self.page.as_ref())
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// Absolute URLs pass through; anything else is joined to the base URL
    pub fn resolve_url(&self, url: &str) -> String {
        if url.contains("://") || url.starts_with("about:") || url.starts_with("data:") {
            return url.to_string();
        }
        let base = self.config.base_url.trim_end_matches('/');
        if url.starts_with('/') {
            format!("{}{}", base, url)
        } else {
            format!("{}/{}", base, url)
        }
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        let url = self.resolve_url(url);
        info!("Navigating to {}", url);
        self.page.goto(&url).await
    }

    pub async fn click(&self, selector: &str) -> Result<()> {
        self.driver.click(selector).await
    }

    pub async fn type_text(&self, selector: &str, text: &str, options: TypeOptions) -> Result<()> {
        self.driver.type_text(selector, text, options).await
    }

    pub async fn hover(&self, selector: &str) -> Result<()> {
        self.driver.hover(selector).await
    }

    pub async fn focus(&self, selector: &str) -> Result<()> {
        self.driver.focus(selector).await
    }

    pub async fn scroll(&self, direction: ScrollDirection, amount: f64) -> Result<()> {
        self.driver.scroll(direction, amount).await
    }

    pub async fn move_to(&self, point: Point) -> Result<()> {
        self.driver.move_to(point).await
    }

    pub async fn press_key(&self, key: &str) -> Result<()> {
        self.page.press_key(key).await
    }

    /// Wait for `selector`; `None` uses the configured timeout
    pub async fn wait_for_selector(&self, selector: &str, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or_else(|| self.default_timeout());
        self.page.wait_for_selector(selector, timeout).await
    }

    pub async fn wait_for_network_idle(&self, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or_else(|| self.default_timeout());
        self.page.wait_for_network_idle(NETWORK_IDLE, timeout).await
    }

    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.page.evaluate(expression).await
    }

    pub async fn element_exists(&self, selector: &str) -> Result<bool> {
        let expression = format!("document.querySelector({}) !== null", js_arg(&selector));
        Ok(self.page.evaluate(&expression).await?.as_bool().unwrap_or(false))
    }

    /// Trimmed text content, `None` when nothing matches
    pub async fn get_element_text(&self, selector: &str) -> Result<Option<String>> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); return el ? (el.textContent || '').trim() : null; }})()",
            js_arg(&selector)
        );
        Ok(self
            .page
            .evaluate(&expression)
            .await?
            .as_str()
            .map(str::to_string))
    }

    pub async fn get_element_count(&self, selector: &str) -> Result<usize> {
        let expression = format!("document.querySelectorAll({}).length", js_arg(&selector));
        Ok(self.page.evaluate(&expression).await?.as_u64().unwrap_or(0) as usize)
    }

    /// Save a PNG under the screenshot directory
    ///
    /// Overlays and annotations are hidden for the capture unless
    /// `show_annotations` is set, and restored afterwards.
    pub async fn take_screenshot(&self, name: &str, options: ScreenshotOptions) -> Result<Artifact> {
        let annotations = self.annotations();
        let hidden = if options.show_annotations {
            false
        } else {
            fail_open("hide_overlays", || annotations.hide_all())
                .await
                .is_some()
        };

        let captured = self.page.screenshot(options.full_page).await;

        if hidden {
            fail_open("restore_overlays", || annotations.restore_all()).await;
        }

        let png = captured.map_err(|e| match e {
            ShowreelError::ScreenshotFailed(_) => e,
            other => ShowreelError::ScreenshotFailed(other.to_string()),
        })?;
        self.artifacts.store_screenshot(name, &png).await
    }

    pub async fn start_recording(
        &self,
        name: &str,
        options: RecordingOptions,
    ) -> Result<RecordingControls> {
        self.recordings.start_recording(name, options).await
    }

    pub fn is_recording(&self) -> bool {
        self.recordings.is_recording()
    }

    /// Log in through the UI and wait for the signed-in page
    pub async fn automated_login(&self, options: &LoginOptions) -> Result<()> {
        info!("Logging in as {}", options.email);
        self.navigate(&options.login_path).await?;
        self.wait_for_selector(&options.email_selector, None).await?;

        let typing = TypeOptions {
            clear_first: true,
            ..TypeOptions::default()
        };
        self.type_text(&options.email_selector, &options.email, typing.clone())
            .await?;
        if let Some(password) = &options.password {
            self.type_text(&options.password_selector, password, typing)
                .await?;
        }

        self.click(&options.submit_selector).await?;
        self.wait_for_selector(&options.success_selector, None).await
    }

    /// Ask the backend to wipe the test database
    pub async fn clear_database(&self) -> Result<()> {
        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            CLEAR_DB_PATH
        );
        let response = self
            .http
            .post(&url)
            .json(&ClearDatabaseRequest {
                confirm_clear: true,
                test_mode: true,
            })
            .send()
            .await
            .map_err(|e| ShowreelError::Http(format!("Failed to reach {}: {}", url, e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(ShowreelError::Http(format!(
                "Clearing the test database failed ({}): {}",
                status, body
            )));
        }
        info!("Test database cleared");
        Ok(())
    }

    /// Close the page and browser; safe to call more than once
    pub async fn teardown(&self) -> Result<()> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            debug!("Teardown already done");
            return Ok(());
        }

        if let Some(handle) = self.console.lock().ok().and_then(|mut c| c.take()) {
            handle.abort();
        }

        if !self.page.is_closed() {
            if let Err(e) = self.page.close().await {
                warn!("Closing the browser failed: {}", e);
            }
        }
        tokio::time::sleep(TEARDOWN_GRACE).await;
        info!("E2E context torn down");
        Ok(())
    }
}

impl Drop for E2eContext {
    fn drop(&mut self) {
        if let Some(handle) = self.console.get_mut().ok().and_then(|c| c.take()) {
            handle.abort();
        }
    }
}
