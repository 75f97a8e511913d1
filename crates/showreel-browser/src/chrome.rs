//! Chrome backend for [`PageDriver`] using the Chrome DevTools Protocol

use async_trait::async_trait;
use base64::Engine;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::{Emulation, Input, Page, Runtime};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use showreel_core::{E2eConfig, Point, Result, ShowreelError};
use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::launcher::resolve_browser;
use crate::page::{InitScriptId, PageDriver, PageEvent, ScreencastFrame, ScreencastParams};

/// Chrome exits after this long without CDP traffic; long narration pauses must fit
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

const EVENT_CAPACITY: usize = 256;

type FrameSlot = Arc<Mutex<Option<mpsc::UnboundedSender<ScreencastFrame>>>>;

/// A single Chrome tab driven over CDP
pub struct ChromePage {
    /// Dropping the browser kills the process
    browser: Mutex<Option<Browser>>,
    tab: Arc<Tab>,
    events: broadcast::Sender<PageEvent>,
    frames: FrameSlot,
    closed: AtomicBool,
}

/// Build a CDP method from its JSON parameters
fn cdp<M: DeserializeOwned>(params: Value) -> anyhow::Result<M> {
    Ok(serde_json::from_value(params)?)
}

/// Wrap an expression so promises are awaited and the result crosses as JSON text
fn wrap_expression(expression: &str) -> String {
    format!(
        "(async () => {{ const __v = await ({}); return __v === undefined ? null : JSON.stringify(__v); }})()",
        expression
    )
}

fn decode_result(raw: Option<Value>) -> Result<Value> {
    match raw {
        Some(Value::String(encoded)) => Ok(serde_json::from_str(&encoded)?),
        Some(other) => Ok(other),
        None => Ok(Value::Null),
    }
}

fn mouse_event(kind: &str, point: Point, extra: Value) -> anyhow::Result<Input::DispatchMouseEvent> {
    let mut params = json!({ "type": kind, "x": point.x, "y": point.y });
    if let (Value::Object(params), Value::Object(extra)) = (&mut params, extra) {
        params.extend(extra);
    }
    cdp(params)
}

fn console_text(args: &[Runtime::RemoteObject]) -> String {
    args.iter()
        .map(|arg| match &arg.value {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => arg.description.clone().unwrap_or_default(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn handle_event(event: &Event, events: &broadcast::Sender<PageEvent>, frames: &FrameSlot) {
    match event {
        Event::PageFrameNavigated(navigated) => {
            let frame = &navigated.params.frame;
            if frame.parent_id.is_none() {
                let _ = events.send(PageEvent::FrameNavigated {
                    url: frame.url.clone(),
                });
            }
        }
        Event::RuntimeConsoleAPICalled(called) => {
            let level = serde_json::to_value(&called.params)
                .ok()
                .and_then(|params| params.get("type").and_then(Value::as_str).map(String::from))
                .unwrap_or_else(|| "log".to_string());
            let _ = events.send(PageEvent::Console {
                level,
                text: console_text(&called.params.args),
            });
        }
        Event::PageScreencastFrame(frame) => {
            let data = match base64::engine::general_purpose::STANDARD.decode(&frame.params.data) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Dropping undecodable screencast frame: {}", e);
                    return;
                }
            };
            let frame = ScreencastFrame {
                data,
                timestamp: frame.params.metadata.timestamp,
                session_id: u64::from(frame.params.session_id),
            };
            if let Ok(slot) = frames.lock() {
                if let Some(sender) = slot.as_ref() {
                    let _ = sender.send(frame);
                }
            }
        }
        _ => {}
    }
}

impl ChromePage {
    /// Launch a browser for `config` and open one tab
    pub async fn launch(config: &E2eConfig) -> Result<Self> {
        let executable = resolve_browser(config.executable_path.as_deref());
        let headless = !config.show_browser;
        let viewport = config.viewport;
        let timeout = Duration::from_millis(config.timeout_ms);

        info!(
            "Launching {} (headless: {}, viewport: {}x{})",
            executable.display(),
            headless,
            viewport.width,
            viewport.height
        );

        let (browser, tab) = tokio::task::spawn_blocking(move || -> anyhow::Result<(Browser, Arc<Tab>)> {
            let options = LaunchOptions::default_builder()
                .path(Some(executable))
                .headless(headless)
                .window_size(Some((viewport.width, viewport.height)))
                .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
                .args(vec![OsStr::new("--hide-scrollbars"), OsStr::new("--mute-audio")])
                .build()
                .map_err(|e| anyhow::anyhow!("invalid launch options: {}", e))?;

            let browser = Browser::new(options)?;
            let tab = browser.new_tab()?;
            tab.set_default_timeout(timeout);
            tab.call_method(cdp::<Emulation::SetDeviceMetricsOverride>(json!({
                "width": viewport.width,
                "height": viewport.height,
                "deviceScaleFactor": 1,
                "mobile": false,
            }))?)?;
            tab.call_method(cdp::<Runtime::Enable>(json!({}))?)?;
            Ok((browser, tab))
        })
        .await
        .map_err(|e| ShowreelError::Browser(format!("Browser launch task failed: {}", e)))?
        .map_err(|e| ShowreelError::Browser(format!("Failed to launch browser: {}", e)))?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let frames: FrameSlot = Arc::new(Mutex::new(None));

        let listener_events = events.clone();
        let listener_frames = Arc::clone(&frames);
        tab.add_event_listener(Arc::new(move |event: &Event| {
            handle_event(event, &listener_events, &listener_frames)
        }))
        .map_err(|e| ShowreelError::Browser(format!("Failed to subscribe to page events: {}", e)))?;

        info!("Browser launched");

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            tab,
            events,
            frames,
            closed: AtomicBool::new(false),
        })
    }

    /// Run a blocking CDP call off the async runtime
    async fn run<T, F>(&self, kind: fn(String) -> ShowreelError, what: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(ShowreelError::Browser(format!("{}: page is closed", what)));
        }
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| ShowreelError::Browser(format!("{} task failed: {}", what, e)))?
            .map_err(|e| kind(format!("{}: {}", what, e)))
    }

    fn set_frame_sender(&self, sender: Option<mpsc::UnboundedSender<ScreencastFrame>>) {
        if let Ok(mut slot) = self.frames.lock() {
            *slot = sender;
        }
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn goto(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        let target = url.to_string();
        self.run(ShowreelError::Navigation, url, move |tab| {
            tab.navigate_to(&target)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn url(&self) -> Result<String> {
        self.run(ShowreelError::Browser, "url", |tab| Ok(tab.get_url()))
            .await
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let wrapped = wrap_expression(expression);
        let raw = self
            .run(ShowreelError::Script, "evaluate", move |tab| {
                Ok(tab.evaluate(&wrapped, true)?.value)
            })
            .await?;
        decode_result(raw)
    }

    async fn add_init_script(&self, source: &str) -> Result<InitScriptId> {
        let params = json!({ "source": source });
        let identifier = self
            .run(ShowreelError::Script, "addScriptToEvaluateOnNewDocument", move |tab| {
                let method = cdp::<Page::AddScriptToEvaluateOnNewDocument>(params)?;
                Ok(tab.call_method(method)?.identifier)
            })
            .await?;
        Ok(InitScriptId(identifier))
    }

    async fn remove_init_script(&self, id: &InitScriptId) -> Result<()> {
        let params = json!({ "identifier": id.0 });
        self.run(ShowreelError::Script, "removeScriptToEvaluateOnNewDocument", move |tab| {
            tab.call_method(cdp::<Page::RemoveScriptToEvaluateOnNewDocument>(params)?)?;
            Ok(())
        })
        .await
    }

    async fn mouse_move(&self, point: Point) -> Result<()> {
        self.run(ShowreelError::Browser, "mouseMoved", move |tab| {
            tab.call_method(mouse_event("mouseMoved", point, json!({}))?)?;
            Ok(())
        })
        .await
    }

    async fn mouse_click(&self, point: Point) -> Result<()> {
        self.run(ShowreelError::Browser, "click", move |tab| {
            let button = json!({ "button": "left", "buttons": 1, "clickCount": 1 });
            tab.call_method(mouse_event("mouseMoved", point, json!({}))?)?;
            tab.call_method(mouse_event("mousePressed", point, button.clone())?)?;
            tab.call_method(mouse_event("mouseReleased", point, button)?)?;
            Ok(())
        })
        .await
    }

    async fn mouse_wheel(&self, point: Point, delta_x: f64, delta_y: f64) -> Result<()> {
        self.run(ShowreelError::Browser, "mouseWheel", move |tab| {
            let deltas = json!({ "deltaX": delta_x, "deltaY": delta_y });
            tab.call_method(mouse_event("mouseWheel", point, deltas)?)?;
            Ok(())
        })
        .await
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        let text = text.to_string();
        self.run(ShowreelError::Browser, "type", move |tab| {
            tab.type_str(&text)?;
            Ok(())
        })
        .await
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.run(ShowreelError::Browser, "press_key", move |tab| {
            tab.press_key(&key)?;
            Ok(())
        })
        .await
    }

    async fn select_all(&self) -> Result<()> {
        self.evaluate(
            "(() => { const el = document.activeElement; \
             if (el && typeof el.select === 'function') { el.select(); } \
             else { document.execCommand('selectAll'); } return true; })()",
        )
        .await?;
        Ok(())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let mut params = json!({
            "format": "png",
            "fromSurface": true,
            "captureBeyondViewport": full_page,
        });
        if full_page {
            let size = self
                .evaluate(
                    "({ width: Math.max(document.documentElement.scrollWidth, window.innerWidth), \
                     height: Math.max(document.documentElement.scrollHeight, window.innerHeight) })",
                )
                .await?;
            params["clip"] = json!({
                "x": 0,
                "y": 0,
                "width": size["width"].as_f64().unwrap_or(0.0),
                "height": size["height"].as_f64().unwrap_or(0.0),
                "scale": 1,
            });
        }

        let encoded = self
            .run(ShowreelError::ScreenshotFailed, "captureScreenshot", move |tab| {
                Ok(tab.call_method(cdp::<Page::CaptureScreenshot>(params)?)?.data)
            })
            .await?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ShowreelError::ScreenshotFailed(format!("Invalid image payload: {}", e)))
    }

    async fn start_screencast(
        &self,
        params: ScreencastParams,
    ) -> Result<mpsc::UnboundedReceiver<ScreencastFrame>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.set_frame_sender(Some(sender));

        let mut body = json!({
            "format": "jpeg",
            "quality": params.quality,
            "everyNthFrame": params.every_nth_frame,
        });
        if let Some(width) = params.max_width {
            body["maxWidth"] = json!(width);
        }
        if let Some(height) = params.max_height {
            body["maxHeight"] = json!(height);
        }

        let started = self
            .run(ShowreelError::Recording, "startScreencast", move |tab| {
                tab.call_method(cdp::<Page::StartScreencast>(body)?)?;
                Ok(())
            })
            .await;
        if let Err(e) = started {
            self.set_frame_sender(None);
            return Err(e);
        }
        Ok(receiver)
    }

    async fn ack_screencast_frame(&self, session_id: u64) -> Result<()> {
        let params = json!({ "sessionId": session_id });
        self.run(ShowreelError::Recording, "screencastFrameAck", move |tab| {
            tab.call_method(cdp::<Page::ScreencastFrameAck>(params)?)?;
            Ok(())
        })
        .await
    }

    async fn stop_screencast(&self) -> Result<()> {
        let stopped = self
            .run(ShowreelError::Recording, "stopScreencast", |tab| {
                tab.call_method(cdp::<Page::StopScreencast>(json!({}))?)?;
                Ok(())
            })
            .await;
        // Closing the channel lets the frame writer drain and exit
        self.set_frame_sender(None);
        stopped
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Page already closed");
            return Ok(());
        }
        self.set_frame_sender(None);

        let tab = Arc::clone(&self.tab);
        let browser = self.browser.lock().ok().and_then(|mut slot| slot.take());
        tokio::task::spawn_blocking(move || {
            if let Err(e) = tab.close(true) {
                debug!("Tab close failed: {}", e);
            }
            drop(browser);
        })
        .await
        .map_err(|e| ShowreelError::Browser(format!("Browser close task failed: {}", e)))?;

        info!("Browser closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_expression_awaits_and_serializes() {
        let wrapped = wrap_expression("1 + 1");
        assert!(wrapped.starts_with("(async () => {"));
        assert!(wrapped.contains("await (1 + 1)"));
        assert!(wrapped.contains("JSON.stringify(__v)"));
    }

    #[test]
    fn test_decode_result() {
        assert_eq!(
            decode_result(Some(Value::String(r#"{"a":[1,2]}"#.into()))).unwrap(),
            json!({"a": [1, 2]})
        );
        assert_eq!(decode_result(Some(Value::String("\"text\"".into()))).unwrap(), json!("text"));
        assert_eq!(decode_result(None).unwrap(), Value::Null);
        assert_eq!(decode_result(Some(Value::Null)).unwrap(), Value::Null);
        assert!(decode_result(Some(Value::String("{broken".into()))).is_err());
    }

    #[test]
    fn test_mouse_event_params() {
        let event = mouse_event(
            "mousePressed",
            Point::new(10.5, 20.0),
            json!({ "button": "left", "clickCount": 1 }),
        )
        .unwrap();
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], "mousePressed");
        assert_eq!(wire["x"], 10.5);
        assert_eq!(wire["y"], 20.0);
        assert_eq!(wire["button"], "left");
        assert_eq!(wire["clickCount"], 1);
    }
}
