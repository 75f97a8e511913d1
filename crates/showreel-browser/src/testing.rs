//! Scripted page double for unit tests

use async_trait::async_trait;
use serde_json::{json, Value};
use showreel_core::{Point, Result, ShowreelError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};

use crate::page::{InitScriptId, PageDriver, PageEvent, ScreencastFrame, ScreencastParams};

/// One recorded driver call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Goto(String),
    Evaluate(String),
    AddInitScript(String),
    RemoveInitScript(String),
    MouseMove(Point),
    MouseClick(Point),
    MouseWheel(Point, f64, f64),
    TypeText(String),
    PressKey(String),
    SelectAll,
    Screenshot(bool),
    StartScreencast,
    AckFrame(u64),
    StopScreencast,
    Close,
}

struct Responder {
    pattern: String,
    value: std::result::Result<Value, String>,
    once: bool,
}

/// Records every call; `evaluate` answers from substring-matched responders
///
/// Unmatched bridge calls answer `{missing: false, value: null}` and any other
/// unmatched expression answers `null`.
pub struct FakePage {
    calls: Mutex<Vec<Call>>,
    responders: Mutex<Vec<Responder>>,
    events: broadcast::Sender<PageEvent>,
    frames: Mutex<Option<mpsc::UnboundedSender<ScreencastFrame>>>,
    next_script: AtomicUsize,
    closed: AtomicBool,
    url: Mutex<String>,
}

impl FakePage {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responders: Mutex::new(Vec::new()),
            events,
            frames: Mutex::new(None),
            next_script: AtomicUsize::new(1),
            closed: AtomicBool::new(false),
            url: Mutex::new("about:blank".to_string()),
        })
    }

    /// Answer every expression containing `pattern` with `value`
    pub fn respond(&self, pattern: &str, value: Value) {
        self.push_responder(pattern, Ok(value), false);
    }

    /// Answer the next matching expression only
    pub fn respond_once(&self, pattern: &str, value: Value) {
        self.push_responder(pattern, Ok(value), true);
    }

    /// Fail every expression containing `pattern`
    pub fn fail(&self, pattern: &str, message: &str) {
        self.push_responder(pattern, Err(message.to_string()), false);
    }

    fn push_responder(&self, pattern: &str, value: std::result::Result<Value, String>, once: bool) {
        // once-responders take priority over sticky ones
        let mut responders = self.responders.lock().unwrap();
        let responder = Responder {
            pattern: pattern.to_string(),
            value,
            once,
        };
        if once {
            responders.insert(0, responder);
        } else {
            responders.push(responder);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn evaluations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Evaluate(expression) => Some(expression),
                _ => None,
            })
            .collect()
    }

    /// Number of evaluations containing `needle`
    pub fn count_evaluations(&self, needle: &str) -> usize {
        self.evaluations().iter().filter(|e| e.contains(needle)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn emit(&self, event: PageEvent) {
        let _ = self.events.send(event);
    }

    /// Deliver a screencast frame to the active screencast
    pub fn push_frame(&self, frame: ScreencastFrame) -> bool {
        match self.frames.lock().unwrap().as_ref() {
            Some(sender) => sender.send(frame).is_ok(),
            None => false,
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn answer(&self, expression: &str) -> Result<Value> {
        let mut responders = self.responders.lock().unwrap();
        if let Some(index) = responders
            .iter()
            .position(|r| expression.contains(&r.pattern))
        {
            let value = responders[index].value.clone();
            if responders[index].once {
                responders.remove(index);
            }
            return value.map_err(ShowreelError::Script);
        }
        if expression.contains("{ missing: true }") {
            return Ok(json!({ "missing": false, "value": null }));
        }
        Ok(Value::Null)
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.record(Call::Goto(url.to_string()));
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.record(Call::Evaluate(expression.to_string()));
        self.answer(expression)
    }

    async fn add_init_script(&self, source: &str) -> Result<InitScriptId> {
        self.record(Call::AddInitScript(source.to_string()));
        let id = self.next_script.fetch_add(1, Ordering::SeqCst);
        Ok(InitScriptId(id.to_string()))
    }

    async fn remove_init_script(&self, id: &InitScriptId) -> Result<()> {
        self.record(Call::RemoveInitScript(id.0.clone()));
        Ok(())
    }

    async fn mouse_move(&self, point: Point) -> Result<()> {
        self.record(Call::MouseMove(point));
        Ok(())
    }

    async fn mouse_click(&self, point: Point) -> Result<()> {
        self.record(Call::MouseClick(point));
        Ok(())
    }

    async fn mouse_wheel(&self, point: Point, delta_x: f64, delta_y: f64) -> Result<()> {
        self.record(Call::MouseWheel(point, delta_x, delta_y));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.record(Call::TypeText(text.to_string()));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.record(Call::PressKey(key.to_string()));
        Ok(())
    }

    async fn select_all(&self) -> Result<()> {
        self.record(Call::SelectAll);
        Ok(())
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        self.record(Call::Screenshot(full_page));
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn start_screencast(
        &self,
        _params: ScreencastParams,
    ) -> Result<mpsc::UnboundedReceiver<ScreencastFrame>> {
        self.record(Call::StartScreencast);
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.frames.lock().unwrap() = Some(sender);
        Ok(receiver)
    }

    async fn ack_screencast_frame(&self, session_id: u64) -> Result<()> {
        self.record(Call::AckFrame(session_id));
        Ok(())
    }

    async fn stop_screencast(&self) -> Result<()> {
        self.record(Call::StopScreencast);
        self.frames.lock().unwrap().take();
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<()> {
        self.record(Call::Close);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
