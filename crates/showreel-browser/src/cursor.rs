//! Cursor Overlay Controller
//!
//! Keeps a synthetic cursor in the page DOM that mirrors the host's pointer
//! position. The overlay script is registered for every new document and run
//! on the current one. After each main-frame navigation a background task
//! re-injects it seeded with the last host-side position, so recordings never
//! show the cursor snapping back to the viewport center.

use serde::Serialize;
use serde_json::{json, Value};
use showreel_core::fail_open::fail_open_with_retries;
use showreel_core::{CursorStyle, Point, Result, ShowreelError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::bridge::{self, installer_script, BridgeReply, Section};
use crate::page::{InitScriptId, PageEvent, SharedPage};

pub const CURSOR_OVERLAY_JS: &str = include_str!("js/cursor_overlay.js");

/// Fixed DOM id of the cursor element
pub const CURSOR_ELEMENT_ID: &str = "e2e-cursor-overlay";

/// Time the new document gets before the cursor is re-injected
pub const NAVIGATION_SETTLE: Duration = Duration::from_millis(150);

const REINJECT_ATTEMPTS: usize = 3;

#[derive(Debug, Serialize)]
struct CursorOptions {
    seed: Option<Point>,
}

fn cursor_script(seed: Option<Point>) -> String {
    installer_script(CURSOR_OVERLAY_JS, &CursorOptions { seed })
}

/// Host side of the cursor overlay
pub struct CursorOverlay {
    page: SharedPage,
    /// Last target position; the host is its only writer
    position: Arc<Mutex<Option<Point>>>,
    init_script: Mutex<Option<InitScriptId>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl CursorOverlay {
    pub fn new(page: SharedPage) -> Self {
        Self {
            page,
            position: Arc::new(Mutex::new(None)),
            init_script: Mutex::new(None),
            watcher: Mutex::new(None),
        }
    }

    /// Last position the host moved the cursor to
    pub fn position(&self) -> Option<Point> {
        self.position.lock().ok().and_then(|position| *position)
    }

    /// Record a pointer position without touching the page
    pub fn remember(&self, point: Point) {
        if let Ok(mut position) = self.position.lock() {
            *position = Some(point);
        }
    }

    pub fn is_injected(&self) -> bool {
        self.init_script.lock().map(|id| id.is_some()).unwrap_or(false)
    }

    /// Install the overlay for future documents and the current one
    ///
    /// Safe to call repeatedly: the page script checks for an existing
    /// installation and only repositions.
    pub async fn inject(&self) -> Result<()> {
        if !self.is_injected() {
            let id = self.page.add_init_script(&cursor_script(None)).await?;
            if let Ok(mut slot) = self.init_script.lock() {
                *slot = Some(id);
            }
        }

        let outcome = self.page.evaluate(&cursor_script(self.position())).await?;
        debug!("Cursor overlay {}", outcome.as_str().unwrap_or("evaluated"));

        self.spawn_watcher();
        info!("Cursor overlay injected");
        Ok(())
    }

    fn spawn_watcher(&self) {
        let Ok(mut watcher) = self.watcher.lock() else {
            return;
        };
        if watcher.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let mut events = self.page.subscribe();
        let page = Arc::clone(&self.page);
        let position = Arc::clone(&self.position);
        *watcher = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(PageEvent::FrameNavigated { url }) => {
                        // Read before the settle delay; the new document starts without it
                        let seed = position.lock().ok().and_then(|p| *p);
                        tokio::time::sleep(NAVIGATION_SETTLE).await;
                        debug!("Re-injecting cursor after navigation to {}", url);
                        let script = cursor_script(seed);
                        fail_open_with_retries(
                            "cursor_reinject",
                            || page.evaluate(&script),
                            REINJECT_ATTEMPTS,
                        )
                        .await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Cursor watcher skipped {} page events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Call a cursor bridge function, re-installing once if the document lost it
    async fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        let page = self.page.as_ref();
        if let BridgeReply::Ok(value) = bridge::invoke(page, Section::Cursor, function, args).await? {
            return Ok(value);
        }

        debug!("Cursor overlay missing; re-installing before {}", function);
        self.page.evaluate(&cursor_script(self.position())).await?;
        bridge::invoke(page, Section::Cursor, function, args)
            .await?
            .into_value()
            .ok_or_else(|| {
                ShowreelError::Overlay(format!("cursor overlay unavailable for {}", function))
            })
    }

    /// Move the overlay and the shared `__mousePosition`
    pub async fn update_position(&self, point: Point) -> Result<()> {
        self.remember(point);
        self.call("update", &[json!(point.x), json!(point.y)]).await?;
        Ok(())
    }

    pub async fn set_style(&self, style: CursorStyle) -> Result<()> {
        self.call("setStyle", &[json!(style.as_str())]).await?;
        Ok(())
    }

    /// Move and report whether the element under `point` looks interactive
    ///
    /// The page switches between the hover and default styles on its own
    /// unless the cursor is in the click style.
    pub async fn move_and_probe(&self, point: Point) -> Result<bool> {
        self.remember(point);
        let interactive = self
            .call("moveAndProbe", &[json!(point.x), json!(point.y)])
            .await?;
        Ok(interactive.as_bool().unwrap_or(false))
    }

    /// Position the page believes the cursor is at
    pub async fn page_position(&self) -> Result<Option<Point>> {
        match bridge::invoke(self.page.as_ref(), Section::Cursor, "position", &[]).await? {
            BridgeReply::Ok(Value::Null) | BridgeReply::Missing => Ok(None),
            BridgeReply::Ok(value) => Ok(serde_json::from_value(value).ok()),
        }
    }

    /// Where the next move starts: host position, else the page's, else the origin
    pub async fn current_position(&self) -> Point {
        if let Some(point) = self.position() {
            return point;
        }
        match self.page_position().await {
            Ok(Some(point)) => point,
            _ => Point::default(),
        }
    }

    /// Tear the overlay down for this and all future documents
    pub async fn remove(&self) -> Result<()> {
        if let Some(handle) = self.watcher.lock().ok().and_then(|mut w| w.take()) {
            handle.abort();
        }

        let init_script = self.init_script.lock().ok().and_then(|mut id| id.take());
        if let Some(id) = init_script {
            self.page.remove_init_script(&id).await?;
        }

        if !self.page.is_closed() {
            bridge::invoke(self.page.as_ref(), Section::Cursor, "remove", &[]).await?;
        }
        if let Ok(mut position) = self.position.lock() {
            *position = None;
        }
        info!("Cursor overlay removed");
        Ok(())
    }
}

impl Drop for CursorOverlay {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.get_mut().ok().and_then(|w| w.take()) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakePage};

    fn overlay() -> (Arc<FakePage>, CursorOverlay) {
        let fake = FakePage::new();
        let overlay = CursorOverlay::new(fake.clone());
        (fake, overlay)
    }

    #[tokio::test]
    async fn test_inject_registers_once_and_runs_now() {
        let (fake, overlay) = overlay();

        overlay.inject().await.unwrap();
        overlay.inject().await.unwrap();

        let registered = fake
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::AddInitScript(_)))
            .count();
        assert_eq!(registered, 1);
        assert_eq!(fake.count_evaluations(CURSOR_ELEMENT_ID), 2);
        assert!(overlay.is_injected());
    }

    #[test]
    fn test_script_is_idempotent_by_element_id() {
        let script = cursor_script(None);
        assert!(script.contains("document.getElementById(ID)"));
        assert!(script.contains("installed.installed"));
        assert!(script.contains("RECREATE_MIN_INTERVAL_MS = 50"));
    }

    #[tokio::test]
    async fn test_update_position_tracks_host_side() {
        let (fake, overlay) = overlay();

        overlay.update_position(Point::new(120.0, 80.0)).await.unwrap();

        assert_eq!(overlay.position(), Some(Point::new(120.0, 80.0)));
        let update = fake.evaluations().pop().unwrap();
        assert!(update.contains(r#"section["update"](120.0, 80.0)"#));
    }

    #[tokio::test]
    async fn test_missing_section_is_reinstalled_with_seed() {
        let (fake, overlay) = overlay();
        fake.respond_once(r#"section["update"]"#, json!({ "missing": true }));

        overlay.update_position(Point::new(40.0, 50.0)).await.unwrap();

        let evaluations = fake.evaluations();
        assert_eq!(evaluations.len(), 3);
        assert!(evaluations[1].contains(r#"{"seed":{"x":40.0,"y":50.0}}"#));
        assert!(evaluations[2].contains(r#"section["update"]"#));
    }

    #[tokio::test]
    async fn test_still_missing_after_reinstall_is_an_overlay_error() {
        let (fake, overlay) = overlay();
        fake.respond(r#"section["setStyle"]"#, json!({ "missing": true }));

        let err = overlay.set_style(CursorStyle::Click).await.unwrap_err();
        assert!(matches!(err, ShowreelError::Overlay(_)));
    }

    #[tokio::test]
    async fn test_move_and_probe_reports_interactive() {
        let (fake, overlay) = overlay();
        fake.respond(r#"section["moveAndProbe"]"#, json!({ "missing": false, "value": true }));

        assert!(overlay.move_and_probe(Point::new(5.0, 5.0)).await.unwrap());
        assert_eq!(overlay.position(), Some(Point::new(5.0, 5.0)));
    }

    #[tokio::test]
    async fn test_navigation_reinjects_with_last_position() {
        let (fake, overlay) = overlay();
        overlay.inject().await.unwrap();
        overlay.update_position(Point::new(300.0, 200.0)).await.unwrap();
        fake.clear_calls();

        fake.emit(PageEvent::FrameNavigated {
            url: "http://localhost/next".to_string(),
        });
        tokio::time::sleep(NAVIGATION_SETTLE + Duration::from_millis(150)).await;

        let evaluations = fake.evaluations();
        assert_eq!(evaluations.len(), 1);
        assert!(evaluations[0].contains(r#"{"seed":{"x":300.0,"y":200.0}}"#));
    }

    #[tokio::test]
    async fn test_remove_unregisters_and_stops_watching() {
        let (fake, overlay) = overlay();
        overlay.inject().await.unwrap();
        overlay.remove().await.unwrap();

        assert!(fake.calls().contains(&Call::RemoveInitScript("1".to_string())));
        assert!(fake.evaluations().last().unwrap().contains(r#"section["remove"]"#));
        assert!(!overlay.is_injected());
        assert_eq!(overlay.position(), None);

        fake.clear_calls();
        fake.emit(PageEvent::FrameNavigated {
            url: "http://localhost/after".to_string(),
        });
        tokio::time::sleep(NAVIGATION_SETTLE + Duration::from_millis(100)).await;
        assert!(fake.evaluations().is_empty());
    }

    #[tokio::test]
    async fn test_current_position_falls_back_to_page() {
        let (fake, overlay) = overlay();
        fake.respond(
            r#"section["position"]"#,
            json!({ "missing": false, "value": { "x": 640.0, "y": 360.0 } }),
        );

        assert_eq!(overlay.current_position().await, Point::new(640.0, 360.0));
    }
}
