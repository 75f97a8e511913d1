//! In-video annotations: subtitles, title cards and element highlights
//!
//! Everything lives under one container (`#e2e-overlay-container`) above the
//! application and below the cursor. Each kind is a singleton, so a new
//! subtitle replaces the previous one. Display calls never block; callers
//! that want the narration visible in the recording pause afterwards.

use serde::Serialize;
use serde_json::{json, Value};
use showreel_core::{Result, ShowreelError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::bridge::{self, installer_script, BridgeReply, Section};
use crate::cursor::CURSOR_ELEMENT_ID;
use crate::page::PageDriver;
use crate::throbber::THROBBER_ELEMENT_ID;
use crate::url_chrome::URL_CHROME_ELEMENT_ID;

pub const ANNOTATIONS_JS: &str = include_str!("js/annotations.js");

pub const OVERLAY_CONTAINER_ID: &str = "e2e-overlay-container";

/// Highlights without an explicit duration stay this long
pub const DEFAULT_HIGHLIGHT_DURATION: Duration = Duration::from_millis(2000);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotationOptions {
    fade_ms: u64,
}

fn annotations_script() -> String {
    installer_script(ANNOTATIONS_JS, &AnnotationOptions { fade_ms: 300 })
}

fn millis(duration: Option<Duration>) -> u64 {
    duration.map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Every harness overlay a clean screenshot must not show
fn overlay_selector() -> String {
    format!(
        "#{}, [data-e2e-annotation], #{}, #{}, #{}",
        OVERLAY_CONTAINER_ID, CURSOR_ELEMENT_ID, URL_CHROME_ELEMENT_ID, THROBBER_ELEMENT_ID
    )
}

/// Hide all overlays, remembering each element's inline `display`
pub fn hide_overlays_script() -> String {
    format!(
        r#"(() => {{
  let hidden = 0;
  document.querySelectorAll({selector}).forEach((el) => {{
    if (el.dataset.e2ePriorDisplay === undefined) {{
      el.dataset.e2ePriorDisplay = el.style.display;
    }}
    el.style.display = 'none';
    hidden += 1;
  }});
  return hidden;
}})()"#,
        selector = bridge::js_arg(&overlay_selector())
    )
}

/// Put back the `display` values saved by [`hide_overlays_script`]
pub const RESTORE_OVERLAYS_SCRIPT: &str = r#"(() => {
  let restored = 0;
  document.querySelectorAll('[data-e2e-prior-display]').forEach((el) => {
    el.style.display = el.dataset.e2ePriorDisplay;
    delete el.dataset.e2ePriorDisplay;
    restored += 1;
  });
  return restored;
})()"#;

/// Host side of the annotation overlay
///
/// Installed lazily: the first call on a document injects the script.
pub struct Annotations<'a> {
    page: &'a dyn PageDriver,
}

impl<'a> Annotations<'a> {
    pub fn new(page: &'a dyn PageDriver) -> Self {
        Self { page }
    }

    async fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        if let BridgeReply::Ok(value) =
            bridge::invoke(self.page, Section::Annotations, function, args).await?
        {
            return Ok(value);
        }

        debug!("Installing annotation overlay for {}", function);
        self.page.evaluate(&annotations_script()).await?;
        bridge::invoke(self.page, Section::Annotations, function, args)
            .await?
            .into_value()
            .ok_or_else(|| {
                ShowreelError::Overlay(format!("annotation overlay unavailable for {}", function))
            })
    }

    /// Bottom-centered subtitle; `None` or zero keeps it until cleared
    pub async fn show_subtitle(&self, text: &str, show_for: Option<Duration>) -> Result<()> {
        self.call("showSubtitle", &[json!(text), json!(millis(show_for))])
            .await?;
        Ok(())
    }

    /// Full-viewport title card
    pub async fn show_title_card(
        &self,
        title: &str,
        subtitle: Option<&str>,
        show_for: Option<Duration>,
        animate: bool,
    ) -> Result<()> {
        self.call(
            "showTitleCard",
            &[json!(title), json!(subtitle), json!(millis(show_for)), json!(animate)],
        )
        .await?;
        Ok(())
    }

    /// Fade out the subtitle and the title card
    pub async fn clear_subtitle(&self) -> Result<()> {
        self.call("clearSubtitle", &[]).await?;
        Ok(())
    }

    /// Pulse a box around `selector` with an optional label
    ///
    /// Returns `false`, with a warning, when the selector matches nothing.
    pub async fn highlight(
        &self,
        selector: &str,
        text: Option<&str>,
        duration: Option<Duration>,
    ) -> Result<bool> {
        let duration = duration.unwrap_or(DEFAULT_HIGHLIGHT_DURATION);
        let found = self
            .call(
                "highlight",
                &[json!(selector), json!(text), json!(millis(Some(duration)))],
            )
            .await?
            .as_bool()
            .unwrap_or(false);
        if !found {
            warn!("Highlight skipped: no element matches {}", selector);
        }
        Ok(found)
    }

    pub async fn clear_highlights(&self) -> Result<()> {
        self.call("clearHighlights", &[]).await?;
        Ok(())
    }

    /// Remove the container and cancel pending timers
    pub async fn remove(&self) -> Result<()> {
        bridge::invoke(self.page, Section::Annotations, "remove", &[]).await?;
        Ok(())
    }

    /// Hide every overlay; returns how many elements were hidden
    pub async fn hide_all(&self) -> Result<u64> {
        let hidden = self.page.evaluate(&hide_overlays_script()).await?;
        Ok(hidden.as_u64().unwrap_or(0))
    }

    pub async fn restore_all(&self) -> Result<u64> {
        let restored = self.page.evaluate(RESTORE_OVERLAYS_SCRIPT).await?;
        Ok(restored.as_u64().unwrap_or(0))
    }
}
