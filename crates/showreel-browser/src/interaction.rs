//! Interaction Driver
//!
//! Performs logical UI actions (click, type, hover, scroll, focus). In smooth
//! mode every action is choreographed: a planned pointer path mirrored by the
//! cursor overlay, a human reaction pause and cursor style feedback. Instant
//! mode dispatches the same input with no motion and no delays.
//!
//! Cursor feedback is cosmetic and fails open. Resolving the target element
//! and dispatching input are not: a selector that matches nothing, or an
//! element without a box, fails the action.

use serde::Deserialize;
use showreel_core::fail_open::fail_open;
use showreel_core::{CursorStyle, E2eConfig, Point, Result, ShowreelError};
use showreel_motion::{MotionGenerator, MotionOptions};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::bridge::js_arg;
use crate::cursor::CursorOverlay;
use crate::page::SharedPage;

/// Human reaction time before a click or focus, in milliseconds
pub const REACTION_PAUSE_MS: (f64, f64) = (50.0, 150.0);

/// Maximum click offset from the element center, in pixels
pub const CLICK_OFFSET: f64 = 1.0;

/// How long the click style stays visible
pub const CLICK_STYLE_HOLD: Duration = Duration::from_millis(100);

pub const SCROLL_STEPS: u32 = 10;

pub const SCROLL_STEP_DELAY: Duration = Duration::from_millis(30);

pub const DEFAULT_TYPE_DELAY: Duration = Duration::from_millis(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMode {
    #[default]
    Smooth,
    Instant,
}

/// Interaction settings, resolved once when the driver is built
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionConfig {
    pub mode: InteractionMode,
    /// Curved, jittered paths instead of straight eased moves
    pub human_mouse: bool,
    /// Delay between typed characters in smooth mode
    pub type_delay: Duration,
    /// Multiplier on the base pointer speed
    pub speed_factor: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            mode: InteractionMode::Smooth,
            human_mouse: true,
            type_delay: DEFAULT_TYPE_DELAY,
            speed_factor: 1.0,
        }
    }
}

impl InteractionConfig {
    pub fn from_config(config: &E2eConfig) -> Self {
        Self {
            mode: if config.smooth {
                InteractionMode::Smooth
            } else {
                InteractionMode::Instant
            },
            human_mouse: config.human_mouse,
            ..Self::default()
        }
    }

    pub fn instant() -> Self {
        Self {
            mode: InteractionMode::Instant,
            ..Self::default()
        }
    }

    fn motion_options(&self) -> MotionOptions {
        MotionOptions {
            speed_factor: self.speed_factor,
            human_like: self.human_mouse,
        }
    }
}

/// Options for [`InteractionDriver::type_text`]
#[derive(Debug, Clone, PartialEq)]
pub struct TypeOptions {
    /// Click the field before typing (otherwise it is focused)
    pub click_first: bool,
    /// Replace the current value instead of appending
    pub clear_first: bool,
    /// Per-character delay; the driver's default when `None`
    pub delay: Option<Duration>,
}

impl Default for TypeOptions {
    fn default() -> Self {
        Self {
            click_first: true,
            clear_first: false,
            delay: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    /// Signed (dx, dy) for `amount` pixels
    fn deltas(&self, amount: f64) -> (f64, f64) {
        match self {
            ScrollDirection::Up => (0.0, -amount),
            ScrollDirection::Down => (0.0, amount),
            ScrollDirection::Left => (-amount, 0.0),
            ScrollDirection::Right => (amount, 0.0),
        }
    }
}

/// Viewport rectangle of an element
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementBox {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Deserialize)]
struct ElementProbe {
    found: bool,
    rect: Option<ElementBox>,
}

/// Resolve `selector`, scroll it into view when off screen and report its box
fn element_probe_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({selector});
  if (!el) {{ return {{ found: false, rect: null }}; }}
  if (el.getClientRects().length === 0) {{ return {{ found: true, rect: null }}; }}
  let r = el.getBoundingClientRect();
  if (r.bottom < 0 || r.right < 0 || r.top > window.innerHeight || r.left > window.innerWidth) {{
    el.scrollIntoView({{ block: 'center', inline: 'center', behavior: 'instant' }});
    r = el.getBoundingClientRect();
  }}
  if (r.width === 0 && r.height === 0) {{ return {{ found: true, rect: null }}; }}
  return {{ found: true, rect: {{ x: r.x, y: r.y, width: r.width, height: r.height }} }};
}})()"#,
        selector = js_arg(selector)
    )
}

fn focus_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({selector});
  if (!el) {{ return false; }}
  el.focus();
  return true;
}})()"#,
        selector = js_arg(selector)
    )
}

/// Set the value directly and fire `input` and `change`
///
/// Goes through the native value setter so framework-controlled inputs see the change.
fn set_value_script(selector: &str, text: &str, replace: bool) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({selector});
  if (!el) {{ return false; }}
  el.focus();
  const text = {text};
  const isField = el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement;
  if (isField) {{
    const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
    const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
    setter.call(el, {replace} ? text : el.value + text);
  }} else if (el.isContentEditable) {{
    el.textContent = {replace} ? text : el.textContent + text;
  }} else {{
    el.value = {replace} ? text : (el.value || '') + text;
  }}
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#,
        selector = js_arg(selector),
        text = js_arg(text),
        replace = replace,
    )
}

fn scroll_by_script(dx: f64, dy: f64) -> String {
    format!("window.scrollBy({}, {})", dx, dy)
}

/// Drives one page with human-looking or instant input
pub struct InteractionDriver {
    page: SharedPage,
    cursor: Arc<CursorOverlay>,
    config: InteractionConfig,
    motion: Mutex<MotionGenerator>,
}

impl InteractionDriver {
    pub fn new(page: SharedPage, cursor: Arc<CursorOverlay>, config: InteractionConfig) -> Self {
        Self {
            page,
            cursor,
            config,
            motion: Mutex::new(MotionGenerator::new()),
        }
    }

    /// Replace the random source, for reproducible runs
    pub fn with_generator(mut self, generator: MotionGenerator) -> Self {
        self.motion = Mutex::new(generator);
        self
    }

    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    pub fn is_smooth(&self) -> bool {
        self.config.mode == InteractionMode::Smooth
    }

    fn uniform(&self, min: f64, max: f64) -> f64 {
        match self.motion.lock() {
            Ok(mut motion) => motion.uniform(min, max),
            Err(_) => (min + max) / 2.0,
        }
    }

    async fn reaction_pause(&self) {
        let (min, max) = REACTION_PAUSE_MS;
        let ms = self.uniform(min, max);
        tokio::time::sleep(Duration::from_secs_f64(ms / 1000.0)).await;
    }

    async fn show_style(&self, style: CursorStyle) {
        if self.cursor.is_injected() {
            fail_open("cursor_style", || self.cursor.set_style(style)).await;
        }
    }

    /// Viewport box of the first element matching `selector`
    pub async fn element_box(&self, selector: &str) -> Result<ElementBox> {
        let probe: ElementProbe =
            serde_json::from_value(self.page.evaluate(&element_probe_script(selector)).await?)?;
        if !probe.found {
            return Err(ShowreelError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        probe.rect.ok_or_else(|| ShowreelError::NoBoundingBox {
            selector: selector.to_string(),
        })
    }

    pub async fn element_center(&self, selector: &str) -> Result<Point> {
        Ok(self.element_box(selector).await?.center())
    }

    /// Move the pointer to `target`
    ///
    /// Smooth mode follows a planned path, mirrored frame by frame in the
    /// cursor overlay which also tracks whether it is over something clickable.
    pub async fn move_to(&self, target: Point) -> Result<()> {
        if !self.is_smooth() {
            self.page.mouse_move(target).await?;
            self.cursor.remember(target);
            return Ok(());
        }

        let start = self.cursor.current_position().await;
        let plan = match self.motion.lock() {
            Ok(mut motion) => motion.plan(start, target, self.config.motion_options()),
            Err(_) => showreel_motion::MotionPlan::Direct(target),
        };
        let interval = plan.frame_interval();
        debug!(
            "Moving {} -> {} in {} frames over {:?}",
            start,
            target,
            plan.frames().len(),
            plan.duration()
        );

        let overlay = self.cursor.is_injected();
        for (index, frame) in plan.frames().iter().enumerate() {
            self.page.mouse_move(*frame).await?;
            if overlay {
                fail_open("cursor_move", || self.cursor.move_and_probe(*frame)).await;
            } else {
                self.cursor.remember(*frame);
            }
            if index + 1 < plan.frames().len() {
                tokio::time::sleep(interval).await;
            }
        }
        Ok(())
    }

    fn click_offset(&self, point: Point) -> Point {
        point.offset(
            self.uniform(-CLICK_OFFSET, CLICK_OFFSET),
            self.uniform(-CLICK_OFFSET, CLICK_OFFSET),
        )
    }

    /// Click the center of the element matching `selector`
    pub async fn click(&self, selector: &str) -> Result<()> {
        let center = self.element_center(selector).await?;
        debug!("Clicking {} at {}", selector, center);

        if !self.is_smooth() {
            return self.page.mouse_click(center).await;
        }

        self.move_to(center).await?;
        self.reaction_pause().await;
        self.show_style(CursorStyle::Click).await;
        self.page.mouse_click(self.click_offset(center)).await?;
        tokio::time::sleep(CLICK_STYLE_HOLD).await;
        self.show_style(CursorStyle::Default).await;
        Ok(())
    }

    /// Type `text` into the element matching `selector`
    pub async fn type_text(&self, selector: &str, text: &str, options: TypeOptions) -> Result<()> {
        info!("Typing {} characters into {}", text.chars().count(), selector);

        if !self.is_smooth() {
            return self.set_value(selector, text, options.clear_first).await;
        }

        if options.click_first {
            self.click(selector).await?;
        } else {
            self.focus_element(selector).await?;
        }

        if options.clear_first {
            self.page.select_all().await?;
            self.page.press_key("Backspace").await?;
        }

        let delay = options.delay.unwrap_or(self.config.type_delay);
        let mut buffer = [0u8; 4];
        for ch in text.chars() {
            self.page.type_text(ch.encode_utf8(&mut buffer)).await?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }

    async fn set_value(&self, selector: &str, text: &str, replace: bool) -> Result<()> {
        let applied = self
            .page
            .evaluate(&set_value_script(selector, text, replace))
            .await?;
        if applied.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(ShowreelError::ElementNotFound {
                selector: selector.to_string(),
            })
        }
    }

    async fn focus_element(&self, selector: &str) -> Result<()> {
        let focused = self.page.evaluate(&focus_script(selector)).await?;
        if focused.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(ShowreelError::ElementNotFound {
                selector: selector.to_string(),
            })
        }
    }

    /// Move over the element without clicking
    pub async fn hover(&self, selector: &str) -> Result<()> {
        let center = self.element_center(selector).await?;
        self.move_to(center).await?;
        if self.is_smooth() {
            self.show_style(CursorStyle::Hover).await;
        }
        Ok(())
    }

    /// Focus like a click would, without clicking
    pub async fn focus(&self, selector: &str) -> Result<()> {
        if !self.is_smooth() {
            return self.focus_element(selector).await;
        }

        let center = self.element_center(selector).await?;
        self.move_to(center).await?;
        self.reaction_pause().await;
        self.focus_element(selector).await?;
        self.show_style(CursorStyle::Default).await;
        Ok(())
    }

    /// Scroll by `amount` pixels
    ///
    /// Smooth mode sends [`SCROLL_STEPS`] wheel events at the pointer, instant
    /// mode a single `window.scrollBy`.
    pub async fn scroll(&self, direction: ScrollDirection, amount: f64) -> Result<()> {
        let (dx, dy) = direction.deltas(amount);
        debug!("Scrolling {:?} by {}", direction, amount);

        if !self.is_smooth() {
            self.page.evaluate(&scroll_by_script(dx, dy)).await?;
            return Ok(());
        }

        let at = self.cursor.current_position().await;
        let steps = f64::from(SCROLL_STEPS);
        for step in 0..SCROLL_STEPS {
            self.page.mouse_wheel(at, dx / steps, dy / steps).await?;
            if step + 1 < SCROLL_STEPS {
                tokio::time::sleep(SCROLL_STEP_DELAY).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakePage};
    use serde_json::json;

    const PROBE: &str = "getClientRects";

    fn driver(fake: &Arc<FakePage>, config: InteractionConfig) -> InteractionDriver {
        let page: SharedPage = fake.clone();
        let cursor = Arc::new(CursorOverlay::new(page.clone()));
        InteractionDriver::new(page, cursor, config).with_generator(MotionGenerator::seeded(11))
    }

    fn button_at(fake: &FakePage) {
        fake.respond(
            PROBE,
            json!({ "found": true, "rect": { "x": 100.0, "y": 40.0, "width": 80.0, "height": 30.0 } }),
        );
    }

    fn clicks(fake: &FakePage) -> Vec<Point> {
        fake.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::MouseClick(point) => Some(point),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_config_from_e2e_config() {
        let mut config = E2eConfig::default();
        assert_eq!(InteractionConfig::from_config(&config).mode, InteractionMode::Smooth);

        config.smooth = false;
        config.human_mouse = false;
        let resolved = InteractionConfig::from_config(&config);
        assert_eq!(resolved.mode, InteractionMode::Instant);
        assert!(!resolved.human_mouse);
        assert_eq!(resolved.type_delay, DEFAULT_TYPE_DELAY);
    }

    #[test]
    fn test_probe_script_escapes_selector() {
        let script = element_probe_script(r#"input[name="email"]"#);
        assert!(script.contains(r#"document.querySelector("input[name=\"email\"]")"#));
    }

    #[tokio::test]
    async fn test_instant_click_hits_center_once() {
        let fake = FakePage::new();
        button_at(&fake);
        let driver = driver(&fake, InteractionConfig::instant());

        driver.click("#b").await.unwrap();

        assert_eq!(clicks(&fake), vec![Point::new(140.0, 55.0)]);
        assert!(!fake.calls().iter().any(|c| matches!(c, Call::MouseMove(_))));
    }

    #[tokio::test]
    async fn test_smooth_click_moves_then_clicks_near_center() {
        let fake = FakePage::new();
        button_at(&fake);
        let config = InteractionConfig {
            human_mouse: false,
            ..InteractionConfig::default()
        };
        let driver = driver(&fake, config);

        driver.click("#b").await.unwrap();

        let moves: Vec<Point> = fake
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::MouseMove(point) => Some(point),
                _ => None,
            })
            .collect();
        assert!(moves.len() > 2);
        assert_eq!(moves.last(), Some(&Point::new(140.0, 55.0)));

        let clicks = clicks(&fake);
        assert_eq!(clicks.len(), 1);
        assert!((clicks[0].x - 140.0).abs() <= CLICK_OFFSET);
        assert!((clicks[0].y - 55.0).abs() <= CLICK_OFFSET);
    }

    #[tokio::test]
    async fn test_missing_element_fails_action() {
        let fake = FakePage::new();
        fake.respond(PROBE, json!({ "found": false, "rect": null }));
        let driver = driver(&fake, InteractionConfig::instant());

        let err = driver.click("#nope").await.unwrap_err();
        assert!(matches!(err, ShowreelError::ElementNotFound { ref selector } if selector == "#nope"));
        assert!(clicks(&fake).is_empty());
    }

    #[tokio::test]
    async fn test_hidden_element_has_no_bounding_box() {
        let fake = FakePage::new();
        fake.respond(PROBE, json!({ "found": true, "rect": null }));
        let driver = driver(&fake, InteractionConfig::instant());

        let err = driver.hover("#hidden").await.unwrap_err();
        assert!(matches!(err, ShowreelError::NoBoundingBox { .. }));
    }

    #[tokio::test]
    async fn test_instant_type_sets_value_with_events() {
        let fake = FakePage::new();
        fake.respond("dispatchEvent", json!(true));
        let driver = driver(&fake, InteractionConfig::instant());

        let options = TypeOptions {
            clear_first: true,
            ..TypeOptions::default()
        };
        driver.type_text("#email", "a@b.c", options).await.unwrap();

        let script = fake.evaluations().pop().unwrap();
        assert!(script.contains(r#"const text = "a@b.c""#));
        assert!(script.contains("true ? text"));
        assert!(!fake.calls().iter().any(|c| matches!(c, Call::TypeText(_))));
    }

    #[tokio::test]
    async fn test_smooth_type_clears_then_types_per_character() {
        let fake = FakePage::new();
        fake.respond("el.focus()", json!(true));
        let driver = driver(&fake, InteractionConfig::default());

        let options = TypeOptions {
            click_first: false,
            clear_first: true,
            delay: Some(Duration::ZERO),
        };
        driver.type_text("#name", "héy", options).await.unwrap();

        let input: Vec<Call> = fake
            .calls()
            .into_iter()
            .filter(|call| {
                matches!(call, Call::SelectAll | Call::PressKey(_) | Call::TypeText(_))
            })
            .collect();
        assert_eq!(
            input,
            vec![
                Call::SelectAll,
                Call::PressKey("Backspace".to_string()),
                Call::TypeText("h".to_string()),
                Call::TypeText("é".to_string()),
                Call::TypeText("y".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_smooth_scroll_uses_ten_wheel_steps() {
        let fake = FakePage::new();
        let driver = driver(&fake, InteractionConfig::default());

        driver.scroll(ScrollDirection::Down, 300.0).await.unwrap();

        let wheels: Vec<(f64, f64)> = fake
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::MouseWheel(_, dx, dy) => Some((dx, dy)),
                _ => None,
            })
            .collect();
        assert_eq!(wheels.len(), SCROLL_STEPS as usize);
        assert!(wheels.iter().all(|&(dx, dy)| dx == 0.0 && (dy - 30.0).abs() < 1e-9));
    }

    #[tokio::test]
    async fn test_instant_scroll_is_one_scroll_by() {
        let fake = FakePage::new();
        let driver = driver(&fake, InteractionConfig::instant());

        driver.scroll(ScrollDirection::Left, 120.0).await.unwrap();

        assert_eq!(fake.evaluations(), vec!["window.scrollBy(-120, 0)".to_string()]);
    }

    #[tokio::test]
    async fn test_focus_missing_element() {
        let fake = FakePage::new();
        fake.respond("el.focus()", json!(false));
        let driver = driver(&fake, InteractionConfig::instant());

        assert!(driver.focus("#x").await.unwrap_err().is_selector_error());
    }
}
