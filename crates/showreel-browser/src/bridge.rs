//! Page bridge: the versioned contract between host and injected scripts
//!
//! Injected scripts register their functions as sections of one page global,
//! `window.__e2eBridge`, stamped with [`BRIDGE_VERSION`]. The host only ever
//! calls those named functions. A navigation wipes the page side at any
//! moment, so [`invoke`] reports [`BridgeReply::Missing`] instead of failing
//! and callers re-inject before retrying.
//!
//! | section       | functions                                                              |
//! |---------------|------------------------------------------------------------------------|
//! | `cursor`      | `ensure`, `update`, `flush`, `setStyle`, `moveAndProbe`, `position`, `remove` |
//! | `chrome`      | `ensure`, `refresh`, `updateStatus`, `clearStatus`, `status`, `remove`  |
//! | `throbber`    | `ensure`, `remove`                                                     |
//! | `annotations` | `showSubtitle`, `showTitleCard`, `clearSubtitle`, `highlight`, `clearHighlights`, `remove` |
//!
//! Legacy globals kept for page-side code: `__mousePosition`,
//! `__recreateCursor`, `updateStatus`, `clearStatus`.

use serde::Serialize;
use serde_json::Value;
use showreel_core::{Result, ShowreelError};
use tracing::debug;

use crate::page::PageDriver;

pub const BRIDGE_GLOBAL: &str = "__e2eBridge";
pub const BRIDGE_VERSION: u32 = 1;

/// Creates the bridge object when the document has none
const PRELUDE: &str = r#"if (!window.__e2eBridge || window.__e2eBridge.version !== 1) { window.__e2eBridge = { version: 1 }; }"#;

/// Bridge sections, one per injected script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Cursor,
    Chrome,
    Throbber,
    Annotations,
}

impl Section {
    pub fn name(&self) -> &'static str {
        match self {
            Section::Cursor => "cursor",
            Section::Chrome => "chrome",
            Section::Throbber => "throbber",
            Section::Annotations => "annotations",
        }
    }
}

/// Outcome of a bridge call
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeReply {
    Ok(Value),
    /// The section is not installed in the current document
    Missing,
}

impl BridgeReply {
    pub fn is_missing(&self) -> bool {
        matches!(self, BridgeReply::Missing)
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            BridgeReply::Ok(value) => Some(value),
            BridgeReply::Missing => None,
        }
    }
}

/// Encode a value as a JavaScript literal
pub fn js_arg<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Wrap an installer (a JS function expression taking one options object)
/// into a self-contained expression usable both as an init script and with
/// `evaluate`.
pub fn installer_script<T: Serialize>(installer: &str, options: &T) -> String {
    format!(
        "(() => {{ {prelude}\nreturn ({installer})({options}); }})()",
        prelude = PRELUDE,
        installer = installer.trim().trim_end_matches(';'),
        options = js_arg(options),
    )
}

/// Expression that calls `section.function(...args)` if installed
pub fn call_expression(section: Section, function: &str, args: &[Value]) -> String {
    let args = args.iter().map(js_arg).collect::<Vec<_>>().join(", ");
    format!(
        r#"(() => {{
  const bridge = window.{global};
  const section = bridge && bridge.version === {version} ? bridge[{section}] : undefined;
  if (!section || typeof section[{function}] !== 'function') {{ return {{ missing: true }}; }}
  const value = section[{function}]({args});
  return {{ missing: false, value: value === undefined ? null : value }};
}})()"#,
        global = BRIDGE_GLOBAL,
        version = BRIDGE_VERSION,
        section = js_arg(section.name()),
        function = js_arg(function),
        args = args,
    )
}

/// Interpret the JSON produced by [`call_expression`]
pub fn parse_reply(raw: Value) -> Result<BridgeReply> {
    match raw {
        Value::Object(mut map) => match map.get("missing") {
            Some(Value::Bool(true)) => Ok(BridgeReply::Missing),
            Some(Value::Bool(false)) => Ok(BridgeReply::Ok(
                map.remove("value").unwrap_or(Value::Null),
            )),
            _ => Err(ShowreelError::Script(format!(
                "malformed bridge reply: {}",
                Value::Object(map)
            ))),
        },
        // The document was torn down mid-call
        Value::Null => Ok(BridgeReply::Missing),
        other => Err(ShowreelError::Script(format!(
            "malformed bridge reply: {}",
            other
        ))),
    }
}

/// Call a bridge function in the current document
pub async fn invoke(
    page: &dyn PageDriver,
    section: Section,
    function: &str,
    args: &[Value],
) -> Result<BridgeReply> {
    let raw = page.evaluate(&call_expression(section, function, args)).await?;
    let reply = parse_reply(raw)?;
    if reply.is_missing() {
        debug!("bridge section {}.{} missing", section.name(), function);
    }
    Ok(reply)
}
