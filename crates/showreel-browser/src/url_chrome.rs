//! URL Chrome Overlay: a fake address bar with a status badge

use serde::Serialize;
use serde_json::{json, Value};
use showreel_core::{Result, ShowreelError, StatusKind};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::bridge::{self, installer_script, BridgeReply, Section};
use crate::page::{InitScriptId, SharedPage};

pub const URL_CHROME_JS: &str = include_str!("js/url_chrome.js");

pub const URL_CHROME_ELEMENT_ID: &str = "video-url-chrome";

#[derive(Debug, Serialize)]
struct ChromeOptions {
    colors: BTreeMap<&'static str, &'static str>,
}

fn url_chrome_script() -> String {
    let colors = [
        StatusKind::Error,
        StatusKind::Warning,
        StatusKind::Info,
        StatusKind::Success,
    ]
    .into_iter()
    .map(|kind| (kind.as_str(), kind.color()))
    .collect();
    installer_script(URL_CHROME_JS, &ChromeOptions { colors })
}

/// Status currently shown in the badge
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct StatusBadge {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: StatusKind,
}

pub struct UrlChromeOverlay {
    page: SharedPage,
    init_script: Mutex<Option<InitScriptId>>,
}

impl UrlChromeOverlay {
    pub fn new(page: SharedPage) -> Self {
        Self {
            page,
            init_script: Mutex::new(None),
        }
    }

    pub fn is_injected(&self) -> bool {
        self.init_script.lock().map(|id| id.is_some()).unwrap_or(false)
    }

    /// Install on every new document and on the current one
    pub async fn inject(&self) -> Result<()> {
        let script = url_chrome_script();
        if !self.is_injected() {
            let id = self.page.add_init_script(&script).await?;
            if let Ok(mut slot) = self.init_script.lock() {
                *slot = Some(id);
            }
        }
        self.page.evaluate(&script).await?;
        info!("URL chrome injected");
        Ok(())
    }

    async fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        let page = self.page.as_ref();
        if let BridgeReply::Ok(value) = bridge::invoke(page, Section::Chrome, function, args).await? {
            return Ok(value);
        }

        debug!("URL chrome missing; re-establishing before {}", function);
        self.page.evaluate(&url_chrome_script()).await?;
        bridge::invoke(page, Section::Chrome, function, args)
            .await?
            .into_value()
            .ok_or_else(|| ShowreelError::Overlay(format!("URL chrome unavailable for {}", function)))
    }

    /// Show `text` in the badge; a positive `duration` auto-clears it
    ///
    /// A pending auto-clear from an earlier status is cancelled first.
    pub async fn update_status(
        &self,
        text: &str,
        kind: StatusKind,
        duration: Option<Duration>,
    ) -> Result<()> {
        let duration_ms = duration.map(|d| d.as_millis() as u64).unwrap_or(0);
        self.call("updateStatus", &[json!(text), json!(kind.as_str()), json!(duration_ms)])
            .await?;
        Ok(())
    }

    pub async fn clear_status(&self) -> Result<()> {
        self.call("clearStatus", &[]).await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<Option<StatusBadge>> {
        let value = self.call("status", &[]).await?;
        Ok(serde_json::from_value(value).ok())
    }

    /// Re-render the address bar from `location.href`
    pub async fn refresh(&self) -> Result<String> {
        let href = self.call("refresh", &[]).await?;
        Ok(href.as_str().unwrap_or_default().to_string())
    }

    /// Remove the node and stop installing on new documents
    pub async fn remove(&self) -> Result<()> {
        let init_script = self.init_script.lock().ok().and_then(|mut id| id.take());
        if let Some(id) = init_script {
            self.page.remove_init_script(&id).await?;
        }
        if !self.page.is_closed() {
            bridge::invoke(self.page.as_ref(), Section::Chrome, "remove", &[]).await?;
        }
        info!("URL chrome removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakePage};
    use std::sync::Arc;

    fn chrome() -> (Arc<FakePage>, UrlChromeOverlay) {
        let fake = FakePage::new();
        let chrome = UrlChromeOverlay::new(fake.clone());
        (fake, chrome)
    }

    #[test]
    fn test_script_carries_status_colors() {
        let script = url_chrome_script();
        assert!(script.contains(r##""error":"#ef4444""##));
        assert!(script.contains(r##""success":"#22c55e""##));
        assert!(script.contains("__e2eHistoryPatched"));
    }

    #[tokio::test]
    async fn test_inject_registers_and_runs() {
        let (fake, chrome) = chrome();
        chrome.inject().await.unwrap();

        let calls = fake.calls();
        assert!(matches!(&calls[0], Call::AddInitScript(s) if s.contains(URL_CHROME_ELEMENT_ID)));
        assert!(matches!(&calls[1], Call::Evaluate(s) if s.contains(URL_CHROME_ELEMENT_ID)));
    }

    #[tokio::test]
    async fn test_update_status_passes_duration() {
        let (fake, chrome) = chrome();
        chrome
            .update_status("Saved", StatusKind::Success, Some(Duration::from_millis(1500)))
            .await
            .unwrap();
        chrome.update_status("Working", StatusKind::Info, None).await.unwrap();

        let evaluations = fake.evaluations();
        assert!(evaluations[0].contains(r#"section["updateStatus"]("Saved", "success", 1500)"#));
        assert!(evaluations[1].contains(r#"section["updateStatus"]("Working", "info", 0)"#));
    }

    #[tokio::test]
    async fn test_status_reestablishes_lost_overlay_once() {
        let (fake, chrome) = chrome();
        fake.respond_once(r#"section["clearStatus"]"#, json!({ "missing": true }));

        chrome.clear_status().await.unwrap();

        let evaluations = fake.evaluations();
        assert_eq!(evaluations.len(), 3);
        assert!(evaluations[1].contains(URL_CHROME_ELEMENT_ID));
    }

    #[tokio::test]
    async fn test_status_decodes_badge() {
        let (fake, chrome) = chrome();
        fake.respond(
            r#"section["status"]"#,
            json!({ "missing": false, "value": { "text": "Boom", "type": "error" } }),
        );

        let badge = chrome.status().await.unwrap().unwrap();
        assert_eq!(badge.text, "Boom");
        assert_eq!(badge.kind, StatusKind::Error);
    }

    #[tokio::test]
    async fn test_remove_unregisters_init_script() {
        let (fake, chrome) = chrome();
        chrome.inject().await.unwrap();
        chrome.remove().await.unwrap();

        assert!(fake.calls().contains(&Call::RemoveInitScript("1".to_string())));
        assert!(!chrome.is_injected());
    }
}
