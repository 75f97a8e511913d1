//! Recording throbber
//!
//! Screencasts only emit frames when something repaints. The throbber is a
//! near-invisible 4x4 element whose opacity alternates on an interval, so a
//! static page still produces frames and pauses keep their length in the video.

use serde::Serialize;
use showreel_core::Result;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::bridge::{self, installer_script, Section};
use crate::page::{InitScriptId, SharedPage};

pub const THROBBER_JS: &str = include_str!("js/throbber.js");

pub const THROBBER_ELEMENT_ID: &str = "e2e-recording-throbber";

pub const THROBBER_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThrobberOptions {
    interval_ms: u64,
}

fn throbber_script() -> String {
    installer_script(
        THROBBER_JS,
        &ThrobberOptions {
            interval_ms: THROBBER_INTERVAL.as_millis() as u64,
        },
    )
}

pub struct RecordingThrobber {
    page: SharedPage,
    init_script: Mutex<Option<InitScriptId>>,
}

impl RecordingThrobber {
    pub fn new(page: SharedPage) -> Self {
        Self {
            page,
            init_script: Mutex::new(None),
        }
    }

    pub async fn inject(&self) -> Result<()> {
        let script = throbber_script();
        let registered = self.init_script.lock().map(|id| id.is_some()).unwrap_or(false);
        if !registered {
            let id = self.page.add_init_script(&script).await?;
            if let Ok(mut slot) = self.init_script.lock() {
                *slot = Some(id);
            }
        }
        self.page.evaluate(&script).await?;
        debug!("Recording throbber injected");
        Ok(())
    }

    /// Clear the interval and remove the element
    pub async fn remove(&self) -> Result<()> {
        let init_script = self.init_script.lock().ok().and_then(|mut id| id.take());
        if let Some(id) = init_script {
            self.page.remove_init_script(&id).await?;
        }
        if !self.page.is_closed() {
            bridge::invoke(self.page.as_ref(), Section::Throbber, "remove", &[]).await?;
        }
        debug!("Recording throbber removed");
        Ok(())
    }
}
