//! Browser binary discovery

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name handed to the launcher when nothing was found; the launch itself then fails loudly
pub const FALLBACK_BROWSER: &str = "chromium";

const EXECUTABLE_NAMES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

fn known_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/snap/bin/chromium"),
        ]
    }
}

/// Search `path_var` (a `PATH`-style list) for the first of `names`
pub fn find_in_path(path_var: &str, names: &[&str]) -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_default();
    names
        .iter()
        .find_map(|name| which::which_in(name, Some(path_var), &cwd).ok())
}

/// Locate a Chromium-family browser
///
/// An explicit path (configuration or `PUPPETEER_EXECUTABLE_PATH`) wins even
/// if it does not exist. Otherwise `PATH` is probed for the usual binary names,
/// then well-known install locations.
pub fn locate_browser(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        debug!("Using configured browser {}", path.display());
        return Some(path.to_path_buf());
    }

    if let Some(path) = EXECUTABLE_NAMES
        .iter()
        .find_map(|name| which::which(name).ok())
    {
        debug!("Found browser on PATH: {}", path.display());
        return Some(path);
    }

    known_paths().into_iter().find(|path| path.exists())
}

/// Like [`locate_browser`] but degrades to [`FALLBACK_BROWSER`] with a warning
pub fn resolve_browser(explicit: Option<&Path>) -> PathBuf {
    locate_browser(explicit).unwrap_or_else(|| {
        warn!(
            "No Chromium or Chrome binary found; falling back to '{}'",
            FALLBACK_BROWSER
        );
        PathBuf::from(FALLBACK_BROWSER)
    })
}
