//! Shared value types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ShowreelError;

/// A point in CSS pixels, relative to the viewport
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Linear interpolation towards `other` by `t` in `[0, 1]`
    pub fn lerp(&self, other: Point, t: f64) -> Point {
        Point {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Point {
        Point {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// Visual state of the synthetic cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorStyle {
    #[default]
    Default,
    Hover,
    Click,
}

impl CursorStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            CursorStyle::Default => "default",
            CursorStyle::Hover => "hover",
            CursorStyle::Click => "click",
        }
    }
}

impl fmt::Display for CursorStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of the status badge shown in the URL chrome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Error,
    Warning,
    #[default]
    Info,
    Success,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Error => "error",
            StatusKind::Warning => "warning",
            StatusKind::Info => "info",
            StatusKind::Success => "success",
        }
    }

    /// Status dot color
    pub fn color(&self) -> &'static str {
        match self {
            StatusKind::Error => "#ef4444",
            StatusKind::Warning => "#eab308",
            StatusKind::Info => "#3b82f6",
            StatusKind::Success => "#22c55e",
        }
    }
}

impl FromStr for StatusKind {
    type Err = ShowreelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(StatusKind::Error),
            "warning" | "warn" => Ok(StatusKind::Warning),
            "info" => Ok(StatusKind::Info),
            "success" => Ok(StatusKind::Success),
            other => Err(ShowreelError::Config(format!("unknown status kind: {}", other))),
        }
    }
}

/// Output container of an encoded recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Webm,
    Gif,
}

impl VideoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
            VideoFormat::Gif => "gif",
        }
    }
}

impl FromStr for VideoFormat {
    type Err = ShowreelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(VideoFormat::Mp4),
            "webm" => Ok(VideoFormat::Webm),
            "gif" => Ok(VideoFormat::Gif),
            other => Err(ShowreelError::Config(format!("unknown video format: {}", other))),
        }
    }
}

/// Encoder quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for VideoQuality {
    type Err = ShowreelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(VideoQuality::Low),
            "medium" => Ok(VideoQuality::Medium),
            "high" => Ok(VideoQuality::High),
            other => Err(ShowreelError::Config(format!("unknown video quality: {}", other))),
        }
    }
}
