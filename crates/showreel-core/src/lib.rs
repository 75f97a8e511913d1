//! # showreel-core
//!
//! Core types for the showreel E2E harness: the unified error type, shared
//! value types (points, cursor styles, status kinds, video settings), the
//! resolved configuration and fail-open helpers for cosmetic operations.

pub mod config;
mod error;
pub mod fail_open;
mod types;

pub use config::{E2eConfig, VideoSettings, Viewport};
pub use error::{Result, ShowreelError};
pub use types::*;
