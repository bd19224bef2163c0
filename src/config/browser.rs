//! Headless browser configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for the shared browser context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Viewport width in pixels
    pub viewport_width: u32,
    /// Viewport height in pixels
    pub viewport_height: u32,
    /// Locale passed to the browser (`--lang`)
    pub locale: String,
    /// Explicit chromium executable; auto-detected when absent
    pub executable: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            viewport_width: 1920,
            viewport_height: 1080,
            locale: "en-US".to_string(),
            executable: None,
        }
    }
}
