//! Engine settings
//!
//! Loaded from a TOML document. Every key is optional; missing keys fall back
//! to the defaults below.
//!
//! ```toml
//! [pagination]
//! default_per_page = 10
//! max_per_page = 100
//! cursor_limit = 10
//! max_cursor_limit = 100
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::pagination::{CursorConfig, PageRequest};

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestKitConfig {
    #[serde(default)]
    pub pagination: PaginationSettings,
}

/// Page size limits for both pagination engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationSettings {
    /// Page size used when the request does not name one
    pub default_per_page: u64,
    /// Upper bound on any requested page size
    pub max_per_page: u64,
    /// Cursor page size used when the request does not name one
    pub cursor_limit: u64,
    /// Upper bound on any requested cursor page size
    pub max_cursor_limit: u64,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            default_per_page: 10,
            max_per_page: 100,
            cursor_limit: 10,
            max_cursor_limit: 100,
        }
    }
}

impl RestKitConfig {
    /// Parse settings from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::validation(format!("invalid config: {}", e)))
    }

    /// Load settings from a file, returning defaults when the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file missing, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::Error::new(e).context(format!("failed to read {}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Build a page request, clamping the size into the configured bounds
    pub fn page_request(&self, page: Option<u64>, per: Option<u64>) -> PageRequest {
        let limits = &self.pagination;
        let per = per
            .unwrap_or(limits.default_per_page)
            .clamp(1, limits.max_per_page.max(1));
        PageRequest::new(page.unwrap_or(1).max(1), per)
    }

    /// Build a cursor request, clamping the limit into the configured bounds
    pub fn cursor_config(&self, cursor: Option<String>, limit: Option<u64>) -> CursorConfig {
        let limits = &self.pagination;
        let limit = limit
            .unwrap_or(limits.cursor_limit)
            .clamp(1, limits.max_cursor_limit.max(1));
        CursorConfig { limit, cursor }
    }
}
