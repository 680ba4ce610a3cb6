//! App identity and running-instance types.

use crate::error::{PhotonError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static BUNDLE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*(\.[A-Za-z0-9_-]+)+$").expect("bundle id regex must compile")
});

/// Identity of an installable app.
///
/// `bundle_id` is the primary key for installation, running state and
/// permission lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDefinition {
    pub bundle_id: String,
    pub name: String,
    pub author: String,
    /// Location loaded into the app's frame.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl AppDefinition {
    pub fn new(
        bundle_id: impl Into<String>,
        name: impl Into<String>,
        author: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            name: name.into(),
            author: author.into(),
            url: url.into(),
            icon: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Check that the bundle id is reverse-DNS shaped and the url parses.
    pub fn validate(&self) -> Result<()> {
        if !BUNDLE_ID_RE.is_match(&self.bundle_id) {
            return Err(PhotonError::Validation {
                field: "bundleId".to_string(),
                message: format!("'{}' is not a reverse-DNS bundle id", self.bundle_id),
            });
        }
        if self.name.trim().is_empty() {
            return Err(PhotonError::Validation {
                field: "name".to_string(),
                message: "name must not be empty".to_string(),
            });
        }
        url::Url::parse(&self.url).map_err(|e| PhotonError::Validation {
            field: "url".to_string(),
            message: format!("invalid url '{}': {}", self.url, e),
        })?;
        Ok(())
    }
}

/// Runtime wrapper around an [`AppDefinition`] while the app is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningAppInstance {
    pub definition: AppDefinition,
    pub started_at: DateTime<Utc>,
    pub last_foregrounded_at: DateTime<Utc>,
    pub is_in_background: bool,
}

impl RunningAppInstance {
    pub fn bundle_id(&self) -> &str {
        &self.definition.bundle_id
    }
}

/// Result of `apps_launchApp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchResult {
    pub launched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppDefinition>,
}

impl LaunchResult {
    pub fn launched(app: AppDefinition) -> Self {
        Self {
            launched: true,
            error: None,
            app: Some(app),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            launched: false,
            error: Some(message.into()),
            app: None,
        }
    }
}
