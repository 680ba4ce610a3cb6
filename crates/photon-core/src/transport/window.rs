//! Window addressing and origin policy.

use crate::error::{PhotonError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Address of a document on a [`MessageBus`](super::MessageBus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub(crate) u64);

impl WindowId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{}", self.0)
    }
}

/// Serialized web origin, `scheme://host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    /// Derive the origin of a URL.
    ///
    /// Default ports are dropped, so `https://a.example:443/x` and
    /// `https://a.example` share an origin.
    pub fn parse(input: &str) -> Result<Self> {
        let url = url::Url::parse(input).map_err(|e| PhotonError::Validation {
            field: "origin".to_string(),
            message: format!("invalid url '{}': {}", input, e),
        })?;
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(PhotonError::Validation {
                field: "origin".to_string(),
                message: format!("'{}' has an opaque origin", input),
            });
        }
        Ok(Origin(origin.ascii_serialization()))
    }

    /// The opaque `null` origin of sandboxed documents.
    pub fn opaque() -> Self {
        Origin("null".to_string())
    }

    pub fn is_opaque(&self) -> bool {
        self.0 == "null"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Origins a transport accepts inbound messages from.
///
/// Cloning shares the underlying set, so the host shell can admit an app's
/// origin when it mounts the app's frame.
#[derive(Debug, Clone, Default)]
pub struct OriginAllowList {
    inner: Arc<RwLock<AllowState>>,
}

#[derive(Debug, Default)]
struct AllowState {
    origins: HashSet<Origin>,
    any: bool,
}

impl OriginAllowList {
    pub fn new(origins: impl IntoIterator<Item = Origin>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AllowState {
                origins: origins.into_iter().collect(),
                any: false,
            })),
        }
    }

    /// Accept every origin. Only for harnesses where all documents are trusted.
    pub fn any() -> Self {
        Self {
            inner: Arc::new(RwLock::new(AllowState {
                origins: HashSet::new(),
                any: true,
            })),
        }
    }

    pub fn allow(&self, origin: Origin) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .origins
            .insert(origin);
    }

    pub fn revoke(&self, origin: &Origin) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .origins
            .remove(origin)
    }

    pub fn is_allowed(&self, origin: &Origin) -> bool {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        state.any || state.origins.contains(origin)
    }
}
