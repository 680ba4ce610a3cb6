//! Session and linked-account types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The signed-in shell user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: String,
    pub display_name: String,
}

impl CurrentUser {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A virtual-world avatar linked to the shell account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccount {
    pub avatar_uuid: String,
    pub avatar_name: String,
    pub linked_at: DateTime<Utc>,
}
