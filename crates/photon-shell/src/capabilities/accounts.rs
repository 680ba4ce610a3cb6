//! Linked virtual-world account handlers.

use super::require_str_arg;
use crate::shell::ShellState;
use photon_core::Result;
use serde_json::Value;
use tracing::{debug, info};

pub async fn get_linked(state: &ShellState) -> Result<Value> {
    let user = state.current_user()?;
    let accounts = state.store().linked_accounts(&user.id).await?;
    Ok(serde_json::to_value(accounts)?)
}

pub async fn unlink(state: &ShellState, args: &[Value]) -> Result<Value> {
    let avatar_uuid = require_str_arg(args, 0, "avatarUuid")?;
    let user = state.current_user()?;

    if state.store().unlink_account(&user.id, &avatar_uuid).await? {
        info!("Unlinked avatar {} from {}", avatar_uuid, user.id);
    } else {
        debug!("Avatar {} was not linked to {}", avatar_uuid, user.id);
    }
    Ok(Value::Null)
}
