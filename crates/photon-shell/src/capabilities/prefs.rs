//! Preference handlers.
//!
//! Sandboxed preferences are private to the calling app and keyed by the
//! bundle id of the frame the call came from. Shared preferences are visible
//! to every app of the signed-in user.

use super::{optional_arg, require_str_arg};
use crate::shell::ShellState;
use crate::store::PrefScope;
use photon_core::config::ShellConfig;
use photon_core::rpc::CallContext;
use photon_core::{PhotonError, Result};
use serde_json::Value;

fn require_key(args: &[Value]) -> Result<String> {
    let key = require_str_arg(args, 0, "key")?;
    if key.is_empty() || key.len() > ShellConfig::MAX_PREFERENCE_KEY_LEN {
        return Err(PhotonError::Validation {
            field: "key".to_string(),
            message: format!(
                "preference keys must be 1 to {} bytes",
                ShellConfig::MAX_PREFERENCE_KEY_LEN
            ),
        });
    }
    Ok(key)
}

fn sandbox(state: &ShellState, ctx: &CallContext) -> Result<PrefScope> {
    Ok(PrefScope::Sandboxed(state.caller_bundle(ctx)?))
}

async fn get(state: &ShellState, scope: PrefScope, args: &[Value]) -> Result<Value> {
    let key = require_key(args)?;
    let user = state.current_user()?;
    let value = state.store().get_preference(&user.id, &scope, &key).await?;
    Ok(value.unwrap_or(Value::Null))
}

async fn set(state: &ShellState, scope: PrefScope, args: &[Value]) -> Result<Value> {
    let key = require_key(args)?;
    let value = optional_arg(args, 1);
    let user = state.current_user()?;
    state
        .store()
        .set_preference(&user.id, &scope, &key, &value)
        .await?;
    Ok(Value::Null)
}

async fn delete(state: &ShellState, scope: PrefScope, args: &[Value]) -> Result<Value> {
    let key = require_key(args)?;
    let user = state.current_user()?;
    state.store().delete_preference(&user.id, &scope, &key).await?;
    Ok(Value::Null)
}

pub async fn get_sandboxed(state: &ShellState, ctx: &CallContext, args: &[Value]) -> Result<Value> {
    get(state, sandbox(state, ctx)?, args).await
}

pub async fn set_sandboxed(state: &ShellState, ctx: &CallContext, args: &[Value]) -> Result<Value> {
    set(state, sandbox(state, ctx)?, args).await
}

pub async fn delete_sandboxed(
    state: &ShellState,
    ctx: &CallContext,
    args: &[Value],
) -> Result<Value> {
    delete(state, sandbox(state, ctx)?, args).await
}

pub async fn get_shared(state: &ShellState, args: &[Value]) -> Result<Value> {
    get(state, PrefScope::Shared, args).await
}

pub async fn set_shared(state: &ShellState, args: &[Value]) -> Result<Value> {
    set(state, PrefScope::Shared, args).await
}

pub async fn delete_shared(state: &ShellState, args: &[Value]) -> Result<Value> {
    delete(state, PrefScope::Shared, args).await
}
