//! System capability handlers.

use crate::shell::ShellState;
use photon_core::Result;
use serde_json::Value;

pub async fn home_button(state: &ShellState) -> Result<Value> {
    state.go_home().await?;
    Ok(Value::Null)
}
