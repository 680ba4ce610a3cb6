//! Session capability handlers.

use crate::shell::ShellState;
use photon_core::Result;
use serde_json::Value;

pub fn get_current_user(state: &ShellState) -> Result<Value> {
    Ok(serde_json::to_value(state.current_user()?)?)
}
