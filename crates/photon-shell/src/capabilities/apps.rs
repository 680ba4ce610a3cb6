//! App management capability handlers.
//!
//! Every handler that takes an app expects its [`AppDefinition`] as the first
//! argument; only the bundle id is trusted for lookups.

use super::parse_arg;
use crate::shell::ShellState;
use photon_core::models::AppDefinition;
use photon_core::Result;
use serde_json::Value;

pub async fn get_installed_apps(state: &ShellState) -> Result<Value> {
    let apps = state.installed_apps().await?;
    Ok(serde_json::to_value(apps)?)
}

pub async fn launch_app(state: &ShellState, args: &[Value]) -> Result<Value> {
    let app: AppDefinition = parse_arg(args, 0, "app")?;
    let result = state.launch(&app).await?;
    Ok(serde_json::to_value(result)?)
}

pub async fn foreground_app(state: &ShellState, args: &[Value]) -> Result<Value> {
    let app: AppDefinition = parse_arg(args, 0, "app")?;
    state.foreground(&app.bundle_id).await?;
    Ok(Value::Null)
}

pub async fn request_app_install(state: &ShellState, args: &[Value]) -> Result<Value> {
    let app: AppDefinition = parse_arg(args, 0, "app")?;
    state.install(&app).await?;
    Ok(Value::Null)
}

pub async fn request_app_uninstall(state: &ShellState, args: &[Value]) -> Result<Value> {
    let app: AppDefinition = parse_arg(args, 0, "app")?;
    state.uninstall(&app.bundle_id).await?;
    Ok(Value::Null)
}
