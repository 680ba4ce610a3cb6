//! User consent for app installation.

use async_trait::async_trait;
use photon_core::models::{AppDefinition, CurrentUser};
use tracing::info;

/// Asks the signed-in user whether an app may be installed.
#[async_trait]
pub trait InstallConsent: Send + Sync + 'static {
    async fn confirm_install(&self, user: &CurrentUser, app: &AppDefinition) -> bool;
}

/// Approves every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl InstallConsent for AutoApprove {
    async fn confirm_install(&self, user: &CurrentUser, app: &AppDefinition) -> bool {
        info!("Auto-approving install of {} for {}", app.bundle_id, user.id);
        true
    }
}

/// Declines every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl InstallConsent for DenyAll {
    async fn confirm_install(&self, _user: &CurrentUser, _app: &AppDefinition) -> bool {
        false
    }
}
