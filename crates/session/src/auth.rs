use notebridge_automation::{AutomationSurface, SurfaceContext};
use notebridge_channels::Notifier;
use notebridge_core::config::AuthConfig;
use notebridge_core::{Config, Error, Notification, Result};
use notebridge_storage::{BlobStore, AUTH_STATE_KEY};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const AUTH_SNAPSHOT_KEY: &str = "screenshot/auth.png";
const READY_SNAPSHOT_KEY: &str = "screenshot/initialized.png";

/// Bootstraps the shared context's authenticated identity.
///
/// Runs once per process; re-authentication mid-process is out of scope, so
/// a later credential expiry surfaces as query failures for the operator to
/// resolve by restarting.
pub struct AuthManager {
    context: Arc<dyn SurfaceContext>,
    blob: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
    auth: AuthConfig,
    app_url: String,
    login_user: String,
    login_password: String,
    authenticated: AtomicBool,
}

impl AuthManager {
    pub fn new(
        context: Arc<dyn SurfaceContext>,
        blob: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            context,
            blob,
            notifier,
            auth: config.auth.clone(),
            app_url: config.app_url.clone(),
            login_user: config.login_user.clone(),
            login_password: config.login_password.clone(),
            authenticated: AtomicBool::new(false),
        }
    }

    /// Idempotent. Restores persisted state when available, walks the login
    /// form when the target still asks for it, and escalates the manual
    /// multi-factor step to the operator channel.
    pub async fn ensure_authenticated(&self) -> Result<()> {
        if self.authenticated.load(Ordering::Acquire) {
            return Ok(());
        }

        match self.blob.get(AUTH_STATE_KEY).await? {
            Some(state) => {
                self.context.restore_state(&state).await?;
                info!("Restored persisted authentication state");
            }
            None => debug!("No persisted authentication state"),
        }

        let surface = self.context.new_surface().await?;
        let outcome = self.login_flow(surface.as_ref()).await;

        // Parting snapshot and close happen on both paths.
        match surface.screenshot().await {
            Ok(png) => {
                if let Err(e) = self.blob.put(READY_SNAPSHOT_KEY, png, "image/png").await {
                    warn!(error = %e, "Failed to store bootstrap snapshot");
                }
            }
            Err(e) => warn!(error = %e, "Bootstrap snapshot failed"),
        }
        if let Err(e) = surface.close().await {
            warn!(error = %e, "Failed to close bootstrap surface");
        }

        outcome?;
        self.authenticated.store(true, Ordering::Release);
        Ok(())
    }

    async fn login_flow(&self, surface: &dyn AutomationSurface) -> Result<()> {
        surface.goto(&self.app_url).await?;
        surface.wait_settled().await?;

        if !surface.exists(&self.auth.identity_selector).await? {
            info!("Context already authenticated, skipping login");
            return Ok(());
        }

        info!("Login form detected, authenticating");
        surface.fill(&self.auth.identity_selector, &self.login_user).await?;
        surface.click_button_by_label(&self.auth.next_button_label).await?;
        surface.wait_settled().await?;

        self.wait_for(surface, &self.auth.credential_selector).await?;
        surface
            .fill(&self.auth.credential_selector, &self.login_password)
            .await?;
        surface.click_button_by_label(&self.auth.next_button_label).await?;

        // Manual multi-factor gate: hand the operator a snapshot, then hold
        // the grace window open. Trust boundary, not a poll-until-success.
        let png = surface.screenshot().await?;
        let snapshot_uri = self.blob.put(AUTH_SNAPSHOT_KEY, png, "image/png").await?;
        self.notifier
            .notify(&Notification::alert(&format!(
                "Manual verification required. Respond within {} seconds.\n{snapshot_uri}",
                self.auth.mfa_grace_secs
            )))
            .await?;
        info!(grace_secs = self.auth.mfa_grace_secs, "Waiting for manual verification");
        tokio::time::sleep(Duration::from_secs(self.auth.mfa_grace_secs)).await;

        // Verification probe: a login form still on screen means the
        // operator never completed the flow; persisting state now would
        // cache an invalid credential.
        if surface.exists(&self.auth.identity_selector).await? {
            return Err(Error::Auth(
                "manual verification did not complete within the grace window".to_string(),
            ));
        }

        let state = self.context.export_state().await?;
        self.blob
            .put(AUTH_STATE_KEY, state, "application/json")
            .await?;
        info!("Authentication state persisted");
        Ok(())
    }

    /// Bounded wait for an element to appear, 500 ms cadence.
    async fn wait_for(&self, surface: &dyn AutomationSurface, selector: &str) -> Result<()> {
        let attempts = self.auth.credential_wait_secs.max(1) * 2;
        for _ in 0..attempts {
            if surface.exists(selector).await? {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Err(Error::Auth(format!("{selector} did not appear")))
    }
}
