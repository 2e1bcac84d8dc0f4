//! Change-event handling: decide whether an event needs a compatibility run.

use std::sync::Arc;

use crate::compat::CompatibilityOrchestrator;
use crate::config::Settings;
use crate::models::{ChangeEvent, CompatibilityRequest, CompatibilityResult, WebhookResponse};

pub const PROCESSED_MESSAGE: &str = "Webhook processed successfully";
pub const SKIPPED_MESSAGE: &str = "Webhook processed, no compatibility check needed";

/// Shared handler state: read-only settings plus the orchestrator.
pub struct WebhookPipeline {
    settings: Arc<Settings>,
    orchestrator: Arc<CompatibilityOrchestrator>,
}

impl WebhookPipeline {
    pub fn new(settings: Arc<Settings>, orchestrator: Arc<CompatibilityOrchestrator>) -> Self {
        Self {
            settings,
            orchestrator,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs a compatibility check when the event touches a manifest file.
    pub async fn handle_event(&self, event: ChangeEvent) -> WebhookResponse {
        log::info!(
            "Received {} event for {} ({} files)",
            if event.event.is_empty() { "unnamed" } else { event.event.as_str() },
            event.repository,
            event.files.len()
        );

        if !event.touches_any(&self.settings.manifest_patterns) {
            log::debug!("No manifest files changed, skipping compatibility check");
            return WebhookResponse::new(SKIPPED_MESSAGE, None);
        }

        let request = self.request_for(&event);
        let result = self.handle_request(request).await;
        WebhookResponse::new(PROCESSED_MESSAGE, Some(result))
    }

    /// Fills defaults from settings and runs the check.
    pub async fn handle_request(&self, mut request: CompatibilityRequest) -> CompatibilityResult {
        if request.kubernetes_version.trim().is_empty() {
            request.kubernetes_version = self.settings.kubernetes_version.clone();
        }
        if request.repository.trim().is_empty() {
            request.repository = self.settings.repository.clone();
        }
        if request.branch.trim().is_empty() {
            request.branch = self.settings.default_branch.clone();
        }

        Arc::clone(&self.orchestrator).check(request).await
    }

    /// Request for an event: configured Kubernetes version, no forced bump.
    pub fn request_for(&self, event: &ChangeEvent) -> CompatibilityRequest {
        CompatibilityRequest {
            kubernetes_version: self.settings.kubernetes_version.clone(),
            force_update: false,
            files: event.files.clone(),
            repository: event.repository.clone(),
            branch: event.branch.clone(),
        }
    }
}
