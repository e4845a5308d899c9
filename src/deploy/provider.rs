//! Cloud provider trait and shared types.
//!
//! The [`CloudProvider`] trait is the only way the orchestrator touches the
//! cloud. Every `ensure_*` operation must be idempotent: calling it against a
//! resource that already exists in the desired state is a no-op.
//!
//! The production implementation is [`AzCli`](super::az::AzCli), which shells
//! out to the `az` command line tool once per operation.

use crate::config::RuntimeConfig;
use crate::target::DeploymentTarget;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("`{command}` exited with {status}\n{stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Operations the deploy pipeline needs from the cloud.
pub trait CloudProvider {
    fn ensure_resource_group(&self, target: &DeploymentTarget) -> Result<(), ProviderError>;

    fn ensure_storage_account(&self, target: &DeploymentTarget) -> Result<(), ProviderError>;

    fn ensure_container(&self, target: &DeploymentTarget) -> Result<(), ProviderError>;

    /// Allow anonymous read access to blobs in the asset container.
    fn set_container_public(&self, target: &DeploymentTarget) -> Result<(), ProviderError>;

    /// Create the function app on the configured plan, or on a consumption
    /// plan when none is configured.
    fn ensure_function_app(
        &self,
        target: &DeploymentTarget,
        runtime: &RuntimeConfig,
    ) -> Result<(), ProviderError>;

    /// Serve the app straight from the uploaded package.
    fn enable_run_from_package(&self, target: &DeploymentTarget) -> Result<(), ProviderError>;

    fn upload_archive(&self, target: &DeploymentTarget, archive: &Path)
    -> Result<(), ProviderError>;

    /// Upload every file under `source` into the asset container, below
    /// `destination` (empty for the container root). Existing blobs are
    /// overwritten.
    fn upload_tree(
        &self,
        target: &DeploymentTarget,
        source: &Path,
        destination: &str,
    ) -> Result<(), ProviderError>;

    fn apply_settings(
        &self,
        target: &DeploymentTarget,
        settings: &BTreeMap<String, String>,
    ) -> Result<(), ProviderError>;

    fn delete_app(&self, target: &DeploymentTarget) -> Result<(), ProviderError>;

    fn delete_container(&self, target: &DeploymentTarget) -> Result<(), ProviderError>;

    /// Delete the telemetry component created alongside the app.
    fn delete_telemetry(&self, target: &DeploymentTarget) -> Result<(), ProviderError>;
}
