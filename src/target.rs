//! Resolution of cloud resource names.
//!
//! A [`DeploymentTarget`] is computed once from the [`DeployConfig`] and is the
//! only place resource names come from afterwards. In ephemeral mode every
//! change request gets its own function app and asset container, so two open
//! change requests never deploy over each other:
//!
//! | Resource | Normal | Ephemeral (change request 42) |
//! |----------|--------|-------------------------------|
//! | function app | `web` | `web-42` |
//! | storage account | `webstore` | `prwebstore` |
//! | asset container | `assets` | `assets-42` |
//!
//! Length limits are enforced by shortening the configured base name, never
//! the suffix; see [`truncate_with_suffix`].

use crate::config::DeployConfig;
use crate::naming::{STORAGE_ACCOUNT_MAX, storage_account_name, truncate_with_suffix};
use thiserror::Error;

/// Function app names are at most 60 characters.
pub const APP_NAME_MAX: usize = 60;

/// Blob container names are at most 63 characters.
pub const CONTAINER_MAX: usize = 63;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TargetError {
    #[error("invalid {resource} name {name:?}: {reason}")]
    InvalidName {
        resource: &'static str,
        name: String,
        reason: &'static str,
    },
    #[error("{app_name} is not an ephemeral deployment; teardown needs a change request id")]
    NotEphemeral { app_name: String },
}

/// Resolved identifiers of every cloud resource the deployment touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    pub subscription: String,
    pub resource_group: String,
    pub location: String,
    pub storage_account: String,
    pub app_name: String,
    pub container: String,
    pub plan: Option<String>,
    pub change_request: Option<u64>,
}

impl DeploymentTarget {
    pub fn resolve(config: &DeployConfig) -> Result<Self, TargetError> {
        let change_request = config
            .ephemeral
            .enabled
            .then_some(config.ephemeral.change_request)
            .flatten();

        let (app_name, storage_account, container) = match change_request {
            Some(id) => {
                let suffix = format!("-{id}");
                (
                    truncate_with_suffix(&config.app_name, &suffix, APP_NAME_MAX),
                    storage_account_name(&format!("pr{}", config.storage_account)),
                    truncate_with_suffix(
                        &config.container.to_ascii_lowercase(),
                        &suffix,
                        CONTAINER_MAX,
                    ),
                )
            }
            None => (
                config.app_name.clone(),
                config.storage_account.clone(),
                config.container.clone(),
            ),
        };

        validate_app_name(&app_name)?;
        validate_storage_account(&storage_account)?;
        validate_container(&container)?;

        Ok(Self {
            subscription: config.subscription.clone(),
            resource_group: config.resource_group.clone(),
            location: config.location.clone(),
            storage_account,
            app_name,
            container,
            plan: config.plan.clone(),
            change_request,
        })
    }

    pub fn is_ephemeral(&self) -> bool {
        self.change_request.is_some()
    }

    /// Error unless this target was derived for a change request.
    pub fn require_ephemeral(&self) -> Result<(), TargetError> {
        if self.is_ephemeral() {
            Ok(())
        } else {
            Err(TargetError::NotEphemeral {
                app_name: self.app_name.clone(),
            })
        }
    }

    /// Public base URL of the asset container.
    pub fn asset_base_url(&self) -> String {
        format!(
            "https://{}.blob.core.windows.net/{}",
            self.storage_account, self.container
        )
    }

    /// Public URL of the deployed app.
    pub fn endpoint_url(&self) -> String {
        format!("https://{}.azurewebsites.net", self.app_name)
    }

    /// Telemetry component created alongside the function app.
    pub fn telemetry_name(&self) -> &str {
        &self.app_name
    }

    /// Archive file name for the function package.
    pub fn package_name(&self) -> String {
        format!("{}.zip", self.app_name)
    }
}

fn invalid(resource: &'static str, name: &str, reason: &'static str) -> TargetError {
    TargetError::InvalidName {
        resource,
        name: name.to_string(),
        reason,
    }
}

fn validate_app_name(name: &str) -> Result<(), TargetError> {
    if name.len() < 2 || name.len() > APP_NAME_MAX {
        return Err(invalid("function app", name, "must be 2-60 characters"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid(
            "function app",
            name,
            "only letters, digits and hyphens are allowed",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid(
            "function app",
            name,
            "must not start or end with a hyphen",
        ));
    }
    Ok(())
}

fn validate_storage_account(name: &str) -> Result<(), TargetError> {
    if name.len() < 3 || name.len() > STORAGE_ACCOUNT_MAX {
        return Err(invalid("storage account", name, "must be 3-24 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(invalid(
            "storage account",
            name,
            "only lowercase letters and digits are allowed",
        ));
    }
    Ok(())
}

fn validate_container(name: &str) -> Result<(), TargetError> {
    if name.len() < 3 || name.len() > CONTAINER_MAX {
        return Err(invalid("container", name, "must be 3-63 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "container",
            name,
            "only lowercase letters, digits and hyphens are allowed",
        ));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) || name.contains("--") {
        return Err(invalid(
            "container",
            name,
            "must start with a letter or digit and not contain '--'",
        ));
    }
    Ok(())
}
