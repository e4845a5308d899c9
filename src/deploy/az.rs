//! [`CloudProvider`] backed by the `az` command line tool.
//!
//! One `az` invocation per operation, run to completion before the next one
//! starts. A failing command surfaces its exit status and stderr unchanged.
//!
//! `ensure_*` operations either use `az` commands that are idempotent on
//! their own (`group create`, `storage container create`) or probe with
//! `show` first and only create when the probe reports the resource missing.
//!
//! In dry-run mode nothing is executed: each command is logged, every probe
//! reports the resource as missing, and every operation succeeds.

use super::provider::{CloudProvider, ProviderError};
use crate::config::RuntimeConfig;
use crate::target::DeploymentTarget;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Command, Stdio};

#[derive(Debug, Clone)]
pub struct AzCli {
    program: String,
    dry_run: bool,
}

impl Default for AzCli {
    fn default() -> Self {
        Self::new()
    }
}

impl AzCli {
    pub fn new() -> Self {
        Self {
            program: "az".to_string(),
            dry_run: false,
        }
    }

    /// Log commands instead of running them.
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::new()
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn render(&self, args: &[String]) -> String {
        let mut line = self.program.clone();
        for arg in args {
            line.push(' ');
            if arg.contains(char::is_whitespace) || arg.is_empty() {
                line.push_str(&format!("{arg:?}"));
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Run a command; non-zero exit is an error carrying stderr.
    fn run(&self, args: &[String]) -> Result<String, ProviderError> {
        let command = self.render(args);
        if self.dry_run {
            log::info!("[dry-run] {command}");
            return Ok(String::new());
        }
        log::debug!("running {command}");
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(ProviderError::Command {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a `show` probe: `true` if the resource exists.
    ///
    /// Only a "not found" answer counts as missing. Any other failure, such
    /// as an expired login, is returned with the probe's stderr.
    fn exists(&self, args: &[String]) -> Result<bool, ProviderError> {
        let command = self.render(args);
        if self.dry_run {
            log::info!("[dry-run] {command}");
            return Ok(false);
        }
        log::debug!("probing {command}");
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        if is_not_found(output.status.code(), &stderr) {
            log::debug!("probe found nothing: {stderr}");
            return Ok(false);
        }
        Err(ProviderError::Command {
            command,
            status: output.status.to_string(),
            stderr,
        })
    }
}

/// Exit code `az` uses for a missing resource.
const NOT_FOUND_EXIT: i32 = 3;

fn is_not_found(code: Option<i32>, stderr: &str) -> bool {
    if code == Some(NOT_FOUND_EXIT) {
        return true;
    }
    let lower = stderr.to_ascii_lowercase();
    lower.contains("resourcenotfound")
        || lower.contains("was not found")
        || lower.contains("could not be found")
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Arguments every command scoped to the target's group takes.
fn scoped(target: &DeploymentTarget, parts: &[&str]) -> Vec<String> {
    let mut v = args(parts);
    v.extend(args(&[
        "--subscription",
        &target.subscription,
        "--resource-group",
        &target.resource_group,
    ]));
    v
}

/// Arguments for a data-plane blob command against the asset container.
fn blob(target: &DeploymentTarget, parts: &[&str]) -> Vec<String> {
    let mut v = args(parts);
    v.extend(args(&[
        "--subscription",
        &target.subscription,
        "--account-name",
        &target.storage_account,
        "--auth-mode",
        "login",
    ]));
    v
}

fn public_access_args(target: &DeploymentTarget) -> Vec<String> {
    blob(
        target,
        &[
            "storage",
            "container",
            "set-permission",
            "--name",
            &target.container,
            "--public-access",
            "blob",
        ],
    )
}

impl CloudProvider for AzCli {
    fn ensure_resource_group(&self, target: &DeploymentTarget) -> Result<(), ProviderError> {
        self.run(&args(&[
            "group",
            "create",
            "--subscription",
            &target.subscription,
            "--name",
            &target.resource_group,
            "--location",
            &target.location,
        ]))?;
        Ok(())
    }

    fn ensure_storage_account(&self, target: &DeploymentTarget) -> Result<(), ProviderError> {
        let name = &target.storage_account;
        if self.exists(&scoped(target, &["storage", "account", "show", "--name", name]))? {
            log::debug!("storage account {name} exists");
            return Ok(());
        }
        self.run(&scoped(
            target,
            &[
                "storage",
                "account",
                "create",
                "--name",
                name,
                "--location",
                &target.location,
                "--sku",
                "Standard_LRS",
                "--kind",
                "StorageV2",
                "--allow-blob-public-access",
                "true",
            ],
        ))?;
        Ok(())
    }

    fn ensure_container(&self, target: &DeploymentTarget) -> Result<(), ProviderError> {
        self.run(&blob(
            target,
            &["storage", "container", "create", "--name", &target.container],
        ))?;
        Ok(())
    }

    fn set_container_public(&self, target: &DeploymentTarget) -> Result<(), ProviderError> {
        self.run(&public_access_args(target))?;
        Ok(())
    }

    fn ensure_function_app(
        &self,
        target: &DeploymentTarget,
        runtime: &RuntimeConfig,
    ) -> Result<(), ProviderError> {
        let app = &target.app_name;
        if self.exists(&scoped(target, &["functionapp", "show", "--name", app]))? {
            log::debug!("function app {app} exists");
            return Ok(());
        }
        let mut create = scoped(
            target,
            &[
                "functionapp",
                "create",
                "--name",
                app,
                "--storage-account",
                &target.storage_account,
                "--runtime",
                "node",
                "--runtime-version",
                &runtime.node_version,
                "--functions-version",
                &runtime.functions_version,
                "--os-type",
                "Windows",
            ],
        );
        match &target.plan {
            Some(plan) => create.extend(args(&["--plan", plan])),
            None => create.extend(args(&["--consumption-plan-location", &target.location])),
        }
        self.run(&create)?;
        Ok(())
    }

    fn enable_run_from_package(&self, target: &DeploymentTarget) -> Result<(), ProviderError> {
        self.run(&scoped(
            target,
            &[
                "functionapp",
                "config",
                "appsettings",
                "set",
                "--name",
                &target.app_name,
                "--settings",
                "WEBSITE_RUN_FROM_PACKAGE=1",
            ],
        ))?;
        Ok(())
    }

    fn upload_archive(
        &self,
        target: &DeploymentTarget,
        archive: &Path,
    ) -> Result<(), ProviderError> {
        let src = archive.to_string_lossy();
        self.run(&scoped(
            target,
            &[
                "functionapp",
                "deployment",
                "source",
                "config-zip",
                "--name",
                &target.app_name,
                "--src",
                &src,
            ],
        ))?;
        Ok(())
    }

    fn upload_tree(
        &self,
        target: &DeploymentTarget,
        source: &Path,
        destination: &str,
    ) -> Result<(), ProviderError> {
        let src = source.to_string_lossy();
        let mut upload = blob(
            target,
            &[
                "storage",
                "blob",
                "upload-batch",
                "--destination",
                &target.container,
                "--source",
                &src,
                "--overwrite",
            ],
        );
        if !destination.is_empty() {
            upload.extend(args(&["--destination-path", destination]));
        }
        self.run(&upload)?;
        Ok(())
    }

    fn apply_settings(
        &self,
        target: &DeploymentTarget,
        settings: &BTreeMap<String, String>,
    ) -> Result<(), ProviderError> {
        if settings.is_empty() {
            log::debug!("no application settings to apply");
            return Ok(());
        }
        let mut cmd = scoped(
            target,
            &[
                "functionapp",
                "config",
                "appsettings",
                "set",
                "--name",
                &target.app_name,
                "--settings",
            ],
        );
        cmd.extend(settings.iter().map(|(k, v)| format!("{k}={v}")));
        self.run(&cmd)?;
        Ok(())
    }

    fn delete_app(&self, target: &DeploymentTarget) -> Result<(), ProviderError> {
        self.run(&scoped(
            target,
            &["functionapp", "delete", "--name", &target.app_name],
        ))?;
        Ok(())
    }

    fn delete_container(&self, target: &DeploymentTarget) -> Result<(), ProviderError> {
        self.run(&blob(
            target,
            &["storage", "container", "delete", "--name", &target.container],
        ))?;
        Ok(())
    }

    fn delete_telemetry(&self, target: &DeploymentTarget) -> Result<(), ProviderError> {
        self.run(&scoped(
            target,
            &[
                "monitor",
                "app-insights",
                "component",
                "delete",
                "--app",
                target.telemetry_name(),
            ],
        ))?;
        Ok(())
    }
}
