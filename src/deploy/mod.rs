//! Deployment orchestration.
//!
//! Stage 4 of the pipeline. Drives a [`CloudProvider`] through a fixed,
//! ordered list of steps:
//!
//! ```text
//! ensure resource group
//! ensure storage account
//! ensure asset container
//! set container public read
//! ensure function app
//! enable run-from-package
//! upload function package      (retried)
//! upload asset tree            → container root
//! upload public assets         → container `public/`
//! apply application settings
//! ```
//!
//! Every step is idempotent, so rerunning a deployment against existing
//! resources converges instead of failing. Only the package upload is
//! retried: up to `upload.attempts` tries with a fixed `upload.backoff_secs`
//! wait in between. Any other failure stops the run with the step name and
//! the provider's error.
//!
//! Teardown removes the function app, the asset container and the telemetry
//! component. All three are attempted even when one fails; failures are
//! collected into one [`TeardownError`].

pub mod az;
pub mod provider;

pub use az::AzCli;
pub use provider::{CloudProvider, ProviderError};

use crate::config::DeployConfig;
use crate::package::PackageOutput;
use crate::target::DeploymentTarget;
use std::fmt;
use std::thread;
use thiserror::Error;

/// One unit of deploy or teardown work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    EnsureResourceGroup,
    EnsureStorageAccount,
    EnsureContainer,
    SetContainerPublic,
    EnsureFunctionApp,
    EnableRunFromPackage,
    UploadPackage,
    UploadAssets,
    UploadPublic,
    ApplySettings,
    DeleteApp,
    DeleteContainer,
    DeleteTelemetry,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::EnsureResourceGroup => "ensure resource group",
            Step::EnsureStorageAccount => "ensure storage account",
            Step::EnsureContainer => "ensure asset container",
            Step::SetContainerPublic => "set container public read",
            Step::EnsureFunctionApp => "ensure function app",
            Step::EnableRunFromPackage => "enable run-from-package",
            Step::UploadPackage => "upload function package",
            Step::UploadAssets => "upload asset tree",
            Step::UploadPublic => "upload public assets",
            Step::ApplySettings => "apply application settings",
            Step::DeleteApp => "delete function app",
            Step::DeleteContainer => "delete asset container",
            Step::DeleteTelemetry => "delete telemetry component",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("{step} failed: {source}")]
    Step {
        step: Step,
        #[source]
        source: ProviderError,
    },
    #[error("{step} failed after {attempts} attempt(s): {source}")]
    UploadExhausted {
        step: Step,
        attempts: u32,
        #[source]
        source: ProviderError,
    },
}

/// Every teardown step that failed. Steps that succeeded are not listed.
#[derive(Error, Debug)]
#[error("teardown incomplete, {} step(s) failed:\n{}", .failures.len(), format_failures(.failures))]
pub struct TeardownError {
    pub failures: Vec<(Step, ProviderError)>,
}

fn format_failures(failures: &[(Step, ProviderError)]) -> String {
    failures
        .iter()
        .map(|(step, e)| format!("  {step}: {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Outcome of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    /// Completed steps, in execution order.
    pub steps: Vec<Step>,
    /// Attempts the package upload took, including the successful one.
    pub upload_attempts: u32,
    pub endpoint: String,
}

/// Run every deploy step against `provider`.
pub fn deploy<P: CloudProvider + ?Sized>(
    provider: &P,
    target: &DeploymentTarget,
    config: &DeployConfig,
    package: &PackageOutput,
) -> Result<DeployReport, DeployError> {
    let mut steps = Vec::new();

    record(
        &mut steps,
        Step::EnsureResourceGroup,
        provider.ensure_resource_group(target),
    )?;
    record(
        &mut steps,
        Step::EnsureStorageAccount,
        provider.ensure_storage_account(target),
    )?;
    record(
        &mut steps,
        Step::EnsureContainer,
        provider.ensure_container(target),
    )?;
    record(
        &mut steps,
        Step::SetContainerPublic,
        provider.set_container_public(target),
    )?;
    record(
        &mut steps,
        Step::EnsureFunctionApp,
        provider.ensure_function_app(target, &config.runtime),
    )?;
    record(
        &mut steps,
        Step::EnableRunFromPackage,
        provider.enable_run_from_package(target),
    )?;

    let upload_attempts = upload_with_retry(provider, target, config, package)?;
    record(&mut steps, Step::UploadPackage, Ok(()))?;

    record(
        &mut steps,
        Step::UploadAssets,
        provider.upload_tree(target, &package.assets_dir, ""),
    )?;
    record(
        &mut steps,
        Step::UploadPublic,
        provider.upload_tree(target, &package.public_dir, "public"),
    )?;
    record(
        &mut steps,
        Step::ApplySettings,
        provider.apply_settings(target, &config.app_settings),
    )?;

    Ok(DeployReport {
        steps,
        upload_attempts,
        endpoint: target.endpoint_url(),
    })
}

fn record(
    steps: &mut Vec<Step>,
    step: Step,
    result: Result<(), ProviderError>,
) -> Result<(), DeployError> {
    result.map_err(|source| DeployError::Step { step, source })?;
    log::info!("{step}: done");
    steps.push(step);
    Ok(())
}

/// Upload the function package, retrying with a fixed backoff. Returns the
/// number of attempts used.
fn upload_with_retry<P: CloudProvider + ?Sized>(
    provider: &P,
    target: &DeploymentTarget,
    config: &DeployConfig,
    package: &PackageOutput,
) -> Result<u32, DeployError> {
    let max = config.upload.attempts.max(1);
    let mut attempt = 1;
    loop {
        match provider.upload_archive(target, &package.archive) {
            Ok(()) => return Ok(attempt),
            Err(source) if attempt >= max => {
                return Err(DeployError::UploadExhausted {
                    step: Step::UploadPackage,
                    attempts: attempt,
                    source,
                });
            }
            Err(e) => {
                log::warn!(
                    "{} attempt {attempt}/{max} failed, retrying in {}s: {e}",
                    Step::UploadPackage,
                    config.upload.backoff_secs
                );
                thread::sleep(config.upload.backoff());
                attempt += 1;
            }
        }
    }
}

/// Delete the app, its asset container and its telemetry component.
///
/// Returns the steps that succeeded. If any step failed, the error lists
/// every failure.
pub fn teardown<P: CloudProvider + ?Sized>(
    provider: &P,
    target: &DeploymentTarget,
) -> Result<Vec<Step>, TeardownError> {
    let results = [
        (Step::DeleteApp, provider.delete_app(target)),
        (Step::DeleteContainer, provider.delete_container(target)),
        (Step::DeleteTelemetry, provider.delete_telemetry(target)),
    ];

    let mut done = Vec::new();
    let mut failures = Vec::new();
    for (step, result) in results {
        match result {
            Ok(()) => {
                log::info!("{step}: done");
                done.push(step);
            }
            Err(e) => {
                log::warn!("{step} failed: {e}");
                failures.push((step, e));
            }
        }
    }

    if failures.is_empty() {
        Ok(done)
    } else {
        Err(TeardownError { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::provider::tests::{FakeProvider, RecordedOp};
    use super::*;
    use std::path::PathBuf;

    fn config() -> DeployConfig {
        let mut c = DeployConfig {
            subscription: "sub".into(),
            resource_group: "rg".into(),
            location: "westeurope".into(),
            app_name: "web".into(),
            storage_account: "webstore".into(),
            ..DeployConfig::default()
        };
        c.upload.backoff_secs = 0;
        c.app_settings.insert("API_URL".into(), "https://api.example.com".into());
        c
    }

    fn target(config: &DeployConfig) -> DeploymentTarget {
        DeploymentTarget::resolve(config).unwrap()
    }

    fn package() -> PackageOutput {
        PackageOutput {
            archive: PathBuf::from("/out/web.zip"),
            manifest: PathBuf::from("/out/package.txt"),
            assets_dir: PathBuf::from("/out/assets"),
            public_dir: PathBuf::from("/out/public"),
            entries: vec!["host.json".into(), "proxies.json".into()],
            functions: Vec::new(),
            assets: vec!["index.html".into()],
            public_assets: Vec::new(),
        }
    }

    fn is_upload(op: &RecordedOp) -> bool {
        matches!(op, RecordedOp::UploadArchive(_))
    }

    #[test]
    fn steps_run_in_order() {
        let provider = FakeProvider::new();
        let c = config();
        let report = deploy(&provider, &target(&c), &c, &package()).unwrap();
        assert_eq!(
            report.steps,
            vec![
                Step::EnsureResourceGroup,
                Step::EnsureStorageAccount,
                Step::EnsureContainer,
                Step::SetContainerPublic,
                Step::EnsureFunctionApp,
                Step::EnableRunFromPackage,
                Step::UploadPackage,
                Step::UploadAssets,
                Step::UploadPublic,
                Step::ApplySettings,
            ]
        );
        assert_eq!(report.upload_attempts, 1);
        assert_eq!(report.endpoint, "https://web.azurewebsites.net");
    }

    #[test]
    fn asset_trees_uploaded_to_their_prefixes() {
        let provider = FakeProvider::new();
        let c = config();
        deploy(&provider, &target(&c), &c, &package()).unwrap();
        let uploads: Vec<RecordedOp> = provider
            .get_operations()
            .into_iter()
            .filter(|op| matches!(op, RecordedOp::UploadTree { .. }))
            .collect();
        assert_eq!(
            uploads,
            vec![
                RecordedOp::UploadTree {
                    source: "/out/assets".into(),
                    destination: "".into()
                },
                RecordedOp::UploadTree {
                    source: "/out/public".into(),
                    destination: "public".into()
                },
            ]
        );
    }

    #[test]
    fn upload_succeeds_on_third_attempt() {
        let provider = FakeProvider::new().fail("upload_archive", 2);
        let c = config();
        let report = deploy(&provider, &target(&c), &c, &package()).unwrap();
        assert_eq!(report.upload_attempts, 3);
        assert_eq!(provider.count(is_upload), 3);
        assert!(report.steps.contains(&Step::ApplySettings));
    }

    #[test]
    fn upload_exhaustion_is_fatal() {
        let provider = FakeProvider::new().fail("upload_archive", 3);
        let c = config();
        let err = deploy(&provider, &target(&c), &c, &package()).unwrap_err();
        assert!(matches!(
            err,
            DeployError::UploadExhausted { attempts: 3, .. }
        ));
        assert_eq!(provider.count(is_upload), 3);
        // Nothing after the upload ran.
        assert!(
            !provider
                .get_operations()
                .iter()
                .any(|op| matches!(op, RecordedOp::UploadTree { .. }))
        );
    }

    #[test]
    fn attempts_follow_config() {
        let provider = FakeProvider::new().fail("upload_archive", 10);
        let mut c = config();
        c.upload.attempts = 5;
        let err = deploy(&provider, &target(&c), &c, &package()).unwrap_err();
        assert!(matches!(
            err,
            DeployError::UploadExhausted { attempts: 5, .. }
        ));
    }

    #[test]
    fn other_steps_are_not_retried() {
        let provider = FakeProvider::new().fail("ensure_container", 1);
        let c = config();
        let err = deploy(&provider, &target(&c), &c, &package()).unwrap_err();
        assert!(matches!(
            err,
            DeployError::Step {
                step: Step::EnsureContainer,
                ..
            }
        ));
        assert_eq!(
            provider.count(|op| matches!(op, RecordedOp::EnsureContainer(_))),
            1
        );
        let msg = err.to_string();
        assert!(msg.starts_with("ensure asset container failed"));
        assert!(msg.contains("scripted failure"));
    }

    #[test]
    fn deploy_twice_converges() {
        let provider = FakeProvider::new();
        let c = config();
        let t = target(&c);
        deploy(&provider, &t, &c, &package()).unwrap();
        let first = provider.get_resources();
        deploy(&provider, &t, &c, &package()).unwrap();
        assert_eq!(provider.get_resources(), first);
    }

    #[test]
    fn existing_resources_are_kept() {
        let provider = FakeProvider::new().with_resources(&["group:rg", "storage:webstore"]);
        let c = config();
        deploy(&provider, &target(&c), &c, &package()).unwrap();
        let resources = provider.get_resources();
        assert!(resources.contains("group:rg"));
        assert!(resources.contains("storage:webstore"));
        assert!(resources.contains("app:web"));
    }

    #[test]
    fn plan_forwarded_to_function_app() {
        let provider = FakeProvider::new();
        let mut c = config();
        c.plan = Some("shared-plan".into());
        deploy(&provider, &target(&c), &c, &package()).unwrap();
        assert!(provider.get_operations().contains(&RecordedOp::EnsureFunctionApp {
            app: "web".into(),
            plan: Some("shared-plan".into()),
        }));
    }

    #[test]
    fn settings_applied_verbatim() {
        let provider = FakeProvider::new();
        let c = config();
        deploy(&provider, &target(&c), &c, &package()).unwrap();
        assert!(provider.get_operations().contains(&RecordedOp::ApplySettings(vec![(
            "API_URL".into(),
            "https://api.example.com".into()
        )])));
    }

    #[test]
    fn teardown_removes_everything() {
        let provider = FakeProvider::new();
        let c = config();
        let t = target(&c);
        deploy(&provider, &t, &c, &package()).unwrap();
        let done = teardown(&provider, &t).unwrap();
        assert_eq!(
            done,
            vec![Step::DeleteApp, Step::DeleteContainer, Step::DeleteTelemetry]
        );
        let resources = provider.get_resources();
        assert!(!resources.contains("app:web"));
        assert!(!resources.contains("container:assets"));
        assert!(!resources.contains("telemetry:web"));
    }

    #[test]
    fn teardown_attempts_all_and_aggregates() {
        let provider = FakeProvider::new()
            .fail("delete_app", 1)
            .fail("delete_telemetry", 1);
        let c = config();
        let err = teardown(&provider, &target(&c)).unwrap_err();

        let failed: Vec<Step> = err.failures.iter().map(|(s, _)| *s).collect();
        assert_eq!(failed, vec![Step::DeleteApp, Step::DeleteTelemetry]);
        assert_eq!(provider.get_operations().len(), 3);

        let msg = err.to_string();
        assert!(msg.starts_with("teardown incomplete, 2 step(s) failed"));
        assert!(msg.contains("delete function app"));
        assert!(msg.contains("delete telemetry component"));
    }

    #[test]
    fn ephemeral_targets_are_isolated() {
        let provider = FakeProvider::new();
        let mut a = config();
        a.ephemeral.enabled = true;
        a.ephemeral.change_request = Some(1);
        let mut b = a.clone();
        b.ephemeral.change_request = Some(2);

        deploy(&provider, &target(&a), &a, &package()).unwrap();
        deploy(&provider, &target(&b), &b, &package()).unwrap();
        teardown(&provider, &target(&a)).unwrap();

        let resources = provider.get_resources();
        assert!(!resources.contains("app:web-1"));
        assert!(resources.contains("app:web-2"));
        assert!(resources.contains("container:assets-2"));
    }
}
