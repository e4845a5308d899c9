//! End-to-end pipeline wiring.
//!
//! Connects the stages in order and tags every failure with the phase it
//! came from:
//!
//! ```text
//! config → target → classify → routes → handlers → package → deploy
//! ```
//!
//! The CLI calls into these functions; each stage module stays usable on its
//! own for the single-stage subcommands.

use crate::classify::{self, ClassifyError};
use crate::config::{ConfigError, DeployConfig};
use crate::deploy::{self, CloudProvider, DeployError, DeployReport, Step, TeardownError};
use crate::handler::{self, SynthesizedHandler};
use crate::package::{self, PackageError, PackageLayout, PackageOutput};
use crate::routes::{self, RouteError};
use crate::target::{DeploymentTarget, TargetError};
use crate::types::{Page, RouteEntry};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("target: {0}")]
    Target(#[from] TargetError),
    #[error("classify: {0}")]
    Classify(#[from] ClassifyError),
    #[error("routes: {0}")]
    Routes(#[from] RouteError),
    #[error("handlers: {0}")]
    Handlers(#[from] serde_json::Error),
    #[error("package: {0}")]
    Package(#[from] PackageError),
    #[error("deploy: {0}")]
    Deploy(#[from] DeployError),
    #[error("teardown: {0}")]
    Teardown(#[from] TeardownError),
}

/// Everything derived from the build tree before any file is written.
#[derive(Debug, Clone)]
pub struct Plan {
    pub target: DeploymentTarget,
    pub pages: Vec<Page>,
    pub routes: Vec<RouteEntry>,
    pub handlers: Vec<SynthesizedHandler>,
}

/// Classify the build, order its routes and synthesize its handlers.
pub fn plan(config: &DeployConfig, workspace: &Path) -> Result<Plan, PipelineError> {
    let target = DeploymentTarget::resolve(config)?;
    let pages = classify::classify(&config.pages_dir(workspace))?;
    log::info!("classified {} page module(s)", pages.len());
    let routes = routes::build(&pages, &target.asset_base_url())?;
    let handlers = handler::synthesize_all(&pages)?;
    log::info!(
        "{} route(s), {} function(s)",
        routes.len(),
        handlers.len()
    );
    Ok(Plan {
        target,
        pages,
        routes,
        handlers,
    })
}

/// Write the function package and asset trees for a plan into `out_dir`.
pub fn package_plan(
    plan: &Plan,
    config: &DeployConfig,
    workspace: &Path,
    out_dir: &Path,
) -> Result<PackageOutput, PipelineError> {
    let layout = PackageLayout {
        pages: &plan.pages,
        routes: &plan.routes,
        handlers: &plan.handlers,
        pages_dir: config.pages_dir(workspace),
        static_dir: config.static_dir(workspace),
        public_dir: config.public_dir(workspace),
        output_dir: out_dir.to_path_buf(),
        package_name: plan.target.package_name(),
        asset_base_url: plan.target.asset_base_url(),
    };
    Ok(package::package(&layout)?)
}

/// Plan, package and deploy in one go.
pub fn build_and_deploy<P: CloudProvider + ?Sized>(
    provider: &P,
    config: &DeployConfig,
    workspace: &Path,
    out_dir: &Path,
) -> Result<(Plan, PackageOutput, DeployReport), PipelineError> {
    let plan = plan(config, workspace)?;
    let output = package_plan(&plan, config, workspace, out_dir)?;
    let report = deploy::deploy(provider, &plan.target, config, &output)?;
    Ok((plan, output, report))
}

/// Deploy the output of an earlier [`package_plan`] run in `out_dir`.
///
/// The package must have been built for the target `config` resolves to.
pub fn deploy_package<P: CloudProvider + ?Sized>(
    provider: &P,
    config: &DeployConfig,
    out_dir: &Path,
) -> Result<(DeploymentTarget, DeployReport), PipelineError> {
    let target = DeploymentTarget::resolve(config)?;
    let output = package::load_output(out_dir)?;
    package::verify_target(&output, &target)?;
    let report = deploy::deploy(provider, &target, config, &output)?;
    Ok((target, report))
}

/// Remove the resources of the configured target.
///
/// Only ephemeral targets can be torn down.
pub fn teardown<P: CloudProvider + ?Sized>(
    provider: &P,
    config: &DeployConfig,
) -> Result<(DeploymentTarget, Vec<Step>), PipelineError> {
    let target = DeploymentTarget::resolve(config)?;
    target.require_ephemeral()?;
    let done = deploy::teardown(provider, &target)?;
    Ok((target, done))
}
