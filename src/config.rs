//! Deployment configuration module.
//!
//! Handles loading, validating and merging `pageship.toml`. Stock defaults are
//! the base layer; the user's file is merged on top, and the CI context
//! (change request id) is applied last through [`BuildContext`].
//!
//! ## Config File Location
//!
//! `pageship.toml` lives in the workspace root, next to the build output:
//!
//! ```text
//! workspace/
//! ├── pageship.toml
//! ├── build/                 # upstream compiler output
//! │   ├── serverless/pages/
//! │   └── static/
//! └── public/
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! subscription = "00000000-0000-0000-0000-000000000000"   # required
//! resource_group = "web-rg"                               # required
//! location = "westeurope"                                 # required
//! app_name = "shop-web"                                   # required
//! storage_account = "shopweb"                             # required
//! plan = "shop-plan"       # optional; omit for a consumption plan
//! container = "assets"     # blob container for static assets
//! build_dir = "build"      # upstream build output, relative to the workspace
//! public_dir = "public"    # author assets, relative to the workspace
//!
//! [runtime]
//! functions_version = "4"
//! node_version = "18"
//!
//! [upload]
//! attempts = 3             # function package upload attempts
//! backoff_secs = 5         # fixed wait between attempts
//!
//! [ephemeral]
//! enabled = false          # per-change-request deployments
//! # change_request = 42
//!
//! [app_settings]           # applied verbatim to the function app
//! # API_URL = "https://api.example.com"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up in the workspace root.
pub const CONFIG_FILENAME: &str = "pageship.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Missing required config field: {0}")]
    Missing(&'static str),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Deployment configuration loaded from `pageship.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    /// Cloud subscription the resources live in.
    pub subscription: String,
    pub resource_group: String,
    /// Region for every created resource.
    pub location: String,
    /// Base function app name (suffixed in ephemeral mode).
    pub app_name: String,
    /// Base storage account name (prefixed in ephemeral mode).
    pub storage_account: String,
    /// Existing app service plan. `None` means a consumption plan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Blob container base name for static assets.
    pub container: String,
    /// Upstream build output directory, relative to the workspace.
    pub build_dir: String,
    /// Author-supplied public assets, relative to the workspace.
    pub public_dir: String,
    pub runtime: RuntimeConfig,
    pub upload: UploadConfig,
    pub ephemeral: EphemeralConfig,
    /// Applied verbatim as application settings on the function app.
    pub app_settings: BTreeMap<String, String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            subscription: String::new(),
            resource_group: String::new(),
            location: String::new(),
            app_name: String::new(),
            storage_account: String::new(),
            plan: None,
            container: "assets".to_string(),
            build_dir: "build".to_string(),
            public_dir: "public".to_string(),
            runtime: RuntimeConfig::default(),
            upload: UploadConfig::default(),
            ephemeral: EphemeralConfig::default(),
            app_settings: BTreeMap::new(),
        }
    }
}

impl DeployConfig {
    /// Check required fields and value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("subscription", &self.subscription),
            ("resource_group", &self.resource_group),
            ("location", &self.location),
            ("app_name", &self.app_name),
            ("storage_account", &self.storage_account),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(field));
            }
        }
        if self.container.trim().is_empty() {
            return Err(ConfigError::Validation("container must not be empty".into()));
        }
        if self.upload.attempts == 0 {
            return Err(ConfigError::Validation(
                "upload.attempts must be at least 1".into(),
            ));
        }
        if self.ephemeral.enabled && self.ephemeral.change_request.is_none() {
            return Err(ConfigError::Validation(
                "ephemeral.enabled requires ephemeral.change_request".into(),
            ));
        }
        Ok(())
    }

    /// Pages directory inside the build output.
    pub fn pages_dir(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.build_dir).join("serverless").join("pages")
    }

    /// Build-generated assets, uploaded under `_next/static`.
    pub fn static_dir(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.build_dir).join("static")
    }

    pub fn public_dir(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.public_dir)
    }

    /// Apply CLI/CI context on top of the loaded file.
    pub fn with_context(mut self, context: &BuildContext) -> Self {
        if let Some(id) = context.change_request {
            self.ephemeral.enabled = true;
            self.ephemeral.change_request = Some(id);
        }
        self
    }
}

/// Function host runtime versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub functions_version: String,
    pub node_version: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            functions_version: "4".to_string(),
            node_version: "18".to_string(),
        }
    }
}

/// Function package upload retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Fixed wait between attempts, in seconds.
    pub backoff_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_secs: 5,
        }
    }
}

impl UploadConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

/// Per-change-request deployments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EphemeralConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_request: Option<u64>,
}

// =============================================================================
// Build context
// =============================================================================

/// Ambient CI state, gathered once in `main` and passed in explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildContext {
    /// Workspace root: the directory holding `pageship.toml` and the build.
    pub workspace: PathBuf,
    /// Change request being deployed, if this is a per-change deployment.
    pub change_request: Option<u64>,
}

/// Extract a change request number from a CI ref like `refs/pull/42/merge`.
pub fn change_request_from_ref(git_ref: &str) -> Option<u64> {
    let rest = git_ref.strip_prefix("refs/pull/")?;
    let (number, _) = rest.split_once('/').unwrap_or((rest, ""));
    number.parse().ok()
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(DeployConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value. `Ok(None)` if it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, apply the build
/// context, deserialize and validate.
pub fn resolve_config(
    overlay: Option<toml::Value>,
    context: &BuildContext,
) -> Result<DeployConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: DeployConfig = merged.try_into()?;
    let config = config.with_context(context);
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path` (defaults if it does not exist), apply the
/// build context and validate.
pub fn load_config(path: &Path, context: &BuildContext) -> Result<DeployConfig, ConfigError> {
    let overlay = load_raw_config(path)?;
    resolve_config(overlay, context)
}

/// Returns a fully-commented stock `pageship.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pageship configuration
# ======================
# Required keys have no default and must be filled in.
# Everything else shows its default value.
# Unknown keys cause an error.

# Cloud subscription id (required).
subscription = ""

# Resource group that holds every resource (required, created if missing).
resource_group = ""

# Region for created resources (required), e.g. "westeurope".
location = ""

# Function app name (required). In ephemeral mode it becomes
# "<app_name>-<change request>", shortened to fit 60 characters.
app_name = ""

# Storage account name (required). 3-24 lowercase letters and digits.
# In ephemeral mode it becomes "pr<storage_account>", cut at 24 characters.
storage_account = ""

# Existing app service plan. Omit to run on a consumption plan.
# plan = "my-plan"

# Blob container for static assets. Suffixed with the change request
# number in ephemeral mode.
container = "assets"

# Upstream build output, relative to the workspace.
build_dir = "build"

# Author-supplied public assets, relative to the workspace.
public_dir = "public"

# ---------------------------------------------------------------------------
# Function host runtime
# ---------------------------------------------------------------------------
[runtime]
functions_version = "4"
node_version = "18"

# ---------------------------------------------------------------------------
# Function package upload
# ---------------------------------------------------------------------------
[upload]
# Total attempts, including the first one.
attempts = 3
# Fixed wait between attempts, in seconds.
backoff_secs = 5

# ---------------------------------------------------------------------------
# Per-change-request deployments
# ---------------------------------------------------------------------------
[ephemeral]
enabled = false
# change_request = 42

# ---------------------------------------------------------------------------
# Application settings, applied verbatim to the function app
# ---------------------------------------------------------------------------
[app_settings]
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
subscription = "sub"
resource_group = "rg"
location = "westeurope"
app_name = "web"
storage_account = "webstore"
"#;

    fn write_config(contents: &str) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&path, contents).unwrap();
        (tmp, path)
    }

    #[test]
    fn defaults() {
        let config = DeployConfig::default();
        assert_eq!(config.container, "assets");
        assert_eq!(config.build_dir, "build");
        assert_eq!(config.upload.attempts, 3);
        assert_eq!(config.upload.backoff(), Duration::from_secs(5));
        assert!(config.plan.is_none());
        assert!(!config.ephemeral.enabled);
    }

    #[test]
    fn minimal_config_loads() {
        let (_tmp, path) = write_config(MINIMAL);
        let config = load_config(&path, &BuildContext::default()).unwrap();
        assert_eq!(config.app_name, "web");
        assert_eq!(config.container, "assets");
        assert!(config.app_settings.is_empty());
    }

    #[test]
    fn missing_required_field() {
        let (_tmp, path) = write_config("subscription = \"sub\"\n");
        let err = load_config(&path, &BuildContext::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("resource_group")));
    }

    #[test]
    fn missing_file_reports_first_required_field() {
        let tmp = TempDir::new().unwrap();
        let err = load_config(&tmp.path().join("nope.toml"), &BuildContext::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("subscription")));
    }

    #[test]
    fn app_settings_and_plan() {
        let toml = format!(
            "{MINIMAL}plan = \"shared\"\n[app_settings]\nAPI_URL = \"https://api\"\nMODE = \"prod\"\n"
        );
        let (_tmp, path) = write_config(&toml);
        let config = load_config(&path, &BuildContext::default()).unwrap();
        assert_eq!(config.plan.as_deref(), Some("shared"));
        assert_eq!(config.app_settings["API_URL"], "https://api");
        assert_eq!(config.app_settings.len(), 2);
    }

    #[test]
    fn unknown_key_rejected() {
        let (_tmp, path) = write_config(&format!("{MINIMAL}app_nmae = \"typo\"\n"));
        assert!(matches!(
            load_config(&path, &BuildContext::default()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn unknown_nested_key_rejected() {
        let (_tmp, path) = write_config(&format!("{MINIMAL}[upload]\nretries = 9\n"));
        assert!(load_config(&path, &BuildContext::default()).is_err());
    }

    #[test]
    fn zero_attempts_rejected() {
        let (_tmp, path) = write_config(&format!("{MINIMAL}[upload]\nattempts = 0\n"));
        assert!(matches!(
            load_config(&path, &BuildContext::default()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn ephemeral_without_id_rejected() {
        let (_tmp, path) = write_config(&format!("{MINIMAL}[ephemeral]\nenabled = true\n"));
        assert!(matches!(
            load_config(&path, &BuildContext::default()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn context_enables_ephemeral_mode() {
        let (_tmp, path) = write_config(MINIMAL);
        let context = BuildContext {
            workspace: PathBuf::from("."),
            change_request: Some(42),
        };
        let config = load_config(&path, &context).unwrap();
        assert!(config.ephemeral.enabled);
        assert_eq!(config.ephemeral.change_request, Some(42));
    }

    #[test]
    fn change_request_ref_parsing() {
        assert_eq!(change_request_from_ref("refs/pull/42/merge"), Some(42));
        assert_eq!(change_request_from_ref("refs/pull/7"), Some(7));
        assert_eq!(change_request_from_ref("refs/heads/main"), None);
        assert_eq!(change_request_from_ref("refs/pull/abc/merge"), None);
    }

    #[test]
    fn directory_layout() {
        let config = DeployConfig::default();
        let ws = Path::new("/ws");
        assert_eq!(config.pages_dir(ws), Path::new("/ws/build/serverless/pages"));
        assert_eq!(config.static_dir(ws), Path::new("/ws/build/static"));
        assert_eq!(config.public_dir(ws), Path::new("/ws/public"));
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str("[upload]\nattempts = 3\nbackoff_secs = 5\n").unwrap();
        let overlay: toml::Value = toml::from_str("[upload]\nattempts = 5\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["upload"]["attempts"].as_integer(), Some(5));
        assert_eq!(merged["upload"]["backoff_secs"].as_integer(), Some(5));
    }

    #[test]
    fn resolve_config_without_overlay_is_missing_fields() {
        assert!(matches!(
            resolve_config(None, &BuildContext::default()),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let value: toml::Value = toml::from_str(stock_config_toml()).unwrap();
        let config: DeployConfig = merge_toml(stock_defaults_value(), value)
            .try_into()
            .unwrap();
        assert_eq!(config, DeployConfig::default());
    }
}
