//! Deployable artifact assembly.
//!
//! Stage 3 of the pipeline. Takes the classified pages, the ordered route
//! table and the synthesized handlers and lays out everything the deploy
//! stage uploads.
//!
//! ## Output Structure
//!
//! ```text
//! <out>/
//! ├── {app}.zip                # function package, uploaded as a whole
//! ├── package.txt              # archive file name
//! ├── assets/                  # uploaded to the container root
//! │   ├── index.html           # static pages at their html paths
//! │   ├── about.html
//! │   └── _next/static/...     # build-generated assets
//! └── public/...               # author assets, uploaded under `public/`
//! ```
//!
//! The archive is built from a working tree that is deleted afterwards:
//!
//! ```text
//! functions/
//! ├── host.json
//! ├── proxies.json
//! ├── blog-_slug/
//! │   ├── function.json
//! │   ├── index.js
//! │   └── page.js              # copy of the compiled module
//! └── ...
//! ```
//!
//! ## Proxies
//!
//! `proxies.json` holds the page routes plus `/_next/{*path}` and
//! `/public/{*path}`, which send asset requests made against the app host
//! to the container. [`verify_target`] checks a reloaded package against the
//! target it is about to be deployed to.
//!
//! ## Reproducibility
//!
//! Archive entries are stored uncompressed, in sorted path order, with a
//! fixed timestamp and fixed permissions. Two runs over the same build give
//! byte-identical archives.

use crate::handler::{BINDING_FILE, HANDLER_FILE, PAGE_MODULE_FILE, SynthesizedHandler};
use crate::routes::{self, FUNCTION_ROUTE_PREFIX, RouteError};
use crate::target::DeploymentTarget;
use crate::types::{Page, PageKind, RouteEntry};
use serde_json::{Map, Value, json};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const HOST_FILE: &str = "host.json";
pub const PROXIES_FILE: &str = "proxies.json";
pub const MANIFEST_FILE: &str = "package.txt";
pub const FUNCTIONS_DIR: &str = "functions";
pub const ASSETS_DIR: &str = "assets";
pub const PUBLIC_DIR: &str = "public";

const PROXIES_SCHEMA: &str = "http://json.schemastore.org/proxies";

/// Host the function runtime answers on from inside the app, used as the
/// backend of proxies that route into a function.
const LOCAL_BACKEND: &str = "https://localhost";

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Route error: {0}")]
    Routes(#[from] RouteError),
    #[error("No compiled module for {identifier} at {}", path.display())]
    MissingModule { identifier: String, path: PathBuf },
    #[error("package {found} was built for another target, expected {expected}")]
    TargetMismatch { found: String, expected: String },
    #[error("proxy backend {uri} is outside the asset container {expected}")]
    AssetBaseMismatch { uri: String, expected: String },
}

/// Inputs of one packaging run.
#[derive(Debug, Clone)]
pub struct PackageLayout<'a> {
    pub pages: &'a [Page],
    pub routes: &'a [RouteEntry],
    pub handlers: &'a [SynthesizedHandler],
    /// Compiled pages root; dynamic modules and static html are read here.
    pub pages_dir: PathBuf,
    /// Build-generated assets. Skipped when missing.
    pub static_dir: PathBuf,
    /// Author assets. Skipped when missing.
    pub public_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Archive file name, `{app}.zip`.
    pub package_name: String,
    /// Container URL the asset proxies point at.
    pub asset_base_url: String,
}

/// What a packaging run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOutput {
    pub archive: PathBuf,
    pub manifest: PathBuf,
    pub assets_dir: PathBuf,
    pub public_dir: PathBuf,
    /// Archive entry names, in archive order.
    pub entries: Vec<String>,
    /// Function names packaged, in handler order.
    pub functions: Vec<String>,
    /// Asset tree files relative to `assets_dir`, sorted.
    pub assets: Vec<String>,
    /// Author asset files relative to `public_dir`, sorted.
    pub public_assets: Vec<String>,
}

/// Assemble the function package and the asset tree.
pub fn package(layout: &PackageLayout) -> Result<PackageOutput, PackageError> {
    let out = &layout.output_dir;
    fs::create_dir_all(out)?;

    let work_dir = out.join(FUNCTIONS_DIR);
    let assets_dir = out.join(ASSETS_DIR);
    let public_dir = out.join(PUBLIC_DIR);
    let archive = out.join(&layout.package_name);
    let manifest = out.join(MANIFEST_FILE);

    // Stale output from an earlier run must not leak into this one.
    remove_dir_if_exists(&work_dir)?;
    remove_dir_if_exists(&assets_dir)?;
    remove_dir_if_exists(&public_dir)?;

    write_function_tree(layout, &work_dir)?;
    let entries = write_archive(&work_dir, &archive)?;
    fs::remove_dir_all(&work_dir)?;
    log::debug!("archived {} entries into {}", entries.len(), archive.display());

    fs::write(&manifest, format!("{}\n", layout.package_name))?;

    write_asset_tree(layout, &assets_dir)?;
    let assets = relative_files(&assets_dir)?;
    fs::create_dir_all(&public_dir)?;
    mirror_dir(&layout.public_dir, &public_dir)?;
    let public_assets = relative_files(&public_dir)?;

    Ok(PackageOutput {
        archive,
        manifest,
        assets_dir,
        public_dir,
        entries,
        functions: layout
            .handlers
            .iter()
            .map(|h| h.identifier.clone())
            .collect(),
        assets,
        public_assets,
    })
}

/// Reopen the result of an earlier [`package`] run in `out_dir`.
///
/// The archive name comes from `package.txt`; entries and function names
/// are read back from the archive itself.
pub fn load_output(out_dir: &Path) -> Result<PackageOutput, PackageError> {
    let manifest = out_dir.join(MANIFEST_FILE);
    let package_name = fs::read_to_string(&manifest)?.trim().to_string();
    let archive = out_dir.join(&package_name);

    let zip = zip::ZipArchive::new(File::open(&archive)?)?;
    let mut entries: Vec<String> = zip.file_names().map(str::to_string).collect();
    entries.sort();
    let functions = entries
        .iter()
        .filter_map(|e| e.strip_suffix(&format!("/{BINDING_FILE}")))
        .map(str::to_string)
        .collect();

    let assets_dir = out_dir.join(ASSETS_DIR);
    let public_dir = out_dir.join(PUBLIC_DIR);
    let assets = list_if_exists(&assets_dir)?;
    let public_assets = list_if_exists(&public_dir)?;

    Ok(PackageOutput {
        archive,
        manifest,
        assets_dir,
        public_dir,
        entries,
        functions,
        assets,
        public_assets,
    })
}

/// Check that a reloaded package was built for `target`.
///
/// The archive must carry the target's package name, and every proxy that
/// does not call into the app must point into the target's asset container.
pub fn verify_target(output: &PackageOutput, target: &DeploymentTarget) -> Result<(), PackageError> {
    let found = output
        .archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let expected = target.package_name();
    if found != expected {
        return Err(PackageError::TargetMismatch { found, expected });
    }

    let mut zip = zip::ZipArchive::new(File::open(&output.archive)?)?;
    let mut proxies = String::new();
    zip.by_name(PROXIES_FILE)?.read_to_string(&mut proxies)?;
    let proxies: Value = serde_json::from_str(&proxies)?;

    let base = format!("{}/", target.asset_base_url());
    let backends = proxies["proxies"]
        .as_object()
        .into_iter()
        .flat_map(|p| p.values())
        .filter_map(|p| p["backendUri"].as_str());
    for uri in backends {
        if !uri.starts_with(LOCAL_BACKEND) && !uri.starts_with(&base) {
            return Err(PackageError::AssetBaseMismatch {
                uri: uri.to_string(),
                expected: target.asset_base_url(),
            });
        }
    }
    Ok(())
}

fn list_if_exists(dir: &Path) -> Result<Vec<String>, PackageError> {
    if dir.is_dir() {
        relative_files(dir)
    } else {
        Ok(Vec::new())
    }
}

// ============================================================================
// Manifests
// ============================================================================

/// `host.json`: mounts HTTP triggers under the function route prefix.
pub fn host_json() -> Result<String, serde_json::Error> {
    let value = json!({
        "version": "2.0",
        "extensions": {
            "http": { "routePrefix": FUNCTION_ROUTE_PREFIX }
        }
    });
    pretty(&value)
}

/// `proxies.json` for an ordered route table.
///
/// The page routes are merged with the `/_next/` and `/public/` asset
/// proxies (see [`routes::with_asset_proxies`]). Keys carry a zero-padded
/// ordinal so the table order survives a host that sorts proxies by name.
pub fn proxies_json(routes: &[RouteEntry], asset_base_url: &str) -> Result<String, PackageError> {
    let routes = routes::with_asset_proxies(routes, asset_base_url)?;
    let width = routes.len().to_string().len().max(3);
    let mut proxies = Map::new();
    for (i, entry) in routes.iter().enumerate() {
        proxies.insert(
            format!("{:0width$}-{}", i, entry.name),
            json!({
                "matchCondition": { "route": entry.pattern },
                "backendUri": backend_uri(entry),
            }),
        );
    }
    Ok(pretty(&json!({
        "$schema": PROXIES_SCHEMA,
        "proxies": Value::Object(proxies),
    }))?)
}

/// Backend of one proxy. Dynamic routes forward every capture as a query
/// parameter of the function call.
pub fn backend_uri(entry: &RouteEntry) -> String {
    if entry.kind == PageKind::Static {
        return entry.target.clone();
    }
    let mut uri = format!("{LOCAL_BACKEND}{}", entry.target);
    for (i, name) in entry.captures.iter().enumerate() {
        uri.push(if i == 0 { '?' } else { '&' });
        uri.push_str(&format!("{name}={{{name}}}"));
    }
    uri
}

fn pretty(value: &Value) -> Result<String, serde_json::Error> {
    let mut s = serde_json::to_string_pretty(value)?;
    s.push('\n');
    Ok(s)
}

// ============================================================================
// Function tree and archive
// ============================================================================

fn write_function_tree(layout: &PackageLayout, work_dir: &Path) -> Result<(), PackageError> {
    fs::create_dir_all(work_dir)?;
    fs::write(work_dir.join(HOST_FILE), host_json()?)?;
    fs::write(
        work_dir.join(PROXIES_FILE),
        proxies_json(layout.routes, &layout.asset_base_url)?,
    )?;

    for handler in layout.handlers {
        let module = layout.pages_dir.join(&handler.source_path);
        if !module.is_file() {
            return Err(PackageError::MissingModule {
                identifier: handler.identifier.clone(),
                path: module,
            });
        }
        let dir = work_dir.join(&handler.identifier);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(HANDLER_FILE), &handler.handler_source)?;
        fs::write(dir.join(BINDING_FILE), &handler.binding)?;
        fs::copy(&module, dir.join(PAGE_MODULE_FILE))?;
    }
    Ok(())
}

/// Store every file under `root` into `archive`, sorted by entry name.
fn write_archive(root: &Path, archive: &Path) -> Result<Vec<String>, PackageError> {
    let entries = relative_files(root)?;
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(File::create(archive)?);
    let mut buf = Vec::new();
    for name in &entries {
        buf.clear();
        File::open(root.join(name))?.read_to_end(&mut buf)?;
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&buf)?;
    }
    zip.finish()?;
    Ok(entries)
}

// ============================================================================
// Asset tree
// ============================================================================

fn write_asset_tree(layout: &PackageLayout, assets_dir: &Path) -> Result<(), PackageError> {
    fs::create_dir_all(assets_dir)?;

    for page in layout.pages.iter().filter(|p| p.kind == PageKind::Static) {
        let dst = assets_dir.join(&page.source_path);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(layout.pages_dir.join(&page.source_path), dst)?;
    }

    mirror_dir(&layout.static_dir, &assets_dir.join("_next").join("static"))?;
    Ok(())
}

fn mirror_dir(src: &Path, dst: &Path) -> Result<(), PackageError> {
    if !src.is_dir() {
        log::debug!("no assets at {}, skipping", src.display());
        return Ok(());
    }
    for rel in relative_files(src)? {
        let target = dst.join(&rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src.join(&rel), target)?;
    }
    Ok(())
}

/// Every file under `root` as a `/`-separated relative path, sorted.
pub fn relative_files(root: &Path) -> Result<Vec<String>, PackageError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        files.push(
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/"),
        );
    }
    files.sort();
    Ok(files)
}

fn remove_dir_if_exists(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    Ok(())
}
