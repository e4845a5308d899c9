//! CLI output formatting for all pipeline stages.
//!
//! # Information-First Display
//!
//! Output is **information-centric, not file-centric**. The primary display
//! for every entity (page, route, step) is its semantic identity: the route
//! it serves, with a positional index where order matters. Source modules and
//! targets are shown as secondary context on indented lines, so the output
//! reads as an inventory of the site while still pointing back at files.
//!
//! # Output Format
//!
//! ## Classify
//!
//! ```text
//! Pages
//! 001 /[id] (dynamic)
//!     Source: [id].js
//!     Function: page_id
//! 002 / (static)
//!     Source: index.html
//!
//! Special
//!     _app.js
//!
//! 2 routable pages: 1 static, 1 dynamic
//! ```
//!
//! ## Routes
//!
//! ```text
//! Routes
//! 001 / → https://store.blob.core.windows.net/assets/index.html
//! 002 /{id} → /api/page_id
//!     Captures: id
//! ```
//!
//! ## Package
//!
//! ```text
//! Package web.zip (8 entries)
//!     Function: page_id
//! Assets: 3 files
//! Public: 1 file
//! ```
//!
//! ## Deploy
//!
//! ```text
//! 01 ensure resource group
//! ...
//! 07 upload function package (2 attempts)
//! ...
//! Deployed: https://web.azurewebsites.net
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::deploy::{DeployReport, Step};
use crate::package::PackageOutput;
use crate::target::DeploymentTarget;
use crate::types::{Page, PageKind, RouteEntry};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn count(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Stage 1: Classify output
// ============================================================================

/// Format the classified page set: routable pages first, reserved shells
/// after, then a count summary.
pub fn format_classify_output(pages: &[Page]) -> Vec<String> {
    let mut lines = vec!["Pages".to_string()];

    let routable: Vec<&Page> = pages.iter().filter(|p| p.is_routable()).collect();
    for (i, page) in routable.iter().enumerate() {
        let mut header = format!("{} {} ({})", format_index(i + 1), page.route(), page.kind);
        if page.api {
            header.push_str(" [api]");
        }
        lines.push(header);
        lines.push(format!("{}Source: {}", indent(1), page.source_path));
        if page.kind == PageKind::Dynamic {
            lines.push(format!("{}Function: {}", indent(1), page.identifier));
        }
    }

    let special: Vec<&Page> = pages
        .iter()
        .filter(|p| p.kind == PageKind::Special)
        .collect();
    if !special.is_empty() {
        lines.push(String::new());
        lines.push("Special".to_string());
        for page in special {
            lines.push(format!("{}{}", indent(1), page.source_path));
        }
    }

    let statics = routable
        .iter()
        .filter(|p| p.kind == PageKind::Static)
        .count();
    lines.push(String::new());
    lines.push(format!(
        "{}: {} static, {} dynamic",
        count(routable.len(), "routable page", "routable pages"),
        statics,
        routable.len() - statics
    ));
    lines
}

pub fn print_classify_output(pages: &[Page]) {
    print_lines(format_classify_output(pages));
}

// ============================================================================
// Stage 2: Routes output
// ============================================================================

/// Format the route table in precedence order.
pub fn format_routes_output(table: &[RouteEntry]) -> Vec<String> {
    let mut lines = vec!["Routes".to_string()];
    for (i, entry) in table.iter().enumerate() {
        lines.push(format!(
            "{} {} \u{2192} {}",
            format_index(i + 1),
            entry.pattern,
            entry.target
        ));
        if !entry.captures.is_empty() {
            lines.push(format!(
                "{}Captures: {}",
                indent(1),
                entry.captures.join(", ")
            ));
        }
    }
    lines
}

pub fn print_routes_output(table: &[RouteEntry]) {
    print_lines(format_routes_output(table));
}

/// Format the result of resolving one request path against the table.
pub fn format_match_output(
    path: &str,
    matched: Option<(&RouteEntry, &[(String, String)])>,
) -> Vec<String> {
    match matched {
        None => vec![format!("{path}: no route")],
        Some((entry, captures)) => {
            let mut lines = vec![format!(
                "{path} \u{2192} {} ({})",
                entry.pattern, entry.target
            )];
            for (name, value) in captures {
                lines.push(format!("{}{name} = {value}", indent(1)));
            }
            lines
        }
    }
}

pub fn print_match_output(path: &str, matched: Option<(&RouteEntry, &[(String, String)])>) {
    print_lines(format_match_output(path, matched));
}

// ============================================================================
// Stage 3: Package output
// ============================================================================

pub fn format_package_output(output: &PackageOutput) -> Vec<String> {
    let archive = output
        .archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| output.archive.display().to_string());

    let mut lines = vec![format!(
        "Package {archive} ({})",
        count(output.entries.len(), "entry", "entries")
    )];
    for function in &output.functions {
        lines.push(format!("{}Function: {function}", indent(1)));
    }
    lines.push(format!("Assets: {}", count(output.assets.len(), "file", "files")));
    lines.push(format!(
        "Public: {}",
        count(output.public_assets.len(), "file", "files")
    ));
    lines
}

pub fn print_package_output(output: &PackageOutput) {
    print_lines(format_package_output(output));
}

// ============================================================================
// Stage 4: Deploy output
// ============================================================================

pub fn format_deploy_output(report: &DeployReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            if *step == Step::UploadPackage && report.upload_attempts > 1 {
                format!("{:0>2} {step} ({} attempts)", i + 1, report.upload_attempts)
            } else {
                format!("{:0>2} {step}", i + 1)
            }
        })
        .collect();
    lines.push(format!("Deployed: {}", report.endpoint));
    lines
}

pub fn print_deploy_output(report: &DeployReport) {
    print_lines(format_deploy_output(report));
}

pub fn format_teardown_output(target: &DeploymentTarget, steps: &[Step]) -> Vec<String> {
    let mut lines: Vec<String> = steps.iter().map(|s| format!("{}{s}", indent(1))).collect();
    lines.insert(0, format!("Teardown {}", target.app_name));
    lines
}

pub fn print_teardown_output(target: &DeploymentTarget, steps: &[Step]) {
    print_lines(format_teardown_output(target, steps));
}

/// One-line description of the resolved target, shown before a deploy.
pub fn format_target(target: &DeploymentTarget) -> String {
    match target.change_request {
        Some(id) => format!(
            "Target {} (change request {id}), assets in {}/{}",
            target.app_name, target.storage_account, target.container
        ),
        None => format!(
            "Target {}, assets in {}/{}",
            target.app_name, target.storage_account, target.container
        ),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::routes;
    use crate::test_helpers::*;
    use std::path::PathBuf;

    const BASE: &str = "https://store.blob.core.windows.net/assets";

    fn small_tree_pages() -> Vec<Page> {
        let tree = BuildTree::new()
            .page("_app.js")
            .page("index.html")
            .page("[id].js");
        classify(&tree.pages_dir()).unwrap()
    }

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(100), "100");
    }

    #[test]
    fn count_forms() {
        assert_eq!(count(1, "entry", "entries"), "1 entry");
        assert_eq!(count(0, "entry", "entries"), "0 entries");
    }

    #[test]
    fn classify_output() {
        let lines = format_classify_output(&small_tree_pages());
        assert_eq!(
            lines,
            vec![
                "Pages",
                "001 /[id] (dynamic)",
                "    Source: [id].js",
                "    Function: page_id",
                "002 / (static)",
                "    Source: index.html",
                "",
                "Special",
                "    _app.js",
                "",
                "2 routable pages: 1 static, 1 dynamic",
            ]
        );
    }

    #[test]
    fn classify_output_marks_api_routes() {
        let pages = classify(&sample_build_tree().pages_dir()).unwrap();
        let lines = format_classify_output(&pages);
        assert!(lines.iter().any(|l| l.ends_with("/api/hello (dynamic) [api]")));
    }

    #[test]
    fn routes_output_in_table_order() {
        let table = routes::build(&small_tree_pages(), BASE).unwrap();
        let lines = format_routes_output(&table);
        assert_eq!(
            lines,
            vec![
                "Routes".to_string(),
                format!("001 / \u{2192} {BASE}/index.html"),
                "002 /{id} \u{2192} /api/page_id".to_string(),
                "    Captures: id".to_string(),
            ]
        );
    }

    #[test]
    fn match_output() {
        let table = routes::build(&small_tree_pages(), BASE).unwrap();
        let (entry, captures) = routes::resolve(&table, "/42").unwrap().unwrap();
        let lines = format_match_output("/42", Some((entry, captures.as_slice())));
        assert_eq!(lines, vec!["/42 \u{2192} /{id} (/api/page_id)", "    id = 42"]);
        assert_eq!(format_match_output("/a/b", None), vec!["/a/b: no route"]);
    }

    #[test]
    fn package_output() {
        let output = PackageOutput {
            archive: PathBuf::from("/out/web.zip"),
            manifest: PathBuf::from("/out/package.txt"),
            assets_dir: PathBuf::from("/out/assets"),
            public_dir: PathBuf::from("/out/public"),
            entries: vec!["a".into(), "b".into()],
            functions: vec!["page_id".into()],
            assets: vec!["index.html".into()],
            public_assets: Vec::new(),
        };
        assert_eq!(
            format_package_output(&output),
            vec![
                "Package web.zip (2 entries)",
                "    Function: page_id",
                "Assets: 1 file",
                "Public: 0 files",
            ]
        );
    }

    #[test]
    fn deploy_output_shows_retries_and_endpoint() {
        let report = DeployReport {
            steps: vec![Step::EnsureResourceGroup, Step::UploadPackage],
            upload_attempts: 2,
            endpoint: "https://web.azurewebsites.net".into(),
        };
        assert_eq!(
            format_deploy_output(&report),
            vec![
                "01 ensure resource group",
                "02 upload function package (2 attempts)",
                "Deployed: https://web.azurewebsites.net",
            ]
        );
    }

    #[test]
    fn teardown_and_target_lines() {
        let target = DeploymentTarget {
            subscription: "sub".into(),
            resource_group: "rg".into(),
            location: "westeurope".into(),
            storage_account: "prstore".into(),
            app_name: "web-3".into(),
            container: "assets-3".into(),
            plan: None,
            change_request: Some(3),
        };
        assert_eq!(
            format_teardown_output(&target, &[Step::DeleteApp]),
            vec!["Teardown web-3", "    delete function app"]
        );
        assert_eq!(
            format_target(&target),
            "Target web-3 (change request 3), assets in prstore/assets-3"
        );
    }
}
