//! Page discovery and classification.
//!
//! Stage 1 of the pipeline. Walks the compiled pages tree produced by the
//! upstream compiler and turns every page module into a [`Page`] with its
//! route segments, kind and host identifier.
//!
//! ## Input Layout
//!
//! ```text
//! build/serverless/pages/
//! ├── _app.js                  # Special: app shell
//! ├── _document.js             # Special: document shell
//! ├── _error.js                # Special: error shell
//! ├── index.html               # Static: pre-rendered `/`
//! ├── about.html               # Static: `/about`
//! ├── [id].js                  # Dynamic: `/{id}`
//! ├── blog/
//! │   ├── index.js             # Dynamic: `/blog`
//! │   └── [slug].js            # Dynamic: `/blog/{slug}`
//! ├── docs/[...path].js        # Dynamic: `/docs/{*path}`
//! └── api/hello.js             # Dynamic API route, every method allowed
//! ```
//!
//! ## Kind Rules
//!
//! - **Special**: `_app`, `_document` or `_error` at the top level
//! - **Static**: `.html` output (the compiler pre-rendered it)
//! - **Dynamic**: `.js` output (needs a server render)
//!
//! Anything that is not `.html` or `.js` (source maps, trace files, hidden
//! files) is not a page and is skipped.
//!
//! ## Validation
//!
//! Problems are collected across the whole tree and reported together, so a
//! broken build fails once with the full list instead of producing a partial
//! page set:
//! - catch-all segment that is not the last segment
//! - malformed brackets or capture names, repeated capture names
//! - a reserved shell compiled to `.html`

use crate::naming::{self, NameError};
use crate::types::{Page, PageKind, Segment};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Top-level module names the framework reserves for itself.
pub const RESERVED_PAGES: &[&str] = &["_app", "_document", "_error"];

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Pages directory not found: {0}")]
    MissingRoot(PathBuf),
    #[error("{} invalid page module(s):\n{}", .0.len(), format_issues(.0))]
    Invalid(Vec<RouteIssue>),
}

/// A problem with one page module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteIssue {
    pub source_path: String,
    pub problem: Problem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    MalformedRoute(NameError),
    /// A reserved shell came out of the compiler pre-rendered.
    ReservedStatic,
}

impl fmt::Display for RouteIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            Problem::MalformedRoute(e) => write!(f, "{}: malformed route: {e}", self.source_path),
            Problem::ReservedStatic => write!(
                f,
                "{}: reserved page cannot be pre-rendered as static html",
                self.source_path
            ),
        }
    }
}

fn format_issues(issues: &[RouteIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("  {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Classify every page module under `pages_root`.
///
/// Returns pages sorted by source path. Fails atomically: if any module is
/// invalid, no pages are returned.
pub fn classify(pages_root: &Path) -> Result<Vec<Page>, ClassifyError> {
    if !pages_root.is_dir() {
        return Err(ClassifyError::MissingRoot(pages_root.to_path_buf()));
    }

    let mut pages = Vec::new();
    let mut issues = Vec::new();

    for entry in WalkDir::new(pages_root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_page_module(entry.path()) {
            continue;
        }
        let source_path = relative_path(entry.path(), pages_root);
        match classify_module(&source_path) {
            Ok(page) => pages.push(page),
            Err(problem) => issues.push(RouteIssue {
                source_path,
                problem,
            }),
        }
    }

    if !issues.is_empty() {
        return Err(ClassifyError::Invalid(issues));
    }

    assign_unique_identifiers(&mut pages);
    pages.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    Ok(pages)
}

/// Classify a single module from its path relative to the pages root.
pub fn classify_module(source_path: &str) -> Result<Page, Problem> {
    let segments = naming::parse_route(source_path).map_err(Problem::MalformedRoute)?;
    let is_html = source_path.ends_with(".html");

    let kind = match (is_reserved(source_path), is_html) {
        (true, true) => return Err(Problem::ReservedStatic),
        (true, false) => PageKind::Special,
        (false, true) => PageKind::Static,
        (false, false) => PageKind::Dynamic,
    };

    Ok(Page {
        source_path: source_path.to_string(),
        identifier: naming::route_identifier(&segments),
        api: matches!(segments.first(), Some(Segment::Literal(s)) if s == "api"),
        segments,
        kind,
    })
}

/// Only a module directly in the pages root (`_app.js`) is reserved;
/// `_app/index.js` is an ordinary page.
fn is_reserved(source_path: &str) -> bool {
    let stem = source_path
        .strip_suffix(".html")
        .or_else(|| source_path.strip_suffix(".js"))
        .unwrap_or(source_path);
    RESERVED_PAGES.contains(&stem)
}

fn is_page_module(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    if name.starts_with('.') {
        return false;
    }
    path.extension()
        .map(|e| e == "html" || e == "js")
        .unwrap_or(false)
}

fn relative_path(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Make identifiers unique across the page set.
///
/// Sanitizing can fold different routes onto one name (`a.b` and `a_b`).
/// Every member of such a group gets a hash suffix derived from its own
/// source path, so the result does not depend on discovery order.
fn assign_unique_identifiers(pages: &mut [Page]) {
    let mut groups: BTreeMap<String, usize> = BTreeMap::new();
    for page in pages.iter() {
        *groups.entry(page.identifier.clone()).or_default() += 1;
    }
    for page in pages.iter_mut() {
        if groups.get(&page.identifier).copied().unwrap_or(0) > 1 {
            page.identifier = naming::with_hash_suffix(&page.identifier, &page.source_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[test]
    fn sample_tree_kinds() {
        let tree = sample_build_tree();
        let pages = classify(&tree.pages_dir()).unwrap();

        assert_eq!(find_page(&pages, "/").kind, PageKind::Static);
        assert_eq!(find_page(&pages, "/about").kind, PageKind::Static);
        assert_eq!(find_page(&pages, "/[id]").kind, PageKind::Dynamic);
        assert_eq!(find_page(&pages, "/blog").kind, PageKind::Dynamic);
        assert_eq!(find_page(&pages, "/blog/[slug]").kind, PageKind::Dynamic);
        assert_eq!(find_page(&pages, "/docs/[...path]").kind, PageKind::Dynamic);
        assert_eq!(find_page(&pages, "/_app").kind, PageKind::Special);
        assert_eq!(find_page(&pages, "/_document").kind, PageKind::Special);
        assert_eq!(find_page(&pages, "/_error").kind, PageKind::Special);
    }

    #[test]
    fn pages_sorted_by_source_path() {
        let tree = sample_build_tree();
        let pages = classify(&tree.pages_dir()).unwrap();
        let paths: Vec<&str> = pages.iter().map(|p| p.source_path.as_str()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
        assert_eq!(pages.len(), 11);
    }

    #[test]
    fn api_routes_flagged() {
        let tree = sample_build_tree();
        let pages = classify(&tree.pages_dir()).unwrap();
        assert!(find_page(&pages, "/api/hello").api);
        assert!(!find_page(&pages, "/blog").api);
    }

    #[test]
    fn non_page_files_ignored() {
        let tree = BuildTree::new().page("index.html").page("[id].js");
        std::fs::write(tree.pages_dir().join("[id].js.map"), "{}").unwrap();
        std::fs::write(tree.pages_dir().join("[id].js.nft.json"), "{}").unwrap();
        std::fs::write(tree.pages_dir().join(".DS_Store"), "").unwrap();

        let pages = classify(&tree.pages_dir()).unwrap();
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn nested_reserved_name_is_regular_page() {
        let tree = BuildTree::new().page("docs/_app.js");
        let pages = classify(&tree.pages_dir()).unwrap();
        assert_eq!(pages[0].kind, PageKind::Dynamic);
    }

    #[test]
    fn reserved_name_as_directory_is_regular_page() {
        let tree = BuildTree::new()
            .page("_app/index.js")
            .page("_document/index.html");
        let pages = classify(&tree.pages_dir()).unwrap();
        assert_eq!(find_page(&pages, "/_app").kind, PageKind::Dynamic);
        assert_eq!(find_page(&pages, "/_document").kind, PageKind::Static);
    }

    #[test]
    fn reserved_static_is_error() {
        let tree = BuildTree::new().page("_app.html");
        let err = classify(&tree.pages_dir()).unwrap_err();
        match err {
            ClassifyError::Invalid(issues) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].problem, Problem::ReservedStatic);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn all_malformed_modules_reported_together() {
        let tree = BuildTree::new()
            .page("index.html")
            .page("docs/[...path]/edit.js")
            .page("[[...a]]/b.js")
            .page("x/[bad-name].js");

        let err = classify(&tree.pages_dir()).unwrap_err();
        let ClassifyError::Invalid(issues) = err else {
            panic!("expected Invalid");
        };
        let sources: Vec<&str> = issues.iter().map(|i| i.source_path.as_str()).collect();
        assert_eq!(
            sources,
            vec!["[[...a]]/b.js", "docs/[...path]/edit.js", "x/[bad-name].js"]
        );
        assert!(matches!(
            issues[1].problem,
            Problem::MalformedRoute(NameError::CatchAllNotLast { .. })
        ));
    }

    #[test]
    fn invalid_error_lists_every_issue() {
        let tree = BuildTree::new().page("a/[...b]/c.js").page("_error.html");
        let msg = classify(&tree.pages_dir()).unwrap_err().to_string();
        assert!(msg.starts_with("2 invalid page module(s)"));
        assert!(msg.contains("_error.html"));
        assert!(msg.contains("a/[...b]/c.js"));
    }

    #[test]
    fn missing_root_is_error() {
        let tree = BuildTree::new();
        let missing = tree.root().join("nope");
        assert!(matches!(
            classify(&missing),
            Err(ClassifyError::MissingRoot(_))
        ));
    }

    #[test]
    fn identifiers_unique_after_sanitizing() {
        let tree = BuildTree::new().page("a.b.js").page("a_b.js");
        let pages = classify(&tree.pages_dir()).unwrap();
        assert_ne!(pages[0].identifier, pages[1].identifier);
        assert!(pages.iter().all(|p| p.identifier.starts_with("a_b-")));
    }

    #[test]
    fn identifiers_stable_across_runs() {
        let first = classify(&sample_build_tree().pages_dir()).unwrap();
        let second = classify(&sample_build_tree().pages_dir()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn every_page_has_exactly_one_kind() {
        let pages = classify(&sample_build_tree().pages_dir()).unwrap();
        for page in &pages {
            let kinds = [PageKind::Static, PageKind::Special, PageKind::Dynamic];
            assert_eq!(kinds.iter().filter(|k| **k == page.kind).count(), 1);
        }
    }
}
