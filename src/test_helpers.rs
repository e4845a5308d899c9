//! Shared test utilities for the pageship test suite.
//!
//! Builds throwaway compiled build trees in temp directories and provides
//! lookup helpers that panic with a readable message on a miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tree = sample_build_tree();
//! let pages = classify(&tree.pages_dir()).unwrap();
//!
//! let page = find_page(&pages, "/blog/[slug]");
//! assert_eq!(page.kind, PageKind::Dynamic);
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::types::{Page, RouteEntry};

// =========================================================================
// Build tree setup
// =========================================================================

/// A compiled build tree in a temp directory, laid out the way the upstream
/// compiler emits it:
///
/// ```text
/// <root>/
/// ├── build/
/// │   ├── serverless/pages/   # compiled page modules
/// │   └── static/             # build-generated assets
/// └── public/                 # author-supplied assets
/// ```
pub struct BuildTree {
    pub dir: TempDir,
}

impl BuildTree {
    pub fn new() -> Self {
        let tree = Self {
            dir: TempDir::new().unwrap(),
        };
        fs::create_dir_all(tree.pages_dir()).unwrap();
        fs::create_dir_all(tree.static_dir()).unwrap();
        tree
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root().join("build")
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.build_dir().join("serverless/pages")
    }

    pub fn static_dir(&self) -> PathBuf {
        self.build_dir().join("static")
    }

    pub fn public_dir(&self) -> PathBuf {
        self.root().join("public")
    }

    /// Write a page module relative to the pages root.
    pub fn page(self, relative: &str) -> Self {
        let contents = if relative.ends_with(".html") {
            format!("<!DOCTYPE html><html><body>{relative}</body></html>")
        } else {
            format!("module.exports.render = function render(req, res) {{ res.end({relative:?}); }};\n")
        };
        write_file(&self.pages_dir().join(relative), &contents);
        self
    }

    /// Write a build-generated asset relative to `build/static`.
    pub fn asset(self, relative: &str) -> Self {
        write_file(&self.static_dir().join(relative), relative);
        self
    }

    /// Write an author asset relative to `public/`.
    pub fn public(self, relative: &str) -> Self {
        write_file(&self.public_dir().join(relative), relative);
        self
    }
}

fn write_file(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// The tree most tests start from: static and dynamic pages, every kind of
/// dynamic segment, an API route and the reserved shells.
pub fn sample_build_tree() -> BuildTree {
    BuildTree::new()
        .page("_app.js")
        .page("_document.js")
        .page("_error.js")
        .page("index.html")
        .page("about.html")
        .page("[id].js")
        .page("blog/index.js")
        .page("blog/[slug].js")
        .page("docs/[...path].js")
        .page("shop/[[...filters]].js")
        .page("api/hello.js")
        .asset("chunks/main.js")
        .asset("css/app.css")
        .public("favicon.ico")
}

// =========================================================================
// Lookups
// =========================================================================

/// Find a page by its bracket-syntax route. Panics if not found.
pub fn find_page<'a>(pages: &'a [Page], route: &str) -> &'a Page {
    pages.iter().find(|p| p.route() == route).unwrap_or_else(|| {
        let routes: Vec<String> = pages.iter().map(Page::route).collect();
        panic!("page '{route}' not found. Available: {routes:?}")
    })
}

/// Route table patterns in table order.
pub fn patterns(table: &[RouteEntry]) -> Vec<&str> {
    table.iter().map(|e| e.pattern.as_str()).collect()
}

/// Index of a pattern in the table. Panics if not found.
pub fn position_of(table: &[RouteEntry], pattern: &str) -> usize {
    table
        .iter()
        .position(|e| e.pattern == pattern)
        .unwrap_or_else(|| panic!("pattern '{pattern}' not in {:?}", patterns(table)))
}
