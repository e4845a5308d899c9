//! Shared types used across all pipeline stages.
//!
//! These types are produced once by the classify stage and then only read by
//! the route, handler and package stages. They serialize to JSON so that
//! `pageship classify --json` can dump the classified page set for inspection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One path segment of a file-system route.
///
/// Parsed from a single path component of a compiled page module:
/// - `blog` → `Literal("blog")`
/// - `[slug]` → `Param("slug")`
/// - `[...rest]` → `CatchAll("rest")`
/// - `[[...rest]]` → `OptionalCatchAll("rest")`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
    OptionalCatchAll(String),
}

impl Segment {
    pub fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self, Segment::CatchAll(_) | Segment::OptionalCatchAll(_))
    }

    /// Capture name for non-literal segments.
    pub fn capture_name(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Param(n) | Segment::CatchAll(n) | Segment::OptionalCatchAll(n) => Some(n),
        }
    }

    /// Precedence rank at a single position: lower wins.
    pub fn rank(&self) -> u8 {
        match self {
            Segment::Literal(_) => 0,
            Segment::Param(_) => 1,
            Segment::CatchAll(_) => 2,
            Segment::OptionalCatchAll(_) => 3,
        }
    }
}

impl fmt::Display for Segment {
    /// Renders the segment back in the bracket syntax it was parsed from.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(s) => write!(f, "{s}"),
            Segment::Param(n) => write!(f, "[{n}]"),
            Segment::CatchAll(n) => write!(f, "[...{n}]"),
            Segment::OptionalCatchAll(n) => write!(f, "[[...{n}]]"),
        }
    }
}

/// How a compiled page is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    /// Pre-rendered HTML, served straight from blob storage.
    Static,
    /// Framework-reserved entry (`_app`, `_document`, `_error`). Never routed.
    Special,
    /// Needs a server-side render, gets its own function.
    Dynamic,
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PageKind::Static => "static",
            PageKind::Special => "special",
            PageKind::Dynamic => "dynamic",
        };
        f.write_str(s)
    }
}

/// A compiled route module discovered in the pages tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Module path relative to the pages root, `/`-separated (`blog/[slug].js`).
    pub source_path: String,
    pub segments: Vec<Segment>,
    pub kind: PageKind,
    /// Host-safe function/proxy name, unique across the page set.
    pub identifier: String,
    /// Lives under `pages/api/`: accepts every HTTP method.
    #[serde(default)]
    pub api: bool,
}

impl Page {
    /// Route in bracket syntax, `/` for the index route.
    pub fn route(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let parts: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        format!("/{}", parts.join("/"))
    }

    pub fn is_routable(&self) -> bool {
        self.kind != PageKind::Special
    }
}

/// One row of the generated proxy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Identifier of the page this entry routes to.
    pub name: String,
    /// Host route template: `/blog/{slug}`, `/docs/{*path}`, `/shop/{*path?}`.
    pub pattern: String,
    /// Absolute asset URL (static) or `/api/{identifier}` (dynamic).
    pub target: String,
    pub kind: PageKind,
    /// Names of captured segments, in pattern order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub captures: Vec<String>,
}
