//! Route-proxy table generation.
//!
//! Stage 2a of the pipeline. Turns the classified page set into the ordered
//! list of [`RouteEntry`] rows that becomes `proxies.json`. The function host
//! routes **first match wins**, so the order of this table is the routing
//! logic: a parameterized route placed above a literal one silently steals
//! its traffic.
//!
//! ## Pattern syntax
//!
//! | Segment | Template | Matches |
//! |---------|----------|---------|
//! | `blog` | `blog` | exactly `blog` |
//! | `[slug]` | `{slug}` | one segment, no `/` |
//! | `[...path]` | `{*path}` | one or more segments |
//! | `[[...path]]` | `{*path?}` | zero or more segments |
//!
//! ## Precedence
//!
//! [`compare_specificity`] orders routes so that whenever two patterns can
//! match the same URL, the more specific one comes first. Patterns are
//! compared segment by segment; at the first position where they differ a
//! literal beats a parameter, a parameter beats a catch-all, and a catch-all
//! beats an optional catch-all. A route that runs out of segments first
//! sorts earlier. Remaining ties are broken by fewer wildcards, then more
//! leading literals, then the template text, which makes the order total and
//! independent of discovery order.
//!
//! Consequences:
//! - `/blog/new` before `/blog/{slug}`
//! - `/{id}` before `/{*all}`, and `/{a}/{b}` before `/{*all}`
//! - `/shop` before `/shop/{*filters?}`
//!
//! Two routable pages with the same shape (equal literals, captures of the
//! same kind at the same positions) can never both be reached, so that is an
//! [`RouteError::AmbiguousRoute`] rather than a silent pick.

use crate::types::{Page, PageKind, RouteEntry, Segment};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

/// Route prefix the function host mounts HTTP triggers under.
pub const FUNCTION_ROUTE_PREFIX: &str = "api";

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("ambiguous route {pattern}: {first} and {second} match the same paths")]
    AmbiguousRoute {
        pattern: String,
        first: String,
        second: String,
    },
    #[error("invalid route template {0:?}")]
    InvalidTemplate(String),
    #[error("pattern compile error: {0}")]
    Regex(#[from] regex::Error),
}

/// Build the ordered proxy table for every routable page.
///
/// Static pages target `asset_base_url` joined with their html file path;
/// dynamic pages target `/api/{identifier}`. Special pages are skipped.
pub fn build(pages: &[Page], asset_base_url: &str) -> Result<Vec<RouteEntry>, RouteError> {
    let mut routable: Vec<&Page> = pages.iter().filter(|p| p.is_routable()).collect();

    check_ambiguity(&routable)?;

    routable.sort_by(|a, b| {
        compare_specificity(&a.segments, &b.segments)
            .then_with(|| a.source_path.cmp(&b.source_path))
    });

    let base = asset_base_url.trim_end_matches('/');
    let table = routable
        .into_iter()
        .map(|page| RouteEntry {
            name: page.identifier.clone(),
            pattern: template(&page.segments),
            target: match page.kind {
                PageKind::Static => format!("{base}/{}", page.source_path),
                _ => function_path(&page.identifier),
            },
            kind: page.kind,
            captures: page
                .segments
                .iter()
                .filter_map(Segment::capture_name)
                .map(str::to_string)
                .collect(),
        })
        .collect();

    Ok(table)
}

/// Invocation path of a page's function.
pub fn function_path(identifier: &str) -> String {
    format!("/{FUNCTION_ROUTE_PREFIX}/{identifier}")
}

/// Container prefixes served straight from the asset container. The page
/// html references build assets under `/_next/` and author assets under
/// `/public/` on the app host, so both are proxied to blob storage.
pub const ASSET_PREFIXES: [&str; 2] = ["_next", "public"];

/// Page table plus one catch-all proxy per [`ASSET_PREFIXES`] entry, merged
/// in specificity order.
///
/// `/_next/{*path}` targets `{asset_base_url}/_next/{path}`. A page route of
/// the same shape keeps the prefix and the asset proxy is left out.
pub fn with_asset_proxies(
    table: &[RouteEntry],
    asset_base_url: &str,
) -> Result<Vec<RouteEntry>, RouteError> {
    let base = asset_base_url.trim_end_matches('/');
    let mut keyed = Vec::with_capacity(table.len() + ASSET_PREFIXES.len());
    for entry in table {
        keyed.push((parse_template(&entry.pattern)?, entry.clone()));
    }

    for prefix in ASSET_PREFIXES {
        let segments = vec![
            Segment::Literal(prefix.to_string()),
            Segment::CatchAll("path".to_string()),
        ];
        if keyed.iter().any(|(s, _)| shape(s) == shape(&segments)) {
            log::warn!("page route {} shadows the {prefix} asset proxy", template(&segments));
            continue;
        }
        let entry = RouteEntry {
            name: prefix.to_string(),
            pattern: template(&segments),
            target: format!("{base}/{prefix}/{{path}}"),
            kind: PageKind::Static,
            captures: vec!["path".to_string()],
        };
        keyed.push((segments, entry));
    }

    keyed.sort_by(|(a, _), (b, _)| compare_specificity(a, b));
    Ok(keyed.into_iter().map(|(_, entry)| entry).collect())
}

fn check_ambiguity(pages: &[&Page]) -> Result<(), RouteError> {
    let mut seen: HashMap<Vec<(u8, &str)>, &Page> = HashMap::new();
    for &page in pages {
        if let Some(existing) = seen.insert(shape(&page.segments), page) {
            let (first, second) = if existing.source_path <= page.source_path {
                (existing, page)
            } else {
                (page, existing)
            };
            return Err(RouteError::AmbiguousRoute {
                pattern: template(&page.segments),
                first: first.source_path.clone(),
                second: second.source_path.clone(),
            });
        }
    }
    Ok(())
}

/// Segment shape with capture names erased: `/blog/{a}` and `/blog/{b}` are
/// the same shape.
fn shape(segments: &[Segment]) -> Vec<(u8, &str)> {
    segments
        .iter()
        .map(|s| match s {
            Segment::Literal(l) => (s.rank(), l.as_str()),
            _ => (s.rank(), ""),
        })
        .collect()
}

/// Total order over routes, most specific first. See the module docs.
pub fn compare_specificity(a: &[Segment], b: &[Segment]) -> Ordering {
    for (sa, sb) in a.iter().zip(b) {
        match sa.rank().cmp(&sb.rank()) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    a.len()
        .cmp(&b.len())
        .then_with(|| wildcard_count(a).cmp(&wildcard_count(b)))
        .then_with(|| leading_literals(b).cmp(&leading_literals(a)))
        .then_with(|| template(a).cmp(&template(b)))
}

fn wildcard_count(segments: &[Segment]) -> usize {
    segments.iter().filter(|s| !s.is_literal()).count()
}

fn leading_literals(segments: &[Segment]) -> usize {
    segments.iter().take_while(|s| s.is_literal()).count()
}

/// Render segments in the host's route template syntax.
pub fn template(segments: &[Segment]) -> String {
    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        match segment {
            Segment::Literal(s) => out.push_str(s),
            Segment::Param(n) => out.push_str(&format!("{{{n}}}")),
            Segment::CatchAll(n) => out.push_str(&format!("{{*{n}}}")),
            Segment::OptionalCatchAll(n) => out.push_str(&format!("{{*{n}?}}")),
        }
    }
    out
}

/// Parse a route template back into segments.
pub fn parse_template(pattern: &str) -> Result<Vec<Segment>, RouteError> {
    if !pattern.starts_with('/') {
        return Err(RouteError::InvalidTemplate(pattern.to_string()));
    }
    pattern
        .split('/')
        .filter(|c| !c.is_empty())
        .map(|component| {
            let segment = match component
                .strip_prefix('{')
                .and_then(|c| c.strip_suffix('}'))
            {
                Some(inner) => {
                    if let Some(name) = inner.strip_prefix('*').and_then(|n| n.strip_suffix('?')) {
                        Segment::OptionalCatchAll(name.to_string())
                    } else if let Some(name) = inner.strip_prefix('*') {
                        Segment::CatchAll(name.to_string())
                    } else {
                        Segment::Param(inner.to_string())
                    }
                }
                None => Segment::Literal(component.to_string()),
            };
            let invalid = match segment.capture_name() {
                Some(name) => name.is_empty() || name.contains(['{', '}', '*', '?']),
                None => component.contains(['{', '}']),
            };
            if invalid {
                Err(RouteError::InvalidTemplate(pattern.to_string()))
            } else {
                Ok(segment)
            }
        })
        .collect()
}

/// A route template compiled for matching request paths.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    template: String,
    regex: Regex,
    names: Vec<String>,
}

impl RoutePattern {
    pub fn from_segments(segments: &[Segment]) -> Result<Self, RouteError> {
        const ONE_OR_MORE: &str = "([^/]+(?:/[^/]+)*)";
        let mut re = String::from("^");
        for segment in segments {
            match segment {
                Segment::Literal(s) => {
                    re.push('/');
                    re.push_str(&regex::escape(s));
                }
                Segment::Param(_) => re.push_str("/([^/]+)"),
                Segment::CatchAll(_) => {
                    re.push('/');
                    re.push_str(ONE_OR_MORE);
                }
                Segment::OptionalCatchAll(_) => {
                    re.push_str("(?:/");
                    re.push_str(ONE_OR_MORE);
                    re.push_str(")?");
                }
            }
        }
        re.push('$');

        Ok(Self {
            template: template(segments),
            regex: Regex::new(&re)?,
            names: segments
                .iter()
                .filter_map(Segment::capture_name)
                .map(str::to_string)
                .collect(),
        })
    }

    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        Self::from_segments(&parse_template(pattern)?)
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Match a request path; returns the captured values in pattern order.
    ///
    /// A trailing slash is ignored and `/` is the root route. An optional
    /// catch-all that matched nothing is left out of the captures.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = path.trim_end_matches('/');
        let caps = self.regex.captures(path)?;
        Some(
            self.names
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    caps.get(i + 1)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

/// First table entry matching `path`, the way the host resolves it.
pub fn resolve<'a>(
    table: &'a [RouteEntry],
    path: &str,
) -> Result<Option<(&'a RouteEntry, Vec<(String, String)>)>, RouteError> {
    for entry in table {
        if let Some(captures) = RoutePattern::parse(&entry.pattern)?.matches(path) {
            return Ok(Some((entry, captures)));
        }
    }
    Ok(None)
}
