//! Centralized parsing for the bracket route convention and host-safe names.
//!
//! Every compiled page module encodes its route in its path. Each path
//! component is one [`Segment`]:
//!
//! - `blog` → literal
//! - `[slug]` → one path segment, captured as `slug`
//! - `[...rest]` → one or more segments, captured as `rest`
//! - `[[...rest]]` → zero or more segments, captured as `rest`
//!
//! A trailing `index` component maps to its parent route, so `blog/index.js`
//! and `blog.js` both serve `/blog`.
//!
//! ## Identifiers
//!
//! The function host limits names to letters, digits, `_` and `-`, starting
//! with a letter. [`route_identifier`] turns a segment list into such a name
//! while keeping literals and captures distinguishable:
//! - `blog/[slug]` → `blog-_slug`
//! - `[...all]` → `page__all`
//! - `` (index) → `index`
//!
//! ## Resource names
//!
//! [`truncate_with_suffix`] and [`storage_account_name`] enforce the cloud
//! provider's length and character limits on derived resource names.

use crate::types::Segment;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Longest identifier accepted by the function host for our purposes.
pub const IDENTIFIER_MAX: usize = 60;

/// Hex digits of SHA-256 used to disambiguate identifiers.
const HASH_SUFFIX_LEN: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("catch-all segment {segment} must be the last segment")]
    CatchAllNotLast { segment: String },
    #[error("malformed segment {0:?}")]
    MalformedSegment(String),
    #[error("parameter name {0:?} must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidParamName(String),
    #[error("parameter {0:?} appears more than once")]
    DuplicateParam(String),
}

/// Parse a single path component into a [`Segment`].
///
/// ```text
/// "blog"         → Literal("blog")
/// "[slug]"       → Param("slug")
/// "[...rest]"    → CatchAll("rest")
/// "[[...rest]]"  → OptionalCatchAll("rest")
/// "a[b]", "[]"   → MalformedSegment
/// ```
pub fn parse_segment(component: &str) -> Result<Segment, NameError> {
    if let Some(inner) = component
        .strip_prefix("[[...")
        .and_then(|s| s.strip_suffix("]]"))
    {
        return Ok(Segment::OptionalCatchAll(param_name(inner)?));
    }
    if let Some(inner) = component
        .strip_prefix("[...")
        .and_then(|s| s.strip_suffix(']'))
    {
        return Ok(Segment::CatchAll(param_name(inner)?));
    }
    if let Some(inner) = component.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return Ok(Segment::Param(param_name(inner)?));
    }
    if component.is_empty() || component.contains(['[', ']']) {
        return Err(NameError::MalformedSegment(component.to_string()));
    }
    Ok(Segment::Literal(component.to_string()))
}

fn param_name(inner: &str) -> Result<String, NameError> {
    if inner.is_empty() || inner.contains(['[', ']', '.']) {
        return Err(NameError::MalformedSegment(inner.to_string()));
    }
    let mut chars = inner.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(NameError::InvalidParamName(inner.to_string()));
    }
    Ok(inner.to_string())
}

/// Parse a module path relative to the pages root (`blog/[slug].js`) into
/// route segments.
///
/// The `.html`/`.js` extension is dropped and a trailing `index` component collapses
/// into the parent route. Catch-all segments must come last and a capture
/// name may only be used once per route.
pub fn parse_route(relative: &str) -> Result<Vec<Segment>, NameError> {
    let without_ext = relative
        .strip_suffix(".html")
        .or_else(|| relative.strip_suffix(".js"))
        .unwrap_or(relative);

    let mut components: Vec<&str> = without_ext.split('/').filter(|c| !c.is_empty()).collect();
    if components.last() == Some(&"index") {
        components.pop();
    }

    let mut segments = Vec::with_capacity(components.len());
    for component in components {
        segments.push(parse_segment(component)?);
    }

    if let Some(pos) = segments.iter().position(Segment::is_catch_all)
        && pos != segments.len() - 1
    {
        return Err(NameError::CatchAllNotLast {
            segment: segments[pos].to_string(),
        });
    }

    let mut seen = std::collections::HashSet::new();
    for name in segments.iter().filter_map(Segment::capture_name) {
        if !seen.insert(name) {
            return Err(NameError::DuplicateParam(name.to_string()));
        }
    }

    Ok(segments)
}

/// Derive the host-safe identifier for a route.
///
/// Literals keep their letters and digits (anything else becomes `_`),
/// captures are prefixed by one underscore per wildcard level so that the
/// literal `slug` and the parameter `[slug]` never share a name. Segments are
/// joined with `-`. Identifiers that would start with a non-letter get a
/// `page` prefix; identifiers longer than [`IDENTIFIER_MAX`] are shortened
/// with a hash suffix.
pub fn route_identifier(segments: &[Segment]) -> String {
    if segments.is_empty() {
        return "index".to_string();
    }

    let parts: Vec<String> = segments
        .iter()
        .map(|segment| match segment {
            Segment::Literal(s) => sanitize(s),
            Segment::Param(n) => format!("_{n}"),
            Segment::CatchAll(n) => format!("__{n}"),
            Segment::OptionalCatchAll(n) => format!("___{n}"),
        })
        .collect();
    let mut identifier = parts.join("-");

    if !identifier.starts_with(|c: char| c.is_ascii_alphabetic()) {
        identifier.insert_str(0, "page");
    }

    if identifier.len() > IDENTIFIER_MAX {
        let route: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
        identifier = with_hash_suffix(&identifier, &route.join("/"));
    }
    identifier
}

/// Shorten `base` to fit [`IDENTIFIER_MAX`] together with `-` and an
/// 8-hex-digit SHA-256 of `key`.
pub fn with_hash_suffix(base: &str, key: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(key.as_bytes()));
    let suffix = format!("-{}", &digest[..HASH_SUFFIX_LEN]);
    truncate_with_suffix(base, &suffix, IDENTIFIER_MAX)
}

fn sanitize(literal: &str) -> String {
    literal
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Truncate `base` so that `base + suffix` fits in `limit` characters.
///
/// Only the base is ever shortened. Trailing characters that are not ASCII
/// alphanumeric are stripped from the truncated base before `suffix` is
/// appended, so `my-app-` never turns into `my-app--42`.
///
/// - `("my-app", "-42", 60)` → `"my-app-42"`
/// - `("abcdef-ghij", "-7", 8)` → `"abcdef-7"`
/// - `("abcde-fghij", "-7", 8)` → `"abcde-7"` (the cut leaves `abcde-`)
pub fn truncate_with_suffix(base: &str, suffix: &str, limit: usize) -> String {
    let keep = limit.saturating_sub(suffix.chars().count());
    let truncated: String = base.chars().take(keep).collect();
    let trimmed = truncated.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
    format!("{trimmed}{suffix}")
}

/// Storage account names: 3-24 lowercase letters and digits.
pub const STORAGE_ACCOUNT_MAX: usize = 24;

/// Lowercase, strip everything that is not an ASCII letter or digit, and cap
/// at [`STORAGE_ACCOUNT_MAX`] characters.
pub fn storage_account_name(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(STORAGE_ACCOUNT_MAX)
        .collect()
}
