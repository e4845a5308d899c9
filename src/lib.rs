//! # pageship
//!
//! Re-hosts a compiled, file-routed web application on a serverless function
//! host plus blob storage. The upstream compiler has already turned every page
//! into either pre-rendered html or a server-render module; pageship works out
//! which is which, synthesizes one function per server-rendered page, builds
//! the ordered route-proxy table that stitches the site back together, and
//! deploys the lot.
//!
//! # Architecture: Four-Stage Pipeline
//!
//! ```text
//! 1. Classify  build/serverless/pages  →  Vec<Page>         (kinds, routes, identifiers)
//! 2. Route     pages                   →  Vec<RouteEntry>   (first-match-wins order)
//!    Handlers  pages                   →  functions         (index.js + function.json)
//! 3. Package   everything above        →  out/              ({app}.zip, assets/, public/)
//! 4. Deploy    out/                    →  cloud             (idempotent steps, retried upload)
//! ```
//!
//! Stages 1 to 3 are pure apart from reading the build tree and writing the
//! output directory, so they are exercised end to end in tests without a
//! cloud account. Stage 4 talks to the cloud only through
//! [`deploy::CloudProvider`].
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`classify`] | Stage 1: walks the compiled pages tree, assigns each module a kind and identifier |
//! | [`routes`] | Stage 2: ordered proxy table, precedence comparator, template matching |
//! | [`handler`] | Stage 2: per-page function adapter and binding descriptor |
//! | [`package`] | Stage 3: `proxies.json`, `host.json`, the store-only archive and the asset trees |
//! | [`deploy`] | Stage 4: provider trait, `az` implementation, orchestrator and teardown |
//! | [`pipeline`] | Wires the stages together; errors name the failing phase |
//! | [`config`] | `pageship.toml` loading, merging and validation; CI build context |
//! | [`target`] | Resolved cloud resource names, including per-change-request names |
//! | [`naming`] | Route segment parsing and host-safe name derivation |
//! | [`types`] | Shared types: `Segment`, `Page`, `PageKind`, `RouteEntry` |
//! | [`output`] | CLI output formatting for every stage |
//!
//! # Design Decisions
//!
//! ## Order Is the Routing Logic
//!
//! The proxy host evaluates routes first-match-wins. Instead of relying on
//! discovery order, [`routes::compare_specificity`] is a total order that
//! puts the more specific pattern first whenever two patterns overlap. Two
//! pages that can never be told apart are rejected up front.
//!
//! ## Ephemeral Deployments
//!
//! With a change request id, every resource the deployment creates gets a
//! per-change name (see [`target`]), so parallel reviews never overwrite each
//! other and teardown removes exactly what one review created.
//!
//! ## Reproducible Artifacts
//!
//! Identifiers, manifests and the archive are pure functions of the build
//! tree. Rerunning a build gives byte-identical output, which keeps redeploys
//! of an unchanged site cheap to reason about.

pub mod classify;
pub mod config;
pub mod deploy;
pub mod handler;
pub mod naming;
pub mod output;
pub mod package;
pub mod pipeline;
pub mod routes;
pub mod target;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
