//! Per-page function synthesis.
//!
//! Stage 2b of the pipeline. Every dynamic page becomes one function on the
//! host, made of two generated files:
//!
//! - `index.js`: an adapter that turns the trigger's request object into a
//!   Node request/response pair, calls the compiled page's `render`, and hands
//!   status, headers and body back untouched.
//! - `function.json`: the binding descriptor (HTTP trigger in, HTTP out).
//!
//! Output is a pure function of the [`Page`]: same page, same bytes. That keeps
//! builds reproducible and lets a deployment diff tell whether a function
//! actually changed.

use crate::types::{Page, PageKind};
use serde::Serialize;

/// Methods a rendered page answers to.
const PAGE_METHODS: &[&str] = &["get", "head"];

/// Methods an API route answers to.
const API_METHODS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options"];

/// Name the compiled page module is copied to inside its function directory.
pub const PAGE_MODULE_FILE: &str = "page.js";
pub const HANDLER_FILE: &str = "index.js";
pub const BINDING_FILE: &str = "function.json";

/// Generated function for one dynamic page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedHandler {
    /// Function name, also its directory name in the package.
    pub identifier: String,
    /// Compiled module this function wraps, relative to the pages root.
    pub source_path: String,
    pub handler_source: String,
    pub binding: String,
}

/// `function.json` contents.
#[derive(Debug, Serialize)]
pub struct FunctionManifest {
    pub bindings: Vec<Binding>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum Binding {
    #[serde(rename = "httpTrigger", rename_all = "camelCase")]
    HttpTrigger {
        direction: &'static str,
        name: &'static str,
        auth_level: &'static str,
        methods: Vec<&'static str>,
        route: String,
    },
    #[serde(rename = "http")]
    Http {
        direction: &'static str,
        name: &'static str,
    },
}

/// Build the binding descriptor for a page.
pub fn binding_for(page: &Page) -> FunctionManifest {
    let methods = if page.api { API_METHODS } else { PAGE_METHODS };
    FunctionManifest {
        bindings: vec![
            Binding::HttpTrigger {
                direction: "in",
                name: "req",
                auth_level: "anonymous",
                methods: methods.to_vec(),
                route: page.identifier.clone(),
            },
            Binding::Http {
                direction: "out",
                name: "$return",
            },
        ],
    }
}

/// Synthesize the function for a page. Returns `None` for anything that is
/// not dynamic.
pub fn synthesize(page: &Page) -> Result<Option<SynthesizedHandler>, serde_json::Error> {
    if page.kind != PageKind::Dynamic {
        return Ok(None);
    }

    let mut binding = serde_json::to_string_pretty(&binding_for(page))?;
    binding.push('\n');

    Ok(Some(SynthesizedHandler {
        identifier: page.identifier.clone(),
        source_path: page.source_path.clone(),
        handler_source: handler_source(page)?,
        binding,
    }))
}

/// Synthesize every dynamic page, in page order.
pub fn synthesize_all(pages: &[Page]) -> Result<Vec<SynthesizedHandler>, serde_json::Error> {
    let mut handlers = Vec::new();
    for page in pages {
        if let Some(handler) = synthesize(page)? {
            handlers.push(handler);
        }
    }
    Ok(handlers)
}

const HANDLER_TEMPLATE: &str = r#""use strict";

// Generated by pageship. Do not edit.
const http = require("http");
const page = require("./__MODULE__");

const ROUTE = __ROUTE__;

function requestUrl(req) {
  const url = new URL(req.originalUrl || req.url, "http://localhost");
  return url.pathname + url.search;
}

module.exports = async function (context, req) {
  const request = new http.IncomingMessage(null);
  request.method = req.method;
  request.url = requestUrl(req);
  request.headers = Object.assign({}, req.headers);
  if (req.rawBody !== undefined && req.rawBody !== null) {
    request.push(req.rawBody);
  }
  request.push(null);

  const response = new http.ServerResponse(request);
  const chunks = [];
  response.write = function (chunk, encoding) {
    if (chunk) chunks.push(Buffer.from(chunk, encoding));
    return true;
  };

  return new Promise(function (resolve, reject) {
    response.end = function (chunk, encoding) {
      if (chunk && typeof chunk !== "function") chunks.push(Buffer.from(chunk, encoding));
      resolve({
        status: response.statusCode,
        headers: response.getHeaders(),
        body: Buffer.concat(chunks),
        isRaw: true,
      });
    };
    context.log.verbose("render " + ROUTE + " " + request.url);
    Promise.resolve(page.render(request, response)).catch(reject);
  });
};
"#;

fn handler_source(page: &Page) -> Result<String, serde_json::Error> {
    // JSON string literals are valid JavaScript string literals.
    let route = serde_json::to_string(&page.route())?;
    Ok(HANDLER_TEMPLATE
        .replace("__MODULE__", PAGE_MODULE_FILE)
        .replace("__ROUTE__", &route))
}
