//! SPA asset serving
//!
//! Resolves request paths against the built UI directory. Extension-less paths
//! that do not exist are client-side routes and get `index.html`.

use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::config::{AppState, AssetsConfig};
use crate::http::cache::CachePolicy;
use crate::http::{self, ConditionalRequest, Content};
use crate::logger;

/// Served when the asset directory has no index page
const PLACEHOLDER_INDEX: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Ratel</title>
</head>
<body>
    <h1>Ratel</h1>
    <p>The UI bundle was not found. Build the client and point <code>assets.dir</code> at it.</p>
    <p>Dgraph address: <code>{{.Addr}}</code></p>
</body>
</html>
"#;

/// Bundler output with content hashes in the file names
const FINGERPRINTED_DIR: &str = "static";

/// How a request path resolves
#[derive(Debug, PartialEq, Eq)]
pub enum AssetPath {
    Index,
    File(PathBuf),
    Invalid,
}

/// Strip the leading slash and reject anything that could escape the asset dir
pub fn normalize_path(path: &str, index_name: &str) -> AssetPath {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() || trimmed == index_name {
        return AssetPath::Index;
    }

    let mut clean = PathBuf::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return AssetPath::Invalid;
        }
        clean.push(segment);
    }
    // A segment like "C:" would still make the path absolute on Windows
    if clean.components().any(|c| !matches!(c, Component::Normal(_))) {
        return AssetPath::Invalid;
    }
    AssetPath::File(clean)
}

/// Fill the `{{.Addr}}` placeholder
pub fn render_index(template: &str, addr: &str) -> String {
    let escaped = escape_html(addr);
    template
        .replace("{{.Addr}}", &escaped)
        .replace("{{ .Addr }}", &escaped)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Read and template the index page once at startup
pub fn prepare_index(cfg: &AssetsConfig, addr: &str) -> Content {
    let path = cfg.dir.join(&cfg.index);
    let (template, mod_time) = match std::fs::read_to_string(&path) {
        Ok(template) => {
            let mod_time = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .map_or_else(|_| Utc::now(), DateTime::<Utc>::from);
            (template, mod_time)
        }
        Err(e) => {
            logger::log_warning(&format!(
                "Index page '{}' unavailable ({e}); serving placeholder",
                path.display()
            ));
            (PLACEHOLDER_INDEX.to_string(), Utc::now())
        }
    };

    Content::new(cfg.index.clone(), mod_time, render_index(&template, addr))
        .with_cache_policy(CachePolicy::Revalidate)
}

/// Load a file below `root` as content
async fn load_asset(root: &Path, relative: &Path) -> Option<Content> {
    let full = root.join(relative);
    let meta = fs::metadata(&full).await.ok()?;
    if !meta.is_file() {
        return None;
    }
    let bytes = match fs::read(&full).await {
        Ok(b) => b,
        Err(e) => {
            logger::log_error(&format!("Failed to read asset '{}': {e}", full.display()));
            return None;
        }
    };
    let mod_time = meta.modified().map_or_else(|_| Utc::now(), DateTime::<Utc>::from);
    let policy = if relative.starts_with(FINGERPRINTED_DIR) {
        CachePolicy::Immutable
    } else {
        CachePolicy::default()
    };
    Some(Content::new(relative.to_string_lossy(), mod_time, bytes).with_cache_policy(policy))
}

/// Serve a bundled asset or fall back to the index page
pub async fn serve_asset(
    path: &str,
    req: &ConditionalRequest,
    state: &AppState,
) -> Response<Full<Bytes>> {
    let relative = match normalize_path(path, &state.config.assets.index) {
        AssetPath::Index => return state.index.serve(req),
        AssetPath::File(p) => p,
        AssetPath::Invalid => return asset_not_found(path),
    };

    if let Some(content) = load_asset(&state.config.assets.dir, &relative).await {
        return content.serve(req);
    }

    if relative.extension().is_none() {
        // Client-side route, e.g. /schema or /acl/users
        return state.index.serve(req);
    }
    asset_not_found(path)
}

fn asset_not_found(path: &str) -> Response<Full<Bytes>> {
    let path = path.strip_prefix('/').unwrap_or(path);
    http::build_404_response(&format!("Asset not found for path {path}"))
}
