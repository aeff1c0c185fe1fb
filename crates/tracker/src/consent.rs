//! Visitor opt-out flag.
//!
//! A single boolean persisted under a fixed key in a small JSON file, read
//! once when the tracker is constructed. Any storage failure degrades to
//! "tracking enabled" and is logged, never propagated: analytics must never
//! break the resume.

use std::fs;
use std::io;
use std::path::Path;

use serde_json::{json, Value};
use tracing::warn;

/// The fixed storage key for the opt-out flag.
pub const OPT_OUT_KEY: &str = "folio_analytics_opt_out";

/// Whether the visitor has opted out of tracking. A missing file, missing
/// key, or unreadable store all default to false (tracking enabled).
pub fn opted_out(path: &Path) -> bool {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "consent store unreadable, defaulting to enabled");
            return false;
        }
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(doc) => doc
            .get(OPT_OUT_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "consent store corrupt, defaulting to enabled");
            false
        }
    }
}

/// Persist the opt-out flag, preserving any other keys in the store.
/// A non-object document (corrupt or otherwise) is replaced wholesale.
pub fn set_opt_out(path: &Path, opt_out: bool) -> io::Result<()> {
    let mut map = match fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
    {
        Some(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    map.insert(OPT_OUT_KEY.to_string(), json!(opt_out));

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, Value::Object(map).to_string())
}
