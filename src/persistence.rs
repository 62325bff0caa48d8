//! On-disk format of a [`Context`](crate::context::Context).
//!
//! The context is stored as one JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "profiles": [ { "id": "…", "title": "Game", "plugins": [ { "type": "ButtonToAxis", … } ] } ],
//!   "groups": { "keyboards": [], "mice": [], "joysticks": [ … ], "generic": [] }
//! }
//! ```
//!
//! Only configuration is stored. Runtime state (which profile is active, live
//! subscriptions, plugin edge memory) is never written and is reset on load.
//!
//! Documents written by a newer schema are rejected rather than partially understood.

use crate::error::{EngineError, EngineResult};
use crate::group::DeviceGroupRegistry;
use crate::profile::Profile;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// A deserialized context document.
#[derive(Debug, Deserialize)]
pub struct ContextDocument {
    pub version: u32,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub groups: DeviceGroupRegistry,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: u32,
    profiles: &'a [Profile],
    groups: &'a DeviceGroupRegistry,
}

/// Serialize profiles and groups as a pretty-printed document.
pub fn to_json(profiles: &[Profile], groups: &DeviceGroupRegistry) -> EngineResult<String> {
    let doc = DocumentRef {
        version: CURRENT_SCHEMA_VERSION,
        profiles,
        groups,
    };
    serde_json::to_string_pretty(&doc)
        .map_err(|e| EngineError::PersistenceSaveFailed(e.to_string()))
}

/// Parse a document, rejecting unknown schema versions.
pub fn from_json(s: &str) -> EngineResult<ContextDocument> {
    let doc: ContextDocument =
        serde_json::from_str(s).map_err(|e| EngineError::PersistenceLoadFailed(e.to_string()))?;
    if doc.version > CURRENT_SCHEMA_VERSION {
        return Err(EngineError::PersistenceLoadFailed(format!(
            "schema version {} is newer than supported version {CURRENT_SCHEMA_VERSION}",
            doc.version
        )));
    }
    Ok(doc)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write the document next to `path` and rename it into place.
///
/// A failed save leaves any previous file untouched.
pub fn save_document(
    path: &Path,
    profiles: &[Profile],
    groups: &DeviceGroupRegistry,
) -> EngineResult<()> {
    let json = to_json(profiles, groups)?;
    let save_err = |e: std::io::Error| {
        EngineError::PersistenceSaveFailed(format!("{}: {e}", path.display()))
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(save_err)?;
    }
    let tmp = temp_path(path);
    fs::write(&tmp, json).map_err(save_err)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(save_err(e));
    }

    debug!(
        path = %path.display(),
        profiles = profiles.len(),
        groups = groups.len(),
        "context saved"
    );
    Ok(())
}

/// Read and parse the document at `path`.
pub fn load_document(path: &Path) -> EngineResult<ContextDocument> {
    let content = fs::read_to_string(path)
        .map_err(|e| EngineError::PersistenceLoadFailed(format!("{}: {e}", path.display())))?;
    from_json(&content)
}
