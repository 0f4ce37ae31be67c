use serde::Deserialize;
use std::path::Path;

pub const MAX_BATCH_SIZE: usize = 1024;
pub const MAX_CSTRING_LEN: usize = 65_536;

/// All configurable settings with their defaults.
///
/// `batch_size` trades expression-evaluation count against expression-parse
/// cost in the target; ~35 is the measured sweet spot for class-name batching.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Handles per compound remote expression.
    pub batch_size: usize,
    /// Byte cap for bounded C-string reads from target memory.
    pub cstring_max_len: usize,
    /// Superclass-chain walk bound (corruption guard).
    pub max_hierarchy_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: 35,
            cstring_max_len: 256,
            max_hierarchy_depth: 20,
        }
    }
}

/// Raw JSON representation — all fields optional for partial overrides.
#[derive(Debug, Deserialize, Default)]
struct SettingsFile {
    #[serde(rename = "batch.size")]
    batch_size: Option<usize>,
    #[serde(rename = "read.cstringMaxLen")]
    cstring_max_len: Option<usize>,
    #[serde(rename = "hierarchy.maxDepth")]
    max_hierarchy_depth: Option<usize>,
}

/// Resolve settings: defaults → user global → project-local.
pub fn resolve(project_root: Option<&Path>) -> Settings {
    let global_path = dirs::home_dir().map(|h| h.join(".objlens/settings.json"));
    let project_path = project_root.map(|r| r.join(".objlens/settings.json"));
    resolve_with_paths(global_path.as_deref(), project_path.as_deref())
}

/// Testable resolver that accepts explicit file paths (no home dir dependency).
fn resolve_with_paths(global_path: Option<&Path>, project_path: Option<&Path>) -> Settings {
    let mut settings = Settings::default();

    if let Some(path) = global_path {
        apply_file(&mut settings, path);
    }
    if let Some(path) = project_path {
        apply_file(&mut settings, path);
    }

    settings
}

fn apply_file(settings: &mut Settings, path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let Ok(file) = serde_json::from_str::<SettingsFile>(&content) else {
        tracing::warn!("Invalid settings file, ignoring: {}", path.display());
        return;
    };
    if let Some(v) = file.batch_size {
        if v >= 1 && v <= MAX_BATCH_SIZE {
            settings.batch_size = v;
        } else {
            tracing::warn!(
                "batch.size ({}) out of range (1..{}), using default",
                v,
                MAX_BATCH_SIZE
            );
        }
    }
    if let Some(v) = file.cstring_max_len {
        if v >= 16 && v <= MAX_CSTRING_LEN {
            settings.cstring_max_len = v;
        } else {
            tracing::warn!(
                "read.cstringMaxLen ({}) out of range (16..{}), using default",
                v,
                MAX_CSTRING_LEN
            );
        }
    }
    if let Some(v) = file.max_hierarchy_depth {
        if v >= 1 && v <= 128 {
            settings.max_hierarchy_depth = v;
        } else {
            tracing::warn!(
                "hierarchy.maxDepth ({}) out of range (1..128), using default",
                v
            );
        }
    }
}
