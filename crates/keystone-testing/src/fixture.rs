//! Golden fixture loader.
//!
//! Loads golden files from `contracts/` (e.g. event envelope shapes) for
//! contract assertion tests.

use std::path::PathBuf;

use serde_json::Value;

/// Load a JSON fixture file relative to the workspace root.
///
/// # Example
/// ```no_run
/// use keystone_testing::fixture::Fixture;
/// let val = Fixture::load("contracts/events/tenant_created.json");
/// ```
pub struct Fixture;

impl Fixture {
    /// Load and parse a fixture JSON file at `workspace_root/path`.
    ///
    /// The workspace root is the nearest ancestor of the calling crate that
    /// contains `relative_path`.
    ///
    /// Panics if the file is missing or invalid JSON.
    pub fn load(relative_path: &str) -> Value {
        let full_path = Self::resolve(relative_path);
        let contents = std::fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("fixture not found at {}: {}", full_path.display(), e));
        serde_json::from_str(&contents)
            .unwrap_or_else(|e| panic!("invalid JSON in fixture {}: {}", relative_path, e))
    }

    fn resolve(relative_path: &str) -> PathBuf {
        let start = std::env::var("CARGO_MANIFEST_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().unwrap());
        start
            .ancestors()
            .find(|dir| dir.join(relative_path).exists())
            .unwrap_or(start.as_path())
            .join(relative_path)
    }
}
