use std::{fs, path::PathBuf};

use tracing::warn;

/// Best-effort blob cache under a single root directory. Keys are stable
/// relative paths ("territories.json", "friends/Steve.json"). Caching is an
/// availability aid, not a durability guarantee: a failed write is logged and
/// dropped, a failed read is indistinguishable from a missing entry.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    enabled: bool,
}

impl CacheStore {
    /// Opens the store, creating the root directory. If the root cannot be
    /// created the store stays usable but inert, so the rest of the system
    /// runs live-only.
    pub fn new(root: PathBuf) -> Self {
        let enabled = match fs::create_dir_all(&root) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    ?err,
                    root = %root.display(),
                    "cache root is not writable; continuing without a local cache"
                );
                false
            }
        };
        Self { root, enabled }
    }

    pub fn write(&self, key: &str, bytes: &[u8]) {
        if !self.enabled {
            return;
        }
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(?err, path = %parent.display(), "failed creating cache subdirectory");
                return;
            }
        }
        if let Err(err) = fs::write(&path, bytes) {
            warn!(?err, path = %path.display(), "failed writing cache entry");
        }
    }

    pub fn read(&self, key: &str) -> Option<Vec<u8>> {
        if !self.enabled {
            return None;
        }
        fs::read(self.path_for(key)).ok()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}
