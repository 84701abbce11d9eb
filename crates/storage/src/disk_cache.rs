//! On-disk copy of cached images.
//!
//! Each entry is a PNG plus a JSON sidecar holding the key text and the entry
//! metadata. Files are written to a temporary name and renamed into place;
//! the sidecar goes first, so a visible PNG always has its sidecar.

use bytes::Bytes;
use map_common::{MapError, MapResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache_key::{CacheKey, Tier};
use crate::tile_cache::{CacheEntry, EntryMetadata};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    key: String,
    metadata: EntryMetadata,
}

/// Directory of persisted entries for one tier.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    /// Use `<root>/<tier>`, creating it if needed.
    pub fn new(root: &Path, tier: Tier) -> MapResult<Self> {
        let dir = root.join(tier.as_str());
        fs::create_dir_all(&dir).map_err(|e| {
            MapError::configuration(format!("cannot create image dir {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn png_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.png", key.file_stem()))
    }

    pub fn sidecar_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.file_stem()))
    }

    /// Load an entry, or `None` when it has not been persisted.
    ///
    /// Blocking; call from a blocking task.
    pub fn load(&self, key: &CacheKey) -> MapResult<Option<CacheEntry>> {
        let png_path = self.png_path(key);
        let png = match fs::read(&png_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let sidecar: Sidecar = serde_json::from_slice(&fs::read(self.sidecar_path(key))?)?;
        if sidecar.key != key.as_str() {
            warn!(
                path = %png_path.display(),
                stored = %sidecar.key,
                "Persisted image belongs to a different key, ignoring"
            );
            return Ok(None);
        }

        let bitmap = image::load_from_memory(&png)?.to_rgba8();
        debug!(path = %png_path.display(), "Loaded persisted image");

        Ok(Some(CacheEntry {
            key: sidecar.key,
            bitmap: Arc::new(bitmap),
            png: Bytes::from(png),
            metadata: sidecar.metadata,
        }))
    }

    /// Persist an entry. Blocking; call from a blocking task.
    pub fn store(&self, key: &CacheKey, entry: &CacheEntry) -> MapResult<()> {
        let sidecar = Sidecar {
            key: key.as_str().to_string(),
            metadata: entry.metadata.clone(),
        };
        let json = serde_json::to_vec(&sidecar)?;

        write_atomic(&self.sidecar_path(key), &json)?;
        write_atomic(&self.png_path(key), &entry.png)?;
        Ok(())
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> MapResult<()> {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("tmp{}-{}", std::process::id(), n));

    let result = fs::write(&tmp, data).and_then(|_| fs::rename(&tmp, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(MapError::PersistenceFailure(format!(
            "{}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}
