use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SnapshotData;
use crate::error::{CanvasError, CanvasResult};
use crate::version::{Version, VersionTree};

const TREE_FILE: &str = "tree.json";
const THUMBNAIL_FILE: &str = "thumbnail.png";
const METADATA_FILE: &str = "metadata.json";

/// On-disk format version of `tree.json`
pub const FORMAT_VERSION: u32 = 1;

/// Metadata part of a version tree as written to `tree.json`.
///
/// Layer blobs and thumbnails live next to it, one directory per version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTree {
    pub format_version: u32,
    pub root_id: Uuid,
    pub current_version_id: Uuid,
    /// Oldest first
    pub versions: Vec<Version>,
    /// Crate version that wrote the file
    pub written_by: String,
}

/// Writes version trees to a directory and reads them back.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True if a tree has been saved here
    pub fn exists(&self) -> bool {
        self.dir.join(TREE_FILE).is_file()
    }

    /// Write `tree` and all its blobs, replacing whatever was stored before.
    pub fn save_tree(&self, tree: &VersionTree) -> CanvasResult<()> {
        fs::create_dir_all(&self.dir)?;

        let versions: Vec<Version> = tree.versions().into_iter().cloned().collect();
        for version in &versions {
            self.save_snapshot(version.id, &version.data)?;
            if let Some(thumbnail) = &version.thumbnail {
                fs::write(self.version_dir(version.id).join(THUMBNAIL_FILE), thumbnail)?;
            }
        }
        self.remove_stale_dirs(tree)?;

        let stored = StoredTree {
            format_version: FORMAT_VERSION,
            root_id: tree.root_id(),
            current_version_id: tree.current_version_id(),
            versions,
            written_by: env!("CARGO_PKG_VERSION").to_string(),
        };
        fs::write(self.dir.join(TREE_FILE), serde_json::to_string_pretty(&stored)?)?;
        info!("Saved {} versions to {}", tree.len(), self.dir.display());
        Ok(())
    }

    /// Read a tree written by [`SnapshotStore::save_tree`].
    pub fn load_tree(&self) -> CanvasResult<VersionTree> {
        let json = fs::read_to_string(self.dir.join(TREE_FILE))?;
        let stored: StoredTree = serde_json::from_str(&json)?;
        if stored.format_version != FORMAT_VERSION {
            return Err(CanvasError::Restore(format!(
                "unsupported tree format {} (written by {})",
                stored.format_version, stored.written_by
            )));
        }

        let mut versions = stored.versions;
        for version in &mut versions {
            version.data = self.load_snapshot(version.id)?;
            let thumbnail = self.version_dir(version.id).join(THUMBNAIL_FILE);
            version.thumbnail = thumbnail.is_file().then(|| fs::read(&thumbnail)).transpose()?;
        }
        let tree = VersionTree::from_parts(stored.root_id, stored.current_version_id, versions)?;
        info!("Loaded {} versions from {}", tree.len(), self.dir.display());
        Ok(tree)
    }

    /// Write one snapshot as `<id>/<layer>.bin` plus `<id>/metadata.json`.
    pub fn save_snapshot(&self, id: Uuid, data: &SnapshotData) -> CanvasResult<()> {
        let dir = self.version_dir(id);
        fs::create_dir_all(&dir)?;
        for (file, blob) in Self::blob_files(data) {
            let path = dir.join(file);
            match blob {
                Some(bytes) => fs::write(path, bytes)?,
                None if path.exists() => fs::remove_file(path)?,
                None => {}
            }
        }
        debug!("Wrote snapshot {} ({} bytes)", id, data.byte_len());
        Ok(())
    }

    pub fn load_snapshot(&self, id: Uuid) -> CanvasResult<SnapshotData> {
        let dir = self.version_dir(id);
        if !dir.is_dir() {
            return Err(CanvasError::UnknownVersion(id));
        }
        let read = |file: &str| -> CanvasResult<Option<Vec<u8>>> {
            let path = dir.join(file);
            Ok(path.is_file().then(|| fs::read(&path)).transpose()?)
        };
        Ok(SnapshotData {
            base_image: read("base.bin")?,
            drawing_layer: read("drawing.bin")?,
            text_layer: read("text.bin")?,
            mask_layer: read("mask.bin")?,
            reference_layers: read("reference.bin")?,
            metadata: read(METADATA_FILE)?,
        })
    }

    fn blob_files(data: &SnapshotData) -> [(&'static str, Option<&Vec<u8>>); 6] {
        [
            ("base.bin", data.base_image.as_ref()),
            ("drawing.bin", data.drawing_layer.as_ref()),
            ("text.bin", data.text_layer.as_ref()),
            ("mask.bin", data.mask_layer.as_ref()),
            ("reference.bin", data.reference_layers.as_ref()),
            (METADATA_FILE, data.metadata.as_ref()),
        ]
    }

    fn version_dir(&self, id: Uuid) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Delete directories of versions that are no longer in the tree
    fn remove_stale_dirs(&self, tree: &VersionTree) -> CanvasResult<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let stale = entry
                .file_name()
                .to_str()
                .and_then(|name| Uuid::parse_str(name).ok())
                .is_some_and(|id| !tree.contains(id));
            if stale {
                debug!("Removing pruned version dir {}", entry.path().display());
                fs::remove_dir_all(entry.path())?;
            }
        }
        Ok(())
    }
}
