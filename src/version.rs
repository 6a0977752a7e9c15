use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CanvasError, CanvasResult};
use crate::state::{SnapshotData, SnapshotTarget};
use crate::util::time;

pub const ROOT_VERSION_NAME: &str = "Initial";
pub const MERGE_TAG: &str = "merge";

/// A named snapshot in the version tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    /// Milliseconds since the UNIX epoch
    pub timestamp: u64,
    /// Creation counter, breaks timestamp ties
    pub sequence: u64,
    pub name: String,
    pub description: String,
    #[serde(skip)]
    pub thumbnail: Option<Vec<u8>>,
    #[serde(skip)]
    pub data: SnapshotData,
    /// Children in creation order. The first one continues the parent's branch.
    pub children: Vec<Uuid>,
    pub tags: Vec<String>,
    pub is_main_branch: bool,
    /// Set for versions made by `create_branch`; they never count as main branch
    pub created_as_branch: bool,
    /// Second parent of a merge. Provenance only.
    pub merged_from: Option<Uuid>,
}

/// Tree of versions rooted at the initial snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct VersionTree {
    root_id: Uuid,
    versions: HashMap<Uuid, Version>,
    current_version_id: Uuid,
    next_sequence: u64,
}

impl VersionTree {
    fn with_root(root: Version) -> Self {
        let root_id = root.id;
        let next_sequence = root.sequence + 1;
        Self {
            root_id,
            versions: HashMap::from([(root_id, root)]),
            current_version_id: root_id,
            next_sequence,
        }
    }

    /// Rebuild a tree from stored versions.
    ///
    /// Fails unless every version reaches `root_id` through its parents and
    /// `current_version_id` is present.
    pub fn from_parts(root_id: Uuid, current_version_id: Uuid, versions: Vec<Version>) -> CanvasResult<Self> {
        let next_sequence = versions.iter().map(|v| v.sequence).max().unwrap_or(0) + 1;
        let versions: HashMap<Uuid, Version> = versions.into_iter().map(|v| (v.id, v)).collect();
        let tree = Self {
            root_id,
            versions,
            current_version_id,
            next_sequence,
        };
        if !tree.versions.contains_key(&root_id) {
            return Err(CanvasError::UnknownVersion(root_id));
        }
        if !tree.versions.contains_key(&current_version_id) {
            return Err(CanvasError::UnknownVersion(current_version_id));
        }
        if let Some(orphan) = tree.versions.keys().find(|id| !tree.reaches_root(**id)) {
            return Err(CanvasError::Restore(format!("version {orphan} is not connected to the root")));
        }
        Ok(tree)
    }

    pub fn root(&self) -> &Version {
        &self.versions[&self.root_id]
    }

    pub fn root_id(&self) -> Uuid {
        self.root_id
    }

    pub fn current(&self) -> &Version {
        &self.versions[&self.current_version_id]
    }

    pub fn current_version_id(&self) -> Uuid {
        self.current_version_id
    }

    pub fn get(&self, id: Uuid) -> Option<&Version> {
        self.versions.get(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.versions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// All versions ordered by creation
    pub fn versions(&self) -> Vec<&Version> {
        let mut all: Vec<&Version> = self.versions.values().collect();
        all.sort_by_key(|v| (v.timestamp, v.sequence));
        all
    }

    /// Follow parent links; bounded by the tree size so a cycle ends the walk
    fn reaches_root(&self, id: Uuid) -> bool {
        let mut cursor = Some(id);
        for _ in 0..=self.versions.len() {
            match cursor {
                Some(current) if current == self.root_id => return true,
                Some(current) => cursor = self.versions.get(&current).and_then(|v| v.parent_id),
                None => return false,
            }
        }
        false
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}

/// Branching history of named snapshots.
///
/// The canvas is passed into each call that needs it, so there is no state
/// in which a manager exists without a canvas to restore into.
#[derive(Debug)]
pub struct VersionManager {
    tree: VersionTree,
    max_versions: usize,
}

impl VersionManager {
    /// Create a manager whose root captures the canvas as it is now
    pub fn new(canvas: &impl SnapshotTarget, max_versions: usize) -> CanvasResult<Self> {
        let root = Version {
            id: Uuid::new_v4(),
            parent_id: None,
            timestamp: time::timestamp_millis(),
            sequence: 0,
            name: ROOT_VERSION_NAME.to_string(),
            description: String::new(),
            thumbnail: canvas.capture_thumbnail(),
            data: canvas.capture_snapshot()?,
            children: Vec::new(),
            tags: Vec::new(),
            is_main_branch: true,
            created_as_branch: false,
            merged_from: None,
        };
        Ok(Self::from_tree(VersionTree::with_root(root), max_versions))
    }

    /// Resume from a previously stored tree
    pub fn from_tree(tree: VersionTree, max_versions: usize) -> Self {
        let mut manager = Self {
            tree,
            max_versions: max_versions.max(2),
        };
        manager.refresh_main_flags();
        manager
    }

    pub fn tree(&self) -> &VersionTree {
        &self.tree
    }

    pub fn into_tree(self) -> VersionTree {
        self.tree
    }

    pub fn get(&self, id: Uuid) -> Option<&Version> {
        self.tree.get(id)
    }

    pub fn root_id(&self) -> Uuid {
        self.tree.root_id
    }

    pub fn current_version_id(&self) -> Uuid {
        self.tree.current_version_id
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn max_versions(&self) -> usize {
        self.max_versions
    }

    pub fn children(&self, id: Uuid) -> &[Uuid] {
        self.tree.get(id).map(|v| v.children.as_slice()).unwrap_or(&[])
    }

    /// Capture the canvas as a new child of the current version and make it current.
    pub fn create_version(
        &mut self,
        canvas: &impl SnapshotTarget,
        name: &str,
        description: &str,
        tags: Vec<String>,
    ) -> CanvasResult<Uuid> {
        self.commit(canvas, name, description, tags, false)
    }

    /// Switch to `from` and branch off it.
    pub fn create_branch(
        &mut self,
        canvas: &mut impl SnapshotTarget,
        from: Uuid,
        name: &str,
        description: &str,
    ) -> CanvasResult<Uuid> {
        self.try_switch(canvas, from)?;
        let id = self.commit(&*canvas, name, description, Vec::new(), true)?;
        info!("Created branch '{}' ({}) from {}", name, id, from);
        Ok(id)
    }

    /// Restore the canvas from `id` and make it current.
    ///
    /// Returns false if the id is unknown or the restore failed; the current
    /// version is unchanged in both cases.
    pub fn switch_to_version(&mut self, canvas: &mut impl SnapshotTarget, id: Uuid) -> bool {
        match self.try_switch(canvas, id) {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot switch to version {}: {}", id, e);
                false
            }
        }
    }

    /// Record a merge of `b` into `a`.
    ///
    /// Switches to `a` and commits its content as a new version tagged with
    /// `b`'s id. Content of `b` is not combined.
    pub fn merge_versions(
        &mut self,
        canvas: &mut impl SnapshotTarget,
        a: Uuid,
        b: Uuid,
        name: &str,
    ) -> CanvasResult<Uuid> {
        if !self.tree.contains(b) {
            return Err(CanvasError::UnknownVersion(b));
        }
        self.try_switch(canvas, a)?;
        let description = format!("Merge of {} into {}", b, a);
        let tags = vec![MERGE_TAG.to_string(), format!("merged-from:{b}")];
        let id = self.commit(&*canvas, name, &description, tags, false)?;
        if let Some(merged) = self.tree.versions.get_mut(&id) {
            merged.merged_from = Some(b);
        }
        info!("Merged {} into {} as {}", b, a, id);
        Ok(id)
    }

    /// True if `id` is reached from the root by always taking the first child,
    /// and nothing on the way was created as a branch.
    pub fn is_main_branch(&self, id: Uuid) -> bool {
        let mut cursor = id;
        for _ in 0..self.tree.len() {
            let Some(version) = self.tree.get(cursor) else {
                return false;
            };
            let Some(parent_id) = version.parent_id else {
                return cursor == self.tree.root_id;
            };
            if version.created_as_branch {
                return false;
            }
            let Some(parent) = self.tree.get(parent_id) else {
                return false;
            };
            if parent.children.first() != Some(&cursor) {
                return false;
            }
            cursor = parent_id;
        }
        false
    }

    /// Parent chain of `id`, nearest first, ending with the root.
    pub fn ancestors(&self, id: Uuid) -> Vec<Uuid> {
        let mut chain = Vec::new();
        let mut cursor = self.tree.get(id).and_then(|v| v.parent_id);
        while let Some(parent) = cursor {
            if chain.len() > self.tree.len() {
                break;
            }
            chain.push(parent);
            cursor = self.tree.get(parent).and_then(|v| v.parent_id);
        }
        chain
    }

    /// Versions without children, oldest first
    pub fn leaves(&self) -> Vec<Uuid> {
        self.tree
            .versions()
            .into_iter()
            .filter(|v| v.children.is_empty())
            .map(|v| v.id)
            .collect()
    }

    pub fn add_tag(&mut self, id: Uuid, tag: &str) -> bool {
        match self.tree.versions.get_mut(&id) {
            Some(version) => {
                if !version.tags.iter().any(|t| t == tag) {
                    version.tags.push(tag.to_string());
                }
                true
            }
            None => false,
        }
    }

    pub fn rename_version(&mut self, id: Uuid, name: &str) -> bool {
        match self.tree.versions.get_mut(&id) {
            Some(version) => {
                version.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Delete the oldest versions until the tree fits `max_versions`.
    ///
    /// The root and the current version's ancestor chain are never removed.
    /// Children of a removed version are re-attached to its parent at the
    /// removed version's position. Returns the removed ids.
    pub fn prune_old_versions(&mut self) -> Vec<Uuid> {
        if self.tree.len() <= self.max_versions {
            return Vec::new();
        }

        let current = self.tree.current_version_id;
        let mut keep: HashSet<Uuid> = self.ancestors(current).into_iter().collect();
        keep.insert(current);
        keep.insert(self.tree.root_id);

        let candidates: Vec<Uuid> = self
            .tree
            .versions()
            .into_iter()
            .filter(|v| !keep.contains(&v.id))
            .map(|v| v.id)
            .collect();

        let excess = self.tree.len() - self.max_versions;
        let removed: Vec<Uuid> = candidates.into_iter().take(excess).collect();
        for id in &removed {
            self.detach(*id);
        }
        self.refresh_main_flags();

        if !removed.is_empty() {
            debug!("Pruned {} versions, {} remain", removed.len(), self.tree.len());
        }
        removed
    }

    fn try_switch(&mut self, canvas: &mut impl SnapshotTarget, id: Uuid) -> CanvasResult<()> {
        let version = self.tree.get(id).ok_or(CanvasError::UnknownVersion(id))?;
        canvas.restore_snapshot(&version.data)?;
        info!("Switched to version '{}' ({})", version.name, id);
        self.tree.current_version_id = id;
        Ok(())
    }

    fn commit(
        &mut self,
        canvas: &impl SnapshotTarget,
        name: &str,
        description: &str,
        tags: Vec<String>,
        as_branch: bool,
    ) -> CanvasResult<Uuid> {
        let data = canvas.capture_snapshot()?;
        let parent_id = self.tree.current_version_id;
        let version = Version {
            id: Uuid::new_v4(),
            parent_id: Some(parent_id),
            timestamp: time::timestamp_millis(),
            sequence: self.tree.next_sequence(),
            name: name.to_string(),
            description: description.to_string(),
            thumbnail: canvas.capture_thumbnail(),
            data,
            children: Vec::new(),
            tags,
            is_main_branch: false,
            created_as_branch: as_branch,
            merged_from: None,
        };
        let id = version.id;

        self.tree.versions.insert(id, version);
        if let Some(parent) = self.tree.versions.get_mut(&parent_id) {
            parent.children.push(id);
        }
        self.tree.current_version_id = id;

        let main = self.is_main_branch(id);
        if let Some(version) = self.tree.versions.get_mut(&id) {
            version.is_main_branch = main;
        }
        info!("Created version '{}' ({}), parent {}", name, id, parent_id);

        self.prune_old_versions();
        Ok(id)
    }

    /// Remove one version, splicing its children into its parent
    fn detach(&mut self, id: Uuid) {
        let Some(version) = self.tree.versions.remove(&id) else {
            return;
        };
        let Some(parent_id) = version.parent_id else {
            return;
        };
        for child in &version.children {
            if let Some(child) = self.tree.versions.get_mut(child) {
                child.parent_id = Some(parent_id);
            }
        }
        if let Some(parent) = self.tree.versions.get_mut(&parent_id) {
            if let Some(index) = parent.children.iter().position(|c| *c == id) {
                parent.children.splice(index..=index, version.children.iter().copied());
            }
        }
    }

    fn refresh_main_flags(&mut self) {
        let flags: Vec<(Uuid, bool)> = self
            .tree
            .versions
            .keys()
            .map(|id| (*id, self.is_main_branch(*id)))
            .collect();
        for (id, main) in flags {
            if let Some(version) = self.tree.versions.get_mut(&id) {
                version.is_main_branch = main;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Canvas stand-in whose content is a single counter
    #[derive(Default)]
    struct Counter {
        value: Cell<u8>,
        fail_restore: bool,
    }

    impl SnapshotTarget for Counter {
        fn capture_snapshot(&self) -> CanvasResult<SnapshotData> {
            Ok(SnapshotData {
                metadata: Some(vec![self.value.get()]),
                ..SnapshotData::default()
            })
        }

        fn capture_thumbnail(&self) -> Option<Vec<u8>> {
            None
        }

        fn restore_snapshot(&mut self, data: &SnapshotData) -> CanvasResult<()> {
            if self.fail_restore {
                return Err(CanvasError::Restore("refused".into()));
            }
            self.value.set(data.metadata.as_ref().map_or(0, |m| m[0]));
            Ok(())
        }
    }

    #[test]
    fn test_splice_keeps_children_connected() {
        let canvas = Counter::default();
        let mut manager = VersionManager::new(&canvas, 100).unwrap();
        let a = manager.create_version(&canvas, "A", "", vec![]).unwrap();
        let b = manager.create_version(&canvas, "B", "", vec![]).unwrap();

        manager.detach(a);
        let root = manager.root_id();
        assert_eq!(manager.children(root), &[b]);
        assert_eq!(manager.get(b).unwrap().parent_id, Some(root));
    }

    #[test]
    fn test_failed_switch_keeps_current() {
        let mut canvas = Counter::default();
        let mut manager = VersionManager::new(&canvas, 100).unwrap();
        let root = manager.root_id();
        let a = manager.create_version(&canvas, "A", "", vec![]).unwrap();

        canvas.fail_restore = true;
        assert!(!manager.switch_to_version(&mut canvas, root));
        assert_eq!(manager.current_version_id(), a);
        assert!(!manager.switch_to_version(&mut canvas, Uuid::new_v4()));
    }

    #[test]
    fn test_from_parts_rejects_orphans() {
        let canvas = Counter::default();
        let manager = VersionManager::new(&canvas, 100).unwrap();
        let root = manager.root_id();
        let mut orphan = manager.get(root).unwrap().clone();
        orphan.id = Uuid::new_v4();
        orphan.parent_id = Some(Uuid::new_v4());

        let versions = vec![manager.get(root).unwrap().clone(), orphan];
        assert!(VersionTree::from_parts(root, root, versions).is_err());
    }
}
