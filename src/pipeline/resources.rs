use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;

use crate::core::recording::OutputArtifact;

/// Opaque reference handed out for a staged input or a produced output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub enum ObjectResource {
    /// Uploaded bytes staged on disk; removed when revoked.
    TempFile(NamedTempFile),
    /// Caller-owned file, only referenced.
    Borrowed(PathBuf),
    Artifact(OutputArtifact),
}

impl ObjectResource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ObjectResource::TempFile(file) => Some(file.path()),
            ObjectResource::Borrowed(path) => Some(path),
            ObjectResource::Artifact(_) => None,
        }
    }
}

/// Every live handle, so none outlives the session that created it.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    next_id: u64,
    entries: HashMap<u64, ObjectResource>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource: ObjectResource) -> ObjectHandle {
        self.next_id += 1;
        let handle = ObjectHandle(self.next_id);
        self.entries.insert(handle.0, resource);
        handle
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&ObjectResource> {
        self.entries.get(&handle.0)
    }

    pub fn path(&self, handle: ObjectHandle) -> Option<&Path> {
        self.get(handle).and_then(ObjectResource::path)
    }

    pub fn artifact(&self, handle: ObjectHandle) -> Option<&OutputArtifact> {
        match self.get(handle) {
            Some(ObjectResource::Artifact(artifact)) => Some(artifact),
            _ => None,
        }
    }

    /// Drop the resource behind `handle`. False when it was already gone.
    pub fn revoke(&mut self, handle: ObjectHandle) -> bool {
        let removed = self.entries.remove(&handle.0).is_some();
        if removed {
            debug!("revoked object handle {}", handle.0);
        }
        removed
    }

    pub fn live_count(&self) -> usize {
        self.entries.len()
    }
}
