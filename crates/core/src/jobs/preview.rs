//! Preview handles for source and converted files.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::types::PreviewHandle;
use crate::codec::ImageFile;

/// Hands out revocable references to in-memory files.
///
/// Every handle belongs to exactly one job and must be revoked when the job
/// supersedes it (retry, cancel, requeue) or goes away (session clear).
pub trait PreviewRegistry: Send + Sync {
    fn create(&self, file: &ImageFile) -> PreviewHandle;

    /// Returns false if the handle was unknown or already revoked.
    fn revoke(&self, handle: &PreviewHandle) -> bool;

    fn resolve(&self, handle: &PreviewHandle) -> Option<ImageFile>;

    /// Number of live handles.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct InMemoryPreviewRegistry {
    entries: Mutex<HashMap<PreviewHandle, ImageFile>>,
}

impl InMemoryPreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PreviewHandle, ImageFile>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PreviewRegistry for InMemoryPreviewRegistry {
    fn create(&self, file: &ImageFile) -> PreviewHandle {
        let handle = PreviewHandle::generate();
        self.entries().insert(handle.clone(), file.clone());
        handle
    }

    fn revoke(&self, handle: &PreviewHandle) -> bool {
        self.entries().remove(handle).is_some()
    }

    fn resolve(&self, handle: &PreviewHandle) -> Option<ImageFile> {
        self.entries().get(handle).cloned()
    }

    fn len(&self) -> usize {
        self.entries().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_create_resolve_revoke() {
        let registry = InMemoryPreviewRegistry::new();
        let handle = registry.create(&fixtures::opaque_source("a.png", 10));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve(&handle).unwrap().name, "a.png");

        assert!(registry.revoke(&handle));
        assert!(!registry.revoke(&handle));
        assert!(registry.resolve(&handle).is_none());
        assert!(registry.is_empty());
    }
}
