//! Snapshot-based linear undo/redo over serialized scene documents.
//!
//! The machine stores full document snapshots with a current-index pointer.
//! A new edit after an undo abandons the redo branch; history never
//! branches. Depth is bounded: past the cap the oldest snapshot silently
//! ages out while the index stays pinned near the cap.
//!
//! The machine is single-writer: it is driven by one interactive editing
//! session, and `save_state`/`undo`/`redo` must not be called concurrently
//! against the same instance. While a programmatic load is in flight (an
//! undo/redo replay or the initial document load), `save_state` is a no-op
//! so the machine does not record its own replay as a fresh user edit.
//!
//! In-memory snapshots may carry editor-proxied image URLs; they never
//! leave the session. Snapshots taken for persistence go through
//! [`persistable_snapshot`], which rewrites sources back to their canonical
//! remote form first.

use crate::{
    foundation::error::SceneResult,
    scene::model::SceneDocument,
    scene::proxy::{UrlResolver, canonicalize_sources},
};

/// Default maximum number of retained snapshots.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Linear snapshot history for one editing session.
#[derive(Debug)]
pub struct SceneHistory {
    snapshots: Vec<String>,
    current: Option<usize>,
    loading: bool,
    max_depth: usize,
}

impl Default for SceneHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneHistory {
    /// Empty history with the default depth cap.
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_HISTORY)
    }

    /// Empty history with a custom depth cap (minimum 1).
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            current: None,
            loading: false,
            max_depth: max_depth.max(1),
        }
    }

    /// Reset to empty, or to a single seed snapshot at index 0.
    pub fn initialize(&mut self, seed: Option<&SceneDocument>) -> SceneResult<()> {
        match seed {
            Some(doc) => {
                self.snapshots = vec![serde_json::to_string(doc)?];
                self.current = Some(0);
            }
            None => {
                self.snapshots = Vec::new();
                self.current = None;
            }
        }
        self.loading = false;
        Ok(())
    }

    /// Record a committed mutation.
    ///
    /// Discards any redo branch, appends the snapshot, and evicts the
    /// oldest snapshot instead of advancing once the depth cap is reached.
    /// No-op while a programmatic load is in progress.
    pub fn save_state(&mut self, doc: &SceneDocument) -> SceneResult<()> {
        if self.loading {
            return Ok(());
        }

        let json = serde_json::to_string(doc)?;

        // Abandon the future branch.
        match self.current {
            Some(i) => self.snapshots.truncate(i + 1),
            None => self.snapshots.clear(),
        }

        self.snapshots.push(json);
        if self.snapshots.len() > self.max_depth {
            self.snapshots.remove(0);
        } else {
            self.current = Some(self.current.map_or(0, |i| i + 1));
        }
        Ok(())
    }

    /// Step back one snapshot and return the document to replay.
    ///
    /// Marks a programmatic load as in progress; the caller applies the
    /// returned document to the live scene and then calls [`end_load`].
    /// Returns `None` (and stays put) at the oldest retained snapshot.
    ///
    /// [`end_load`]: SceneHistory::end_load
    pub fn undo(&mut self) -> SceneResult<Option<SceneDocument>> {
        let Some(i) = self.current else {
            return Ok(None);
        };
        if i == 0 {
            return Ok(None);
        }

        self.current = Some(i - 1);
        let doc: SceneDocument = serde_json::from_str(&self.snapshots[i - 1])?;
        self.loading = true;
        Ok(Some(doc))
    }

    /// Step forward one snapshot; the mirror of [`undo`](SceneHistory::undo).
    pub fn redo(&mut self) -> SceneResult<Option<SceneDocument>> {
        let Some(i) = self.current else {
            return Ok(None);
        };
        if i + 1 >= self.snapshots.len() {
            return Ok(None);
        }

        self.current = Some(i + 1);
        let doc: SceneDocument = serde_json::from_str(&self.snapshots[i + 1])?;
        self.loading = true;
        Ok(Some(doc))
    }

    /// Signal that a programmatic load (undo/redo replay or initial load)
    /// has finished being applied to the live scene.
    pub fn end_load(&mut self) {
        self.loading = false;
    }

    /// Mark the start of a programmatic load driven by the caller (e.g.
    /// loading a persisted document into the editor).
    pub fn begin_load(&mut self) {
        self.loading = true;
    }

    /// Whether stepping back is possible.
    pub fn can_undo(&self) -> bool {
        self.current.is_some_and(|i| i > 0)
    }

    /// Whether stepping forward is possible.
    pub fn can_redo(&self) -> bool {
        self.current
            .is_some_and(|i| i + 1 < self.snapshots.len())
    }

    /// Number of retained snapshots.
    pub fn depth(&self) -> usize {
        self.snapshots.len()
    }

    /// Current snapshot index, if any snapshot is active.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }
}

/// Serialize a document for persistence, rewriting any editor-proxied image
/// sources back to their canonical remote form.
pub fn persistable_snapshot(
    doc: &SceneDocument,
    resolver: &dyn UrlResolver,
) -> SceneResult<String> {
    let mut clone = doc.clone();
    canonicalize_sources(&mut clone, resolver);
    Ok(serde_json::to_string(&clone)?)
}
