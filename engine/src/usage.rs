use crate::pool::ClipId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Answers whether the project still references a clip. With
/// `include_undo_history` the undo and redo stacks count as references too.
pub trait UsageScanner {
    fn is_in_use(&self, id: ClipId, include_undo_history: bool) -> bool;
}

impl<F> UsageScanner for F
where
    F: Fn(ClipId, bool) -> bool,
{
    fn is_in_use(&self, id: ClipId, include_undo_history: bool) -> bool {
        self(id, include_undo_history)
    }
}

/// Clip ids referenced by live regions and by undo/redo history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipReferences {
    #[serde(default)]
    pub regions: BTreeSet<ClipId>,
    #[serde(default)]
    pub undo_history: BTreeSet<ClipId>,
}

impl ClipReferences {
    pub fn reference(&mut self, id: ClipId) {
        self.undo_history.remove(&id);
        self.regions.insert(id);
    }

    /// The region is gone but undo can still bring it back.
    pub fn unreference(&mut self, id: ClipId) {
        if self.regions.remove(&id) {
            self.undo_history.insert(id);
        }
    }

    pub fn forget(&mut self, id: ClipId) {
        self.regions.remove(&id);
        self.undo_history.remove(&id);
    }

    pub fn clear_history(&mut self) {
        self.undo_history.clear();
    }
}

impl UsageScanner for ClipReferences {
    fn is_in_use(&self, id: ClipId, include_undo_history: bool) -> bool {
        self.regions.contains(&id) || (include_undo_history && self.undo_history.contains(&id))
    }
}
