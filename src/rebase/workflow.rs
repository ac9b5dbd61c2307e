use serde::{Deserialize, Serialize};

use crate::RebaseError;

/// Second phase of an operation, run once `rebase --continue` succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Continuation {
    /// Drop the custom patch
    ResetPatch,
    /// Apply the patch forward at the destination commit, amend it and continue
    ApplyToDestination,
    /// Apply the patch forward into the index, then restore the stash if one was saved
    MoveIntoIndex { stash: bool },
}

/// Holds at most one pending [`Continuation`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseWorkflow {
    pending: Option<Continuation>,
}

impl RebaseWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_progress(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<Continuation> {
        self.pending
    }

    /// Queue `continuation`, refusing if another one is already pending.
    pub fn start(&mut self, continuation: Continuation) -> Result<(), RebaseError> {
        if self.in_progress() {
            return Err(RebaseError::WorkflowInProgress);
        }
        self.pending = Some(continuation);
        Ok(())
    }

    /// Remove and return the pending continuation
    pub fn take(&mut self) -> Option<Continuation> {
        self.pending.take()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}
