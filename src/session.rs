//! Rebase-driven operations on a custom patch.
//!
//! A [`Session`] owns the custom patch, the pending continuation and the git
//! boundary for one repository. Every operation moving a patch follows the
//! same shape: stop a rebase at the commit to edit, apply the patch, amend,
//! queue whatever has to happen after the rebase moves on, and continue.

use tracing::{info, warn};

use crate::config::DEFAULT_STASH_PREFIX;
use crate::git::{GitRunner, SequenceAction, SequenceKind};
use crate::parse::{FileSelection, LineSelection};
use crate::patch::{PatchError, PatchManager};
use crate::rebase::todo::{self, Commit, TodoAction};
use crate::rebase::{Continuation, RebaseWorkflow};
use crate::state::SessionState;
use crate::{CarveError, GitCommandError, RebaseError};

/// Custom patch, pending continuation and git access for one repository
#[derive(Debug)]
pub struct Session<G> {
    git: G,
    patch: PatchManager,
    workflow: RebaseWorkflow,
    stash_prefix: String,
}

impl<G: GitRunner> Session<G> {
    pub fn new(git: G) -> Self {
        Self::from_state(git, SessionState::default())
    }

    /// Resume a session saved by an earlier invocation
    pub fn from_state(git: G, state: SessionState) -> Self {
        Self {
            git,
            patch: state.patch,
            workflow: state.workflow,
            stash_prefix: DEFAULT_STASH_PREFIX.to_string(),
        }
    }

    pub fn with_stash_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.stash_prefix = prefix.into();
        self
    }

    /// Snapshot of what must survive until the next invocation
    pub fn state(&self) -> SessionState {
        SessionState {
            patch: self.patch.clone(),
            workflow: self.workflow.clone(),
        }
    }

    pub fn git(&self) -> &G {
        &self.git
    }

    pub fn patch(&self) -> &PatchManager {
        &self.patch
    }

    pub fn patch_mut(&mut self) -> &mut PatchManager {
        &mut self.patch
    }

    pub fn workflow(&self) -> &RebaseWorkflow {
        &self.workflow
    }

    /// Begin a custom patch for `commit_sha` from already loaded diffs.
    ///
    /// Refused while a continuation is pending, since it would run against
    /// the new selection.
    pub fn start_patch<I, F, D>(&mut self, commit_sha: &str, diffs: I) -> Result<(), RebaseError>
    where
        I: IntoIterator<Item = (F, D)>,
        F: Into<String>,
        D: Into<String>,
    {
        if self.workflow.in_progress() {
            return Err(RebaseError::WorkflowInProgress);
        }
        self.patch.start(commit_sha, diffs);
        Ok(())
    }

    /// Begin a custom patch for `commit_sha`, loading each file's diff from git
    pub fn load_patch(&mut self, commit_sha: &str, files: &[String]) -> Result<(), CarveError> {
        let parent = format!("{commit_sha}^");
        let diffs = files
            .iter()
            .map(|file| {
                let diff = self.git.file_diff(&parent, commit_sha, false, file)?;
                Ok((file.clone(), diff))
            })
            .collect::<Result<Vec<_>, GitCommandError>>()?;
        Ok(self.start_patch(commit_sha, diffs)?)
    }

    /// Add a parsed `file[:refs]` selection to the custom patch
    pub fn select(&mut self, selection: &FileSelection) -> Result<(), PatchError> {
        match &selection.lines {
            LineSelection::Whole => self.patch.add_file_whole(&selection.file),
            LineSelection::Ranges(ranges) => ranges.iter().try_for_each(|&(first, last)| {
                self.patch.add_file_line_range(&selection.file, first, last)
            }),
        }
    }

    /// Stop an interactive rebase at the commit at `index` for editing.
    pub fn begin_interactive_rebase_for_commit(
        &mut self,
        commits: &[Commit],
        index: usize,
    ) -> Result<(), CarveError> {
        check_index(commits, index)?;
        self.ensure_no_gpg()?;
        self.start_edit_rebase(commits, index)
    }

    /// Run a single-commit interactive rebase applying `action` at `index`.
    ///
    /// Rewording opens the user's editor, every other action runs unattended.
    pub fn interactive_rebase(
        &mut self,
        commits: &[Commit],
        index: usize,
        action: TodoAction,
    ) -> Result<(), CarveError> {
        let (todo, base) = todo::generate_generic_rebase_todo(commits, index, action)?;
        self.git
            .interactive_rebase(&base, &todo, action != TodoAction::Reword)?;
        Ok(())
    }

    /// Swap the commit at `index` with its parent
    pub fn move_commit_down(&mut self, commits: &[Commit], index: usize) -> Result<(), CarveError> {
        let (todo, base) = todo::move_commit_down(commits, index)?;
        self.git.interactive_rebase(&base, &todo, true)?;
        Ok(())
    }

    /// Abort, continue or skip a merge or rebase.
    ///
    /// "No rebase in progress" is logged and ignored. A successful rebase
    /// continue runs the pending continuation; an abort discards it.
    pub fn merge_or_rebase_action(
        &mut self,
        kind: SequenceKind,
        action: SequenceAction,
    ) -> Result<(), CarveError> {
        match self.git.sequence_action(kind, action) {
            Ok(()) => {}
            Err(GitCommandError::NoRebaseInProgress { stderr }) => {
                warn!(stderr = %stderr.trim(), "{} --{}: nothing to do", kind.as_str(), action.as_str());
            }
            Err(e) => return Err(e.into()),
        }

        if kind == SequenceKind::Rebase && action == SequenceAction::Continue {
            if let Some(continuation) = self.workflow.take() {
                return self.run_continuation(continuation);
            }
        }
        if action == SequenceAction::Abort {
            self.workflow.clear();
        }
        Ok(())
    }

    pub fn continue_rebase(&mut self) -> Result<(), CarveError> {
        self.merge_or_rebase_action(SequenceKind::Rebase, SequenceAction::Continue)
    }

    pub fn abort_rebase(&mut self) -> Result<(), CarveError> {
        self.merge_or_rebase_action(SequenceKind::Rebase, SequenceAction::Abort)
    }

    /// Remove the custom patch from the commit it was built from.
    pub fn delete_patch_from_commit(
        &mut self,
        commits: &[Commit],
        index: usize,
    ) -> Result<(), CarveError> {
        self.check_ready(commits, index)?;
        self.ensure_no_gpg()?;
        info!(commit = %commits[index].sha, "removing patch from commit");

        self.start_edit_rebase(commits, index)?;
        self.apply_or_abort(true)?;
        self.git.amend_head()?;
        self.workflow.start(Continuation::ResetPatch)?;
        self.continue_rebase()
    }

    /// Move the custom patch from the commit at `source` into the one at `destination`.
    pub fn move_patch_to_commit(
        &mut self,
        commits: &[Commit],
        source: usize,
        destination: usize,
    ) -> Result<(), CarveError> {
        self.check_ready(commits, source)?;
        check_index(commits, destination)?;
        if source == destination {
            return Err(RebaseError::SameCommit { index: source }.into());
        }
        self.ensure_no_gpg()?;
        info!(
            from = %commits[source].sha,
            to = %commits[destination].sha,
            "moving patch between commits"
        );

        if source < destination {
            // Replaying the source afterwards merges the now duplicated lines away
            self.start_edit_rebase(commits, destination)?;
            self.apply_or_abort(false)?;
            self.git.amend_head()?;
            self.workflow.start(Continuation::ResetPatch)?;
            return self.continue_rebase();
        }

        let (todo, base) = todo::generate_edit_todo(commits, source, destination)?;
        self.git.interactive_rebase(&base, &todo, true)?;
        self.apply_or_abort(true)?;
        self.git.amend_head()?;
        self.workflow.start(Continuation::ApplyToDestination)?;
        self.continue_rebase()
    }

    /// Take the custom patch out of its commit and leave it staged in the index.
    ///
    /// With `stash`, local changes are stashed first and restored afterwards.
    /// Nothing is restored when there was nothing to stash.
    pub fn move_patch_into_index(
        &mut self,
        commits: &[Commit],
        index: usize,
        stash: bool,
    ) -> Result<(), CarveError> {
        self.check_ready(commits, index)?;
        self.ensure_no_gpg()?;
        info!(commit = %commits[index].sha, stash, "moving patch into index");

        let stashed = if stash {
            let message = format!("{}{}", self.stash_prefix, commits[index].sha);
            self.git.stash_save(&message)?
        } else {
            false
        };

        self.start_edit_rebase(commits, index)?;
        self.apply_or_abort_if_rebasing(true)?;
        self.git.amend_head()?;
        self.workflow
            .start(Continuation::MoveIntoIndex { stash: stashed })?;
        self.continue_rebase()
    }

    /// Split the custom patch out of its commit into a new commit right after it.
    pub fn pull_patch_into_new_commit(
        &mut self,
        commits: &[Commit],
        index: usize,
    ) -> Result<(), CarveError> {
        self.check_ready(commits, index)?;
        self.ensure_no_gpg()?;
        info!(commit = %commits[index].sha, "pulling patch into new commit");

        self.start_edit_rebase(commits, index)?;
        self.apply_or_abort(true)?;
        self.git.amend_head()?;
        self.apply_or_abort(false)?;

        let head_message = self.git.head_message().unwrap_or_default();
        self.git.commit(&format!("Split from \"{head_message}\""))?;

        self.patch.reset();
        self.continue_rebase()
    }

    fn run_continuation(&mut self, continuation: Continuation) -> Result<(), CarveError> {
        info!(?continuation, "rebase continued, resuming");
        match continuation {
            Continuation::ResetPatch => {
                self.patch.reset();
                Ok(())
            }
            Continuation::ApplyToDestination => {
                self.apply_or_abort(false)?;
                self.git.amend_head()?;
                self.workflow.start(Continuation::ResetPatch)?;
                self.continue_rebase()
            }
            Continuation::MoveIntoIndex { stash } => {
                self.apply_or_abort_if_rebasing(false)?;
                if stash {
                    self.git.stash_apply(0)?;
                }
                self.patch.reset();
                Ok(())
            }
        }
    }

    /// Refuse to start before touching the repository
    fn check_ready(&self, commits: &[Commit], index: usize) -> Result<(), CarveError> {
        if self.workflow.in_progress() {
            return Err(RebaseError::WorkflowInProgress.into());
        }
        let commit = check_index(commits, index)?;
        if !self.patch.is_active() {
            return Err(PatchError::NotStarted.into());
        }
        if self.patch.commit_sha() != commit.sha {
            return Err(PatchError::CommitMismatch {
                expected: self.patch.commit_sha().to_string(),
                actual: commit.sha.clone(),
            }
            .into());
        }
        if self.patch.is_empty() {
            return Err(PatchError::NothingSelected.into());
        }
        Ok(())
    }

    fn ensure_no_gpg(&self) -> Result<(), CarveError> {
        if self.git.using_gpg()? {
            return Err(RebaseError::DisabledForGpg.into());
        }
        Ok(())
    }

    fn start_edit_rebase(&mut self, commits: &[Commit], index: usize) -> Result<(), CarveError> {
        let (todo, base) =
            todo::generate_generic_rebase_todo(commits, index, TodoAction::Edit)?;
        self.git.interactive_rebase(&base, &todo, true)?;
        Ok(())
    }

    /// Apply the patch, aborting the rebase if git rejects it.
    ///
    /// A failing abort is reported instead of the apply error.
    fn apply_or_abort(&mut self, reverse: bool) -> Result<(), CarveError> {
        if let Err(e) = self.patch.apply_patches(&self.git, reverse) {
            warn!(error = %e, "patch did not apply, aborting rebase");
            self.abort_rebase()?;
            return Err(e.into());
        }
        Ok(())
    }

    fn apply_or_abort_if_rebasing(&mut self, reverse: bool) -> Result<(), CarveError> {
        if let Err(e) = self.patch.apply_patches(&self.git, reverse) {
            if self.git.is_rebasing()? {
                warn!(error = %e, "patch did not apply, aborting rebase");
                self.abort_rebase()?;
            }
            return Err(e.into());
        }
        Ok(())
    }
}

fn check_index(commits: &[Commit], index: usize) -> Result<&Commit, RebaseError> {
    commits.get(index).ok_or(RebaseError::IndexOutOfRange {
        index,
        len: commits.len(),
    })
}
