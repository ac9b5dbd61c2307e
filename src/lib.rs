//! Carve selected lines out of git commits.
//!
//! The library slices unified diffs down to an arbitrary selection of lines,
//! regenerates patches that `git apply` accepts for exactly those lines, and
//! drives scripted interactive rebases that move such a patch out of a
//! commit, into another commit, into the index or into a brand new commit.

use error_set::error_set;

pub mod config;
pub mod git;
pub mod parse;
pub mod patch;
pub mod rebase;
pub mod session;
pub mod state;

pub use config::Config;
pub use git::{ApplyFlag, DiffSource, GitCli, GitRunner, PatchApplier, SequenceAction, SequenceKind};
pub use parse::{FileSelection, LineSelection, ParseError};
pub use patch::{
    LineKind, PatchError, PatchHunk, PatchLine, PatchManager, PatchModifier, PatchParser,
    PatchStatus,
};
pub use rebase::{Commit, Continuation, EditorError, RebaseWorkflow, TodoAction};
pub use session::Session;
pub use state::{SessionState, StateError, StateStore};

error_set! {
    /// Top-level error for git-carve operations
    CarveError := {
        #[display("Failed to access rebase todo {path}: {message}")]
        TodoFile { path: String, message: String },
        ParseError(ParseError),
        PatchError(PatchError),
        StateError(StateError),
        EditorError(EditorError),
    } || RebaseError || GitCommandError

    /// Errors raised while planning or sequencing a rebase
    RebaseError := {
        #[display("Index {index} is outside of the range of {len} commits")]
        IndexOutOfRange { index: usize, len: usize },
        #[display("You cannot interactive rebase onto the first commit")]
        CannotRebaseOntoFirstCommit,
        #[display("You cannot squash or fixup onto the second commit")]
        CannotSquashOntoSecondCommit,
        #[display("There is no room to move commit {index} down")]
        NoRoomToMove { index: usize },
        #[display("You are midway through another rebase operation. Please abort to start again")]
        WorkflowInProgress,
        #[display("Feature not available for users using GPG")]
        DisabledForGpg,
        #[display("Todo item {index} not found in rebase todo")]
        TodoItemNotFound { index: usize },
        #[display("Commit {index} is both the source and the destination")]
        SameCommit { index: usize },
        #[display("Unknown rebase action '{action}'")]
        UnknownAction { action: String },
    }

    /// Errors from git command execution
    GitCommandError := {
        #[display("Failed to run git {command}: {message}")]
        SpawnFailed { command: String, message: String },
        #[display("git {command} failed: {stderr}")]
        ExitError { command: String, stderr: String },
        #[display("Invalid UTF-8 in git output: {message}")]
        InvalidUtf8 { message: String },
        #[display("Failed to get stdin handle for git apply")]
        ApplyStdinFailed,
        #[display("Failed to write patch to git apply: {message}")]
        ApplyWriteFailed { message: String },
        #[display("Failed to wait for git {command}: {message}")]
        WaitFailed { command: String, message: String },
        #[display("git apply rejected the patch: {stderr}")]
        ApplyRejected { stderr: String },
        #[display("No rebase in progress: {stderr}")]
        NoRebaseInProgress { stderr: String },
        #[display("Could not locate the git-carve executable: {message}")]
        CurrentExe { message: String },
    }
}
