//! Patch slicing and the commit-scoped custom patch.
//!
//! [`PatchModifier`] turns a file diff plus a set of selected line indices
//! into a patch `git apply` accepts, [`PatchParser`] classifies diff lines
//! for display and navigation, and [`PatchManager`] accumulates per-file
//! selections for a single commit.

use error_set::error_set;

mod hunk;
mod manager;
mod modifier;
mod parser;

pub use hunk::{PatchHunk, extract_header, extract_hunks};
pub use manager::{PatchManager, PatchStatus};
pub use modifier::{PatchModifier, modified_patch_for_lines, modified_patch_for_range};
pub use parser::{LineKind, PatchLine, PatchParser};

error_set! {
    /// Errors from building or applying a custom patch
    PatchError := {
        #[display("File '{file}' is not part of the current patch")]
        UnknownFile { file: String },
        #[display("No lines are selected in the current patch")]
        NothingSelected,
        #[display("The current patch belongs to commit {expected}, not {actual}")]
        CommitMismatch { expected: String, actual: String },
        #[display("No patch has been started")]
        NotStarted,
    }
}
