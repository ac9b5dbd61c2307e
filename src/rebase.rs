//! Interactive rebase planning and sequencing.

pub mod editor;
pub mod todo;
pub mod workflow;

pub use editor::{ClientCommand, EditorError};
pub use todo::{Commit, TodoAction};
pub use workflow::{Continuation, RebaseWorkflow};
