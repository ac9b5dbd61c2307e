//! Rebase todo scripts.
//!
//! Commit lists are ordered newest first, as `git log` prints them, while a
//! todo script lists the oldest commit first. Every generator here takes the
//! former and produces the latter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::RebaseError;

/// A commit as listed in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub name: String,
    pub is_merge: bool,
}

impl Commit {
    pub fn new(sha: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sha: sha.into(),
            name: name.into(),
            is_merge: false,
        }
    }

    pub fn merge(sha: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            is_merge: true,
            ..Self::new(sha, name)
        }
    }
}

/// An instruction in a rebase todo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoAction {
    Pick,
    Edit,
    Reword,
    Squash,
    Fixup,
    Drop,
}

impl TodoAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pick => "pick",
            Self::Edit => "edit",
            Self::Reword => "reword",
            Self::Squash => "squash",
            Self::Fixup => "fixup",
            Self::Drop => "drop",
        }
    }

    /// Squash and fixup fold into the commit below, which must be replayed too
    fn needs_parent(self) -> bool {
        matches!(self, Self::Squash | Self::Fixup)
    }
}

impl fmt::Display for TodoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TodoAction {
    type Err = RebaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pick" | "p" => Ok(Self::Pick),
            "edit" | "e" => Ok(Self::Edit),
            "reword" | "r" => Ok(Self::Reword),
            "squash" | "s" => Ok(Self::Squash),
            "fixup" | "f" => Ok(Self::Fixup),
            "drop" | "d" => Ok(Self::Drop),
            _ => Err(RebaseError::UnknownAction {
                action: s.to_string(),
            }),
        }
    }
}

fn todo_line(action: TodoAction, commit: &Commit) -> String {
    format!("{action} {} {}\n", commit.sha, commit.name)
}

/// Render newest-first `(action, commit)` pairs as a todo script
fn render_todo<'a>(items: impl DoubleEndedIterator<Item = (TodoAction, &'a Commit)>) -> String {
    items.rev().map(|(action, commit)| todo_line(action, commit)).collect()
}

/// Todo applying `action` to the commit at `action_index`.
///
/// Commits between the target and HEAD are picked, except merges, which are
/// dropped. Returns the todo text and the sha of the rebase base.
pub fn generate_generic_rebase_todo(
    commits: &[Commit],
    action_index: usize,
    action: TodoAction,
) -> Result<(String, String), RebaseError> {
    let mut base_index = action_index + 1;
    if commits.len() <= base_index {
        return Err(RebaseError::CannotRebaseOntoFirstCommit);
    }

    if action.needs_parent() {
        base_index += 1;
        if commits.len() <= base_index {
            return Err(RebaseError::CannotSquashOntoSecondCommit);
        }
    }

    let todo = render_todo(commits[..base_index].iter().enumerate().map(|(i, commit)| {
        let action = if i == action_index {
            action
        } else if commit.is_merge {
            TodoAction::Drop
        } else {
            TodoAction::Pick
        };
        (action, commit)
    }));

    Ok((todo, commits[base_index].sha.clone()))
}

/// Todo stopping to edit both `source` and `destination`, where `source` is
/// the older of the two.
pub fn generate_edit_todo(
    commits: &[Commit],
    source: usize,
    destination: usize,
) -> Result<(String, String), RebaseError> {
    if source >= commits.len() {
        return Err(RebaseError::IndexOutOfRange {
            index: source,
            len: commits.len(),
        });
    }
    let base_index = source + 1;
    let Some(base) = commits.get(base_index) else {
        return Err(RebaseError::CannotRebaseOntoFirstCommit);
    };

    let todo = render_todo(commits[..base_index].iter().enumerate().map(|(i, commit)| {
        let action = if i == source || i == destination {
            TodoAction::Edit
        } else if commit.is_merge {
            TodoAction::Drop
        } else {
            TodoAction::Pick
        };
        (action, commit)
    }));

    Ok((todo, base.sha.clone()))
}

/// Todo swapping the commit at `index` with its parent.
pub fn move_commit_down(commits: &[Commit], index: usize) -> Result<(String, String), RebaseError> {
    if commits.len() <= index + 2 {
        return Err(RebaseError::NoRoomToMove { index });
    }

    let reordered = commits[..index]
        .iter()
        .chain([&commits[index + 1], &commits[index]]);
    let todo: String = reordered
        .rev()
        .map(|commit| todo_line(TodoAction::Pick, commit))
        .collect();

    Ok((todo, commits[index + 2].sha.clone()))
}

/// Raw line positions of the instructions in a todo, comments and blanks skipped
fn item_positions(lines: &[&str]) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(pos, _)| pos)
        .collect()
}

/// Raw line position of the item at newest-first `index`
fn item_position(positions: &[usize], index: usize) -> Result<usize, RebaseError> {
    positions
        .len()
        .checked_sub(index + 1)
        .map(|ordinal| positions[ordinal])
        .ok_or(RebaseError::TodoItemNotFound { index })
}

/// Replace the action of the todo item at newest-first `index`.
pub fn edit_todo_action(todo: &str, index: usize, action: TodoAction) -> Result<String, RebaseError> {
    let lines: Vec<&str> = todo.split('\n').collect();
    let target = item_position(&item_positions(&lines), index)?;

    let rest = lines[target]
        .split_once(' ')
        .map_or("", |(_, rest)| rest);
    let replaced = format!("{action} {rest}");

    Ok(lines
        .iter()
        .enumerate()
        .map(|(pos, line)| if pos == target { replaced.as_str() } else { *line })
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Move the todo item at newest-first `index` one step older.
pub fn move_todo_down(todo: &str, index: usize) -> Result<String, RebaseError> {
    let lines: Vec<&str> = todo.split('\n').collect();
    let positions = item_positions(&lines);
    let ordinal = positions
        .len()
        .checked_sub(index + 1)
        .ok_or(RebaseError::TodoItemNotFound { index })?;
    if ordinal == 0 {
        return Err(RebaseError::NoRoomToMove { index });
    }

    let (older, target) = (positions[ordinal - 1], positions[ordinal]);
    let mut reordered = lines.clone();
    reordered.swap(older, target);
    Ok(reordered.join("\n"))
}
