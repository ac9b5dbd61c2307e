//! Non-interactive editor for git.
//!
//! git-carve runs interactive rebases with itself as the sequence editor.
//! The todo travels in an environment variable and the child process, started
//! by git in client mode, writes it over the file git asks it to edit.

use std::fs;
use std::path::Path;

use error_set::error_set;

/// Selects client mode and what it does
pub const CLIENT_COMMAND_ENV: &str = "GIT_CARVE_CLIENT_COMMAND";
/// Todo text to write in client mode
pub const REBASE_TODO_ENV: &str = "GIT_CARVE_REBASE_TODO";

const TODO_FILE_NAME: &str = "git-rebase-todo";

error_set! {
    /// Errors while acting as git's editor
    EditorError := {
        #[display("Failed to write rebase todo to {path}: {message}")]
        WriteTodo { path: String, message: String },
    }
}

/// What the program does when git invokes it as an editor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// Write the todo from the environment into the rebase todo file
    InteractiveRebase,
    /// Leave the file untouched
    ExitImmediately,
}

impl ClientCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InteractiveRebase => "INTERACTIVE_REBASE",
            Self::ExitImmediately => "EXIT_IMMEDIATELY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INTERACTIVE_REBASE" => Some(Self::InteractiveRebase),
            "EXIT_IMMEDIATELY" => Some(Self::ExitImmediately),
            _ => None,
        }
    }

    /// Client mode requested by the environment, if any
    pub fn from_env() -> Option<Self> {
        std::env::var(CLIENT_COMMAND_ENV)
            .ok()
            .and_then(|value| Self::parse(&value))
    }
}

/// Run as git's editor with the file arguments git passed.
///
/// Only a `git-rebase-todo` argument is written. Commit messages and any other
/// file are left alone so git keeps their current content.
pub fn run_client(command: ClientCommand, args: &[String], todo: &str) -> Result<(), EditorError> {
    if command == ClientCommand::ExitImmediately {
        return Ok(());
    }

    for path in args.iter().filter(|arg| arg.ends_with(TODO_FILE_NAME)) {
        write_todo(Path::new(path), todo)?;
    }
    Ok(())
}

fn write_todo(path: &Path, todo: &str) -> Result<(), EditorError> {
    fs::write(path, todo).map_err(|e| EditorError::WriteTodo {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Quote `path` for the shell git runs editors through
pub fn shell_quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', r"'\''"))
}

/// Environment for `git rebase --interactive` driven by `todo`.
///
/// An empty todo keeps git's own list by using `true` as the sequence editor.
/// With `override_editor` commit message prompts also come back to us and are
/// accepted unchanged.
pub fn interactive_rebase_env(
    editor: &str,
    todo: &str,
    override_editor: bool,
) -> Vec<(&'static str, String)> {
    let editor = shell_quote(editor);
    let sequence_editor = if todo.is_empty() {
        "true".to_string()
    } else {
        editor.clone()
    };

    let mut env = vec![
        (
            CLIENT_COMMAND_ENV,
            ClientCommand::InteractiveRebase.as_str().to_string(),
        ),
        (REBASE_TODO_ENV, todo.to_string()),
        ("LANG", "en_US.UTF-8".to_string()),
        ("LC_ALL", "en_US.UTF-8".to_string()),
        ("GIT_SEQUENCE_EDITOR", sequence_editor),
    ];
    if override_editor {
        env.push(("GIT_EDITOR", editor));
    }
    env
}

/// Environment for commands that may open an editor we want skipped.
///
/// Messages are forced untranslated since callers match on git's stderr.
pub fn skip_editor_env(editor: &str) -> Vec<(&'static str, String)> {
    let editor = shell_quote(editor);
    vec![
        (
            CLIENT_COMMAND_ENV,
            ClientCommand::ExitImmediately.as_str().to_string(),
        ),
        ("LANG", "C".to_string()),
        ("LC_ALL", "C".to_string()),
        ("GIT_EDITOR", editor.clone()),
        ("EDITOR", editor.clone()),
        ("VISUAL", editor),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;
    use tempfile::TempDir;

    fn lookup<'a>(env: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        env.iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn client_command_names() {
        for command in [ClientCommand::InteractiveRebase, ClientCommand::ExitImmediately] {
            assert_eq!(ClientCommand::parse(command.as_str()), Some(command));
        }
        assert_eq!(ClientCommand::parse("SOMETHING_ELSE"), None);
    }

    #[test]
    fn rebase_env_injects_self_as_sequence_editor() {
        let env = interactive_rebase_env("/usr/bin/git-carve", "edit abc one\n", true);
        assert_eq!(lookup(&env, CLIENT_COMMAND_ENV), Some("INTERACTIVE_REBASE"));
        assert_eq!(lookup(&env, REBASE_TODO_ENV), Some("edit abc one\n"));
        assert_eq!(lookup(&env, "GIT_SEQUENCE_EDITOR"), Some("'/usr/bin/git-carve'"));
        assert_eq!(lookup(&env, "GIT_EDITOR"), Some("'/usr/bin/git-carve'"));
        assert_eq!(lookup(&env, "LC_ALL"), Some("en_US.UTF-8"));
    }

    #[test]
    fn empty_todo_keeps_git_list() {
        let env = interactive_rebase_env("/usr/bin/git-carve", "", false);
        assert_eq!(lookup(&env, "GIT_SEQUENCE_EDITOR"), Some("true"));
        assert_eq!(lookup(&env, "GIT_EDITOR"), None);
    }

    #[test]
    fn skip_env_sets_every_editor() {
        let env = skip_editor_env("/opt/it's here/git-carve");
        let quoted = r"'/opt/it'\''s here/git-carve'";
        assert_eq!(lookup(&env, CLIENT_COMMAND_ENV), Some("EXIT_IMMEDIATELY"));
        assert_eq!(lookup(&env, "GIT_EDITOR"), Some(quoted));
        assert_eq!(lookup(&env, "EDITOR"), Some(quoted));
        assert_eq!(lookup(&env, "VISUAL"), Some(quoted));
        assert_eq!(lookup(&env, "LC_ALL"), Some("C"));
    }

    #[test]
    fn client_writes_only_the_todo_file() {
        let dir = TempDir::new().unwrap();
        let todo_path = dir.path().join("git-rebase-todo");
        let message_path = dir.path().join("COMMIT_EDITMSG");
        fs::write(&todo_path, "pick abc one\n").unwrap();
        fs::write(&message_path, "original message\n").unwrap();

        let args = [
            todo_path.display().to_string(),
            message_path.display().to_string(),
        ];
        run_client(ClientCommand::InteractiveRebase, &args, "edit abc one\n").unwrap();

        assert_eq!(fs::read_to_string(&todo_path).unwrap(), "edit abc one\n");
        assert_eq!(fs::read_to_string(&message_path).unwrap(), "original message\n");
    }

    #[test]
    fn exit_immediately_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let todo_path = dir.path().join("git-rebase-todo");
        fs::write(&todo_path, "pick abc one\n").unwrap();

        let args = [todo_path.display().to_string()];
        run_client(ClientCommand::ExitImmediately, &args, "drop abc one\n").unwrap();
        assert_eq!(fs::read_to_string(&todo_path).unwrap(), "pick abc one\n");
    }
}
