//! The boundary to git itself.
//!
//! The core only talks to git through the traits in this module so that
//! operations can be driven against a recording fake in tests. [`GitCli`]
//! implements them by running the `git` executable.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::debug;

use crate::GitCommandError;
use crate::rebase::Commit;
use crate::rebase::editor::{interactive_rebase_env, skip_editor_env};
use crate::rebase::todo::{TodoAction, edit_todo_action, move_todo_down};

/// Flags passed to `git apply`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyFlag {
    Index,
    ThreeWay,
    Reverse,
}

impl ApplyFlag {
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Index => "--index",
            Self::ThreeWay => "--3way",
            Self::Reverse => "--reverse",
        }
    }
}

/// Which sequencer an abort/continue/skip targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    Merge,
    Rebase,
}

impl SequenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Rebase => "rebase",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceAction {
    Abort,
    Continue,
    Skip,
}

impl SequenceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Continue => "continue",
            Self::Skip => "skip",
        }
    }
}

/// Applies patch text to the repository
pub trait PatchApplier {
    fn apply_patch(&self, patch: &str, flags: &[ApplyFlag]) -> Result<(), GitCommandError>;
}

/// Produces the unified diff of one file between two revisions
pub trait DiffSource {
    fn file_diff(
        &self,
        from: &str,
        to: &str,
        reverse: bool,
        path: &str,
    ) -> Result<String, GitCommandError>;
}

/// Everything the rebase operations need from git.
pub trait GitRunner: PatchApplier + DiffSource {
    /// Run `git rebase --interactive` onto `base` with `todo` as the script.
    fn interactive_rebase(
        &self,
        base: &str,
        todo: &str,
        override_editor: bool,
    ) -> Result<(), GitCommandError>;

    /// `git <merge|rebase> --<abort|continue|skip>` without opening an editor.
    ///
    /// Fails with [`GitCommandError::NoRebaseInProgress`] when there is
    /// nothing to act on.
    fn sequence_action(
        &self,
        kind: SequenceKind,
        action: SequenceAction,
    ) -> Result<(), GitCommandError>;

    /// Fold the index into HEAD, keeping its message
    fn amend_head(&self) -> Result<(), GitCommandError>;

    fn commit(&self, message: &str) -> Result<(), GitCommandError>;

    /// Subject line of HEAD
    fn head_message(&self) -> Result<String, GitCommandError>;

    /// Stash local changes, returning whether an entry was created.
    ///
    /// A clean working tree creates none.
    fn stash_save(&self, message: &str) -> Result<bool, GitCommandError>;

    fn stash_apply(&self, index: usize) -> Result<(), GitCommandError>;

    /// Whether commits are signed with GPG
    fn using_gpg(&self) -> Result<bool, GitCommandError>;

    fn is_rebasing(&self) -> Result<bool, GitCommandError>;
}

/// [`GitRunner`] backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_path: String,
    editor_program: Option<PathBuf>,
}

impl GitCli {
    /// Create a new GitCli for the given repository path
    pub fn new(repo_path: impl Into<String>) -> Self {
        Self {
            repo_path: repo_path.into(),
            editor_program: None,
        }
    }

    /// Use `program` as the injected editor instead of the running executable
    pub fn with_editor_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.editor_program = Some(program.into());
        self
    }

    pub fn repo_path(&self) -> &str {
        &self.repo_path
    }

    fn editor_program(&self) -> Result<String, GitCommandError> {
        let program = match &self.editor_program {
            Some(program) => program.clone(),
            None => std::env::current_exe().map_err(|e| GitCommandError::CurrentExe {
                message: e.to_string(),
            })?,
        };
        Ok(program.display().to_string())
    }

    fn command(&self, args: &[&str]) -> Command {
        debug!(args = ?args, "git");
        let mut command = Command::new("git");
        command.arg("-C").arg(&self.repo_path).args(args);
        command
    }

    fn output(&self, mut command: Command, args: &[&str]) -> Result<Output, GitCommandError> {
        let output = command.output().map_err(|e| GitCommandError::SpawnFailed {
            command: args.join(" "),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitCommandError::ExitError {
                command: args.join(" "),
                stderr: stderr.into_owned(),
            });
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<String, GitCommandError> {
        let output = self.output(self.command(args), args)?;
        String::from_utf8(output.stdout).map_err(|e| GitCommandError::InvalidUtf8 {
            message: e.to_string(),
        })
    }

    /// Absolute path of the repository's git directory
    pub fn git_dir(&self) -> Result<PathBuf, GitCommandError> {
        let dir = self.run(&["rev-parse", "--absolute-git-dir"])?;
        Ok(PathBuf::from(dir.trim()))
    }

    /// Up to `limit` commits reachable from HEAD, newest first
    pub fn load_commits(&self, limit: usize) -> Result<Vec<Commit>, GitCommandError> {
        let limit = format!("-{limit}");
        let log = self.run(&["log", "--format=%H%x00%P%x00%s", &limit])?;
        Ok(parse_commit_log(&log))
    }

    /// Paths touched by `sha` relative to its first parent
    pub fn commit_files(&self, sha: &str) -> Result<Vec<String>, GitCommandError> {
        let files = self.run(&[
            "diff-tree",
            "--no-commit-id",
            "--name-only",
            "-r",
            "--root",
            sha,
        ])?;
        Ok(files.lines().map(str::to_string).collect())
    }

    /// Rewrite the action of a live todo item, newest-first `index`
    pub fn edit_rebase_todo(&self, index: usize, action: TodoAction) -> Result<(), crate::CarveError> {
        let path = self.todo_path()?;
        let todo = read_todo(&path)?;
        write_todo(&path, &edit_todo_action(&todo, index, action)?)
    }

    /// Move a live todo item one step older
    pub fn move_rebase_todo_down(&self, index: usize) -> Result<(), crate::CarveError> {
        let path = self.todo_path()?;
        let todo = read_todo(&path)?;
        write_todo(&path, &move_todo_down(&todo, index)?)
    }

    /// Commit at the top of the stash, `None` when the stash is empty
    fn stash_head(&self) -> Result<Option<String>, GitCommandError> {
        // `--verify -q` exits 1 silently for a missing ref
        match self.run(&["rev-parse", "-q", "--verify", "refs/stash"]) {
            Ok(sha) => Ok(Some(sha.trim().to_string())),
            Err(GitCommandError::ExitError { stderr, .. }) if stderr.trim().is_empty() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn todo_path(&self) -> Result<PathBuf, GitCommandError> {
        Ok(self.git_dir()?.join("rebase-merge").join("git-rebase-todo"))
    }
}

fn read_todo(path: &Path) -> Result<String, crate::CarveError> {
    fs::read_to_string(path).map_err(|e| crate::CarveError::TodoFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn write_todo(path: &Path, todo: &str) -> Result<(), crate::CarveError> {
    fs::write(path, todo).map_err(|e| crate::CarveError::TodoFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// git prints "fatal: No rebase in progress?" when there is nothing to act on
fn is_no_rebase_in_progress(stderr: &str) -> bool {
    stderr.to_lowercase().contains("no rebase in progress")
}

/// Parse `git log --format=%H%x00%P%x00%s` output
pub fn parse_commit_log(log: &str) -> Vec<Commit> {
    log.lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, '\0');
            let sha = fields.next()?;
            let parents = fields.next()?;
            let name = fields.next().unwrap_or_default();
            Some(Commit {
                sha: sha.to_string(),
                name: name.to_string(),
                is_merge: parents.split_whitespace().count() > 1,
            })
        })
        .collect()
}

impl PatchApplier for GitCli {
    /// Apply a patch read from stdin
    fn apply_patch(&self, patch: &str, flags: &[ApplyFlag]) -> Result<(), GitCommandError> {
        let mut args = vec!["apply"];
        args.extend(flags.iter().map(|flag| flag.as_arg()));
        args.push("-");

        let mut child = self
            .command(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GitCommandError::SpawnFailed {
                command: args.join(" "),
                message: e.to_string(),
            })?;

        child
            .stdin
            .take()
            .ok_or(GitCommandError::ApplyStdinFailed)?
            .write_all(patch.as_bytes())
            .map_err(|e| GitCommandError::ApplyWriteFailed {
                message: e.to_string(),
            })?;

        let output = child
            .wait_with_output()
            .map_err(|e| GitCommandError::WaitFailed {
                command: args.join(" "),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitCommandError::ApplyRejected {
                stderr: stderr.into_owned(),
            });
        }

        Ok(())
    }
}

impl DiffSource for GitCli {
    fn file_diff(
        &self,
        from: &str,
        to: &str,
        reverse: bool,
        path: &str,
    ) -> Result<String, GitCommandError> {
        let mut args = vec!["diff", "--no-ext-diff", "--no-color", "--no-renames"];
        if reverse {
            args.push("-R");
        }
        args.extend([from, to, "--", path]);
        self.run(&args)
    }
}

impl GitRunner for GitCli {
    fn interactive_rebase(
        &self,
        base: &str,
        todo: &str,
        override_editor: bool,
    ) -> Result<(), GitCommandError> {
        if !todo.is_empty() {
            debug!(%base, todo, "running interactive rebase");
        }
        let args = ["rebase", "--interactive", "--autostash", "--keep-empty", base];
        let mut command = self.command(&args);
        command.envs(interactive_rebase_env(
            &self.editor_program()?,
            todo,
            override_editor,
        ));
        if override_editor {
            return self.output(command, &args).map(drop);
        }

        // The user's own editor needs the terminal
        let status = command.status().map_err(|e| GitCommandError::SpawnFailed {
            command: args.join(" "),
            message: e.to_string(),
        })?;
        if !status.success() {
            return Err(GitCommandError::ExitError {
                command: args.join(" "),
                stderr: format!("exited with {status}"),
            });
        }
        Ok(())
    }

    fn sequence_action(
        &self,
        kind: SequenceKind,
        action: SequenceAction,
    ) -> Result<(), GitCommandError> {
        let flag = format!("--{}", action.as_str());
        let args = [kind.as_str(), flag.as_str()];
        let mut command = self.command(&args);
        command.envs(skip_editor_env(&self.editor_program()?));

        match self.output(command, &args) {
            Err(GitCommandError::ExitError { stderr, .. }) if is_no_rebase_in_progress(&stderr) =>
            {
                Err(GitCommandError::NoRebaseInProgress { stderr })
            }
            other => other.map(drop),
        }
    }

    fn amend_head(&self) -> Result<(), GitCommandError> {
        self.run(&["commit", "--amend", "--no-edit", "--allow-empty"])
            .map(drop)
    }

    fn commit(&self, message: &str) -> Result<(), GitCommandError> {
        self.run(&["commit", "-m", message]).map(drop)
    }

    fn head_message(&self) -> Result<String, GitCommandError> {
        Ok(self.run(&["log", "-1", "--format=%s"])?.trim_end().to_string())
    }

    fn stash_save(&self, message: &str) -> Result<bool, GitCommandError> {
        let before = self.stash_head()?;
        self.run(&["stash", "push", "-m", message])?;
        Ok(self.stash_head()? != before)
    }

    fn stash_apply(&self, index: usize) -> Result<(), GitCommandError> {
        let stash = format!("stash@{{{index}}}");
        self.run(&["stash", "apply", &stash]).map(drop)
    }

    fn using_gpg(&self) -> Result<bool, GitCommandError> {
        // An unset key makes git exit 1 with no output
        match self.run(&["config", "--get", "--bool", "commit.gpgSign"]) {
            Ok(value) => Ok(value.trim() == "true"),
            Err(GitCommandError::ExitError { stderr, .. }) if stderr.trim().is_empty() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_rebasing(&self) -> Result<bool, GitCommandError> {
        let git_dir = self.git_dir()?;
        Ok(git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists())
    }
}
