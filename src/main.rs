use std::collections::BTreeSet;
use std::io;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use git_carve::config::{DEFAULT_COMMIT_LIMIT, DEFAULT_STASH_PREFIX};
use git_carve::git::{DiffSource, GitCli, GitRunner, SequenceAction, SequenceKind};
use git_carve::parse::parse_selection;
use git_carve::rebase::editor::{ClientCommand, REBASE_TODO_ENV, run_client};
use git_carve::rebase::{Commit, TodoAction};
use git_carve::{CarveError, Config, PatchParser, Session, StateStore};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "git-carve")]
#[command(version)]
#[command(about = "Carve selected lines out of commits and move them elsewhere")]
struct Cli {
    /// Repository to operate on
    #[arg(long, global = true, env = "GIT_CARVE_REPO", default_value = ".")]
    repo: String,

    /// Log filter directive (e.g. "git_carve=debug")
    #[arg(long, global = true, env = "GIT_CARVE_LOG", default_value = "warn")]
    log: String,

    /// Log everything at debug level
    #[arg(long, global = true)]
    debug: bool,

    /// How many commits to load from the log
    #[arg(long, global = true, default_value_t = DEFAULT_COMMIT_LIMIT)]
    commit_limit: usize,

    /// Prefix of the stash message saved by `extract --stash`
    #[arg(
        long,
        global = true,
        env = "GIT_CARVE_STASH_PREFIX",
        default_value = DEFAULT_STASH_PREFIX
    )]
    stash_prefix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a commit's diff lines with their indices, marking the selected ones
    Lines {
        /// Commit index, 0 being HEAD
        commit: usize,
        /// Files to list (defaults to every file the commit touches)
        files: Vec<String>,
    },
    /// Select lines of a commit and print the resulting patch
    Show {
        /// Commit index, 0 being HEAD
        commit: Option<usize>,
        /// Selections, "FILE" or "FILE:N,N..M"
        selections: Vec<String>,
    },
    /// Edit the todo of the rebase in progress
    Todo {
        #[command(subcommand)]
        command: TodoCommand,
    },
    /// Rebase a single commit with the given action
    Rebase {
        /// Commit index, 0 being HEAD
        commit: usize,
        /// pick, edit, reword, squash, fixup or drop
        action: TodoAction,
    },
    /// Swap a commit with its parent
    MoveDown {
        /// Commit index, 0 being HEAD
        commit: usize,
    },
    /// Remove the selected lines from their commit
    Remove {
        /// Commit index, 0 being HEAD
        commit: usize,
        /// Selections (defaults to the saved patch)
        selections: Vec<String>,
    },
    /// Move the selected lines from one commit into another
    Move {
        /// Commit index the lines come from
        from: usize,
        /// Commit index the lines go to
        to: usize,
        /// Selections (defaults to the saved patch)
        selections: Vec<String>,
    },
    /// Take the selected lines out of their commit and stage them
    Extract {
        /// Commit index, 0 being HEAD
        commit: usize,
        /// Selections (defaults to the saved patch)
        selections: Vec<String>,
        /// Stash local changes first and restore them afterwards
        #[arg(long)]
        stash: bool,
    },
    /// Split the selected lines into a new commit after their commit
    Split {
        /// Commit index, 0 being HEAD
        commit: usize,
        /// Selections (defaults to the saved patch)
        selections: Vec<String>,
    },
    /// Continue the rebase or merge in progress and resume pending work
    Continue {
        /// Act on a merge instead of a rebase
        #[arg(long)]
        merge: bool,
    },
    /// Abort the rebase or merge in progress and drop pending work
    Abort {
        #[arg(long)]
        merge: bool,
    },
    /// Skip the current commit of the rebase or merge in progress
    Skip {
        #[arg(long)]
        merge: bool,
    },
    /// Show the saved patch and any pending work
    Status,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
    /// Generate a man page
    Man,
}

#[derive(Subcommand)]
enum TodoCommand {
    /// Change the action of a todo item
    Set {
        /// Item index, 0 being the newest
        index: usize,
        action: TodoAction,
    },
    /// Move a todo item one step older
    Down {
        /// Item index, 0 being the newest
        index: usize,
    },
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            repo_path: self.repo.clone(),
            commit_limit: self.commit_limit,
            stash_prefix: self.stash_prefix.clone(),
            debug: self.debug,
            log_filter: self.log.clone(),
        }
    }
}

fn main() -> ExitCode {
    // git runs us as its editor during our own rebases
    if let Some(command) = ClientCommand::from_env() {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let todo = std::env::var(REBASE_TODO_ENV).unwrap_or_default();
        return match run_client(command, &args, &todo) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    let cli = Cli::parse();
    let config = cli.config();
    init_logging(&config);

    match cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "git-carve", &mut io::stdout());
            ExitCode::SUCCESS
        }
        Commands::Man => match clap_mangen::Man::new(Cli::command()).render(&mut io::stdout()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
        command => match run(command, &config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_new(config.effective_log_filter())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber installed earlier wins
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

/// Run a repository command, saving the session whatever the outcome
fn run(command: Commands, config: &Config) -> Result<(), CarveError> {
    let git = GitCli::new(&config.repo_path);
    let store = StateStore::in_git_dir(&git.git_dir()?);
    let commits = git.load_commits(config.commit_limit)?;
    let mut session =
        Session::from_state(git, store.load()?).with_stash_prefix(&config.stash_prefix);

    let result = execute(&mut session, &commits, command);
    let saved = store.save(&session.state());
    result?;
    Ok(saved?)
}

fn execute(
    session: &mut Session<GitCli>,
    commits: &[Commit],
    command: Commands,
) -> Result<(), CarveError> {
    match command {
        Commands::Lines { commit, files } => print_lines(session, commits, commit, files),
        Commands::Show { commit, selections } => {
            if let Some(commit) = commit {
                select(session, commits, commit, &selections)?;
            }
            print!("{}", session.patch().render_aggregated_patch());
            Ok(())
        }
        Commands::Todo { command } => match command {
            TodoCommand::Set { index, action } => session.git().edit_rebase_todo(index, action),
            TodoCommand::Down { index } => session.git().move_rebase_todo_down(index),
        },
        Commands::Rebase { commit, action } => session.interactive_rebase(commits, commit, action),
        Commands::MoveDown { commit } => session.move_commit_down(commits, commit),
        Commands::Remove { commit, selections } => {
            select(session, commits, commit, &selections)?;
            session.delete_patch_from_commit(commits, commit)
        }
        Commands::Move {
            from,
            to,
            selections,
        } => {
            select(session, commits, from, &selections)?;
            session.move_patch_to_commit(commits, from, to)
        }
        Commands::Extract {
            commit,
            selections,
            stash,
        } => {
            select(session, commits, commit, &selections)?;
            session.move_patch_into_index(commits, commit, stash)
        }
        Commands::Split { commit, selections } => {
            select(session, commits, commit, &selections)?;
            session.pull_patch_into_new_commit(commits, commit)
        }
        Commands::Continue { merge } => sequence(session, merge, SequenceAction::Continue),
        Commands::Abort { merge } => sequence(session, merge, SequenceAction::Abort),
        Commands::Skip { merge } => sequence(session, merge, SequenceAction::Skip),
        Commands::Status => print_status(session),
        Commands::Completions { .. } | Commands::Man => Ok(()),
    }
}

fn sequence(
    session: &mut Session<GitCli>,
    merge: bool,
    action: SequenceAction,
) -> Result<(), CarveError> {
    let kind = if merge {
        SequenceKind::Merge
    } else {
        SequenceKind::Rebase
    };
    session.merge_or_rebase_action(kind, action)
}

/// Start a fresh patch on `commit` from `selections`; none keeps the saved patch
fn select(
    session: &mut Session<GitCli>,
    commits: &[Commit],
    commit: usize,
    selections: &[String],
) -> Result<(), CarveError> {
    if selections.is_empty() {
        return Ok(());
    }
    let parsed = selections
        .iter()
        .map(|selection| parse_selection(selection))
        .collect::<Result<Vec<_>, _>>()?;

    let sha = commit_sha(commits, commit)?;
    let files = session.git().commit_files(sha)?;
    session.load_patch(sha, &files)?;
    for selection in &parsed {
        session.select(selection)?;
    }
    Ok(())
}

fn commit_sha(commits: &[Commit], index: usize) -> Result<&str, CarveError> {
    commits
        .get(index)
        .map(|commit| commit.sha.as_str())
        .ok_or_else(|| {
            git_carve::RebaseError::IndexOutOfRange {
                index,
                len: commits.len(),
            }
            .into()
        })
}

fn print_lines(
    session: &Session<GitCli>,
    commits: &[Commit],
    commit: usize,
    files: Vec<String>,
) -> Result<(), CarveError> {
    let sha = commit_sha(commits, commit)?;
    let files = if files.is_empty() {
        session.git().commit_files(sha)?
    } else {
        files
    };

    let patch = session.patch();
    let no_selection = BTreeSet::new();
    for file in &files {
        let diff = session
            .git()
            .file_diff(&format!("{sha}^"), sha, false, file)?;
        let included = if patch.commit_sha() == sha {
            patch
                .file_included_line_indices(file)
                .unwrap_or(&no_selection)
        } else {
            &no_selection
        };
        println!("{file}");
        print!("{}", PatchParser::parse(&diff).render(included));
    }
    Ok(())
}

fn print_status(session: &Session<GitCli>) -> Result<(), CarveError> {
    let patch = session.patch();
    if patch.is_active() {
        println!("patch on {}", patch.commit_sha());
        for file in patch.file_names() {
            println!("  {:?} {file}", patch.file_status(file));
        }
    } else {
        println!("no patch");
    }

    if let Some(continuation) = session.workflow().pending() {
        println!("pending: {continuation:?}");
    }
    if session.git().is_rebasing()? {
        println!("rebase in progress");
    }
    Ok(())
}
