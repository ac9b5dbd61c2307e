/// Stash message prefix used before moving a patch into the index
pub const DEFAULT_STASH_PREFIX: &str = "Auto-stashing changes for ";

/// How many commits are loaded from the log by default
pub const DEFAULT_COMMIT_LIMIT: usize = 300;

/// Runtime settings for a git-carve session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Repository to operate on
    pub repo_path: String,
    /// How many commits are loaded from the log
    pub commit_limit: usize,
    /// Prefix of the stash message saved before moving a patch into the index
    pub stash_prefix: String,
    pub debug: bool,
    /// `tracing` filter directive used when `debug` is off
    pub log_filter: String,
}

impl Config {
    /// Filter directive to install, `debug` when debugging is on
    pub fn effective_log_filter(&self) -> &str {
        if self.debug { "debug" } else { &self.log_filter }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_path: ".".to_string(),
            commit_limit: DEFAULT_COMMIT_LIMIT,
            stash_prefix: DEFAULT_STASH_PREFIX.to_string(),
            debug: false,
            log_filter: "warn".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_overrides_filter() {
        let mut config = Config {
            log_filter: "git_carve=info".to_string(),
            ..Config::default()
        };
        assert_eq!(config.effective_log_filter(), "git_carve=info");

        config.debug = true;
        assert_eq!(config.effective_log_filter(), "debug");
    }
}
