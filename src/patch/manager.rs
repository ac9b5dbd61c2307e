use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::PatchError;
use super::modifier::modified_patch_for_lines;
use crate::GitCommandError;
use crate::git::{ApplyFlag, PatchApplier};

/// How much of a file is part of the custom patch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    #[default]
    Unselected,
    Whole,
    Part,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct FileInfo {
    mode: PatchStatus,
    included_line_indices: BTreeSet<usize>,
    diff: String,
}

impl FileInfo {
    fn add_whole(&mut self) {
        self.mode = PatchStatus::Whole;
        self.included_line_indices = (0..self.diff.split('\n').count()).collect();
    }

    fn remove(&mut self) {
        self.mode = PatchStatus::Unselected;
        self.included_line_indices.clear();
    }

    fn is_selected(&self) -> bool {
        match self.mode {
            PatchStatus::Unselected => false,
            PatchStatus::Whole => true,
            PatchStatus::Part => !self.included_line_indices.is_empty(),
        }
    }
}

/// Custom patch built from one commit's changes.
///
/// Every file of the commit starts out unselected. Files can then be taken
/// whole or line by line, and the selection is rendered into patches that
/// are applied with `git apply`. An empty commit sha means no patch is in
/// progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchManager {
    commit_sha: String,
    files: BTreeMap<String, FileInfo>,
}

impl PatchManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a patch for `commit_sha`, discarding any previous selection.
    pub fn start<I, F, D>(&mut self, commit_sha: &str, diffs: I)
    where
        I: IntoIterator<Item = (F, D)>,
        F: Into<String>,
        D: Into<String>,
    {
        self.commit_sha = commit_sha.to_string();
        self.files = diffs
            .into_iter()
            .map(|(file, diff)| {
                let info = FileInfo {
                    diff: diff.into(),
                    ..FileInfo::default()
                };
                (file.into(), info)
            })
            .collect();
        debug!(commit = commit_sha, files = self.files.len(), "started custom patch");
    }

    pub fn reset(&mut self) {
        self.commit_sha.clear();
        self.files.clear();
    }

    /// Whether a patch is in progress
    pub fn is_active(&self) -> bool {
        !self.commit_sha.is_empty()
    }

    pub fn commit_sha(&self) -> &str {
        &self.commit_sha
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// The source diff captured for `file` at start
    pub fn file_diff(&self, file: &str) -> Option<&str> {
        self.files.get(file).map(|info| info.diff.as_str())
    }

    pub fn add_file_whole(&mut self, file: &str) -> Result<(), PatchError> {
        self.file_mut(file)?.add_whole();
        Ok(())
    }

    pub fn remove_file(&mut self, file: &str) -> Result<(), PatchError> {
        self.file_mut(file)?.remove();
        Ok(())
    }

    /// Unselected and partial files become whole, whole files become unselected.
    pub fn toggle_file_whole(&mut self, file: &str) -> Result<(), PatchError> {
        let info = self.file_mut(file)?;
        match info.mode {
            PatchStatus::Unselected | PatchStatus::Part => info.add_whole(),
            PatchStatus::Whole => info.remove(),
        }
        Ok(())
    }

    /// Add the diff lines `first..=last` of `file` to the selection.
    pub fn add_file_line_range(
        &mut self,
        file: &str,
        first: usize,
        last: usize,
    ) -> Result<(), PatchError> {
        let info = self.file_mut(file)?;
        info.mode = PatchStatus::Part;
        info.included_line_indices.extend(first..=last);
        Ok(())
    }

    /// Remove the diff lines `first..=last` of `file` from the selection.
    ///
    /// A file left with no selected lines reverts to unselected.
    pub fn remove_file_line_range(
        &mut self,
        file: &str,
        first: usize,
        last: usize,
    ) -> Result<(), PatchError> {
        let info = self.file_mut(file)?;
        info.mode = PatchStatus::Part;
        info.included_line_indices.retain(|idx| !(first..=last).contains(idx));
        if info.included_line_indices.is_empty() {
            info.remove();
        }
        Ok(())
    }

    /// Status of `file`, unselected when it is not part of the patch
    pub fn file_status(&self, file: &str) -> PatchStatus {
        self.files
            .get(file)
            .map_or(PatchStatus::Unselected, |info| info.mode)
    }

    pub fn file_included_line_indices(&self, file: &str) -> Result<&BTreeSet<usize>, PatchError> {
        self.files
            .get(file)
            .map(|info| &info.included_line_indices)
            .ok_or_else(|| PatchError::UnknownFile {
                file: file.to_string(),
            })
    }

    /// Render the patch text for one file.
    ///
    /// A whole file renders as its stored diff whatever `reverse` says, since
    /// whole-file reversal is left to `git apply --reverse`.
    pub fn render_plain_patch_for_file(
        &self,
        file: &str,
        reverse: bool,
        keep_original_header: bool,
    ) -> String {
        let Some(info) = self.files.get(file) else {
            return String::new();
        };
        match info.mode {
            PatchStatus::Whole => info.diff.clone(),
            PatchStatus::Part => modified_patch_for_lines(
                file,
                &info.diff,
                &info.included_line_indices,
                reverse,
                keep_original_header,
            ),
            PatchStatus::Unselected => String::new(),
        }
    }

    /// Forward patches with original headers for every file that renders one,
    /// in file name order
    pub fn render_each_file_patch(&self) -> Vec<String> {
        self.files
            .keys()
            .map(|file| self.render_plain_patch_for_file(file, false, true))
            .filter(|patch| !patch.is_empty())
            .collect()
    }

    /// All file patches, one after another
    pub fn render_aggregated_patch(&self) -> String {
        self.render_each_file_patch()
            .into_iter()
            .map(|patch| patch + "\n")
            .collect()
    }

    /// True when no file contributes any line
    pub fn is_empty(&self) -> bool {
        !self.files.values().any(FileInfo::is_selected)
    }

    /// Apply the selection to the working tree and index.
    ///
    /// Whole files are applied as stored and reversed by `git apply`. Partial
    /// files are rendered already reversed and applied forward. Each file is
    /// tried with its original header first and then with a minimal one. The
    /// first file that fails both ways stops the run; files applied before it
    /// stay applied.
    pub fn apply_patches<A>(&self, applier: &A, reverse: bool) -> Result<(), GitCommandError>
    where
        A: PatchApplier + ?Sized,
    {
        for (file, info) in &self.files {
            if info.mode == PatchStatus::Unselected {
                continue;
            }

            let mut flags = vec![ApplyFlag::Index, ApplyFlag::ThreeWay];
            let mut reverse_on_generate = false;
            if reverse {
                if info.mode == PatchStatus::Whole {
                    flags.push(ApplyFlag::Reverse);
                } else {
                    reverse_on_generate = true;
                }
            }

            let mut result = Ok(());
            for keep_original_header in [true, false] {
                let patch =
                    self.render_plain_patch_for_file(file, reverse_on_generate, keep_original_header);
                if patch.is_empty() {
                    continue;
                }
                if !keep_original_header {
                    warn!(file = %file, "retrying patch without its original header");
                }
                debug!(file = %file, ?flags, "applying patch");
                result = applier.apply_patch(&patch, &flags);
                if result.is_ok() {
                    break;
                }
            }
            result?;
        }
        Ok(())
    }

    fn file_mut(&mut self, file: &str) -> Result<&mut FileInfo, PatchError> {
        self.files
            .get_mut(file)
            .ok_or_else(|| PatchError::UnknownFile {
                file: file.to_string(),
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;
    use std::cell::RefCell;

    const DIFF_A: &str = r#"diff --git a/a.go b/a.go
index 1111111..2222222 100644
--- a/a.go
+++ b/a.go
@@ -1,3 +1,3 @@
 package a
-var x = 1
+var x = 2
 func f() {}
"#;

    const DIFF_B: &str = r#"diff --git a/b.go b/b.go
new file mode 100644
index 0000000..3333333
--- /dev/null
+++ b/b.go
@@ -0,0 +1,2 @@
+package b
+var y = 3
"#;

    #[derive(Default)]
    struct RecordingApplier {
        calls: RefCell<Vec<(String, Vec<ApplyFlag>)>>,
        failures: RefCell<Vec<bool>>,
    }

    impl RecordingApplier {
        fn failing(pattern: &[bool]) -> Self {
            Self {
                failures: RefCell::new(pattern.iter().rev().copied().collect()),
                ..Self::default()
            }
        }
    }

    impl PatchApplier for RecordingApplier {
        fn apply_patch(&self, patch: &str, flags: &[ApplyFlag]) -> Result<(), GitCommandError> {
            self.calls
                .borrow_mut()
                .push((patch.to_string(), flags.to_vec()));
            if self.failures.borrow_mut().pop().unwrap_or(false) {
                return Err(GitCommandError::ApplyRejected {
                    stderr: "patch does not apply".to_string(),
                });
            }
            Ok(())
        }
    }

    fn manager() -> PatchManager {
        let mut manager = PatchManager::new();
        manager.start("sha1", [("a.go", DIFF_A), ("b.go", DIFF_B)]);
        manager
    }

    #[test]
    fn line_range_round_trip_reverts_to_unselected() {
        let mut manager = manager();
        manager.add_file_line_range("a.go", 3, 5).unwrap();
        assert_eq!(manager.file_status("a.go"), PatchStatus::Part);

        manager.remove_file_line_range("a.go", 3, 5).unwrap();
        assert_eq!(manager.file_status("a.go"), PatchStatus::Unselected);
        assert_eq!(manager.render_plain_patch_for_file("a.go", false, true), "");
    }

    #[test]
    fn whole_file_narrows_into_part() {
        let mut manager = manager();
        manager.add_file_whole("a.go").unwrap();
        manager.remove_file_line_range("a.go", 7, 7).unwrap();

        assert_eq!(manager.file_status("a.go"), PatchStatus::Part);
        assert_eq!(
            manager.render_plain_patch_for_file("a.go", false, false),
            "--- a/a.go\n+++ b/a.go\n@@ -1,3 +1,2 @@\n package a\n-var x = 1\n func f() {}\n"
        );
    }

    #[test]
    fn toggle_file_whole() {
        let mut manager = manager();
        manager.toggle_file_whole("a.go").unwrap();
        assert_eq!(manager.file_status("a.go"), PatchStatus::Whole);
        manager.toggle_file_whole("a.go").unwrap();
        assert_eq!(manager.file_status("a.go"), PatchStatus::Unselected);

        manager.add_file_line_range("a.go", 6, 6).unwrap();
        manager.toggle_file_whole("a.go").unwrap();
        assert_eq!(manager.file_status("a.go"), PatchStatus::Whole);
    }

    #[test]
    fn unknown_file_is_rejected() {
        let mut manager = manager();
        assert!(matches!(
            manager.add_file_whole("c.go"),
            Err(PatchError::UnknownFile { .. })
        ));
        assert_eq!(manager.file_status("c.go"), PatchStatus::Unselected);
        assert_eq!(manager.render_plain_patch_for_file("c.go", false, true), "");
    }

    #[test]
    fn whole_file_ignores_reverse_when_rendering() {
        let mut manager = manager();
        manager.add_file_whole("b.go").unwrap();
        assert_eq!(manager.render_plain_patch_for_file("b.go", true, false), DIFF_B);
    }

    #[test]
    fn each_file_patch_is_sorted_and_skips_empty() {
        let mut manager = manager();
        manager.add_file_whole("b.go").unwrap();
        manager.add_file_line_range("a.go", 7, 7).unwrap();

        let patches = manager.render_each_file_patch();
        assert_eq!(patches.len(), 2);
        assert!(patches[0].starts_with("diff --git a/a.go"));
        assert_eq!(patches[1], DIFF_B);

        manager.remove_file("b.go").unwrap();
        manager.add_file_line_range("a.go", 4, 4).unwrap();
        manager.remove_file_line_range("a.go", 7, 7).unwrap();
        // Only the hunk header is left, which renders nothing
        assert!(manager.render_each_file_patch().is_empty());
        assert!(!manager.is_empty());
    }

    #[test]
    fn is_empty_and_reset() {
        let mut manager = manager();
        assert!(manager.is_active());
        assert!(manager.is_empty());

        manager.add_file_whole("a.go").unwrap();
        assert!(!manager.is_empty());

        manager.reset();
        assert!(!manager.is_active());
        assert!(manager.is_empty());
        assert_eq!(manager.file_names().count(), 0);
    }

    #[test]
    fn start_discards_previous_selection() {
        let mut manager = manager();
        manager.add_file_whole("a.go").unwrap();
        manager.start("sha2", [("a.go", DIFF_A)]);

        assert_eq!(manager.commit_sha(), "sha2");
        assert_eq!(manager.file_status("a.go"), PatchStatus::Unselected);
    }

    #[test]
    fn apply_flags_follow_mode_and_direction() {
        let mut manager = manager();
        manager.add_file_line_range("a.go", 6, 7).unwrap();
        manager.add_file_whole("b.go").unwrap();

        let applier = RecordingApplier::default();
        manager.apply_patches(&applier, true).unwrap();

        let calls = applier.calls.borrow();
        assert_eq!(calls.len(), 2);

        // Partial selection is reversed in the text itself
        assert_eq!(calls[0].1, vec![ApplyFlag::Index, ApplyFlag::ThreeWay]);
        assert!(calls[0].0.contains("+var x = 1\n-var x = 2\n"));

        assert_eq!(
            calls[1].1,
            vec![ApplyFlag::Index, ApplyFlag::ThreeWay, ApplyFlag::Reverse]
        );
        assert_eq!(calls[1].0, DIFF_B);
    }

    #[test]
    fn apply_retries_without_original_header() {
        let mut manager = manager();
        manager.add_file_line_range("a.go", 7, 7).unwrap();

        let applier = RecordingApplier::failing(&[true, false]);
        manager.apply_patches(&applier, false).unwrap();

        let calls = applier.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].0.starts_with("diff --git a/a.go b/a.go\n"));
        assert!(calls[1].0.starts_with("--- a/a.go\n+++ b/a.go\n"));
    }

    #[test]
    fn apply_stops_at_first_failing_file() {
        let mut manager = manager();
        manager.add_file_whole("a.go").unwrap();
        manager.add_file_whole("b.go").unwrap();

        let applier = RecordingApplier::failing(&[true, true]);
        let result = manager.apply_patches(&applier, false);

        assert!(matches!(result, Err(GitCommandError::ApplyRejected { .. })));
        assert_eq!(applier.calls.borrow().len(), 2);
    }

    #[test]
    fn serde_round_trip_keeps_selection() {
        let mut manager = manager();
        manager.add_file_line_range("a.go", 6, 7).unwrap();

        let json = serde_json::to_string(&manager).unwrap();
        let restored: PatchManager = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, manager);
    }
}
