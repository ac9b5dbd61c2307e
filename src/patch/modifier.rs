use std::collections::BTreeSet;

use super::hunk::{PatchHunk, extract_header, extract_hunks};

/// Regenerates one file's diff restricted to a set of selected lines.
#[derive(Debug, Clone)]
pub struct PatchModifier {
    filename: String,
    hunks: Vec<PatchHunk>,
    header: String,
}

impl PatchModifier {
    pub fn new(filename: impl Into<String>, diff: &str) -> Self {
        Self {
            filename: filename.into(),
            hunks: extract_hunks(diff),
            header: extract_header(diff),
        }
    }

    pub fn hunks(&self) -> &[PatchHunk] {
        &self.hunks
    }

    /// Build a patch containing only the changes on `line_indices`.
    ///
    /// In forward mode unselected deletions become context and unselected
    /// additions are dropped. In reverse mode every change is inverted,
    /// unselected additions become context and unselected deletions are
    /// dropped. Hunks with no surviving change are left out, and an empty
    /// string means the selection needs no patch at all.
    ///
    /// With `keep_original_header` the file's own `diff --git` header is
    /// reused, which lets `git apply` see creations, deletions and renames.
    /// Otherwise a minimal `--- a/` / `+++ b/` header is written.
    pub fn modified_patch_for_lines(
        &self,
        line_indices: &BTreeSet<usize>,
        reverse: bool,
        keep_original_header: bool,
    ) -> String {
        let mut start_offset = 0;
        let mut hunks_text = String::new();

        let touched = self.hunks.iter().filter(|hunk| {
            line_indices
                .range(hunk.first_line_idx()..=hunk.last_line_idx())
                .next()
                .is_some()
        });
        for hunk in touched {
            let (next_offset, text) = hunk.format_with_changes(line_indices, reverse, start_offset);
            start_offset = next_offset;
            if let Some(text) = text {
                hunks_text.push_str(&text);
            }
        }

        if hunks_text.is_empty() {
            return String::new();
        }

        let file_header = if keep_original_header {
            self.header.clone()
        } else {
            format!("--- a/{0}\n+++ b/{0}\n", self.filename)
        };
        file_header + &hunks_text
    }

    /// [`Self::modified_patch_for_lines`] over the inclusive range `first..=last`.
    pub fn modified_patch_for_range(
        &self,
        first: usize,
        last: usize,
        reverse: bool,
        keep_original_header: bool,
    ) -> String {
        let selected: BTreeSet<usize> = (first..=last).collect();
        self.modified_patch_for_lines(&selected, reverse, keep_original_header)
    }

    /// Index of the last line of the last hunk, or 0 for a diff without hunks
    pub fn original_patch_length(&self) -> usize {
        self.hunks.last().map_or(0, PatchHunk::last_line_idx)
    }
}

/// One-shot form of [`PatchModifier::modified_patch_for_lines`]
pub fn modified_patch_for_lines(
    filename: &str,
    diff: &str,
    line_indices: &BTreeSet<usize>,
    reverse: bool,
    keep_original_header: bool,
) -> String {
    PatchModifier::new(filename, diff).modified_patch_for_lines(
        line_indices,
        reverse,
        keep_original_header,
    )
}

/// One-shot form of [`PatchModifier::modified_patch_for_range`]
pub fn modified_patch_for_range(
    filename: &str,
    diff: &str,
    first: usize,
    last: usize,
    reverse: bool,
    keep_original_header: bool,
) -> String {
    PatchModifier::new(filename, diff).modified_patch_for_range(
        first,
        last,
        reverse,
        keep_original_header,
    )
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    // l1..l20 with three hunks: a replacement, a deletion and an insertion
    const MULTI_HUNK: &str = "\
diff --git a/f b/f
index 1111111..2222222 100644
--- a/f
+++ b/f
@@ -2,3 +2,4 @@
 l2
-l3
+a3
+x
 l4
@@ -9,4 +10,2 @@
 l9
-l10
-l11
 l12
@@ -17,2 +16,4 @@
 l17
+y1
+y2
 l18
";

    const STAGEABLE: [usize; 7] = [6, 7, 8, 12, 13, 17, 18];

    fn old_file() -> Vec<String> {
        (1..=20).map(|n| format!("l{n}")).collect()
    }

    fn new_file() -> Vec<String> {
        let mut lines = old_file();
        lines.splice(15..17, ["l16", "l17", "y1", "y2"].map(String::from));
        lines.drain(9..11);
        lines.splice(2..3, ["a3", "x"].map(String::from));
        lines
    }

    /// Minimal strict `git apply`: context must match and every new start
    /// must agree with where the hunk lands in the output.
    fn apply(file: &[String], patch: &str) -> Result<Vec<String>, String> {
        let mut out = Vec::new();
        let mut cursor = 0;

        for hunk in extract_hunks(patch) {
            let body = hunk.body_lines();
            let old_len = body.iter().filter(|l| l.starts_with([' ', '-'])).count();
            let new_len = body.iter().filter(|l| l.starts_with([' ', '+'])).count();
            let pos = if old_len == 0 {
                hunk.old_start()
            } else {
                hunk.old_start() - 1
            };
            out.extend_from_slice(&file[cursor..pos]);
            cursor = pos;

            let expected_new_start = if new_len == 0 { out.len() } else { out.len() + 1 };
            if hunk.new_start() != expected_new_start {
                return Err(format!("bad new start in {}", hunk.header()));
            }

            for line in body {
                let (marker, content) = line.split_at(1);
                match marker {
                    " " | "-" if file.get(cursor).map(String::as_str) != Some(content) => {
                        return Err(format!("mismatch at old line {}: {line}", cursor + 1));
                    }
                    " " => {
                        out.push(content.to_string());
                        cursor += 1;
                    }
                    "-" => cursor += 1,
                    "+" => out.push(content.to_string()),
                    _ => {}
                }
            }
        }

        out.extend_from_slice(&file[cursor..]);
        Ok(out)
    }

    fn arb_selection() -> impl Strategy<Value = BTreeSet<usize>> {
        prop::collection::btree_set(0..22usize, 0..12)
    }

    #[test]
    fn fixture_is_consistent() {
        let all: BTreeSet<usize> = (0..20).collect();
        let forward = modified_patch_for_lines("f", MULTI_HUNK, &all, false, false);
        assert_eq!(apply(&old_file(), &forward).unwrap(), new_file());
        let reverse = modified_patch_for_lines("f", MULTI_HUNK, &all, true, false);
        assert_eq!(apply(&new_file(), &reverse).unwrap(), old_file());
    }

    proptest! {
        /// Applying the selection forward onto the old file lands on the same
        /// content as reverting everything else from the new file.
        #[test]
        fn forward_selection_matches_reverted_complement(selected in arb_selection()) {
            let complement: BTreeSet<usize> = STAGEABLE
                .iter()
                .copied()
                .filter(|idx| !selected.contains(idx))
                .collect();

            let forward = modified_patch_for_lines("f", MULTI_HUNK, &selected, false, false);
            let reverse = modified_patch_for_lines("f", MULTI_HUNK, &complement, true, false);

            let from_old = apply(&old_file(), &forward);
            let from_new = apply(&new_file(), &reverse);
            prop_assert!(from_old.is_ok(), "{:?}\n{}", from_old, forward);
            prop_assert!(from_new.is_ok(), "{:?}\n{}", from_new, reverse);
            prop_assert_eq!(from_old.unwrap(), from_new.unwrap());
        }

        /// Reverting a selection from the new file leaves only the rest of
        /// the changes on top of the old file
        #[test]
        fn reverted_selection_matches_forward_rest(selected in arb_selection()) {
            let rest: BTreeSet<usize> = STAGEABLE
                .iter()
                .copied()
                .filter(|idx| !selected.contains(idx))
                .collect();

            let reverse = modified_patch_for_lines("f", MULTI_HUNK, &selected, true, false);
            let forward_rest = modified_patch_for_lines("f", MULTI_HUNK, &rest, false, false);

            let reverted = apply(&new_file(), &reverse);
            let via_old = apply(&old_file(), &forward_rest);
            prop_assert!(reverted.is_ok(), "{:?}\n{}", reverted, reverse);
            prop_assert!(via_old.is_ok(), "{:?}\n{}", via_old, forward_rest);
            prop_assert_eq!(reverted.unwrap(), via_old.unwrap());
        }

        /// No selected change means no patch
        #[test]
        fn context_only_selection_is_empty(selected in prop::collection::btree_set(
            prop::sample::select(vec![0usize, 1, 2, 3, 4, 5, 9, 10, 11, 14, 15, 16, 19]),
            0..8,
        )) {
            prop_assert_eq!(modified_patch_for_lines("f", MULTI_HUNK, &selected, false, true), "");
            prop_assert_eq!(modified_patch_for_lines("f", MULTI_HUNK, &selected, true, true), "");
        }
    }
}
