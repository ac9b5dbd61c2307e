use std::collections::BTreeSet;

use super::hunk::{PatchHunk, extract_hunks};

/// What a line of a diff or commit patch is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    PatchHeader,
    CommitSha,
    CommitDescription,
    HunkHeader,
    Addition,
    Deletion,
    Context,
    NewlineMessage,
}

impl LineKind {
    /// Additions and deletions can be selected individually
    pub fn is_stageable(self) -> bool {
        matches!(self, Self::Addition | Self::Deletion)
    }
}

/// One classified line, marker character included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchLine {
    pub kind: LineKind,
    pub content: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    CommitMessage,
    FileHeader,
    Hunks,
}

/// Classified view of a diff, used for display and cursor navigation.
#[derive(Debug, Clone, Default)]
pub struct PatchParser {
    lines: Vec<PatchLine>,
    hunk_starts: Vec<usize>,
    stageable_lines: Vec<usize>,
    hunks: Vec<PatchHunk>,
}

impl PatchParser {
    /// Classify every line of `patch`.
    ///
    /// A patch starting with `commit` is treated as `git show` output: its
    /// message block runs until the first `diff` or `---` line.
    pub fn parse(patch: &str) -> Self {
        let mut raw: Vec<&str> = patch.split('\n').collect();
        if raw.last() == Some(&"") {
            raw.pop();
        }

        let mut lines = Vec::with_capacity(raw.len());
        let mut hunk_starts = Vec::new();
        let mut stageable_lines = Vec::new();
        let mut section = Section::FileHeader;

        for (index, line) in raw.into_iter().enumerate() {
            let kind = if index == 0 && line.starts_with("commit") {
                section = Section::CommitMessage;
                LineKind::CommitSha
            } else if section == Section::CommitMessage {
                if line.starts_with("diff") || line.starts_with("---") {
                    section = Section::FileHeader;
                    LineKind::PatchHeader
                } else {
                    LineKind::CommitDescription
                }
            } else if line.starts_with('@') {
                section = Section::Hunks;
                hunk_starts.push(index);
                LineKind::HunkHeader
            } else if section == Section::Hunks {
                classify_body_line(line)
            } else {
                LineKind::PatchHeader
            };

            if kind.is_stageable() {
                stageable_lines.push(index);
            }
            lines.push(PatchLine {
                kind,
                content: line.to_string(),
            });
        }

        Self {
            lines,
            hunk_starts,
            stageable_lines,
            hunks: extract_hunks(patch),
        }
    }

    pub fn lines(&self) -> &[PatchLine] {
        &self.lines
    }

    pub fn hunk_starts(&self) -> &[usize] {
        &self.hunk_starts
    }

    pub fn stageable_lines(&self) -> &[usize] {
        &self.stageable_lines
    }

    pub fn hunks(&self) -> &[PatchHunk] {
        &self.hunks
    }

    /// The hunk `offset` positions away from the one containing `index`.
    ///
    /// The result is clamped to the available hunks. An index outside every
    /// hunk resolves to the last hunk when it lies past the end and to the
    /// first one otherwise.
    pub fn hunk_containing_line(&self, index: usize, offset: isize) -> Option<&PatchHunk> {
        let last = self.hunks.last()?;

        match self.hunks.iter().position(|hunk| hunk.contains(index)) {
            Some(position) => {
                let target = position
                    .saturating_add_signed(offset)
                    .min(self.hunks.len() - 1);
                self.hunks.get(target)
            }
            None if index > last.last_line_idx() => Some(last),
            None => self.hunks.first(),
        }
    }

    /// First stageable line at or after `current`, else the last stageable line
    pub fn next_stageable_line_index(&self, current: usize) -> Option<usize> {
        self.stageable_lines
            .iter()
            .copied()
            .find(|&idx| idx >= current)
            .or_else(|| self.stageable_lines.last().copied())
    }

    /// Numbered plain-text listing of the patch.
    ///
    /// Each line is prefixed by its index and a `*` when it is in `included`.
    /// A patch without any visible text renders as an empty string.
    pub fn render(&self, included: &BTreeSet<usize>) -> String {
        if self.lines.iter().all(|line| line.content.trim().is_empty()) {
            return String::new();
        }

        let mut out = String::new();
        for (index, line) in self.lines.iter().enumerate() {
            let flag = if included.contains(&index) { '*' } else { ' ' };
            out.push_str(&format!("{index:<4}{flag} {}\n", line.content));
        }
        out
    }
}

fn classify_body_line(line: &str) -> LineKind {
    match line.chars().next() {
        Some('-') => LineKind::Deletion,
        Some('+') => LineKind::Addition,
        Some('\\') => LineKind::NewlineMessage,
        Some(' ') | None => LineKind::Context,
        Some(_) => LineKind::PatchHeader,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    const COMMIT_PATCH: &str = r#"commit 4f8c1a2
Author: Jane <jane@example.com>

    Tidy fruit list

diff --git a/fruit.txt b/fruit.txt
index e48a11c..b2ab81b 100644
--- a/fruit.txt
+++ b/fruit.txt
@@ -1,3 +1,3 @@
 apple
-grape
+orange
 pear
@@ -9,2 +9,3 @@ pear
 plum
+lemon
 fig
\ No newline at end of file
"#;

    #[test]
    fn classify_commit_patch() {
        let parser = PatchParser::parse(COMMIT_PATCH);
        let kinds: Vec<LineKind> = parser.lines().iter().map(|line| line.kind).collect();

        assert_eq!(
            kinds,
            vec![
                LineKind::CommitSha,
                LineKind::CommitDescription,
                LineKind::CommitDescription,
                LineKind::CommitDescription,
                LineKind::CommitDescription,
                LineKind::PatchHeader,
                LineKind::PatchHeader,
                LineKind::PatchHeader,
                LineKind::PatchHeader,
                LineKind::HunkHeader,
                LineKind::Context,
                LineKind::Deletion,
                LineKind::Addition,
                LineKind::Context,
                LineKind::HunkHeader,
                LineKind::Context,
                LineKind::Addition,
                LineKind::Context,
                LineKind::NewlineMessage,
            ]
        );
        assert_eq!(parser.hunk_starts(), &[9, 14]);
        assert_eq!(parser.stageable_lines(), &[11, 12, 16]);
        assert_eq!(parser.hunks().len(), 2);
    }

    #[test]
    fn classify_plain_diff() {
        let parser = PatchParser::parse("diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n");
        assert_eq!(parser.lines()[1].kind, LineKind::PatchHeader);
        assert_eq!(parser.lines()[2].kind, LineKind::PatchHeader);
        assert_eq!(parser.stageable_lines(), &[4, 5]);
    }

    #[test]
    fn hunk_navigation() {
        let parser = PatchParser::parse(COMMIT_PATCH);
        let first = parser.hunk_containing_line(11, 0).unwrap();
        assert_eq!(first.first_line_idx(), 9);

        let next = parser.hunk_containing_line(11, 1).unwrap();
        assert_eq!(next.first_line_idx(), 14);

        // Clamped at both ends
        assert_eq!(parser.hunk_containing_line(16, 5).unwrap().first_line_idx(), 14);
        assert_eq!(parser.hunk_containing_line(16, -5).unwrap().first_line_idx(), 9);
    }

    #[test]
    fn hunk_navigation_outside_hunks() {
        let parser = PatchParser::parse(COMMIT_PATCH);
        assert_eq!(parser.hunk_containing_line(2, 0).unwrap().first_line_idx(), 9);
        assert_eq!(parser.hunk_containing_line(99, 0).unwrap().first_line_idx(), 14);
        assert!(PatchParser::parse("").hunk_containing_line(0, 0).is_none());
    }

    #[test]
    fn next_stageable_line() {
        let parser = PatchParser::parse(COMMIT_PATCH);
        assert_eq!(parser.next_stageable_line_index(0), Some(11));
        assert_eq!(parser.next_stageable_line_index(12), Some(12));
        assert_eq!(parser.next_stageable_line_index(13), Some(16));
        assert_eq!(parser.next_stageable_line_index(17), Some(16));
        assert_eq!(PatchParser::parse("").next_stageable_line_index(0), None);
    }

    #[test]
    fn render_blank_patch() {
        assert_eq!(PatchParser::parse("\n\n").render(&BTreeSet::new()), "");
    }

    #[test]
    fn render_listing() {
        let diff = r#"diff --git a/fruit.txt b/fruit.txt
index e48a11c..b2ab81b 100644
--- a/fruit.txt
+++ b/fruit.txt
@@ -1,3 +1,3 @@
 apple
-grape
+orange
 pear
"#;
        let parser = PatchParser::parse(diff);
        let listing = parser.render(&BTreeSet::from([7]));
        insta::assert_snapshot!(listing.trim_end(), @r"
        0     diff --git a/fruit.txt b/fruit.txt
        1     index e48a11c..b2ab81b 100644
        2     --- a/fruit.txt
        3     +++ b/fruit.txt
        4     @@ -1,3 +1,3 @@
        5      apple
        6     -grape
        7   * +orange
        8      pear
        ");
    }
}
