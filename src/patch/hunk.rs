use std::collections::BTreeSet;
use std::fmt;

use nom::{
    IResult, Parser,
    bytes::complete::{is_not, tag},
    character::complete::{char, digit1},
    combinator::{map_res, rest},
};

/// A single `@@ … @@` block of a unified diff.
///
/// Line indices are absolute 0-based positions within the whole diff text
/// split on `'\n'`, so they can be compared directly with the indices a user
/// selects in a rendered diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchHunk {
    first_line_idx: usize,
    header: String,
    old_start: usize,
    new_start: usize,
    heading: String,
    body_lines: Vec<String>,
}

impl PatchHunk {
    /// Build a hunk from its header line and the body lines that follow it.
    ///
    /// Returns `None` if `header` is not a hunk header.
    pub fn new(first_line_idx: usize, header: &str, body_lines: Vec<String>) -> Option<Self> {
        let (_, (old_start, new_start, heading)) = parse_header(header).ok()?;
        Some(Self {
            first_line_idx,
            header: header.to_string(),
            old_start,
            new_start,
            heading: heading.to_string(),
            body_lines,
        })
    }

    /// Index of the header line
    pub fn first_line_idx(&self) -> usize {
        self.first_line_idx
    }

    /// Index of the last body line (equal to the header index for an empty body)
    pub fn last_line_idx(&self) -> usize {
        self.first_line_idx + self.body_lines.len()
    }

    /// Whether `idx` falls within this hunk, header included
    pub fn contains(&self, idx: usize) -> bool {
        (self.first_line_idx..=self.last_line_idx()).contains(&idx)
    }

    /// The original header line
    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn old_start(&self) -> usize {
        self.old_start
    }

    pub fn new_start(&self) -> usize {
        self.new_start
    }

    /// Text after the closing `@@`, usually a function signature
    pub fn heading(&self) -> &str {
        &self.heading
    }

    /// Body lines, each with its marker character
    pub fn body_lines(&self) -> &[String] {
        &self.body_lines
    }

    /// Line number in the new version of the file at which diff line `idx` sits.
    pub fn line_number_of_line(&self, idx: usize) -> usize {
        let preceding = idx
            .saturating_sub(self.first_line_idx + 1)
            .min(self.body_lines.len());
        let offset = count_with_markers(&self.body_lines[..preceding], &['+', ' ']);
        self.new_start + offset
    }

    /// Render this hunk restricted to `selected` and return the running
    /// start offset for the next hunk along with the text.
    ///
    /// The text is `None` when no change survives the selection.
    pub(super) fn format_with_changes(
        &self,
        selected: &BTreeSet<usize>,
        reverse: bool,
        start_offset: isize,
    ) -> (isize, Option<String>) {
        let body = self.updated_lines(selected, reverse);

        let change_count = count_with_markers(&body, &['+', '-']);
        if change_count == 0 {
            return (start_offset, None);
        }
        let old_length = count_with_markers(&body, &[' ', '-']);
        let new_length = count_with_markers(&body, &['+', ' ']);

        let old_start = if reverse {
            self.new_start
        } else {
            self.old_start
        };

        // Zero-length sides are addressed by the line before them
        let delta: isize = if old_length == 0 {
            1
        } else if new_length == 0 {
            -1
        } else {
            0
        };
        let new_start = (old_start as isize + start_offset + delta).max(0);
        let next_offset = start_offset + new_length as isize - old_length as isize;

        let mut text = format!(
            "@@ -{old_start},{old_length} +{new_start},{new_length} @@{}\n",
            self.heading
        );
        for line in &body {
            text.push_str(line);
            text.push('\n');
        }
        (next_offset, Some(text))
    }

    fn updated_lines(&self, selected: &BTreeSet<usize>, reverse: bool) -> Vec<String> {
        let mut skipped_newline_idx = None;
        let mut lines = Vec::new();

        for (offset, line) in self.body_lines.iter().enumerate() {
            let idx = self.first_line_idx + offset + 1;
            let mut chars = line.chars();
            let Some(marker) = chars.next() else {
                break;
            };
            let is_selected = selected.contains(&idx);
            let marker = transformed_marker(marker, reverse, is_selected);

            if is_selected
                || (marker == '\\' && skipped_newline_idx != Some(idx))
                || marker == ' '
            {
                lines.push(format!("{marker}{}", chars.as_str()));
                continue;
            }

            // A dropped addition takes its "no newline" marker with it
            if marker == '+' {
                skipped_newline_idx = Some(idx + 1);
            }
        }

        lines
    }
}

impl fmt::Display for PatchHunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        for line in &self.body_lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

fn transformed_marker(marker: char, reverse: bool, is_selected: bool) -> char {
    match (reverse, marker) {
        (true, '+') if !is_selected => ' ',
        (true, '+') => '-',
        (true, '-') => '+',
        (false, '-') if !is_selected => ' ',
        (_, other) => other,
    }
}

fn count_with_markers(lines: &[String], markers: &[char]) -> usize {
    lines
        .iter()
        .filter(|line| line.chars().next().is_some_and(|c| markers.contains(&c)))
        .count()
}

/// Parse `@@ -OLD[,LEN] +NEW[,LEN] @@HEADING` into its start lines and heading
fn parse_header(line: &str) -> IResult<&str, (usize, usize, &str)> {
    let (remaining, (_, old_start, _, _, new_start, _, _, heading)) = (
        tag("@@ -"),
        map_res(digit1, str::parse::<usize>),
        is_not("+"),
        char('+'),
        map_res(digit1, str::parse::<usize>),
        is_not("@"),
        tag("@@"),
        rest,
    )
        .parse(line)?;
    Ok((remaining, (old_start, new_start, heading)))
}

/// Split diff text into its hunks.
///
/// Lines before the first hunk header are skipped. Every line that parses as
/// a hunk header starts a new hunk; all other lines belong to the current one.
pub fn extract_hunks(diff: &str) -> Vec<PatchHunk> {
    let mut lines: Vec<&str> = diff.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }

    let mut hunks = Vec::new();
    let mut current: Option<(usize, &str, Vec<String>)> = None;

    for (idx, line) in lines.into_iter().enumerate() {
        if parse_header(line).is_ok() {
            if let Some((first, header, body)) = current.take() {
                hunks.extend(PatchHunk::new(first, header, body));
            }
            current = Some((idx, line, Vec::new()));
        } else if let Some((_, _, body)) = current.as_mut() {
            body.push(line.to_string());
        }
    }

    if let Some((first, header, body)) = current {
        hunks.extend(PatchHunk::new(first, header, body));
    }
    hunks
}

/// The file header of a diff: from the first `diff` line up to the first hunk header.
///
/// Returns an empty string when the diff has no `diff` line or no hunk.
pub fn extract_header(diff: &str) -> String {
    let mut start = None;
    let mut pos = 0;
    for line in diff.split_inclusive('\n') {
        match start {
            None if line.starts_with("diff") => start = Some(pos),
            Some(begin) if line.starts_with("@@") => return diff[begin..pos].to_string(),
            _ => {}
        }
        pos += line.len();
    }
    String::new()
}
