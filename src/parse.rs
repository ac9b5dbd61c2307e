//! Parsing for the `file[:refs]` selection syntax.
//!
//! A selection names one file of a commit's patch and, optionally, which of
//! its diff lines to include. Line references are 0-based indices into that
//! file's diff text, exactly as printed by `git-carve lines`.
//!
//! # Syntax
//!
//! - `FILE` selects the whole file
//! - `FILE:REFS` selects specific lines, where `REFS` is a comma-separated
//!   list of `N` (single line) or `N..M` (inclusive range)
//!
//! # Examples
//!
//! ```
//! use git_carve::parse::{parse_selection, LineSelection};
//!
//! let sel = parse_selection("src/main.rs").unwrap();
//! assert_eq!(sel.file, "src/main.rs");
//! assert_eq!(sel.lines, LineSelection::Whole);
//!
//! let sel = parse_selection("src/main.rs:7,9..11").unwrap();
//! assert_eq!(sel.lines, LineSelection::Ranges(vec![(7, 7), (9, 11)]));
//! ```

use error_set::error_set;

error_set! {
    /// Errors from parsing selection syntax
    ParseError := {
        /// File name portion is empty or whitespace
        #[display("Invalid selection '{input}': file name cannot be empty")]
        EmptyFileName { input: String },
        /// No line references provided after the colon
        #[display("No line references provided in '{input}'")]
        EmptyRefs { input: String },
        /// Line index could not be parsed
        #[display("Invalid line index '{value}'")]
        InvalidLineIndex { value: String },
        /// Range has start greater than end
        #[display("Invalid range {start}..{end}: start must be <= end")]
        InvalidRange { start: usize, end: usize },
    }
}

/// Which lines of a file a selection covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSelection {
    /// The whole file diff
    Whole,
    /// Inclusive `(first, last)` ranges of diff line indices
    Ranges(Vec<(usize, usize)>),
}

/// Parsed `file[:refs]` selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    /// The file path
    pub file: String,
    /// The lines of that file to include
    pub lines: LineSelection,
}

/// Parse a `file[:refs]` string into structured data.
///
/// The last colon separates the path from the references, so paths that
/// contain colons must always carry a reference list.
///
/// # Errors
///
/// Returns [`ParseError`] if the file name is empty, the reference list
/// after a colon is empty, an index is not a number, or a range is inverted.
pub fn parse_selection(input: &str) -> Result<FileSelection, ParseError> {
    let Some((file, refs)) = input.rsplit_once(':') else {
        return whole_file(input);
    };

    let file = file.trim();
    if file.is_empty() {
        return Err(ParseError::EmptyFileName {
            input: input.to_string(),
        });
    }

    let ranges = parse_line_refs(refs)?;
    if ranges.is_empty() {
        return Err(ParseError::EmptyRefs {
            input: input.to_string(),
        });
    }

    Ok(FileSelection {
        file: file.to_string(),
        lines: LineSelection::Ranges(ranges),
    })
}

fn whole_file(input: &str) -> Result<FileSelection, ParseError> {
    let file = input.trim();
    if file.is_empty() {
        return Err(ParseError::EmptyFileName {
            input: input.to_string(),
        });
    }
    Ok(FileSelection {
        file: file.to_string(),
        lines: LineSelection::Whole,
    })
}

/// Parse the references part (after the colon)
/// Examples: "7", "9..11", "7,9..11"
fn parse_line_refs(input: &str) -> Result<Vec<(usize, usize)>, ParseError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_single_ref)
        .collect()
}

fn parse_single_ref(input: &str) -> Result<(usize, usize), ParseError> {
    match input.split_once("..") {
        Some((start, end)) => {
            let start = parse_index(start)?;
            let end = parse_index(end)?;
            if start > end {
                return Err(ParseError::InvalidRange { start, end });
            }
            Ok((start, end))
        }
        None => {
            let index = parse_index(input)?;
            Ok((index, index))
        }
    }
}

fn parse_index(input: &str) -> Result<usize, ParseError> {
    input
        .trim()
        .parse::<usize>()
        .map_err(|_| ParseError::InvalidLineIndex {
            value: input.to_string(),
        })
}
