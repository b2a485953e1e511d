//! In-memory edit application

use std::path::{Path, PathBuf};

use diagfix_storage::FixEdit;

use crate::error::{EngineError, Result};

/// Line count change caused by one edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineShift {
    /// Last original line that keeps its number; later lines move by `delta`
    pub end_line: u32,
    pub delta: i64,
}

/// Result of applying one file's edits
#[derive(Debug, Clone)]
pub struct AppliedChange {
    /// Path as written in the edits
    pub file: PathBuf,
    pub absolute: PathBuf,
    pub original: String,
    pub updated: String,
    pub shifts: Vec<LineShift>,
    /// 1-based lines of `updated` covered by inserted text
    pub touched_lines: Vec<u32>,
}

fn shift_line(shifts: &[LineShift], line: u32) -> u32 {
    let delta: i64 = shifts.iter().filter(|s| s.end_line < line).map(|s| s.delta).sum();
    (i64::from(line) + delta).max(1) as u32
}

impl AppliedChange {
    /// Where an original line ended up after the edits
    pub fn adjust_line(&self, line: u32) -> u32 {
        shift_line(&self.shifts, line)
    }

    pub fn inserted_text(&self) -> Vec<&str> {
        self.touched_lines
            .iter()
            .filter_map(|&l| self.updated.lines().nth(l as usize - 1))
            .collect()
    }
}

/// Line movement left by the fixes kept so far, per root-relative file
///
/// Layers are replayed in the order the fixes were applied, so a line read
/// before any of them maps to where it sits now.
#[derive(Debug, Clone, Default)]
pub struct LineMap {
    layers: Vec<(PathBuf, Vec<LineShift>)>,
}

impl LineMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the shifts of one kept change; changes that move no line are dropped
    pub fn record(&mut self, file: PathBuf, shifts: &[LineShift]) {
        if shifts.iter().any(|s| s.delta != 0) {
            self.layers.push((file, shifts.to_vec()));
        }
    }

    /// Current position of an original line of `file`
    pub fn current_line(&self, file: &Path, line: u32) -> u32 {
        self.layers
            .iter()
            .filter(|(f, _)| f == file)
            .fold(line, |line, (_, shifts)| shift_line(shifts, line))
    }

    /// Forget every layer, after the files went back to their original content
    pub fn clear(&mut self) {
        self.layers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Bounds, char boundaries and pairwise overlap
pub fn validate_edits(file: &Path, content: &str, edits: &[&FixEdit]) -> Result<()> {
    for edit in edits {
        if edit.start_offset > edit.end_offset || edit.end_offset > content.len() {
            return Err(EngineError::EditOutOfBounds {
                file: file.to_path_buf(),
                start: edit.start_offset,
                end: edit.end_offset,
                len: content.len(),
            });
        }
        if !content.is_char_boundary(edit.start_offset) || !content.is_char_boundary(edit.end_offset) {
            return Err(EngineError::validation(
                "edit",
                format!(
                    "{}: offsets {}..{} split a UTF-8 character",
                    file.display(),
                    edit.start_offset,
                    edit.end_offset
                ),
            ));
        }
    }

    let mut sorted: Vec<&&FixEdit> = edits.iter().collect();
    sorted.sort_by_key(|e| (e.start_offset, e.end_offset));
    for pair in sorted.windows(2) {
        if pair[0].overlaps(pair[1]) {
            return Err(EngineError::OverlappingEdits {
                file: file.to_path_buf(),
                first: format!("{}..{}", pair[0].start_offset, pair[0].end_offset),
                second: format!("{}..{}", pair[1].start_offset, pair[1].end_offset),
            });
        }
    }
    Ok(())
}

/// Apply validated edits in descending offset order
///
/// Returns the new content, the line shifts and the touched lines.
pub fn apply_in_memory(content: &str, edits: &[&FixEdit]) -> (String, Vec<LineShift>, Vec<u32>) {
    let mut descending: Vec<&FixEdit> = edits.to_vec();
    descending.sort_by(|a, b| b.start_offset.cmp(&a.start_offset));

    let mut updated = content.to_string();
    for edit in &descending {
        updated.replace_range(edit.start_offset..edit.end_offset, &edit.new_text);
    }

    let mut shifts = Vec::with_capacity(edits.len());
    let mut touched = Vec::new();
    let mut cumulative: i64 = 0;
    for edit in descending.iter().rev() {
        let removed = &content[edit.start_offset..edit.end_offset];
        let delta = newlines(&edit.new_text) as i64 - newlines(removed) as i64;
        let at_line_start = edit.end_offset == 0 || content.as_bytes()[edit.end_offset - 1] == b'\n';
        let end_line = line_at(content, edit.end_offset) - u32::from(at_line_start);
        shifts.push(LineShift { end_line, delta });

        let new_start = (edit.start_offset as i64 + cumulative) as usize;
        let new_end = new_start + edit.new_text.len();
        let first = line_at(&updated, new_start);
        let last = line_at(&updated, new_end.saturating_sub(1).max(new_start));
        touched.extend(first..=last);
        cumulative += edit.new_text.len() as i64 - edit.replaced_len() as i64;
    }
    touched.sort_unstable();
    touched.dedup();

    (updated, shifts, touched)
}

fn newlines(s: &str) -> usize {
    s.bytes().filter(|b| *b == b'\n').count()
}

/// 1-based line of a byte offset
pub fn line_at(content: &str, offset: usize) -> u32 {
    let end = offset.min(content.len());
    newlines(&content[..floor_char_boundary(content, end)]) as u32 + 1
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
