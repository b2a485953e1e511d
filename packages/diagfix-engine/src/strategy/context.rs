//! Source view handed to strategies

use std::path::{Path, PathBuf};

use diagfix_storage::Diagnostic;

use crate::symbols::{relative_to_root, SymbolIndex};

/// Everything a strategy may look at while generating a fix
pub struct FixContext<'a> {
    pub diagnostic: &'a Diagnostic,
    /// Current content of `diagnostic.file`
    pub source: &'a str,
    pub symbols: &'a SymbolIndex,
    pub project_root: &'a Path,
    line_starts: Vec<usize>,
}

impl<'a> FixContext<'a> {
    pub fn new(
        diagnostic: &'a Diagnostic,
        source: &'a str,
        symbols: &'a SymbolIndex,
        project_root: &'a Path,
    ) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            diagnostic,
            source,
            symbols,
            project_root,
            line_starts,
        }
    }

    /// Diagnostic file relative to the project root
    pub fn relative_file(&self) -> PathBuf {
        relative_to_root(self.project_root, &self.diagnostic.file)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte span of a 1-based line, without its line terminator
    pub fn line_span(&self, line: u32) -> Option<(usize, usize)> {
        let idx = (line as usize).checked_sub(1)?;
        let start = *self.line_starts.get(idx)?;
        let mut end = self
            .line_starts
            .get(idx + 1)
            .map(|next| next - 1)
            .unwrap_or(self.source.len());
        if end > start && self.source.as_bytes()[end - 1] == b'\r' {
            end -= 1;
        }
        Some((start, end))
    }

    pub fn line_text(&self, line: u32) -> Option<&'a str> {
        let (start, end) = self.line_span(line)?;
        self.source.get(start..end)
    }

    /// Byte offset just past the line terminator (or EOF)
    pub fn line_end_inclusive(&self, line: u32) -> Option<usize> {
        let idx = (line as usize).checked_sub(1)?;
        self.line_starts.get(idx)?;
        Some(self.line_starts.get(idx + 1).copied().unwrap_or(self.source.len()))
    }

    /// 1-based line containing `offset`
    pub fn line_of(&self, offset: usize) -> u32 {
        match self.line_starts.binary_search(&offset) {
            Ok(i) => i as u32 + 1,
            Err(i) => i as u32,
        }
    }

    /// Byte offset of a 1-based (line, column); the column counts characters
    /// and is clamped to the end of the line
    pub fn offset_of(&self, line: u32, column: u32) -> Option<usize> {
        let (start, end) = self.line_span(line)?;
        let text = &self.source[start..end];
        let col = column.saturating_sub(1) as usize;
        let within = text
            .char_indices()
            .nth(col)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        Some(start + within)
    }

    /// Offset of the diagnostic's own position
    pub fn diagnostic_offset(&self) -> Option<usize> {
        self.offset_of(self.diagnostic.line, self.diagnostic.column)
    }

    /// Identifier covering (or starting right at) `offset`
    pub fn identifier_at(&self, offset: usize) -> Option<(usize, usize)> {
        let bytes = self.source.as_bytes();
        if offset > bytes.len() {
            return None;
        }
        let mut start = offset;
        while start > 0 && is_ident_byte(bytes[start - 1]) {
            start -= 1;
        }
        let mut end = offset;
        while end < bytes.len() && is_ident_byte(bytes[end]) {
            end += 1;
        }
        if start == end || bytes[start].is_ascii_digit() {
            return None;
        }
        Some((start, end))
    }

    /// Member-access / call / index chain around `offset`
    ///
    /// `foo.bar(baz)[0]` is one expression; stops at operators and line ends.
    pub fn expression_span_at(&self, offset: usize) -> Option<(usize, usize)> {
        let (mut start, mut end) = self.identifier_at(offset)?;
        let bytes = self.source.as_bytes();

        // Extend left over `a.b.` prefixes
        while start >= 2 && bytes[start - 1] == b'.' {
            let mut s = start - 1;
            if s >= 1 && bytes[s - 1] == b'?' {
                s -= 1;
            }
            let mut ident_start = s;
            while ident_start > 0 && is_ident_byte(bytes[ident_start - 1]) {
                ident_start -= 1;
            }
            if ident_start == s {
                break;
            }
            start = ident_start;
        }

        // Extend right over `.x`, `?.x`, `(...)`, `[...]`
        loop {
            match bytes.get(end) {
                Some(b'.') | Some(b'?') => {
                    let mut e = end;
                    if bytes[e] == b'?' {
                        if bytes.get(e + 1) != Some(&b'.') {
                            break;
                        }
                        e += 1;
                    }
                    e += 1;
                    let ident_start = e;
                    while e < bytes.len() && is_ident_byte(bytes[e]) {
                        e += 1;
                    }
                    if e == ident_start {
                        break;
                    }
                    end = e;
                }
                Some(b'(') | Some(b'[') => match matching_close(bytes, end) {
                    Some(close) => end = close + 1,
                    None => break,
                },
                _ => break,
            }
        }
        Some((start, end))
    }

    /// Offset just past the leading import block (0 when there is none)
    pub fn import_block_end(&self) -> usize {
        let mut end = 0;
        let mut in_import = false;
        for line in 1..=self.line_count() as u32 {
            let Some(text) = self.line_text(line) else { break };
            let trimmed = text.trim();
            if in_import {
                if trimmed.contains(" from ") || trimmed.starts_with("from ") || trimmed.ends_with(';') {
                    in_import = false;
                    end = self.line_end_inclusive(line).unwrap_or(end);
                }
                continue;
            }
            if trimmed.starts_with("import ") || trimmed.starts_with("import{") {
                if trimmed.contains(" from ") || trimmed.ends_with(';') || trimmed.starts_with("import '") || trimmed.starts_with("import \"") {
                    end = self.line_end_inclusive(line).unwrap_or(end);
                } else {
                    in_import = true;
                }
            } else if trimmed.is_empty()
                || trimmed.starts_with("//")
                || trimmed.starts_with("'use ")
                || trimmed.starts_with("\"use ")
                || trimmed.starts_with("#!")
            {
                continue;
            } else {
                break;
            }
        }
        end
    }

    /// Text to insert at `import_block_end()` so the new line stands alone
    pub fn line_prefix_at(&self, offset: usize) -> &'static str {
        if offset > 0 && self.source.as_bytes().get(offset - 1) != Some(&b'\n') {
            "\n"
        } else {
            ""
        }
    }
}

#[inline]
pub(crate) fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Index of the bracket closing the one at `open`
fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let (o, c) = match bytes.get(open)? {
        b'(' => (b'(', b')'),
        b'[' => (b'[', b']'),
        b'{' => (b'{', b'}'),
        _ => return None,
    };
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if b == b'\n' {
            return None;
        }
        if b == o {
            depth += 1;
        } else if b == c {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(d: &'a Diagnostic, src: &'a str, idx: &'a SymbolIndex) -> FixContext<'a> {
        FixContext::new(d, src, idx, Path::new("/p"))
    }

    #[test]
    fn test_line_spans_and_offsets() {
        let d = Diagnostic::new("X", "m", "/p/a.ts", 2, 3);
        let idx = SymbolIndex::new();
        let src = "first\r\nsecond line\nthird";
        let c = ctx(&d, src, &idx);

        assert_eq!(c.line_count(), 3);
        assert_eq!(c.line_text(1), Some("first"));
        assert_eq!(c.line_text(2), Some("second line"));
        assert_eq!(c.line_text(3), Some("third"));
        assert_eq!(c.line_text(4), None);
        assert_eq!(c.offset_of(2, 3), Some(9));
        assert_eq!(c.offset_of(2, 99), Some(18));
        assert_eq!(c.line_of(9), 2);
        assert_eq!(c.line_of(0), 1);
        assert_eq!(c.relative_file(), PathBuf::from("a.ts"));
    }

    #[test]
    fn test_expression_span() {
        let d = Diagnostic::new("X", "m", "a.ts", 1, 1);
        let idx = SymbolIndex::new();
        let src = "const v = user.profile?.get(id)[0] + 1;";
        let c = ctx(&d, src, &idx);

        let at = src.find("profile").unwrap();
        let (s, e) = c.expression_span_at(at).unwrap();
        assert_eq!(&src[s..e], "user.profile?.get(id)[0]");
        assert!(c.identifier_at(src.find('+').unwrap()).is_none());
    }

    #[test]
    fn test_import_block_end() {
        let d = Diagnostic::new("X", "m", "a.ts", 1, 1);
        let idx = SymbolIndex::new();
        let src = "import { a } from './a';\nimport {\n  b,\n} from './b';\n\nconst x = 1;\n";
        let c = ctx(&d, src, &idx);
        let end = c.import_block_end();
        assert_eq!(&src[end..], "\nconst x = 1;\n");

        let none = "const y = 2;\n";
        assert_eq!(ctx(&d, none, &idx).import_block_end(), 0);
    }
}
