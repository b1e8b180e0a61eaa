//! Text edits over bundle code, and the source map of the edited text.
//!
//! Edits are byte ranges of the original source. A replacement swallows
//! every edit recorded inside its range, which lets a construct render its
//! already-edited children into its own text and replace itself whole.

use duet_sourcemap::{OriginalLocation, SourceMap, SourceMapBuilder};

/// Which neighbour an insertion sticks to when it shares an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    /// Opens the construct starting at the offset.
    Before,
    /// Closes the construct ending at the offset.
    After,
}

#[derive(Debug)]
struct Edit {
    start: u32,
    end: u32,
    text: String,
    side: Side,
    seq: usize,
}

impl Edit {
    fn is_insert(&self) -> bool {
        self.start == self.end
    }

    /// Whether the edit belongs to whatever occupies `start..end`.
    fn within(&self, start: u32, end: u32) -> bool {
        if self.start < start || self.end > end {
            return false;
        }
        if self.is_insert() {
            let closes_previous = self.start == start && self.side == Side::After;
            let opens_next = self.end == end && self.side == Side::Before;
            return !(closes_previous || opens_next);
        }
        true
    }

    /// Closers at one offset apply innermost first, openers outermost first.
    fn order(&self) -> (u32, u32, u8, usize) {
        match (self.is_insert(), self.side) {
            (true, Side::After) => (self.start, self.end, 0, self.seq),
            (true, Side::Before) => (self.start, self.end, 1, usize::MAX - self.seq),
            (false, _) => (self.start, self.end, 2, self.seq),
        }
    }
}

/// Pending edits of one source text.
#[derive(Debug)]
pub(crate) struct Edits<'s> {
    source: &'s str,
    edits: Vec<Edit>,
    seq: usize,
}

impl<'s> Edits<'s> {
    pub(crate) fn new(source: &'s str) -> Self {
        Self {
            source,
            edits: Vec::new(),
            seq: 0,
        }
    }

    pub(crate) fn source(&self) -> &'s str {
        self.source
    }

    fn push(&mut self, start: u32, end: u32, side: Side, text: String) {
        self.seq += 1;
        self.edits.push(Edit {
            start,
            end,
            text,
            side,
            seq: self.seq,
        });
    }

    pub(crate) fn insert(&mut self, at: u32, side: Side, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.push(at, at, side, text);
        }
    }

    /// Replaces `start..end`, dropping the edits recorded inside it.
    pub(crate) fn replace(&mut self, start: u32, end: u32, text: impl Into<String>) {
        self.edits.retain(|e| !e.within(start, end));
        self.push(start, end, Side::Before, text.into());
    }

    /// The text of `start..end` with the edits inside it applied.
    pub(crate) fn render(&self, start: u32, end: u32) -> String {
        let mut out = String::new();
        let mut cursor = start as usize;
        for edit in self.sorted(|e| e.within(start, end)) {
            if (edit.start as usize) < cursor {
                continue;
            }
            out.push_str(&self.source[cursor..edit.start as usize]);
            out.push_str(&edit.text);
            cursor = edit.end as usize;
        }
        out.push_str(&self.source[cursor..end as usize]);
        out
    }

    fn sorted(&self, keep: impl Fn(&Edit) -> bool) -> Vec<&Edit> {
        let mut edits: Vec<&Edit> = self.edits.iter().filter(|e| keep(e)).collect();
        edits.sort_by_key(|e| e.order());
        edits
    }

    /// Applies every edit, mapping the result back to the source.
    ///
    /// Unchanged text gets a segment per token, inserted text one segment at
    /// the offset it replaces.
    pub(crate) fn finish(self, file: &str, source_name: &str) -> (String, SourceMap) {
        let mut builder = SourceMapBuilder::new(Some(file));
        let source_id = builder.add_source(source_name);
        builder.set_source_content(source_id, Some(self.source));

        let mut writer = MapWriter {
            out: String::with_capacity(self.source.len()),
            generated: Position::default(),
            original: Position::default(),
            source: source_id,
            builder,
        };
        let mut cursor = 0usize;
        for edit in self.sorted(|_| true) {
            if (edit.start as usize) < cursor {
                continue;
            }
            writer.copy(&self.source[cursor..edit.start as usize]);
            writer.insert(&edit.text);
            writer.original.advance(&self.source[edit.start as usize..edit.end as usize]);
            cursor = edit.end as usize;
        }
        writer.copy(&self.source[cursor..]);
        (writer.out, writer.builder.build())
    }
}

/// A 0-based line and UTF-16 column.
#[derive(Debug, Default, Clone, Copy)]
struct Position {
    line: u32,
    column: u32,
}

impl Position {
    fn step(&mut self, c: char) {
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += c.len_utf16() as u32;
        }
    }

    fn advance(&mut self, text: &str) {
        text.chars().for_each(|c| self.step(c));
    }
}

struct MapWriter {
    out: String,
    generated: Position,
    original: Position,
    source: u32,
    builder: SourceMapBuilder,
}

impl MapWriter {
    fn mark(&mut self) {
        self.builder.add(
            self.generated.line,
            self.generated.column,
            Some(OriginalLocation {
                source: self.source,
                line: self.original.line,
                column: self.original.column,
                name: None,
            }),
        );
    }

    fn copy(&mut self, chunk: &str) {
        let mut prev: Option<char> = None;
        for c in chunk.chars() {
            let starts_token = !c.is_whitespace()
                && prev.map_or(true, |p| p.is_whitespace() || !is_word(p) || !is_word(c));
            if starts_token {
                self.mark();
            }
            self.out.push(c);
            self.generated.step(c);
            self.original.step(c);
            prev = Some(c);
        }
    }

    fn insert(&mut self, text: &str) {
        let mut line_start = true;
        for c in text.chars() {
            if line_start && c != '\n' {
                self.mark();
            }
            line_start = c == '\n';
            self.out.push(c);
            self.generated.step(c);
        }
    }
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || !c.is_ascii()
}
