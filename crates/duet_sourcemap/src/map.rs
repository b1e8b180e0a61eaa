//! Decoded revision 3 source maps and a builder for new ones.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SourceMapError;
use crate::vlq;

/// The JSON shape of a revision 3 source map.
#[derive(Debug, Serialize, Deserialize)]
struct RawSourceMap {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(rename = "sourceRoot", default, skip_serializing_if = "Option::is_none")]
    source_root: Option<String>,
    #[serde(default)]
    sources: Vec<Option<String>>,
    #[serde(
        rename = "sourcesContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    mappings: String,
    #[serde(default, skip_serializing)]
    sections: Option<serde_json::Value>,
}

/// Where a generated position came from. All values are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalLocation {
    /// Index into [`SourceMap::sources`].
    pub source: u32,
    /// Line in the source.
    pub line: u32,
    /// Column in the source, in UTF-16 code units.
    pub column: u32,
    /// Index into [`SourceMap::names`].
    pub name: Option<u32>,
}

/// One segment of the mappings: a generated column and its origin, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Generated column (0-based).
    pub generated_column: u32,
    /// The original location, absent for generated-only segments.
    pub original: Option<OriginalLocation>,
}

/// A resolved original position with its strings looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved<'a> {
    /// Source file name.
    pub source: &'a str,
    /// 0-based line.
    pub line: u32,
    /// 0-based column.
    pub column: u32,
    /// Original identifier name.
    pub name: Option<&'a str>,
}

/// A decoded source map.
///
/// Segments are grouped by generated line and sorted by generated column,
/// so lookups are a binary search within one line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    file: Option<String>,
    source_root: Option<String>,
    sources: Vec<String>,
    sources_content: Vec<Option<String>>,
    names: Vec<String>,
    lines: Vec<Vec<Segment>>,
}

impl SourceMap {
    /// Parses a JSON source map.
    pub fn from_json(json: &str) -> Result<Self, SourceMapError> {
        let raw: RawSourceMap = serde_json::from_str(json)?;
        if raw.sections.is_some() {
            return Err(SourceMapError::IndexMap);
        }
        if raw.version != 3 {
            return Err(SourceMapError::UnsupportedVersion(raw.version));
        }

        let sources: Vec<String> = raw
            .sources
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        let mut sources_content = raw.sources_content.unwrap_or_default();
        sources_content.resize(sources.len(), None);

        let lines = decode_mappings(&raw.mappings, sources.len(), raw.names.len())?;

        Ok(Self {
            file: raw.file,
            source_root: raw.source_root,
            sources,
            sources_content,
            names: raw.names,
            lines,
        })
    }

    /// Serializes the map to JSON.
    pub fn to_json(&self) -> String {
        let has_content = self.sources_content.iter().any(Option::is_some);
        let raw = RawSourceMap {
            version: 3,
            file: self.file.clone(),
            source_root: self.source_root.clone(),
            sources: self.sources.iter().cloned().map(Some).collect(),
            sources_content: has_content.then(|| self.sources_content.clone()),
            names: self.names.clone(),
            mappings: encode_mappings(&self.lines),
            sections: None,
        };
        // Serializing plain strings and integers cannot fail.
        serde_json::to_string(&raw).unwrap_or_default()
    }

    /// The generated file name recorded in the map.
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Sets the generated file name.
    pub fn set_file(&mut self, file: Option<String>) {
        self.file = file;
    }

    /// The root prepended to every source, if any.
    pub fn source_root(&self) -> Option<&str> {
        self.source_root.as_deref()
    }

    /// Sets the source root.
    pub fn set_source_root(&mut self, root: Option<String>) {
        self.source_root = root;
    }

    /// Source file names.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Embedded source contents, parallel to [`SourceMap::sources`].
    pub fn sources_content(&self) -> &[Option<String>] {
        &self.sources_content
    }

    /// Identifier names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Segments grouped by generated line.
    pub fn lines(&self) -> &[Vec<Segment>] {
        &self.lines
    }

    /// Number of segments that carry an original location.
    pub fn mapping_count(&self) -> usize {
        self.lines
            .iter()
            .flatten()
            .filter(|s| s.original.is_some())
            .count()
    }

    /// Finds the original location of a generated position.
    ///
    /// Uses the segment with the greatest generated column at or before
    /// `column` on `line`. Returns `None` when the line has no such segment
    /// or the segment has no origin.
    pub fn lookup(&self, line: u32, column: u32) -> Option<OriginalLocation> {
        let segments = self.lines.get(line as usize)?;
        let idx = segments.partition_point(|s| s.generated_column <= column);
        if idx == 0 {
            return None;
        }
        segments[idx - 1].original
    }

    /// Like [`SourceMap::lookup`], with the source and name strings resolved.
    pub fn original_position_for(&self, line: u32, column: u32) -> Option<Resolved<'_>> {
        let loc = self.lookup(line, column)?;
        let source = self.sources.get(loc.source as usize)?;
        Some(Resolved {
            source,
            line: loc.line,
            column: loc.column,
            name: loc
                .name
                .and_then(|n| self.names.get(n as usize))
                .map(String::as_str),
        })
    }
}

fn decode_mappings(
    mappings: &str,
    source_count: usize,
    name_count: usize,
) -> Result<Vec<Vec<Segment>>, SourceMapError> {
    let mut lines = Vec::new();
    let mut source: i64 = 0;
    let mut orig_line: i64 = 0;
    let mut orig_col: i64 = 0;
    let mut name: i64 = 0;

    for (line_no, line_text) in mappings.split(';').enumerate() {
        let mut segments = Vec::new();
        let mut gen_col: i64 = 0;
        for segment in line_text.split(',').filter(|s| !s.is_empty()) {
            let invalid = |reason: &str| SourceMapError::InvalidMappings {
                line: line_no as u32,
                reason: reason.to_string(),
            };
            let values = vlq::decode_segment(segment).ok_or_else(|| invalid("bad VLQ"))?;

            gen_col += values[0];
            if gen_col < 0 {
                return Err(invalid("negative generated column"));
            }
            let original = match values.len() {
                1 => None,
                4 | 5 => {
                    source += values[1];
                    orig_line += values[2];
                    orig_col += values[3];
                    if source < 0 || source as usize >= source_count {
                        return Err(invalid("source index out of range"));
                    }
                    if orig_line < 0 || orig_col < 0 {
                        return Err(invalid("negative original position"));
                    }
                    let name_idx = if values.len() == 5 {
                        name += values[4];
                        if name < 0 || name as usize >= name_count {
                            return Err(invalid("name index out of range"));
                        }
                        Some(name as u32)
                    } else {
                        None
                    };
                    Some(OriginalLocation {
                        source: source as u32,
                        line: orig_line as u32,
                        column: orig_col as u32,
                        name: name_idx,
                    })
                }
                _ => return Err(invalid("segment must have 1, 4 or 5 fields")),
            };
            segments.push(Segment {
                generated_column: gen_col as u32,
                original,
            });
        }
        segments.sort_by_key(|s| s.generated_column);
        lines.push(segments);
    }

    while lines.last().is_some_and(Vec::is_empty) {
        lines.pop();
    }
    Ok(lines)
}

fn encode_mappings(lines: &[Vec<Segment>]) -> String {
    let mut out = String::new();
    let mut source: i64 = 0;
    let mut orig_line: i64 = 0;
    let mut orig_col: i64 = 0;
    let mut name: i64 = 0;

    for (i, segments) in lines.iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        let mut gen_col: i64 = 0;
        for (j, seg) in segments.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            vlq::encode(seg.generated_column as i64 - gen_col, &mut out);
            gen_col = seg.generated_column as i64;
            if let Some(orig) = seg.original {
                vlq::encode(orig.source as i64 - source, &mut out);
                vlq::encode(orig.line as i64 - orig_line, &mut out);
                vlq::encode(orig.column as i64 - orig_col, &mut out);
                source = orig.source as i64;
                orig_line = orig.line as i64;
                orig_col = orig.column as i64;
                if let Some(n) = orig.name {
                    vlq::encode(n as i64 - name, &mut out);
                    name = n as i64;
                }
            }
        }
    }
    out
}

/// Incrementally assembles a [`SourceMap`].
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    map: SourceMap,
    source_ids: HashMap<String, u32>,
    name_ids: HashMap<String, u32>,
}

impl SourceMapBuilder {
    /// Starts a map for the generated file `file`.
    pub fn new(file: Option<&str>) -> Self {
        Self {
            map: SourceMap {
                file: file.map(str::to_string),
                ..SourceMap::default()
            },
            ..Self::default()
        }
    }

    /// Sets the source root of the map.
    pub fn set_source_root(&mut self, root: Option<&str>) {
        self.map.source_root = root.map(str::to_string);
    }

    /// Registers a source file, returning its index.
    pub fn add_source(&mut self, source: &str) -> u32 {
        if let Some(&id) = self.source_ids.get(source) {
            return id;
        }
        let id = self.map.sources.len() as u32;
        self.map.sources.push(source.to_string());
        self.map.sources_content.push(None);
        self.source_ids.insert(source.to_string(), id);
        id
    }

    /// Embeds the content of a registered source.
    pub fn set_source_content(&mut self, source: u32, content: Option<&str>) {
        if let Some(slot) = self.map.sources_content.get_mut(source as usize) {
            *slot = content.map(str::to_string);
        }
    }

    /// Registers an identifier name, returning its index.
    pub fn add_name(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.name_ids.get(name) {
            return id;
        }
        let id = self.map.names.len() as u32;
        self.map.names.push(name.to_string());
        self.name_ids.insert(name.to_string(), id);
        id
    }

    /// Adds a segment at a generated position (0-based).
    pub fn add(&mut self, line: u32, column: u32, original: Option<OriginalLocation>) {
        let line = line as usize;
        if self.map.lines.len() <= line {
            self.map.lines.resize_with(line + 1, Vec::new);
        }
        self.map.lines[line].push(Segment {
            generated_column: column,
            original,
        });
    }

    /// Finishes the map, ordering segments within each line.
    pub fn build(mut self) -> SourceMap {
        for line in &mut self.map.lines {
            line.sort_by_key(|s| s.generated_column);
            line.dedup_by(|b, a| a.generated_column == b.generated_column && a.original == b.original);
        }
        self.map
    }
}
