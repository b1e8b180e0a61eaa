//! Composition of two consecutive source maps.
//!
//! Given an `outer` map (final output -> intermediate code) and an `inner`
//! map (intermediate code -> original sources), composition resolves every
//! outer mapping through the inner map. Mappings whose original position
//! cannot be resolved are dropped; the count is reported and logged.

use rayon::prelude::*;
use tracing::debug;

use crate::map::{OriginalLocation, Segment, SourceMap, SourceMapBuilder};

/// Code size at which composition switches to [`ComposeStrategy::Parallel`].
pub const LARGE_BUNDLE_THRESHOLD: usize = 500 * 1024;

/// How the generated lines of the outer map are walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeStrategy {
    /// One line after another on the calling thread.
    Inline,
    /// Lines resolved concurrently on the rayon pool, then assembled in order.
    Parallel,
}

impl ComposeStrategy {
    /// Picks the strategy for a bundle of `code_size` bytes.
    pub fn for_code_size(code_size: usize) -> Self {
        if code_size >= LARGE_BUNDLE_THRESHOLD {
            Self::Parallel
        } else {
            Self::Inline
        }
    }
}

/// Counts of outer mappings kept and dropped by composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposeStats {
    /// Mappings resolved through the inner map.
    pub kept: usize,
    /// Mappings whose position did not resolve in the inner map.
    pub dropped: usize,
}

/// A resolved segment, still indexed into the inner map's tables.
struct Resolved {
    generated_column: u32,
    source: u32,
    line: u32,
    column: u32,
    name: Option<NameRef>,
}

#[derive(Clone, Copy)]
enum NameRef {
    Inner(u32),
    Outer(u32),
}

fn resolve_line(segments: &[Segment], inner: &SourceMap) -> (Vec<Resolved>, usize) {
    let mut out = Vec::with_capacity(segments.len());
    let mut dropped = 0;
    for seg in segments {
        let Some(orig) = seg.original else {
            continue;
        };
        match inner.lookup(orig.line, orig.column) {
            Some(loc) if (loc.source as usize) < inner.sources().len() => {
                let name = match (loc.name, orig.name) {
                    (Some(n), _) => Some(NameRef::Inner(n)),
                    (None, Some(n)) => Some(NameRef::Outer(n)),
                    (None, None) => None,
                };
                out.push(Resolved {
                    generated_column: seg.generated_column,
                    source: loc.source,
                    line: loc.line,
                    column: loc.column,
                    name,
                });
            }
            _ => dropped += 1,
        }
    }
    (out, dropped)
}

/// Composes `outer` (output -> intermediate) with `inner` (intermediate -> original).
///
/// The result keeps the outer map's `file` and takes the inner map's
/// `sourceRoot` and embedded source contents.
pub fn compose(
    outer: &SourceMap,
    inner: &SourceMap,
    strategy: ComposeStrategy,
) -> (SourceMap, ComposeStats) {
    let resolved: Vec<(Vec<Resolved>, usize)> = match strategy {
        ComposeStrategy::Inline => outer
            .lines()
            .iter()
            .map(|line| resolve_line(line, inner))
            .collect(),
        ComposeStrategy::Parallel => outer
            .lines()
            .par_iter()
            .map(|line| resolve_line(line, inner))
            .collect(),
    };

    let mut builder = SourceMapBuilder::new(outer.file());
    builder.set_source_root(inner.source_root());
    let mut source_ids: Vec<Option<u32>> = vec![None; inner.sources().len()];
    let mut stats = ComposeStats::default();

    for (line_no, (segments, dropped)) in resolved.into_iter().enumerate() {
        stats.dropped += dropped;
        for seg in segments {
            let source = match source_ids[seg.source as usize] {
                Some(id) => id,
                None => {
                    let idx = seg.source as usize;
                    let id = builder.add_source(&inner.sources()[idx]);
                    let content = inner.sources_content().get(idx).and_then(Option::as_deref);
                    builder.set_source_content(id, content);
                    source_ids[idx] = Some(id);
                    id
                }
            };
            let name = match seg.name {
                Some(NameRef::Inner(n)) => inner.names().get(n as usize),
                Some(NameRef::Outer(n)) => outer.names().get(n as usize),
                None => None,
            }
            .map(|n| builder.add_name(n));
            builder.add(
                line_no as u32,
                seg.generated_column,
                Some(OriginalLocation {
                    source,
                    line: seg.line,
                    column: seg.column,
                    name,
                }),
            );
            stats.kept += 1;
        }
    }

    if stats.dropped > 0 {
        debug!(
            "Dropped {} of {} mappings during source map composition",
            stats.dropped,
            stats.dropped + stats.kept
        );
    }

    (builder.build(), stats)
}
