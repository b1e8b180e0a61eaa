//! Printing with oxc: optional mangling, minified output and a map.

use std::fmt::Write;
use std::path::PathBuf;

use duet_sourcemap::{OriginalLocation, SourceMap, SourceMapBuilder};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_mangler::{MangleOptions, Mangler};
use oxc_parser::Parser;

use crate::downlevel::script_type;
use crate::error::SyntaxError;

/// How [`print`] treats its input.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintOptions<'o> {
    /// Mangle local names; `Some(true)` mangles top-level names as well.
    pub mangle: Option<bool>,
    /// Escape every non-ASCII character.
    pub ascii_only: bool,
    /// Produce a map whose single source is this name, embedding the input.
    pub map_source: Option<&'o str>,
}

/// Printed code and its map back to the input.
#[derive(Debug, Clone)]
pub struct Printed {
    /// Minified code.
    pub code: String,
    /// Maps `code` to the input, when requested.
    pub map: Option<SourceMap>,
}

/// Parses `source` as a script and prints it minified.
pub fn print(source: &str, options: PrintOptions<'_>) -> Result<Printed, SyntaxError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, script_type()).parse();
    if !parsed.errors.is_empty() {
        return Err(SyntaxError::from_diagnostics(source, &parsed.errors));
    }
    let program = parsed.program;

    let symbols = options.mangle.map(|top_level| {
        Mangler::default()
            .with_options(MangleOptions {
                top_level,
                ..MangleOptions::default()
            })
            .build(&program)
    });
    let printed = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            source_map_path: options.map_source.map(PathBuf::from),
            ..CodegenOptions::default()
        })
        .with_symbol_table(symbols)
        .build(&program);

    let (code, shifts) = if options.ascii_only {
        escape_non_ascii(&printed.code)
    } else {
        (printed.code, Vec::new())
    };
    let map = match (printed.map, options.map_source) {
        (Some(map), Some(name)) => {
            let map = SourceMap::from_json(&map.to_json_string()).map_err(|e| {
                SyntaxError::at(source, 0, format!("printer produced an unreadable map: {e}"))
            })?;
            Some(retarget(&map, name, source, &shifts))
        }
        _ => None,
    };
    Ok(Printed { code, map })
}

/// Where escaping widened a line: the UTF-16 column of each escaped
/// character and the columns it added.
type Shifts = Vec<Vec<(u32, u32)>>;

/// Replaces non-ASCII characters with `\u` escapes.
///
/// Comments are gone after printing, so every such character sits in a
/// string, template, regular expression or identifier, where the escape
/// means the same character.
fn escape_non_ascii(code: &str) -> (String, Shifts) {
    let mut out = String::with_capacity(code.len());
    let mut shifts: Shifts = vec![Vec::new()];
    let mut column = 0u32;
    for c in code.chars() {
        if c == '\n' {
            shifts.push(Vec::new());
            column = 0;
            out.push(c);
            continue;
        }
        let width = c.len_utf16() as u32;
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units).iter() {
                let _ = write!(out, "\\u{unit:04x}");
            }
            if let Some(line) = shifts.last_mut() {
                line.push((column, 6 * width - width));
            }
        }
        column += width;
    }
    (out, shifts)
}

/// Points every segment of `map` at `source`, named `name`, and moves
/// generated columns past escaped characters.
fn retarget(map: &SourceMap, name: &str, source: &str, shifts: &Shifts) -> SourceMap {
    let mut builder = SourceMapBuilder::new(map.file());
    let id = builder.add_source(name);
    builder.set_source_content(id, Some(source));
    for (line, segments) in map.lines().iter().enumerate() {
        let widened = shifts.get(line).map(Vec::as_slice).unwrap_or_default();
        for segment in segments {
            let extra: u32 = widened
                .iter()
                .take_while(|(column, _)| *column < segment.generated_column)
                .map(|(_, extra)| extra)
                .sum();
            let original = segment.original.map(|o| OriginalLocation {
                source: id,
                line: o.line,
                column: o.column,
                name: o
                    .name
                    .and_then(|n| map.names().get(n as usize))
                    .map(|n| builder.add_name(n)),
            });
            builder.add(line as u32, segment.generated_column + extra, original);
        }
    }
    builder.build()
}
