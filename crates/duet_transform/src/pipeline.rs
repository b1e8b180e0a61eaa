//! The per-bundle transform: downlevel, minify, map composition and runtime
//! chunk rewriting for one [`ProcessingAction`].

use std::path::{Path, PathBuf};

use duet_common::TargetNaming;
use duet_sourcemap::{compose, ComposeStrategy, SourceMap};
use tracing::{debug, warn};

use crate::downlevel::{lower, LowerOptions};
use crate::error::TransformError;
use crate::minify::{print, PrintOptions};

/// Everything needed to transform one bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingAction {
    /// Where the bundle lives; the original output is written back here.
    pub source_path: PathBuf,
    /// Where the downlevel output is written.
    pub downlevel_path: PathBuf,
    /// Bundle code.
    pub code: String,
    /// The bundle's own source map, if one was emitted.
    pub source_map: Option<String>,
    /// Minify the outputs.
    pub optimize: bool,
    /// Only minify the original; produce no downlevel output.
    pub optimize_only: bool,
    /// Produce source maps for the outputs.
    pub generate_source_maps: bool,
    /// Produce maps but do not reference them from the code.
    pub hidden_source_maps: bool,
    /// Vendor maps are part of the input map.
    pub vendor_source_maps: bool,
    /// The bundle is the runtime chunk that loads lazy chunks by name.
    pub is_runtime_chunk: bool,
    /// Do not produce the minified original.
    pub ignore_original: bool,
}

/// One generated file and its map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedOutput {
    /// Generated code, including the `sourceMappingURL` comment if any.
    pub code: String,
    /// Source map JSON.
    pub source_map: Option<String>,
}

/// The outputs of [`transform`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    /// Code lowered to the legacy syntax level.
    pub downlevel: Option<ProcessedOutput>,
    /// Minified code at the modern syntax level.
    pub original: Option<ProcessedOutput>,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Transforms one bundle.
///
/// Steps run strictly in order: lowering with chunk reference rewriting
/// (runtime chunk only), printing with mangling when optimizing, map
/// composition through the bundle's own map, then the minified original.
pub fn transform(
    action: &ProcessingAction,
    naming: &TargetNaming,
) -> Result<TransformOutput, TransformError> {
    let input_map = input_map(action);

    if action.optimize_only {
        let original = minify_original(action, input_map.as_ref())?;
        return Ok(TransformOutput {
            downlevel: None,
            original: Some(original),
        });
    }

    let source_name = file_name(&action.source_path);
    let (modern, legacy) = (
        naming.modern_chunk_reference(),
        naming.legacy_chunk_reference(),
    );
    let options = LowerOptions {
        chunk_rewrite: action
            .is_runtime_chunk
            .then_some((modern.as_str(), legacy.as_str())),
    };
    let lowered = lower(&action.code, &source_name, options).map_err(TransformError::downlevel)?;
    if action.is_runtime_chunk {
        debug!(
            "Rewrote {} chunk references in {}",
            lowered.rewritten,
            action.source_path.display()
        );
    }

    let printed = print(
        &lowered.code,
        PrintOptions {
            mangle: action.optimize.then_some(true),
            ascii_only: action.optimize,
            map_source: action.generate_source_maps.then_some(source_name.as_str()),
        },
    )
    .map_err(|e| TransformError::Downlevel {
        message: format!("lowered code does not parse: {}", e.message),
        line: e.line,
        column: e.column,
    })?;
    // The printer maps into the lowered code, which maps into the bundle.
    let map = printed.map.map(|own| {
        let strategy = ComposeStrategy::for_code_size(action.code.len());
        compose(&own, &lowered.map, strategy).0
    });
    let downlevel = finish(
        printed.code,
        map,
        action,
        &file_name(&action.downlevel_path),
        input_map.as_ref(),
    );

    let original = if action.optimize && !action.ignore_original {
        Some(minify_original(action, input_map.as_ref())?)
    } else {
        None
    };

    Ok(TransformOutput {
        downlevel: Some(downlevel),
        original,
    })
}

/// Parses the bundle's map when maps are requested. A malformed map is
/// ignored with a warning and the outputs map to the bundle itself.
fn input_map(action: &ProcessingAction) -> Option<SourceMap> {
    if !action.generate_source_maps {
        return None;
    }
    let raw = action.source_map.as_deref()?;
    match SourceMap::from_json(raw) {
        Ok(map) => Some(map),
        Err(e) => {
            warn!(
                "Ignoring source map of {}: {}",
                action.source_path.display(),
                e
            );
            None
        }
    }
}

/// Mangles the bundle at its own syntax level, keeping top-level names.
fn minify_original(
    action: &ProcessingAction,
    input_map: Option<&SourceMap>,
) -> Result<ProcessedOutput, TransformError> {
    let source_name = file_name(&action.source_path);
    let printed = print(
        &action.code,
        PrintOptions {
            mangle: Some(false),
            ascii_only: true,
            map_source: action.generate_source_maps.then_some(source_name.as_str()),
        },
    )
    .map_err(TransformError::minify)?;
    Ok(finish(
        printed.code,
        printed.map,
        action,
        &source_name,
        input_map,
    ))
}

/// Names the output's map, composes it with the input map and appends the
/// map reference unless maps are hidden.
fn finish(
    mut code: String,
    map: Option<SourceMap>,
    action: &ProcessingAction,
    output_name: &str,
    input_map: Option<&SourceMap>,
) -> ProcessedOutput {
    let map = map.map(|own| {
        let mut map = match input_map {
            Some(inner) => {
                let strategy = ComposeStrategy::for_code_size(action.code.len());
                let (composed, stats) = compose(&own, inner, strategy);
                debug!(
                    "Composed map for {}: {} mappings kept, {} dropped",
                    output_name, stats.kept, stats.dropped
                );
                composed
            }
            None => own,
        };
        map.set_file(Some(output_name.to_string()));
        map
    });

    if map.is_some() && !action.hidden_source_maps {
        code.push_str(&format!("\n//# sourceMappingURL={output_name}.map"));
    }
    ProcessedOutput {
        code,
        source_map: map.map(|m| m.to_json()),
    }
}
