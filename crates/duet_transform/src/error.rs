//! Error types for the transform pipeline.

use oxc_diagnostics::OxcDiagnostic;

/// A problem found in bundle code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (line {line}, column {column})")]
pub struct SyntaxError {
    /// What went wrong.
    pub message: String,
    /// 1-based line of the offending code.
    pub line: u32,
    /// 1-based column of the offending code, in characters.
    pub column: u32,
}

impl SyntaxError {
    /// Locates `offset`, a byte offset into `source`.
    pub(crate) fn at(source: &str, offset: u32, message: impl Into<String>) -> Self {
        let offset = (offset as usize).min(source.len());
        let before = source.get(..offset).unwrap_or(source);
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        Self {
            message: message.into(),
            line: before.matches('\n').count() as u32 + 1,
            column: before[line_start..].chars().count() as u32 + 1,
        }
    }

    /// Reports the first parser diagnostic.
    pub(crate) fn from_diagnostics(source: &str, errors: &[OxcDiagnostic]) -> Self {
        let Some(first) = errors.first() else {
            return Self::at(source, 0, "unparsable input");
        };
        let offset = first
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map_or(0, |label| label.offset() as u32);
        Self::at(source, offset, first.to_string())
    }
}

/// Errors that abort the processing of a single bundle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransformError {
    /// The bundle could not be lowered to the legacy syntax level.
    #[error("downlevel failed at {line}:{column}: {message}")]
    Downlevel {
        /// Description of the failure.
        message: String,
        /// 1-based line in the input bundle.
        line: u32,
        /// 1-based column in the input bundle.
        column: u32,
    },

    /// The bundle could not be minified.
    #[error("minify failed: {message}")]
    Minify {
        /// Description of the failure.
        message: String,
    },
}

impl TransformError {
    pub(crate) fn downlevel(err: SyntaxError) -> Self {
        Self::Downlevel {
            message: err.message,
            line: err.line,
            column: err.column,
        }
    }

    pub(crate) fn minify(err: SyntaxError) -> Self {
        Self::Minify {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_become_one_based_positions() {
        let source = "let a;\nlet é = `x`;";
        let err = SyntaxError::at(source, source.find('`').unwrap() as u32, "template");
        assert_eq!((err.line, err.column), (2, 9));
        let err = TransformError::downlevel(err);
        assert_eq!(err.to_string(), "downlevel failed at 2:9: template");
    }

    #[test]
    fn minify_carries_syntax_position() {
        let err = TransformError::minify(SyntaxError::at("a\n)", 2, "unbalanced ')'"));
        assert_eq!(
            err.to_string(),
            "minify failed: unbalanced ')' (line 2, column 1)"
        );
    }
}
