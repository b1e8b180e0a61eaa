//! Differential bundle transforms.
//!
//! A bundle written at the modern syntax level is lowered to the legacy
//! level, and optionally minified. Parsing, scope resolution, mangling and
//! printing are done with oxc. Both outputs carry source maps chained
//! through the bundle's own map.

#![warn(missing_docs)]

pub mod downlevel;
mod edit;
pub mod error;
mod js;
pub mod minify;
pub mod pipeline;
mod scoping;

pub use downlevel::{lower, LowerOptions, Lowered};
pub use error::{SyntaxError, TransformError};
pub use minify::{print, PrintOptions, Printed};
pub use pipeline::{transform, ProcessedOutput, ProcessingAction, TransformOutput};
