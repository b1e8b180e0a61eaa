//! Emitted files and the resulting file lists.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// A file emitted by the upstream build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleFile {
    /// Logical chunk name (`main`, `polyfills`, ...); empty for unnamed chunks.
    #[serde(default)]
    pub identifier: String,
    /// Path relative to the output path.
    pub path: String,
    /// Extension including the leading dot.
    pub extension: String,
    /// The file is the runtime chunk of an entry point.
    #[serde(default)]
    pub is_entry_runtime: bool,
}

impl BundleFile {
    /// Creates a file record, deriving the extension from `path`.
    pub fn new(identifier: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let extension = Path::new(&path)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        Self {
            identifier: identifier.into(),
            path,
            extension,
            is_entry_runtime: false,
        }
    }

    /// The final path component.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.path.as_str())
    }

    /// Whether the file is a script candidate for processing.
    pub fn is_script(&self) -> bool {
        self.extension == ".js"
    }
}

/// The file lists produced by processing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Scripts loaded by browsers with module support.
    pub module_files: Vec<BundleFile>,
    /// Downlevel scripts loaded by browsers without module support.
    pub no_module_files: Vec<BundleFile>,
    /// Files copied through untouched (styles, global scripts, assets).
    pub passthrough_files: Vec<BundleFile>,
}
