//! File naming conventions for the modern and legacy bundle variants.

use serde::{Deserialize, Serialize};

/// Error returned when a target tag is unusable in file names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamingError {
    /// A tag is empty.
    #[error("target tag must not be empty")]
    Empty,
    /// A tag contains characters other than ASCII alphanumerics and `_`.
    #[error("target tag '{0}' may only contain ASCII letters, digits and '_'")]
    InvalidCharacter(String),
    /// Both tags are identical, so the variants would overwrite each other.
    #[error("modern and legacy tags are both '{0}'")]
    Identical(String),
}

/// The pair of tags distinguishing modern bundles from their downlevel twins.
///
/// Bundles emitted by the upstream build carry the modern tag in their file
/// name (`main-es2015.js`); downlevel output replaces it with the legacy tag
/// (`main-es5.js`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetNaming {
    modern_tag: String,
    legacy_tag: String,
}

impl Default for TargetNaming {
    fn default() -> Self {
        Self {
            modern_tag: "es2015".to_string(),
            legacy_tag: "es5".to_string(),
        }
    }
}

impl TargetNaming {
    /// Creates a naming scheme, validating both tags.
    pub fn new(modern_tag: &str, legacy_tag: &str) -> Result<Self, NamingError> {
        validate_tag(modern_tag)?;
        validate_tag(legacy_tag)?;
        if modern_tag == legacy_tag {
            return Err(NamingError::Identical(modern_tag.to_string()));
        }
        Ok(Self {
            modern_tag: modern_tag.to_string(),
            legacy_tag: legacy_tag.to_string(),
        })
    }

    /// The tag carried by modern bundle names.
    pub fn modern_tag(&self) -> &str {
        &self.modern_tag
    }

    /// The tag carried by downlevel bundle names.
    pub fn legacy_tag(&self) -> &str {
        &self.legacy_tag
    }

    /// Prefix of polyfill bundles that are already written in legacy syntax.
    pub fn legacy_polyfills_prefix(&self) -> String {
        format!("polyfills-{}", self.legacy_tag)
    }

    /// Prefix of the legacy polyfill bundle loaded only by `nomodule` browsers.
    pub fn nomodule_polyfills_prefix(&self) -> String {
        format!("polyfills-nomodule-{}", self.legacy_tag)
    }

    /// Prefix of polyfill bundles targeting the modern baseline.
    pub fn modern_polyfills_prefix(&self) -> String {
        format!("polyfills-{}", self.modern_tag)
    }

    /// Returns the downlevel twin of a bundle file name or path.
    ///
    /// The first occurrence of the modern tag is replaced with the legacy tag.
    /// Names without the modern tag get `-<legacy>` inserted before the
    /// extension so the twin never overwrites its source.
    pub fn downlevel_name(&self, name: &str) -> String {
        if name.contains(&self.modern_tag) {
            return name.replacen(&self.modern_tag, &self.legacy_tag, 1);
        }
        let file_start = name.rfind(['/', '\\']).map_or(0, |i| i + 1);
        match name[file_start..].rfind('.') {
            Some(dot) if dot > 0 => {
                let dot = file_start + dot;
                format!("{}-{}{}", &name[..dot], self.legacy_tag, &name[dot..])
            }
            _ => format!("{name}-{}", self.legacy_tag),
        }
    }

    /// Strips the `-<modern>` marker from a legacy polyfill name
    /// (`polyfills-es5-es2015.js` becomes `polyfills-es5.js`).
    pub fn strip_modern_marker(&self, name: &str) -> String {
        name.replacen(&format!("-{}", self.modern_tag), "", 1)
    }

    /// Chunk reference prefix embedded in runtime bootstrap code for modern chunks.
    pub fn modern_chunk_reference(&self) -> String {
        format!("-{}.", self.modern_tag)
    }

    /// Chunk reference prefix for the legacy variant of a chunk.
    pub fn legacy_chunk_reference(&self) -> String {
        format!("-{}.", self.legacy_tag)
    }
}

fn validate_tag(tag: &str) -> Result<(), NamingError> {
    if tag.is_empty() {
        return Err(NamingError::Empty);
    }
    if !tag.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(NamingError::InvalidCharacter(tag.to_string()));
    }
    Ok(())
}
