//! Script classification by file name.

use duet_common::TargetNaming;

use crate::files::BundleFile;

/// How a script bundle is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// Polyfills already written in legacy syntax. Only the downlevel output
    /// is kept; the modern-tagged original is removed.
    LegacyPolyfills,
    /// Polyfills loaded only by browsers without module support.
    NomodulePolyfills,
    /// Polyfills for the modern baseline. Never downleveled; minified only.
    ModernPolyfills,
    /// The runtime chunk, whose lazy chunk references are rewritten.
    Runtime,
    /// Any other script.
    Module,
}

impl ScriptKind {
    /// Whether the bundle is listed as a module script.
    pub fn is_module(self) -> bool {
        !matches!(self, Self::LegacyPolyfills | Self::NomodulePolyfills)
    }
}

/// Classifies a script bundle.
pub fn classify(file: &BundleFile, naming: &TargetNaming) -> ScriptKind {
    let name = file.file_name();
    if name.starts_with(&naming.legacy_polyfills_prefix()) {
        ScriptKind::LegacyPolyfills
    } else if name.starts_with(&naming.nomodule_polyfills_prefix()) {
        ScriptKind::NomodulePolyfills
    } else if name.starts_with(&naming.modern_polyfills_prefix()) {
        ScriptKind::ModernPolyfills
    } else if file.is_entry_runtime || name.starts_with("runtime") {
        ScriptKind::Runtime
    } else {
        ScriptKind::Module
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(path: &str) -> ScriptKind {
        classify(&BundleFile::new("", path), &TargetNaming::default())
    }

    #[test]
    fn polyfill_variants() {
        assert_eq!(kind("polyfills-es5-es2015.js"), ScriptKind::LegacyPolyfills);
        assert_eq!(
            kind("polyfills-nomodule-es5.js"),
            ScriptKind::NomodulePolyfills
        );
        assert_eq!(kind("polyfills-es2015.js"), ScriptKind::ModernPolyfills);
    }

    #[test]
    fn runtime_by_name_or_flag() {
        assert_eq!(kind("runtime-es2015.js"), ScriptKind::Runtime);
        let mut file = BundleFile::new("main", "main-es2015.js");
        file.is_entry_runtime = true;
        assert_eq!(
            classify(&file, &TargetNaming::default()),
            ScriptKind::Runtime
        );
    }

    #[test]
    fn everything_else_is_a_module() {
        assert_eq!(kind("main-es2015.js"), ScriptKind::Module);
        assert_eq!(kind("lazy/feature-es2015.js"), ScriptKind::Module);
        assert_eq!(kind("vendor-es2015.js"), ScriptKind::Module);
    }

    #[test]
    fn module_listing() {
        assert!(!ScriptKind::LegacyPolyfills.is_module());
        assert!(!ScriptKind::NomodulePolyfills.is_module());
        assert!(ScriptKind::ModernPolyfills.is_module());
        assert!(ScriptKind::Runtime.is_module());
    }

    #[test]
    fn custom_tags() {
        let naming = TargetNaming::new("modern", "legacy").unwrap();
        let file = BundleFile::new("", "polyfills-legacy-modern.js");
        assert_eq!(classify(&file, &naming), ScriptKind::LegacyPolyfills);
        let file = BundleFile::new("", "polyfills-modern.js");
        assert_eq!(classify(&file, &naming), ScriptKind::ModernPolyfills);
    }
}
