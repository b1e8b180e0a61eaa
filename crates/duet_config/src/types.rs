//! Configuration types deserialized from `duet.toml`.

use duet_common::{NamingError, TargetNaming};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

/// The top-level configuration parsed from `duet.toml`.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ProjectConfig {
    /// Bundle processing settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Artifact cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Tags distinguishing modern bundles from their downlevel twins.
    #[serde(default)]
    pub naming: NamingConfig,
}

/// Bundle processing settings.
#[derive(Debug, Deserialize)]
pub struct BuildConfig {
    /// Directory holding the emitted bundles, relative to the project.
    #[serde(default = "default_output_path")]
    pub output_path: String,
    /// Minify outputs.
    #[serde(default = "default_true")]
    pub optimize: bool,
    /// Source map generation.
    ///
    /// Accepts either `source_maps = true` or a table with `scripts`,
    /// `hidden` and `vendor` keys.
    #[serde(default, deserialize_with = "deserialize_bool_or_table")]
    pub source_maps: SourceMapConfig,
    /// Chunk identifiers of global scripts that are copied through untouched.
    ///
    /// Accepts either a single string or a list of strings.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub script_entry_points: Vec<String>,
    /// Number of transform workers. Defaults to the available parallelism.
    pub workers: Option<usize>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            optimize: true,
            source_maps: SourceMapConfig::default(),
            script_entry_points: Vec::new(),
            workers: None,
        }
    }
}

/// Source map options for script bundles.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourceMapConfig {
    /// Produce maps for script outputs.
    pub scripts: bool,
    /// Produce maps without a `sourceMappingURL` reference.
    pub hidden: bool,
    /// Include third-party sources in the maps.
    pub vendor: bool,
}

/// Deserializes a field that can be either a boolean or a table.
///
/// `source_maps = true` is shorthand for `source_maps = { scripts = true }`.
fn deserialize_bool_or_table<'de, D>(deserializer: D) -> Result<SourceMapConfig, D::Error>
where
    D: Deserializer<'de>,
{
    struct BoolOrTable;

    impl<'de> Visitor<'de> for BoolOrTable {
        type Value = SourceMapConfig;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a boolean or a table of source map options")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
            Ok(SourceMapConfig {
                scripts: v,
                ..SourceMapConfig::default()
            })
        }

        fn visit_map<A: de::MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
            SourceMapConfig::deserialize(de::value::MapAccessDeserializer::new(map))
        }
    }

    deserializer.deserialize_any(BoolOrTable)
}

/// Deserializes a field that can be either a single string or a list of strings.
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

/// Artifact cache settings.
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Whether processed bundles are cached at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache directory, relative to the project.
    #[serde(default = "default_cache_path")]
    pub path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_cache_path(),
        }
    }
}

/// Tags carried in bundle file names.
#[derive(Debug, Deserialize)]
pub struct NamingConfig {
    /// Tag of bundles at the modern syntax level.
    #[serde(default = "default_modern_tag")]
    pub modern_tag: String,
    /// Tag of downlevel bundles.
    #[serde(default = "default_legacy_tag")]
    pub legacy_tag: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            modern_tag: default_modern_tag(),
            legacy_tag: default_legacy_tag(),
        }
    }
}

impl NamingConfig {
    /// Builds the validated naming scheme.
    pub fn target_naming(&self) -> Result<TargetNaming, NamingError> {
        TargetNaming::new(&self.modern_tag, &self.legacy_tag)
    }
}

fn default_true() -> bool {
    true
}

fn default_output_path() -> String {
    "dist".to_string()
}

fn default_cache_path() -> String {
    ".duet-cache".to_string()
}

fn default_modern_tag() -> String {
    "es2015".to_string()
}

fn default_legacy_tag() -> String {
    "es5".to_string()
}
