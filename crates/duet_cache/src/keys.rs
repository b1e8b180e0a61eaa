//! Deterministic cache keys for the artifacts of one processing action.
//!
//! Every key starts from a base of `tool_version|byte_length|sha256(code)`,
//! so a change to the bundle or to the tool produces new keys instead of
//! invalidating stored entries. The suffix names the artifact variant.

use duet_common::CodeDigest;

/// Postfix added to source map keys when vendor source maps are included, so
/// maps built with and without vendor sources never share a key.
const VENDOR_POSTFIX: &str = "|vendor";

/// One of the four artifacts an action can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Minified code at the modern syntax level.
    OriginalCode,
    /// Source map of [`Slot::OriginalCode`].
    OriginalMap,
    /// Downlevel code.
    DownlevelCode,
    /// Source map of [`Slot::DownlevelCode`].
    DownlevelMap,
}

impl Slot {
    /// All slots, in artifact order.
    pub const ALL: [Slot; 4] = [
        Slot::OriginalCode,
        Slot::OriginalMap,
        Slot::DownlevelCode,
        Slot::DownlevelMap,
    ];
}

/// Flags of a processing action that decide which artifacts are required.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyFlags {
    /// Minify output.
    pub optimize: bool,
    /// Minify at the modern level only, without a downlevel variant.
    pub optimize_only: bool,
    /// Do not produce the modern variant.
    pub ignore_original: bool,
    /// Produce source maps.
    pub generate_source_maps: bool,
    /// Source maps include vendor sources.
    pub vendor_source_maps: bool,
}

/// The cache keys required by one processing action.
///
/// A slot is `None` when the action does not produce that artifact; such
/// slots are never looked up in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheKeySet {
    /// Key of the minified modern code.
    pub original_code: Option<String>,
    /// Key of the modern source map.
    pub original_map: Option<String>,
    /// Key of the downlevel code.
    pub downlevel_code: Option<String>,
    /// Key of the downlevel source map.
    pub downlevel_map: Option<String>,
}

impl CacheKeySet {
    /// Returns the key of `slot`, if required.
    pub fn get(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::OriginalCode => self.original_code.as_deref(),
            Slot::OriginalMap => self.original_map.as_deref(),
            Slot::DownlevelCode => self.downlevel_code.as_deref(),
            Slot::DownlevelMap => self.downlevel_map.as_deref(),
        }
    }

    /// Iterates over the required slots and their keys.
    pub fn required(&self) -> impl Iterator<Item = (Slot, &str)> + '_ {
        Slot::ALL
            .into_iter()
            .filter_map(|slot| self.get(slot).map(|key| (slot, key)))
    }

    /// Returns `true` if no slot is required.
    pub fn is_empty(&self) -> bool {
        self.required().next().is_none()
    }
}

/// Derives the cache keys for `code` processed with `flags` by `tool_version`.
pub fn build_keys(code: &str, tool_version: &str, flags: KeyFlags) -> CacheKeySet {
    let digest = CodeDigest::of(code.as_bytes());
    let base = format!("{tool_version}|{}|{digest}", code.len());
    let map_postfix = if flags.generate_source_maps && flags.vendor_source_maps {
        VENDOR_POSTFIX
    } else {
        ""
    };

    let mut keys = CacheKeySet::default();

    if (flags.optimize || flags.optimize_only) && !flags.ignore_original {
        keys.original_code = Some(format!("{base}|orig"));
        if flags.generate_source_maps {
            keys.original_map = Some(format!("{base}{map_postfix}|orig-map"));
        }
    }

    if !flags.optimize_only {
        keys.downlevel_code = Some(format!("{base}|dl"));
        if flags.generate_source_maps {
            keys.downlevel_map = Some(format!("{base}{map_postfix}|dl-map"));
        }
    }

    keys
}
