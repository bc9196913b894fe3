//! Preloaded hint trees.
//!
//! A serializer may attach auxiliary per-id data during discovery
//! (`Serializer::preloaded`); the top level of the tree is keyed by the
//! entity id rendered as a string. Trees coming from different branches are
//! combined with [`deep_merge`].

use serde_json::{Map, Value as Json};

pub type HintTree = Map<String, Json>;

/// Overlay `source` onto `target`.
///
/// Nested objects merge recursively; any other source value replaces the
/// target leaf. A target leaf that is not an object is replaced by the merged
/// object when the source has an object at that key.
pub fn deep_merge(target: &mut HintTree, source: HintTree) {
    for (key, value) in source {
        match value {
            Json::Object(nested) => {
                let slot = target
                    .entry(key)
                    .or_insert_with(|| Json::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Json::Object(Map::new());
                }
                if let Json::Object(existing) = slot {
                    deep_merge(existing, nested);
                }
            }
            leaf => {
                target.insert(key, leaf);
            }
        }
    }
}
