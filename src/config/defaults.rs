//! Built-in vote configuration and the default merger.
//!
//! Channel documents keep their vote settings under `config.vote`. Whatever
//! an operator has not set is filled from [`DefaultConfig::vote`] without ever
//! overwriting a value that is already present.

use super::document::ConfigDoc;
use crate::chat::traits::{ChatResult, ConfigStore};
use serde_json::{Map, Value};
use tracing::debug;

/// Key of the vote subtree inside a channel document.
pub const VOTE_CONFIG_KEY: &str = "config.vote";

/// Built-in defaults.
pub struct DefaultConfig;

impl DefaultConfig {
    /// Default `config.vote` subtree.
    pub fn vote() -> ConfigDoc {
        let mut doc = ConfigDoc::new();
        doc.put("max_active", 16);
        doc.put("max_per_user", 1);
        doc.put("min_ballots", 1);
        doc.put("min_yes", 1);
        doc.put("turnout", 0.0);
        doc.put("duration", 30);
        doc.put("plurality", 0.51);
        doc.put("enfranchise.age", 1800);
        doc.put("enfranchise.lines", 6);
        doc.put("enfranchise.access", "");
        doc.put("qualify.age", 900);
        doc.put("qualify.lines", 3);
        doc.put("qualify.access", "");
        doc.put("ballot.ack_chan", 0);
        doc.put("ballot.ack_priv", 1);
        doc.put("ballot.rej_chan", 0);
        doc.put("ballot.rej_priv", 1);
        doc.put("result.ack_chan", 1);
        doc.put("intercede.yes", 0);
        doc.put("config.disable", "0");
        doc.put("kick.disable", "0");
        doc.put("mode.disable", "0");
        doc.put("mode.expiry", 0);
        doc
    }

    /// Fill gaps in `cfg` from the vote defaults. Returns the number of keys
    /// inserted.
    pub fn configure(cfg: &mut ConfigDoc) -> usize {
        merge(&Self::vote(), cfg)
    }

    /// Load the vote subtree of a channel document, fill it from the defaults
    /// and write the channel document back if anything was added.
    pub async fn configure_channel(store: &dyn ConfigStore, chan: &str) -> ChatResult<ConfigDoc> {
        let mut doc = store.load(chan).await?;
        let mut cfg = doc.get_child(VOTE_CONFIG_KEY).unwrap_or_default();

        let inserted = Self::configure(&mut cfg);
        if inserted > 0 {
            debug!(channel = %chan, inserted, "seeding vote defaults into channel document");
            doc.put_child(VOTE_CONFIG_KEY, cfg.clone());
            store.save(chan, &doc).await?;
        }

        Ok(cfg)
    }
}

/// Recursively copy every key of `defaults` that `target` lacks.
///
/// Subtrees are descended into (created empty when absent). Existing values
/// at any depth are never overwritten; a scalar in `target` where `defaults`
/// holds a subtree is left as it is. Returns the count of inserted scalars.
pub fn merge(defaults: &ConfigDoc, target: &mut ConfigDoc) -> usize {
    merge_map(defaults.as_map(), target.as_map_mut())
}

fn merge_map(defaults: &Map<String, Value>, target: &mut Map<String, Value>) -> usize {
    let mut inserted = 0;
    for (key, value) in defaults {
        match value {
            Value::Object(sub) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(target_sub) = slot {
                    inserted += merge_map(sub, target_sub);
                }
            }
            _ => {
                if !target.contains_key(key) {
                    target.insert(key.clone(), value.clone());
                    inserted += 1;
                }
            }
        }
    }
    inserted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::mock::MockChat;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_merge_never_overwrites() {
        let defaults = ConfigDoc::from_value(json!({ "a": 1, "b": 2 }));
        let mut target = ConfigDoc::from_value(json!({ "a": 5 }));

        let inserted = merge(&defaults, &mut target);

        assert_eq!(inserted, 1);
        assert_eq!(target, ConfigDoc::from_value(json!({ "a": 5, "b": 2 })));
    }

    #[test]
    fn test_merge_recurses_into_new_and_existing_subtrees() {
        let defaults = ConfigDoc::from_value(json!({
            "qualify": { "age": 900, "lines": 3 },
            "ballot": { "ack_priv": 1 },
        }));
        let mut target = ConfigDoc::from_value(json!({ "qualify": { "lines": 10 } }));

        let inserted = merge(&defaults, &mut target);

        assert_eq!(inserted, 2);
        assert_eq!(target.get_u64("qualify.lines").unwrap(), 10);
        assert_eq!(target.get_u64("qualify.age").unwrap(), 900);
        assert_eq!(target.get_u64("ballot.ack_priv").unwrap(), 1);
    }

    #[test]
    fn test_scalar_override_of_subtree_is_kept() {
        let defaults = ConfigDoc::from_value(json!({ "kick": { "disable": "0" } }));
        let mut target = ConfigDoc::from_value(json!({ "kick": "off" }));

        assert_eq!(merge(&defaults, &mut target), 0);
        assert_eq!(target.get_str("kick"), "off");
    }

    #[test]
    fn test_configure_fills_everything_on_empty() {
        let mut cfg = ConfigDoc::new();
        let inserted = DefaultConfig::configure(&mut cfg);

        assert!(inserted > 0);
        assert_eq!(cfg, DefaultConfig::vote());
        assert_eq!(DefaultConfig::configure(&mut cfg), 0);
    }

    #[tokio::test]
    async fn test_configure_channel_saves_only_when_changed() {
        let chat = MockChat::new();
        let cfg = DefaultConfig::configure_channel(&chat, "#senate").await.unwrap();

        assert_eq!(cfg.get_u64("duration").unwrap(), 30);
        assert_eq!(chat.saved_documents(), 1);

        let stored = chat.document("#senate").unwrap();
        assert_eq!(stored.get_u64("config.vote.max_active").unwrap(), 16);

        // Second pass finds nothing missing and does not write.
        DefaultConfig::configure_channel(&chat, "#senate").await.unwrap();
        assert_eq!(chat.saved_documents(), 1);
    }

    #[tokio::test]
    async fn test_configure_channel_keeps_operator_overrides() {
        let chat = MockChat::new();
        let mut doc = ConfigDoc::new();
        doc.put("config.vote.duration", 120);
        doc.put("topic", "hello");
        chat.set_document("#senate", doc);

        let cfg = DefaultConfig::configure_channel(&chat, "#senate").await.unwrap();

        assert_eq!(cfg.get_u64("duration").unwrap(), 120);
        let stored = chat.document("#senate").unwrap();
        assert_eq!(stored.get_str("topic"), "hello");
        assert_eq!(stored.get_u64("config.vote.duration").unwrap(), 120);
    }

    fn doc_strategy() -> impl Strategy<Value = ConfigDoc> {
        let leaf = prop_oneof![
            any::<u32>().prop_map(|n| json!(n)),
            "[a-z]{0,4}".prop_map(|s| json!(s)),
        ];
        let tree = leaf.prop_recursive(3, 24, 4, |inner| {
            prop::collection::btree_map("[a-e]", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect()))
        });
        prop::collection::btree_map("[a-e]", tree, 0..5)
            .prop_map(|m| ConfigDoc::from(m.into_iter().collect::<Map<String, Value>>()))
    }

    proptest! {
        /// Property: merging the same defaults twice changes nothing the second time
        #[test]
        fn merge_is_idempotent(defaults in doc_strategy(), target in doc_strategy()) {
            let mut once = target.clone();
            merge(&defaults, &mut once);

            let mut twice = once.clone();
            let inserted = merge(&defaults, &mut twice);

            prop_assert_eq!(inserted, 0);
            prop_assert_eq!(twice, once);
        }

        /// Property: every top-level scalar already in the target survives the merge
        #[test]
        fn merge_preserves_target_scalars(defaults in doc_strategy(), target in doc_strategy()) {
            let mut merged = target.clone();
            merge(&defaults, &mut merged);

            for (key, value) in target.iter() {
                if !value.is_object() {
                    prop_assert_eq!(merged.get(key), Some(value));
                }
            }
        }
    }
}
