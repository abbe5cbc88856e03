//! Property tests for cache keys and lookups

use proptest::prelude::*;
use redline_cache::{CacheKey, MokaTransformationCache, TransformationCache};
use redline_content::Fingerprint;
use serde_json::{Map, Value};
use std::time::Duration;

fn config() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
        .prop_map(|m| m.into_iter().collect())
}

fn object(entries: impl IntoIterator<Item = (String, i64)>) -> Value {
    let mut map = Map::new();
    for (k, v) in entries {
        map.insert(k, Value::from(v));
    }
    Value::Object(map)
}

proptest! {
    #[test]
    fn key_ignores_config_key_order(entries in config(), text in ".{0,64}") {
        let fp = Fingerprint::of_text(&text);
        let forward = object(entries.clone());
        let reversed = object(entries.into_iter().rev());

        prop_assert_eq!(
            CacheKey::derive(&fp, "stage", &forward),
            CacheKey::derive(&fp, "stage", &reversed)
        );
    }

    #[test]
    fn key_separates_stage_names(a in "[a-z-]{1,12}", b in "[a-z-]{1,12}") {
        prop_assume!(a != b);
        let fp = Fingerprint::of_text("contract");
        prop_assert_ne!(
            CacheKey::derive(&fp, &a, &Value::Null),
            CacheKey::derive(&fp, &b, &Value::Null)
        );
    }
}

#[tokio::test]
async fn nested_config_order_hits_the_same_entry() {
    let cache = MokaTransformationCache::default();
    let fp = Fingerprint::of_text("contract");
    let stored: Value = serde_json::from_str(r#"{"model":{"name":"m","temp":0},"depth":1}"#).unwrap();
    let probe: Value = serde_json::from_str(r#"{"depth":1,"model":{"temp":0,"name":"m"}}"#).unwrap();

    cache
        .store(&fp, "review", &stored, Value::from("cached"), Duration::from_secs(60))
        .await;

    assert_eq!(cache.lookup(&fp, "review", &probe).await, Some(Value::from("cached")));
    assert_eq!(cache.stats().hits, 1);
}
