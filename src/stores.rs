//! Configuration stores the host hands to the orchestrator.

use serde::Serialize;
use serde_json::{Map, Value};

/// Key of the public sub-store inside runtime-config.
pub const PUBLIC_KEY: &str = "public";

/// Runtime-config (with its `public` sub-store) and app-config.
///
/// The orchestrator only ever merges into these maps; it never replaces them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStores {
    pub runtime_config: Map<String, Value>,
    pub app_config: Map<String, Value>,
}

impl ConfigStores {
    pub fn new(runtime_config: Map<String, Value>, app_config: Map<String, Value>) -> Self {
        Self {
            runtime_config,
            app_config,
        }
    }

    pub fn merge_runtime(&mut self, fragment: Map<String, Value>) {
        shallow_merge(&mut self.runtime_config, fragment);
    }

    /// Merge into `runtime_config.public`, creating it when absent or not an object.
    pub fn merge_public(&mut self, fragment: Map<String, Value>) {
        let entry = self
            .runtime_config
            .entry(PUBLIC_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            tracing::warn!("runtimeConfig.public was not an object; replacing it");
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(public) = entry {
            shallow_merge(public, fragment);
        }
    }

    pub fn merge_app(&mut self, fragment: Map<String, Value>) {
        shallow_merge(&mut self.app_config, fragment);
    }

    pub fn public_config(&self) -> Option<&Map<String, Value>> {
        self.runtime_config.get(PUBLIC_KEY).and_then(Value::as_object)
    }
}

/// Copy every key of `fragment` into `target`, overwriting on collision.
///
/// Nested objects are not merged recursively.
pub fn shallow_merge(target: &mut Map<String, Value>, fragment: Map<String, Value>) {
    for (key, value) in fragment {
        target.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_shallow_merge_last_writer_wins() {
        let mut target = obj(json!({ "foo": "a", "keep": 1 }));
        shallow_merge(&mut target, obj(json!({ "foo": "b", "baz": "c" })));
        assert_eq!(Value::Object(target), json!({ "foo": "b", "baz": "c", "keep": 1 }));
    }

    #[test]
    fn test_shallow_merge_does_not_recurse() {
        let mut target = obj(json!({ "db": { "host": "localhost", "port": 5432 } }));
        shallow_merge(&mut target, obj(json!({ "db": { "host": "remote" } })));
        assert_eq!(target["db"], json!({ "host": "remote" }));
    }

    #[test]
    fn test_merge_public_creates_sub_store() {
        let mut stores = ConfigStores::default();
        assert!(stores.public_config().is_none());

        stores.merge_public(obj(json!({ "gee": "wiz" })));
        assert_eq!(stores.runtime_config["public"], json!({ "gee": "wiz" }));
    }

    #[test]
    fn test_merge_public_keeps_existing_keys() {
        let mut stores = ConfigStores::new(
            obj(json!({ "secret": "s", "public": { "apiBase": "/api" } })),
            Map::new(),
        );
        stores.merge_public(obj(json!({ "gee": "wiz" })));

        let public = stores.public_config().unwrap();
        assert_eq!(public["apiBase"], "/api");
        assert_eq!(public["gee"], "wiz");
        assert_eq!(stores.runtime_config["secret"], "s");
    }

    #[test]
    fn test_merge_public_replaces_non_object() {
        let mut stores = ConfigStores::new(obj(json!({ "public": 3 })), Map::new());
        stores.merge_public(obj(json!({ "a": 1 })));
        assert_eq!(stores.runtime_config["public"], json!({ "a": 1 }));
    }

    #[test]
    fn test_stores_serialize_camel_case() {
        let mut stores = ConfigStores::default();
        stores.merge_app(obj(json!({ "x": 1 })));
        let json = serde_json::to_value(&stores).unwrap();
        assert_eq!(json, json!({ "runtimeConfig": {}, "appConfig": { "x": 1 } }));
    }
}
